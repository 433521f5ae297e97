//! Typed store of the artifacts produced by each pipeline stage.
//!
//! Each artifact is recorded once and replaced wholesale by a new run. The one
//! exception is a render batch item, which refinement may replace by index.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::views::CameraView;

/// Depth keys tried, in order, when choosing the depth reference for rendering.
const PRIMARY_DEPTH_KEYS: [&str; 3] = ["0", "main", "top"];

/// How an uploaded file is processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// CAD drawing, parsed remotely into a whitebox
    VectorCad,
    /// Raster floor plan, stored synchronously
    RasterImage,
}

impl AssetKind {
    /// Classify by filename suffix. Unknown suffixes are raster images.
    pub fn classify(file_name: &str) -> Self {
        if file_name.to_ascii_lowercase().ends_with(".dxf") {
            AssetKind::VectorCad
        } else {
            AssetKind::RasterImage
        }
    }
}

/// Raw file handed over by the file picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Bytes,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn kind(&self) -> AssetKind {
        AssetKind::classify(&self.name)
    }
}

/// Local handle for previewing an upload before the remote copy exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreviewHandle(Uuid);

impl PreviewHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PreviewHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PreviewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "preview:{}", self.0)
    }
}

/// Result of storing an asset remotely
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAsset {
    pub storage_ref: String,
    pub display_name: String,
    #[serde(default)]
    pub encrypted: bool,
}

/// The uploaded file, its preview and, once stored, its remote reference
#[derive(Debug, Clone)]
pub struct UploadAsset {
    pub file: SourceFile,
    pub kind: AssetKind,
    pub preview: PreviewHandle,
    pub stored: Option<StoredAsset>,
    pub selected_at: DateTime<Utc>,
}

impl UploadAsset {
    pub fn local(file: SourceFile) -> Self {
        Self {
            kind: file.kind(),
            file,
            preview: PreviewHandle::new(),
            stored: None,
            selected_at: Utc::now(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.stored
            .as_ref()
            .map(|s| s.display_name.as_str())
            .unwrap_or(&self.file.name)
    }
}

/// 3D mass model plus per-view depth references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhiteboxAsset {
    pub model_ref: String,
    pub depth_refs: BTreeMap<String, String>,
}

impl WhiteboxAsset {
    pub fn new(model_ref: impl Into<String>, depth_refs: BTreeMap<String, String>) -> Self {
        Self {
            model_ref: model_ref.into(),
            depth_refs,
        }
    }

    /// Depth reference used for rendering, empty if none of the known keys exist.
    pub fn primary_depth_ref(&self) -> &str {
        PRIMARY_DEPTH_KEYS
            .iter()
            .find_map(|k| self.depth_refs.get(*k).filter(|v| !v.is_empty()))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// One rendered image tagged with the view that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderItem {
    pub image_ref: String,
    pub view: CameraView,
}

pub type RenderBatch = Vec<RenderItem>;

/// Errors from recording an artifact out of order
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetError {
    #[error("whitebox already recorded for this generation")]
    WhiteboxAlreadyRecorded,
    #[error("no upload recorded")]
    NoUpload,
    #[error("no whitebox recorded")]
    NoWhitebox,
    #[error("render item {index} out of range (batch has {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Artifacts of the current generation
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    upload: Option<UploadAsset>,
    whitebox: Option<WhiteboxAsset>,
    render_batch: Option<RenderBatch>,
}

impl AssetRegistry {
    pub fn upload(&self) -> Option<&UploadAsset> {
        self.upload.as_ref()
    }

    pub fn whitebox(&self) -> Option<&WhiteboxAsset> {
        self.whitebox.as_ref()
    }

    pub fn render_batch(&self) -> Option<&RenderBatch> {
        self.render_batch.as_ref()
    }

    /// Start over with a fresh upload. Everything downstream is dropped.
    pub fn record_upload(&mut self, upload: UploadAsset) {
        self.clear();
        self.upload = Some(upload);
    }

    /// Attach the remote storage reference to the current upload.
    pub fn record_stored(&mut self, stored: StoredAsset) -> Result<(), AssetError> {
        let upload = self.upload.as_mut().ok_or(AssetError::NoUpload)?;
        upload.stored = Some(stored);
        Ok(())
    }

    pub fn record_whitebox(&mut self, whitebox: WhiteboxAsset) -> Result<(), AssetError> {
        if self.whitebox.is_some() {
            return Err(AssetError::WhiteboxAlreadyRecorded);
        }
        self.whitebox = Some(whitebox);
        Ok(())
    }

    pub fn record_batch(&mut self, batch: RenderBatch) -> Result<(), AssetError> {
        if self.whitebox.is_none() {
            return Err(AssetError::NoWhitebox);
        }
        self.render_batch = Some(batch);
        Ok(())
    }

    pub fn discard_batch(&mut self) {
        self.render_batch = None;
    }

    pub fn discard_upload(&mut self) {
        self.clear();
    }

    /// Replace the image at `index`, keeping its view tag and position.
    pub fn replace_image(&mut self, index: usize, image_ref: String) -> Result<(), AssetError> {
        let batch = self.render_batch.as_mut().ok_or(AssetError::IndexOutOfRange {
            index,
            len: 0,
        })?;
        let len = batch.len();
        let item = batch
            .get_mut(index)
            .ok_or(AssetError::IndexOutOfRange { index, len })?;
        item.image_ref = image_ref;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.upload = None;
        self.whitebox = None;
        self.render_batch = None;
    }
}

//! Pipeline session: the root aggregate of one user workflow.

mod assets;

pub use assets::{
    AssetError, AssetKind, AssetRegistry, PreviewHandle, RenderBatch, RenderItem, SourceFile,
    StoredAsset, UploadAsset, WhiteboxAsset,
};

use serde::{Deserialize, Serialize};

use crate::gallery::{DownloadItem, GalleryCursor};

/// Processing stage of the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    Uploading,
    AwaitingSyncResult,
    ProcessingAsync,
    WhiteboxReady,
    Rendering,
    GalleryReady,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Idle => write!(f, "idle"),
            Stage::Uploading => write!(f, "uploading"),
            Stage::AwaitingSyncResult => write!(f, "awaiting_sync_result"),
            Stage::ProcessingAsync => write!(f, "processing_async"),
            Stage::WhiteboxReady => write!(f, "whitebox_ready"),
            Stage::Rendering => write!(f, "rendering"),
            Stage::GalleryReady => write!(f, "gallery_ready"),
        }
    }
}

/// Fencing counter, bumped on every user-initiated restart.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fencing counter for render batches, bumped on every accepted render.
///
/// A batch outlives neither the render that replaces it nor its generation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RenderEpoch(u64);

impl RenderEpoch {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for RenderEpoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The remote job currently being polled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveTask {
    pub task_id: String,
    pub generation: Generation,
}

/// Coarse step shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Import,
    Configure,
    Generate,
}

/// State of one workflow run.
///
/// Mutated only through `PipelineController`.
#[derive(Debug, Clone, Default)]
pub struct PipelineSession {
    pub stage: Stage,
    pub generation: Generation,
    /// Epoch of the latest accepted render
    pub render_epoch: RenderEpoch,
    pub active_task: Option<ActiveTask>,
    pub assets: AssetRegistry,
    pub gallery: GalleryCursor,
    /// Stage-scoped user-facing error
    pub error: Option<String>,
    /// Display text while a stage is working
    pub progress_note: Option<String>,
}

impl PipelineSession {
    pub fn step(&self) -> WorkflowStep {
        if self.assets.upload().is_none() {
            WorkflowStep::Import
        } else if self.assets.whitebox().is_none() {
            WorkflowStep::Configure
        } else {
            WorkflowStep::Generate
        }
    }

    /// The render item under the gallery cursor.
    pub fn current_item(&self) -> Option<&RenderItem> {
        let index = self.gallery.current()?;
        self.assets.render_batch()?.get(index)
    }

    /// Human label of the view that produced the current image.
    pub fn current_label(&self) -> Option<&'static str> {
        self.current_item().map(|item| item.view.label())
    }

    pub fn current_download(&self) -> Option<DownloadItem> {
        let index = self.gallery.current()?;
        let item = self.current_item()?;
        Some(DownloadItem::new(index, item.image_ref.clone()))
    }

    /// Whether the user can re-run processing without uploading again.
    pub fn can_retry(&self) -> bool {
        self.stage == Stage::AwaitingSyncResult
            && self.assets.upload().is_some()
            && self.assets.whitebox().is_none()
    }
}

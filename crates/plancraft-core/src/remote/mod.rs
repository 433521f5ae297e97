//! Remote design services
//!
//! The pipeline drives four opaque backends: asset storage, structural CAD
//! parsing (submit/poll), batch rendering and refinement. This module defines
//! the call shapes the pipeline depends on; `http` implements them against the
//! design backend's REST API.

pub mod http;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StudioResult;
use crate::session::{SourceFile, StoredAsset, WhiteboxAsset};
use crate::views::ViewSelection;

pub use http::HttpDesignServices;

/// Response to a structural parse submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The backend finished immediately
    Completed(WhiteboxAsset),
    /// Poll this task until it resolves
    Task { task_id: String },
}

/// Observable state of a remote job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending {
        progress: Option<u8>,
    },
    /// Terminal success. A missing result means the backend has not
    /// published the assets yet.
    Success {
        result: Option<WhiteboxAsset>,
    },
    Failure {
        reason: Option<String>,
    },
}

/// One batch render request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub model_ref: String,
    pub depth_ref: String,
    pub prompt: String,
    pub strength: f32,
    pub views: ViewSelection,
}

/// Remote collaborators of the pipeline
#[async_trait]
pub trait DesignServices: Send + Sync {
    /// Store a raster asset synchronously.
    async fn store_asset(&self, file: &SourceFile) -> StudioResult<StoredAsset>;

    /// Submit a CAD file for structural parsing.
    async fn begin_structural_parse(&self, file: &SourceFile) -> StudioResult<ParseOutcome>;

    /// Check the state of a parse task.
    async fn poll_task(&self, task_id: &str) -> StudioResult<TaskStatus>;

    /// Build a whitebox from a stored raster asset.
    async fn generate_whitebox(&self, stored: &StoredAsset) -> StudioResult<WhiteboxAsset>;

    /// Render one image per requested view, in request order.
    async fn render_batch(&self, request: &RenderRequest) -> StudioResult<Vec<String>>;

    /// Apply a natural-language edit to a rendered image.
    async fn refine(&self, image_ref: &str, instruction: &str) -> StudioResult<String>;
}

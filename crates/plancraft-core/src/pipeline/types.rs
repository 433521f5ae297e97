//! Asynchronous completions applied to the session.

use crate::session::{Generation, RenderBatch, RenderEpoch, StoredAsset, WhiteboxAsset};

/// Which synchronous call a `RequestFailed` came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOrigin {
    /// Store, parse or whitebox request for the current upload
    Processing,
    /// Batch render accepted under `epoch`
    Render { epoch: RenderEpoch },
    /// Refinement of an image from the batch rendered under `epoch`
    Refine { epoch: RenderEpoch },
}

impl RequestOrigin {
    /// Render epoch the request belongs to, if it targets a batch.
    pub fn epoch(&self) -> Option<RenderEpoch> {
        match self {
            RequestOrigin::Processing => None,
            RequestOrigin::Render { epoch } | RequestOrigin::Refine { epoch } => Some(*epoch),
        }
    }
}

/// Result of a remote call or poll, tagged with the generation it started under.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    /// Raster asset stored (Uploading -> AwaitingSyncResult).
    UploadStored {
        generation: Generation,
        stored: StoredAsset,
    },
    /// Parse task accepted (-> ProcessingAsync).
    TaskStarted {
        generation: Generation,
        task_id: String,
    },
    /// Parse task still running.
    TaskProgress {
        generation: Generation,
        progress: Option<u8>,
    },
    /// Whitebox available (-> WhiteboxReady).
    WhiteboxReady {
        generation: Generation,
        whitebox: WhiteboxAsset,
    },
    /// Parse task reported terminal failure (-> AwaitingSyncResult, upload kept).
    TaskFailed {
        generation: Generation,
        error: String,
    },
    /// A synchronous call failed. Only the call's own stage is unwound.
    RequestFailed {
        generation: Generation,
        origin: RequestOrigin,
        error: String,
    },
    /// Render batch returned (Rendering -> GalleryReady).
    RenderCompleted {
        generation: Generation,
        epoch: RenderEpoch,
        batch: RenderBatch,
    },
    /// One gallery image replaced in place.
    ItemRefined {
        generation: Generation,
        epoch: RenderEpoch,
        index: usize,
        image_ref: String,
    },
}

impl SessionUpdate {
    pub fn generation(&self) -> Generation {
        match self {
            SessionUpdate::UploadStored { generation, .. }
            | SessionUpdate::TaskStarted { generation, .. }
            | SessionUpdate::TaskProgress { generation, .. }
            | SessionUpdate::WhiteboxReady { generation, .. }
            | SessionUpdate::TaskFailed { generation, .. }
            | SessionUpdate::RequestFailed { generation, .. }
            | SessionUpdate::RenderCompleted { generation, .. }
            | SessionUpdate::ItemRefined { generation, .. } => *generation,
        }
    }

    /// Render epoch for updates that target a batch.
    pub fn epoch(&self) -> Option<RenderEpoch> {
        match self {
            SessionUpdate::RenderCompleted { epoch, .. }
            | SessionUpdate::ItemRefined { epoch, .. } => Some(*epoch),
            SessionUpdate::RequestFailed { origin, .. } => origin.epoch(),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionUpdate::UploadStored { .. } => "upload_stored",
            SessionUpdate::TaskStarted { .. } => "task_started",
            SessionUpdate::TaskProgress { .. } => "task_progress",
            SessionUpdate::WhiteboxReady { .. } => "whitebox_ready",
            SessionUpdate::TaskFailed { .. } => "task_failed",
            SessionUpdate::RequestFailed { .. } => "request_failed",
            SessionUpdate::RenderCompleted { .. } => "render_completed",
            SessionUpdate::ItemRefined { .. } => "item_refined",
        }
    }
}

/// Outcome of applying an update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fence {
    /// State changed
    Applied,
    /// Update belongs to a superseded generation or render batch
    Stale,
    /// Current generation, but the stage no longer accepts it
    Ignored,
}

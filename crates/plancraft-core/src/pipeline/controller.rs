//! Stage pipeline controller: the single owner of the session state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};

use crate::error::{StudioError, StudioResult};
use crate::gallery::GalleryCursor;
use crate::session::{
    ActiveTask, Generation, PipelineSession, RenderBatch, RenderEpoch, SourceFile, Stage,
    StoredAsset, UploadAsset, WhiteboxAsset,
};
use crate::views::ViewSelection;

use super::types::{Fence, RequestOrigin, SessionUpdate};

const PARSING_NOTE: &str = "Parsing CAD structure...";
const WHITEBOX_NOTE: &str = "Generating 3D whitebox...";
const RENDERING_NOTE: &str = "Rendering views...";

/// What a render needs, captured when the render is accepted
#[derive(Debug, Clone)]
pub struct RenderTicket {
    pub generation: Generation,
    pub epoch: RenderEpoch,
    pub whitebox: WhiteboxAsset,
    pub views: ViewSelection,
}

/// What a processing retry needs
#[derive(Debug, Clone)]
pub struct RetryTicket {
    pub generation: Generation,
    pub file: SourceFile,
    pub stored: Option<StoredAsset>,
}

/// Snapshot published after every applied change
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub stage: Stage,
    pub generation: Generation,
    /// Name shown for the upload, remote name once stored
    pub upload: Option<String>,
    pub selected_at: Option<DateTime<Utc>>,
    pub task_id: Option<String>,
    pub error: Option<String>,
    pub progress_note: Option<String>,
    pub gallery_len: usize,
    pub gallery_index: usize,
}

impl From<&PipelineSession> for SessionSummary {
    fn from(session: &PipelineSession) -> Self {
        Self {
            stage: session.stage,
            generation: session.generation,
            upload: session.assets.upload().map(|u| u.display_name().to_string()),
            selected_at: session.assets.upload().map(|u| u.selected_at),
            task_id: session.active_task.as_ref().map(|t| t.task_id.clone()),
            error: session.error.clone(),
            progress_note: session.progress_note.clone(),
            gallery_len: session.gallery.len(),
            gallery_index: session.gallery.index(),
        }
    }
}

/// Owns the pipeline session and enforces stage ordering.
///
/// User-initiated transitions are methods; asynchronous completions go
/// through `apply`, the one place the generation fence is checked.
#[derive(Clone)]
pub struct PipelineController {
    session: Arc<RwLock<PipelineSession>>,
    /// Channel to notify listeners of session changes
    notify_tx: mpsc::Sender<SessionSummary>,
}

impl PipelineController {
    pub fn new() -> (Self, mpsc::Receiver<SessionSummary>) {
        let (notify_tx, notify_rx) = mpsc::channel(256);
        (
            Self {
                session: Arc::new(RwLock::new(PipelineSession::default())),
                notify_tx,
            },
            notify_rx,
        )
    }

    fn publish(&self, session: &PipelineSession) {
        let _ = self.notify_tx.try_send(SessionSummary::from(session));
    }

    /// Clone of the current session.
    pub async fn snapshot(&self) -> PipelineSession {
        self.session.read().await.clone()
    }

    pub async fn stage(&self) -> Stage {
        self.session.read().await.stage
    }

    pub async fn generation(&self) -> Generation {
        self.session.read().await.generation
    }

    /// Start a new run with `file`. Always legal.
    ///
    /// The caller must stop any running poller first.
    pub async fn begin_upload(&self, file: SourceFile) -> Generation {
        let mut session = self.session.write().await;
        let generation = session.generation.next();

        tracing::info!(
            generation = %generation,
            file = %file.name,
            previous_stage = %session.stage,
            "Upload started"
        );

        session.generation = generation;
        session.assets.record_upload(UploadAsset::local(file));
        session.gallery = GalleryCursor::default();
        session.active_task = None;
        session.error = None;
        session.progress_note = None;
        session.stage = Stage::Uploading;

        self.publish(&session);
        generation
    }

    /// Drop everything and return to `Idle` (re-import).
    pub async fn reset(&self) -> Generation {
        let mut session = self.session.write().await;
        let generation = session.generation.next();
        *session = PipelineSession {
            generation,
            ..Default::default()
        };
        tracing::info!(generation = %generation, "Session reset");

        self.publish(&session);
        generation
    }

    /// Re-run processing for the current upload without uploading again.
    pub async fn begin_retry(&self) -> StudioResult<RetryTicket> {
        let mut session = self.session.write().await;
        if !session.can_retry() {
            return Err(StudioError::invalid_request(format!(
                "Nothing to retry while {}",
                session.stage
            )));
        }
        let upload = match session.assets.upload() {
            Some(upload) => upload.clone(),
            None => return Err(StudioError::invalid_request("No upload to process")),
        };

        let generation = session.generation.next();
        session.generation = generation;
        session.error = None;
        session.progress_note = Some(WHITEBOX_NOTE.to_string());

        tracing::info!(generation = %generation, file = %upload.file.name, "Retrying processing");
        self.publish(&session);

        Ok(RetryTicket {
            generation,
            file: upload.file,
            stored: upload.stored,
        })
    }

    /// Accept a render request for the current whitebox.
    ///
    /// Rejected requests never change the stage.
    pub async fn begin_render(&self, views: &ViewSelection) -> StudioResult<RenderTicket> {
        let mut session = self.session.write().await;

        if views.is_empty() {
            let err = StudioError::invalid_request("Select at least one camera view");
            session.error = Some(err.display_message());
            self.publish(&session);
            return Err(err);
        }
        if !matches!(session.stage, Stage::WhiteboxReady | Stage::GalleryReady) {
            return Err(StudioError::invalid_request(format!(
                "Cannot render while {}",
                session.stage
            )));
        }
        let whitebox = match session.assets.whitebox() {
            Some(w) => w.clone(),
            None => return Err(StudioError::invalid_request("No whitebox to render")),
        };

        let epoch = session.render_epoch.next();
        session.render_epoch = epoch;
        session.assets.discard_batch();
        session.gallery = GalleryCursor::default();
        session.error = None;
        session.progress_note = Some(RENDERING_NOTE.to_string());
        session.stage = Stage::Rendering;

        tracing::info!(
            generation = %session.generation,
            epoch = %epoch,
            views = views.len(),
            "Render started"
        );
        self.publish(&session);

        Ok(RenderTicket {
            generation: session.generation,
            epoch,
            whitebox,
            views: views.clone(),
        })
    }

    /// Apply an asynchronous completion.
    ///
    /// Updates from an older generation, or aimed at a batch an accepted
    /// render has since replaced, are discarded without touching state.
    pub async fn apply(&self, update: SessionUpdate) -> Fence {
        self.apply_then(update, || {}).await
    }

    /// Like `apply`, running `on_applied` before the session is released.
    ///
    /// No user transition can interleave between the state change and
    /// `on_applied`.
    pub async fn apply_then(&self, update: SessionUpdate, on_applied: impl FnOnce()) -> Fence {
        let mut session = self.session.write().await;

        if update.generation() != session.generation {
            tracing::debug!(
                update = update.name(),
                update_generation = %update.generation(),
                current_generation = %session.generation,
                "Discarding stale update"
            );
            return Fence::Stale;
        }
        if let Some(epoch) = update.epoch() {
            if epoch != session.render_epoch {
                tracing::debug!(
                    update = update.name(),
                    update_epoch = %epoch,
                    current_epoch = %session.render_epoch,
                    "Discarding update for a replaced batch"
                );
                return Fence::Stale;
            }
        }

        let fence = apply_update(&mut session, update);
        if fence == Fence::Applied {
            on_applied();
            self.publish(&session);
        }
        fence
    }

    /// Move the gallery cursor forward, clamped to the batch.
    pub async fn next_image(&self) -> usize {
        let mut session = self.session.write().await;
        let index = session.gallery.next();
        self.publish(&session);
        index
    }

    pub async fn previous_image(&self) -> usize {
        let mut session = self.session.write().await;
        let index = session.gallery.previous();
        self.publish(&session);
        index
    }

    pub async fn select_image(&self, index: usize) -> usize {
        let mut session = self.session.write().await;
        let index = session.gallery.select(index);
        self.publish(&session);
        index
    }
}

fn apply_update(session: &mut PipelineSession, update: SessionUpdate) -> Fence {
    let stage = session.stage;
    match update {
        SessionUpdate::UploadStored { stored, .. } => {
            if stage != Stage::Uploading {
                return ignored("upload_stored", stage);
            }
            if session.assets.record_stored(stored).is_err() {
                return ignored("upload_stored", stage);
            }
            session.stage = Stage::AwaitingSyncResult;
            tracing::info!(generation = %session.generation, "Upload stored");
        }

        SessionUpdate::TaskStarted { task_id, .. } => {
            if !matches!(stage, Stage::Uploading | Stage::AwaitingSyncResult) {
                return ignored("task_started", stage);
            }
            tracing::info!(generation = %session.generation, task_id = %task_id, "Processing task started");
            session.active_task = Some(ActiveTask {
                task_id,
                generation: session.generation,
            });
            session.progress_note = Some(PARSING_NOTE.to_string());
            session.stage = Stage::ProcessingAsync;
        }

        SessionUpdate::TaskProgress { progress, .. } => {
            if stage != Stage::ProcessingAsync {
                return ignored("task_progress", stage);
            }
            session.progress_note = Some(match progress {
                Some(p) => format!("{} {}%", WHITEBOX_NOTE, p),
                None => WHITEBOX_NOTE.to_string(),
            });
        }

        SessionUpdate::WhiteboxReady { whitebox, .. } => {
            if !matches!(
                stage,
                Stage::Uploading | Stage::ProcessingAsync | Stage::AwaitingSyncResult
            ) {
                return ignored("whitebox_ready", stage);
            }
            if let Err(e) = session.assets.record_whitebox(whitebox) {
                tracing::warn!(generation = %session.generation, error = %e, "Whitebox not recorded");
                return Fence::Ignored;
            }
            session.active_task = None;
            session.progress_note = None;
            session.error = None;
            session.stage = Stage::WhiteboxReady;
            tracing::info!(generation = %session.generation, "Whitebox ready");
        }

        SessionUpdate::TaskFailed { error, .. } => {
            if !matches!(stage, Stage::ProcessingAsync | Stage::AwaitingSyncResult) {
                return ignored("task_failed", stage);
            }
            tracing::error!(generation = %session.generation, error = %error, "Processing failed");
            session.active_task = None;
            session.progress_note = None;
            session.error = Some(error);
            session.stage = Stage::AwaitingSyncResult;
        }

        SessionUpdate::RequestFailed { origin, error, .. } => {
            match (origin, stage) {
                (RequestOrigin::Processing, Stage::Uploading) => {
                    session.assets.discard_upload();
                    session.stage = Stage::Idle;
                }
                (RequestOrigin::Processing, Stage::AwaitingSyncResult) => {}
                (RequestOrigin::Render { .. }, Stage::Rendering) => {
                    session.stage = Stage::WhiteboxReady;
                }
                (RequestOrigin::Refine { .. }, Stage::GalleryReady) => {}
                _ => return ignored("request_failed", stage),
            }
            tracing::error!(
                generation = %session.generation,
                ?origin,
                stage = %stage,
                error = %error,
                "Request failed"
            );
            session.progress_note = None;
            session.error = Some(error);
        }

        SessionUpdate::RenderCompleted { batch, .. } => {
            if stage != Stage::Rendering {
                return ignored("render_completed", stage);
            }
            let len = batch.len();
            if session.assets.record_batch(batch).is_err() {
                return ignored("render_completed", stage);
            }
            session.gallery = GalleryCursor::new(len);
            session.progress_note = None;
            session.stage = Stage::GalleryReady;
            tracing::info!(generation = %session.generation, images = len, "Gallery ready");
        }

        SessionUpdate::ItemRefined {
            index, image_ref, ..
        } => {
            if stage != Stage::GalleryReady {
                return ignored("item_refined", stage);
            }
            if let Err(e) = session.assets.replace_image(index, image_ref) {
                tracing::warn!(error = %e, "Refined image not recorded");
                return Fence::Ignored;
            }
        }
    }
    Fence::Applied
}

fn ignored(update: &str, stage: Stage) -> Fence {
    tracing::debug!(update, stage = %stage, "Update does not apply in current stage");
    Fence::Ignored
}

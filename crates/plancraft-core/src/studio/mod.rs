//! One design session: the pipeline plus its poller and notices.
//!
//! `Studio` is the surface a frontend drives. It owns the only `TaskPoller`
//! for the session and tears it down together with the notice timer.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::{StudioError, StudioResult};
use crate::gallery::DownloadItem;
use crate::notify::{Notice, NotificationChannel};
use crate::pipeline::{
    BatchRenderCoordinator, Fence, PipelineController, PollConfig, SessionSummary, StyleParams,
    TaskPoller, UploadCoordinator,
};
use crate::remote::{DesignServices, HttpDesignServices};
use crate::session::{Generation, PipelineSession, RenderBatch, SourceFile, Stage};
use crate::views::ViewSelection;

const REFINEMENT_LABEL: &str = "Refinement";

pub struct Studio {
    config: Config,
    controller: PipelineController,
    poller: Arc<TaskPoller>,
    uploads: UploadCoordinator,
    renderer: BatchRenderCoordinator,
    notices: NotificationChannel,
}

impl Studio {
    /// Create a session backed by `services`.
    ///
    /// The receiver yields a summary after every session change.
    pub fn new(
        config: Config,
        services: Arc<dyn DesignServices>,
    ) -> (Self, mpsc::Receiver<SessionSummary>) {
        let (controller, changes) = PipelineController::new();
        let poller = Arc::new(TaskPoller::new(PollConfig {
            interval: config.poll_interval,
            max_consecutive_failures: config.max_consecutive_poll_failures,
        }));
        let uploads = UploadCoordinator::new(controller.clone(), services.clone(), poller.clone());
        let renderer = BatchRenderCoordinator::new(controller.clone(), services);
        let notices = NotificationChannel::new(config.notice_ttl);

        (
            Self {
                config,
                controller,
                poller,
                uploads,
                renderer,
                notices,
            },
            changes,
        )
    }

    /// Create a session against the HTTP design backend.
    pub fn connect(config: Config) -> StudioResult<(Self, mpsc::Receiver<SessionSummary>)> {
        let services = HttpDesignServices::new(&config)?;
        tracing::info!(api = %config.api_base_url, "Connected to design backend");
        Ok(Self::new(config, Arc::new(services)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn snapshot(&self) -> PipelineSession {
        self.controller.snapshot().await
    }

    pub async fn stage(&self) -> Stage {
        self.controller.stage().await
    }

    /// Start over with a new file. Any running poll is stopped.
    pub async fn upload(&self, file: SourceFile) -> StudioResult<Generation> {
        self.uploads.submit(file).await
    }

    /// Re-run processing for the current upload.
    pub async fn retry_processing(&self) -> StudioResult<Generation> {
        self.uploads.retry().await
    }

    pub async fn render(
        &self,
        views: &ViewSelection,
        style: &StyleParams,
    ) -> StudioResult<RenderBatch> {
        self.renderer.render(views, style).await
    }

    pub async fn next_image(&self) -> usize {
        self.controller.next_image().await
    }

    pub async fn previous_image(&self) -> usize {
        self.controller.previous_image().await
    }

    pub async fn select_image(&self, index: usize) -> usize {
        self.controller.select_image(index).await
    }

    pub async fn current_label(&self) -> Option<&'static str> {
        self.controller.snapshot().await.current_label()
    }

    /// Export reference for the image under the cursor.
    pub async fn download_current(&self) -> Option<DownloadItem> {
        self.controller.snapshot().await.current_download()
    }

    /// Apply a natural-language edit to the current image.
    ///
    /// With refinement disabled this only acknowledges the request. A refined
    /// image that arrives after a new render or upload is discarded and
    /// reported as `Superseded`.
    pub async fn refine(&self, instruction: &str) -> StudioResult<()> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(StudioError::invalid_request(
                "Describe the change you want to make",
            ));
        }

        if !self.config.refinement_enabled {
            self.notices.coming_soon(REFINEMENT_LABEL);
            return Ok(());
        }

        let session = self.controller.snapshot().await;
        let (index, image_ref) = match (session.gallery.current(), session.current_item()) {
            (Some(index), Some(item)) => (index, item.image_ref.clone()),
            _ => return Err(StudioError::invalid_request("No image selected")),
        };

        let fence = self
            .renderer
            .refine(
                session.generation,
                session.render_epoch,
                index,
                &image_ref,
                instruction,
            )
            .await?;
        match fence {
            Fence::Applied => Ok(()),
            Fence::Stale | Fence::Ignored => Err(StudioError::superseded(
                "Refined image discarded, the gallery has changed",
            )),
        }
    }

    /// Acknowledge a feature that is not available yet.
    pub fn coming_soon(&self, label: &str) {
        self.notices.coming_soon(label);
    }

    pub fn notify(&self, notice: Notice) {
        self.notices.post(notice);
    }

    pub fn notice(&self) -> Option<Notice> {
        self.notices.current()
    }

    /// Drop all artifacts and return to `Idle`.
    pub async fn reset(&self) -> Generation {
        let generation = self.controller.reset().await;
        self.poller.stop();
        generation
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_active()
    }

    /// Task id of the running poll, if any.
    pub fn polling_task(&self) -> Option<String> {
        self.poller.active().map(|(task_id, _)| task_id)
    }

    /// Stop the poller and the notice timer. Idempotent.
    pub fn shutdown(&self) {
        self.poller.stop();
        self.notices.close();
    }
}

impl Drop for Studio {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests;

//! Upload and whitebox processing.
//!
//! Raster images are stored synchronously and wait for an explicit whitebox
//! request. CAD files go to the structural parser, which either answers
//! immediately or hands back a task to poll.

use std::sync::Arc;

use crate::error::{StudioError, StudioResult};
use crate::remote::{DesignServices, ParseOutcome};
use crate::session::{AssetKind, Generation, SourceFile, StoredAsset};

use super::controller::PipelineController;
use super::poller::TaskPoller;
use super::types::{Fence, RequestOrigin, SessionUpdate};

/// Drives a source file from selection to whitebox.
pub struct UploadCoordinator {
    controller: PipelineController,
    services: Arc<dyn DesignServices>,
    poller: Arc<TaskPoller>,
}

impl UploadCoordinator {
    pub fn new(
        controller: PipelineController,
        services: Arc<dyn DesignServices>,
        poller: Arc<TaskPoller>,
    ) -> Self {
        Self {
            controller,
            services,
            poller,
        }
    }

    /// Start a new run with `file`, superseding whatever was in flight.
    ///
    /// Remote failures are recorded on the session and also returned.
    pub async fn submit(&self, file: SourceFile) -> StudioResult<Generation> {
        let kind = file.kind();
        let generation = self.controller.begin_upload(file.clone()).await;
        // A parse of the previous generation starts its poller under the
        // session lock, so it is either running now or never starts.
        self.poller.stop();
        tracing::debug!(generation = %generation, file = %file.name, ?kind, "Submitting upload");

        match kind {
            AssetKind::RasterImage => self.store(generation, &file).await?,
            AssetKind::VectorCad => self.parse(generation, &file).await?,
        }
        Ok(generation)
    }

    /// Re-run processing for the current upload under a new generation.
    ///
    /// CAD uploads are parsed again; stored rasters get a whitebox request.
    pub async fn retry(&self) -> StudioResult<Generation> {
        let ticket = self.controller.begin_retry().await?;
        self.poller.stop();
        match ticket.file.kind() {
            AssetKind::VectorCad => self.parse(ticket.generation, &ticket.file).await?,
            AssetKind::RasterImage => match ticket.stored {
                Some(stored) => self.whitebox_from(ticket.generation, &stored).await?,
                None => {
                    let err = StudioError::invalid_request("Upload has not been stored");
                    self.fail(ticket.generation, &err).await;
                    return Err(err);
                }
            },
        }
        Ok(ticket.generation)
    }

    async fn store(&self, generation: Generation, file: &SourceFile) -> StudioResult<()> {
        match self.services.store_asset(file).await {
            Ok(stored) => {
                self.controller
                    .apply(SessionUpdate::UploadStored { generation, stored })
                    .await;
                Ok(())
            }
            Err(e) => {
                self.fail(generation, &e).await;
                Err(e)
            }
        }
    }

    async fn parse(&self, generation: Generation, file: &SourceFile) -> StudioResult<()> {
        match self.services.begin_structural_parse(file).await {
            Ok(ParseOutcome::Completed(whitebox)) => {
                self.controller
                    .apply(SessionUpdate::WhiteboxReady {
                        generation,
                        whitebox,
                    })
                    .await;
                Ok(())
            }
            Ok(ParseOutcome::Task { task_id }) => {
                let fence = self
                    .controller
                    .apply_then(
                        SessionUpdate::TaskStarted {
                            generation,
                            task_id: task_id.clone(),
                        },
                        || {
                            self.poller.start(
                                task_id.clone(),
                                generation,
                                self.services.clone(),
                                Arc::new(self.controller.clone()),
                            )
                        },
                    )
                    .await;
                if fence != Fence::Applied {
                    tracing::debug!(generation = %generation, task_id = %task_id, ?fence, "Task not polled");
                }
                Ok(())
            }
            Err(e) => {
                self.fail(generation, &e).await;
                Err(e)
            }
        }
    }

    async fn whitebox_from(&self, generation: Generation, stored: &StoredAsset) -> StudioResult<()> {
        match self.services.generate_whitebox(stored).await {
            Ok(whitebox) => {
                self.controller
                    .apply(SessionUpdate::WhiteboxReady {
                        generation,
                        whitebox,
                    })
                    .await;
                Ok(())
            }
            Err(e) => {
                self.fail(generation, &e).await;
                Err(e)
            }
        }
    }

    async fn fail(&self, generation: Generation, error: &StudioError) {
        self.controller
            .apply(SessionUpdate::RequestFailed {
                generation,
                origin: RequestOrigin::Processing,
                error: error.display_message(),
            })
            .await;
    }
}

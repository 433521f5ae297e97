//! Batch rendering and in-place refinement of gallery items.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{StudioError, StudioResult};
use crate::remote::{DesignServices, RenderRequest};
use crate::session::{Generation, RenderBatch, RenderEpoch, RenderItem};
use crate::views::ViewSelection;

use super::controller::PipelineController;
use super::types::{Fence, RequestOrigin, SessionUpdate};

const PROMPT_SUFFIX: &str = "interior design";
pub const DEFAULT_STRENGTH: f32 = 0.7;

/// Named rendering style
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleKey {
    #[default]
    Modern,
    Wabi,
    /// Free text only
    Custom,
}

impl StyleKey {
    fn base_prompt(&self) -> &'static str {
        match self {
            StyleKey::Modern => "modern minimalist",
            StyleKey::Wabi => "wabi-sabi",
            StyleKey::Custom => "",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StyleKey::Modern => "Modern minimalist",
            StyleKey::Wabi => "Wabi-sabi",
            StyleKey::Custom => "Custom style",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "modern" => Some(StyleKey::Modern),
            "wabi" => Some(StyleKey::Wabi),
            "custom" => Some(StyleKey::Custom),
            _ => None,
        }
    }
}

/// Style key, optional free text and structure-adherence strength
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleParams {
    pub style: StyleKey,
    #[serde(default)]
    pub extra: String,
    pub strength: f32,
}

impl Default for StyleParams {
    fn default() -> Self {
        Self {
            style: StyleKey::default(),
            extra: String::new(),
            strength: DEFAULT_STRENGTH,
        }
    }
}

impl StyleParams {
    pub fn new(style: StyleKey, extra: impl Into<String>, strength: f32) -> Self {
        Self {
            style,
            extra: extra.into(),
            strength,
        }
    }

    /// Prompt sent to the renderer: non-empty parts joined by ", ".
    pub fn resolved_prompt(&self) -> String {
        [self.style.base_prompt(), PROMPT_SUFFIX, self.extra.trim()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn validate(&self) -> StudioResult<()> {
        if !(0.0..=1.0).contains(&self.strength) {
            return Err(StudioError::invalid_request(format!(
                "Strength must be between 0 and 1, got {}",
                self.strength
            )));
        }
        Ok(())
    }
}

/// Turns the current whitebox into a tagged gallery.
pub struct BatchRenderCoordinator {
    controller: PipelineController,
    services: Arc<dyn DesignServices>,
}

impl BatchRenderCoordinator {
    pub fn new(controller: PipelineController, services: Arc<dyn DesignServices>) -> Self {
        Self {
            controller,
            services,
        }
    }

    /// Render one image per selected view.
    ///
    /// Invalid requests are rejected before any remote call. A batch that
    /// arrives after a newer upload or render was accepted is an error: the
    /// session never holds it.
    pub async fn render(
        &self,
        views: &ViewSelection,
        style: &StyleParams,
    ) -> StudioResult<RenderBatch> {
        style.validate()?;
        let ticket = self.controller.begin_render(views).await?;
        let generation = ticket.generation;
        let origin = RequestOrigin::Render {
            epoch: ticket.epoch,
        };

        let request = RenderRequest {
            model_ref: ticket.whitebox.model_ref.clone(),
            depth_ref: ticket.whitebox.primary_depth_ref().to_string(),
            prompt: style.resolved_prompt(),
            strength: style.strength,
            views: ticket.views,
        };
        tracing::debug!(generation = %generation, prompt = %request.prompt, "Requesting render batch");

        let images = match self.services.render_batch(&request).await {
            Ok(images) if images.is_empty() => {
                let err = StudioError::transport("Render returned no images");
                self.fail(generation, origin, &err).await;
                return Err(err);
            }
            Ok(images) => images,
            Err(e) => {
                self.fail(generation, origin, &e).await;
                return Err(e);
            }
        };

        if images.len() != request.views.len() {
            tracing::warn!(
                generation = %generation,
                views = request.views.len(),
                images = images.len(),
                "Image count differs from requested views, tags wrap by position"
            );
        }

        let tags = request.views.tag_results(images.len());
        let batch: RenderBatch = images
            .into_iter()
            .zip(tags)
            .map(|(image_ref, view)| RenderItem { image_ref, view })
            .collect();

        let fence = self
            .controller
            .apply(SessionUpdate::RenderCompleted {
                generation,
                epoch: ticket.epoch,
                batch: batch.clone(),
            })
            .await;
        if fence != Fence::Applied {
            tracing::info!(
                generation = %generation,
                epoch = %ticket.epoch,
                ?fence,
                "Render result discarded"
            );
            return Err(StudioError::superseded(
                "Render result discarded, the session has moved on",
            ));
        }
        Ok(batch)
    }

    /// Replace the image at `index` of the batch rendered under `epoch`.
    ///
    /// Returns the fence of the replacement; a failed call only records its
    /// error while that batch is still current.
    pub async fn refine(
        &self,
        generation: Generation,
        epoch: RenderEpoch,
        index: usize,
        image_ref: &str,
        instruction: &str,
    ) -> StudioResult<Fence> {
        let refined = match self.services.refine(image_ref, instruction).await {
            Ok(refined) => refined,
            Err(e) => {
                self.fail(generation, RequestOrigin::Refine { epoch }, &e)
                    .await;
                return Err(e);
            }
        };
        tracing::info!(generation = %generation, epoch = %epoch, index, "Image refined");
        Ok(self
            .controller
            .apply(SessionUpdate::ItemRefined {
                generation,
                epoch,
                index,
                image_ref: refined,
            })
            .await)
    }

    async fn fail(&self, generation: Generation, origin: RequestOrigin, error: &StudioError) {
        self.controller
            .apply(SessionUpdate::RequestFailed {
                generation,
                origin,
                error: error.display_message(),
            })
            .await;
    }
}

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    capabilities::{InlineImage, require_text},
    errors::{Result, StudioError},
    events::{BroadcastSender, broadcast_json},
    options::{AspectRatio, ConsistencyMode},
    prompts,
    providers::{GenerationProvider, GenerationRequest},
};

pub const DEFAULT_MAX_BATCH_PROMPTS: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub prompts: Vec<String>,
    #[serde(default)]
    pub base_prompt: String,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub consistency_mode: ConsistencyMode,
    #[serde(default)]
    pub reference_image: Option<InlineImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    pub image: InlineImage,
    pub prompt: String,
    pub index: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub results: Vec<BatchItem>,
    pub requested: usize,
    pub failed_indices: Vec<usize>,
    /// successes / requested. Advisory only, nothing is measured on the images.
    pub consistency_score: f64,
}

pub struct BatchGenerator {
    provider: Arc<dyn GenerationProvider>,
    max_prompts: usize,
    broadcaster: Option<BroadcastSender>,
}

impl BatchGenerator {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        max_prompts: usize,
        broadcaster: Option<BroadcastSender>,
    ) -> Self {
        Self {
            provider,
            max_prompts,
            broadcaster,
        }
    }

    fn validate(&self, request: &BatchRequest) -> Result<Vec<String>> {
        if request.prompts.is_empty() {
            return Err(StudioError::invalid("batch needs at least one prompt"));
        }
        if request.prompts.len() > self.max_prompts {
            return Err(StudioError::invalid(format!(
                "batch accepts at most {} prompts, got {}",
                self.max_prompts,
                request.prompts.len()
            )));
        }

        request
            .prompts
            .iter()
            .enumerate()
            .map(|(index, prompt)| require_text(prompt, &format!("prompt #{}", index + 1)))
            .collect()
    }

    /// Runs the prompts one after another. A failed item is logged and skipped.
    pub async fn run(&self, request: &BatchRequest) -> Result<BatchOutcome> {
        let item_prompts = self.validate(request)?;
        let requested = item_prompts.len();
        let aspect = request.aspect_ratio;
        let mode = request.consistency_mode;

        let reference = request
            .reference_image
            .as_ref()
            .filter(|_| mode.uses_reference())
            .cloned();

        self.emit(
            "batch.started",
            json!({ "requested": requested, "consistency_mode": mode, "aspect_ratio": aspect }),
        );

        let system = prompts::generation_system(aspect, usize::from(reference.is_some()));
        let mut results = Vec::with_capacity(requested);
        let mut failed_indices = Vec::new();

        for (index, item) in item_prompts.into_iter().enumerate() {
            let call = GenerationRequest::new(
                system.clone(),
                prompts::batch_prompt(&request.base_prompt, &item, mode),
            )
            .images(reference.clone())
            .aspect_ratio(aspect);

            let outcome = match self.provider.generate_image(call).await {
                Ok(Some(image)) => Ok(image),
                Ok(None) => Err(StudioError::EmptyResult("image")),
                Err(err) => Err(err),
            };

            match outcome {
                Ok(image) => {
                    info!(target: "batch", index, requested, "batch item generated");
                    self.emit("batch.item_completed", json!({ "index": index }));
                    results.push(BatchItem {
                        image,
                        prompt: item,
                        index,
                    });
                }
                Err(err) => {
                    warn!(target: "batch", index, error = %err, "batch item failed, skipping");
                    self.emit(
                        "batch.item_failed",
                        json!({ "index": index, "error": err.to_string() }),
                    );
                    failed_indices.push(index);
                }
            }
        }

        let consistency_score = results.len() as f64 / requested as f64;
        info!(
            target: "batch",
            succeeded = results.len(),
            requested,
            consistency_score,
            "batch finished"
        );
        self.emit(
            "batch.finished",
            json!({
                "succeeded": results.len(),
                "requested": requested,
                "failed_indices": failed_indices,
            }),
        );

        Ok(BatchOutcome {
            results,
            requested,
            failed_indices,
            consistency_score,
        })
    }

    fn emit(&self, event: &str, payload: serde_json::Value) {
        if let Some(broadcaster) = &self.broadcaster {
            broadcast_json(broadcaster, event, payload);
        }
    }
}

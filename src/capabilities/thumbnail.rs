use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    capabilities::{InlineImage, check_reference_count, require_text},
    errors::{Result, StudioError},
    options::AspectRatio,
    prompts,
    providers::{GenerationProvider, GenerationRequest},
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub images: Vec<InlineImage>,
    /// Placed in the first reference slot, replacing whatever was there.
    #[serde(default)]
    pub style_reference: Option<InlineImage>,
}

impl GenerateRequest {
    #[cfg(test)]
    pub fn new(prompt: impl Into<String>, aspect_ratio: AspectRatio) -> Self {
        Self {
            prompt: prompt.into(),
            aspect_ratio,
            ..Default::default()
        }
    }

    /// Final reference list after style substitution.
    pub fn references(&self) -> Result<Vec<InlineImage>> {
        check_reference_count(&self.images)?;

        let mut images = self.images.clone();
        if let Some(style) = &self.style_reference {
            if images.is_empty() {
                images.push(style.clone());
            } else {
                images[0] = style.clone();
            }
        }
        Ok(images)
    }
}

pub struct ThumbnailGenerator {
    provider: Arc<dyn GenerationProvider>,
}

impl ThumbnailGenerator {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self { provider }
    }

    pub async fn generate(&self, request: &GenerateRequest) -> Result<InlineImage> {
        let prompt = require_text(&request.prompt, "prompt")?;
        let references = request.references()?;
        let aspect = request.aspect_ratio;

        let call = GenerationRequest::new(
            prompts::generation_system(aspect, references.len()),
            prompt,
        )
        .images(references)
        .aspect_ratio(aspect);

        match self.provider.generate_image(call).await? {
            Some(image) => {
                info!(target: "thumbnail", %aspect, bytes = image.data.len(), "thumbnail generated");
                Ok(image)
            }
            None => {
                warn!(target: "thumbnail", %aspect, "model answered without an image");
                Err(StudioError::EmptyResult("image"))
            }
        }
    }
}

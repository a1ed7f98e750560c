pub mod gemini;

use async_trait::async_trait;

use crate::{capabilities::InlineImage, errors::Result, options::AspectRatio};

/// One multimodal call: a system instruction, attached images and the user prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub images: Vec<InlineImage>,
    pub prompt: String,
    pub aspect_ratio: Option<AspectRatio>,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            images: Vec::new(),
            prompt: prompt.into(),
            aspect_ratio: None,
        }
    }

    pub fn images(mut self, images: impl IntoIterator<Item = InlineImage>) -> Self {
        self.images.extend(images);
        self
    }

    pub fn aspect_ratio(mut self, aspect: AspectRatio) -> Self {
        self.aspect_ratio = Some(aspect);
        self
    }
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Text completion over the attached images.
    async fn generate_text(&self, request: GenerationRequest) -> Result<String>;

    /// Image synthesis. `Ok(None)` means the call succeeded without an image part.
    async fn generate_image(&self, request: GenerationRequest) -> Result<Option<InlineImage>>;
}

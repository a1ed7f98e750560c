use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    capabilities::{InlineImage, require_text},
    errors::{Result, StudioError},
    options::AspectRatio,
    prompts,
    providers::{GenerationProvider, GenerationRequest},
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditRequest {
    #[serde(default)]
    pub base_image: Option<InlineImage>,
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
}

/// Stateless editor: every call starts from the base image the caller supplies.
pub struct ThumbnailEditor {
    provider: Arc<dyn GenerationProvider>,
}

impl ThumbnailEditor {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self { provider }
    }

    pub async fn edit(&self, request: &EditRequest) -> Result<InlineImage> {
        let base = request
            .base_image
            .clone()
            .ok_or_else(|| StudioError::invalid("a base image is required for editing"))?;
        let instruction = require_text(&request.instruction, "edit instruction")?;
        let aspect = request.aspect_ratio;

        let call = GenerationRequest::new(prompts::edit_system(aspect), instruction)
            .images([base])
            .aspect_ratio(aspect);

        match self.provider.generate_image(call).await? {
            Some(image) => {
                info!(target: "editor", %aspect, bytes = image.data.len(), "edit applied");
                Ok(image)
            }
            None => {
                warn!(target: "editor", %aspect, "model answered without an edited image");
                Err(StudioError::EmptyResult("edited image"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::{Scripted, ScriptedProvider, png};

    fn request(instruction: &str) -> EditRequest {
        EditRequest {
            base_image: Some(png(1)),
            instruction: instruction.to_string(),
            aspect_ratio: AspectRatio::Landscape,
        }
    }

    #[tokio::test]
    async fn sends_base_image_and_instruction() {
        let provider = ScriptedProvider::new(vec![Scripted::Image(Some(png(2)))]);
        let editor = ThumbnailEditor::new(provider.clone());

        let edited = editor.edit(&request("make the sky purple")).await.unwrap();
        assert_eq!(edited, png(2));

        let calls = provider.calls();
        let call = &calls[0].1;
        assert_eq!(call.images, vec![png(1)]);
        assert_eq!(call.prompt, "make the sky purple");
        assert!(call.system.contains("16:9"));
        assert!(call.system.contains("Crop the composition"));
    }

    #[tokio::test]
    async fn missing_result_is_an_error() {
        let provider = ScriptedProvider::new(vec![Scripted::Image(None)]);
        let editor = ThumbnailEditor::new(provider);

        let err = editor.edit(&request("brighter")).await.unwrap_err();
        assert!(matches!(err, StudioError::EmptyResult(_)));
    }

    #[tokio::test]
    async fn requires_base_image_and_instruction() {
        let provider = ScriptedProvider::new(vec![]);
        let editor = ThumbnailEditor::new(provider.clone());

        let mut no_base = request("brighter");
        no_base.base_image = None;
        assert!(editor.edit(&no_base).await.unwrap_err().is_validation());
        assert!(editor.edit(&request("")).await.unwrap_err().is_validation());
        assert!(provider.calls().is_empty());
    }
}

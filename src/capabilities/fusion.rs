use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    capabilities::InlineImage,
    errors::{Result, StudioError},
    options::{AspectRatio, CreativityLevel, FusionStyle},
    prompts,
    providers::{GenerationProvider, GenerationRequest},
};

const MIN_FUSION_IMAGES: usize = 2;
const MAX_FUSION_IMAGES: usize = 4;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FusionRequest {
    #[serde(default)]
    pub images: Vec<InlineImage>,
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub style: FusionStyle,
    #[serde(default)]
    pub creativity: CreativityLevel,
    #[serde(default)]
    pub dominant_image: Option<usize>,
}

/// Echo of the requested parameters; nothing here is measured on the output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusionDetails {
    pub style: FusionStyle,
    pub creativity: CreativityLevel,
    pub image_count: usize,
    pub aspect_ratio: AspectRatio,
    pub dominant_image: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FusionOutcome {
    pub image: InlineImage,
    pub description: String,
    pub analysis: String,
    pub technical_details: FusionDetails,
}

pub struct FusionEngine {
    provider: Arc<dyn GenerationProvider>,
}

impl FusionEngine {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self { provider }
    }

    fn validate(request: &FusionRequest) -> Result<()> {
        let count = request.images.len();
        if !(MIN_FUSION_IMAGES..=MAX_FUSION_IMAGES).contains(&count) {
            return Err(StudioError::invalid(format!(
                "fusion needs between {MIN_FUSION_IMAGES} and {MAX_FUSION_IMAGES} images, got {count}"
            )));
        }
        if let Some(index) = request.dominant_image {
            if index >= count {
                return Err(StudioError::invalid(format!(
                    "dominant image index {index} is out of range for {count} images"
                )));
            }
        }
        Ok(())
    }

    pub async fn fuse(&self, request: &FusionRequest) -> Result<FusionOutcome> {
        Self::validate(request)?;

        let count = request.images.len();
        let aspect = request.aspect_ratio;

        let analysis_call = GenerationRequest::new(
            prompts::fusion_analysis_system(),
            format!("Analyze these {count} images for a fused thumbnail."),
        )
        .images(request.images.iter().cloned());

        let analysis = self.provider.generate_text(analysis_call).await?;
        let analysis = analysis.trim().to_string();
        if analysis.is_empty() {
            warn!(target: "fusion", "analysis came back empty");
            return Err(StudioError::EmptyResult("image analysis"));
        }

        let instruction = if request.instruction.trim().is_empty() {
            prompts::DEFAULT_FUSION_INSTRUCTION
        } else {
            request.instruction.as_str()
        };

        let fusion_call = GenerationRequest::new(
            prompts::generation_system(aspect, count),
            prompts::fusion_prompt(
                instruction,
                &analysis,
                request.style,
                request.creativity,
                request.dominant_image,
            ),
        )
        .images(request.images.iter().cloned())
        .aspect_ratio(aspect);

        let image = self
            .provider
            .generate_image(fusion_call)
            .await?
            .ok_or(StudioError::EmptyResult("fused image"))?;

        info!(
            target: "fusion",
            images = count,
            style = %request.style,
            creativity = %request.creativity,
            "fusion completed"
        );

        Ok(FusionOutcome {
            image,
            description: prompts::fusion_description(
                count,
                request.style,
                request.creativity,
                aspect,
            ),
            analysis,
            technical_details: FusionDetails {
                style: request.style,
                creativity: request.creativity,
                image_count: count,
                aspect_ratio: aspect,
                dominant_image: request.dominant_image,
            },
        })
    }
}

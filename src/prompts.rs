//! Prompt templates shared by the generation capabilities.

use crate::options::{AspectRatio, ConsistencyMode, CreativityLevel, FusionStyle};

const OPTIMIZER_RULES: &str = "You are an expert thumbnail art director. Rewrite the user's idea into one rich, \
descriptive image-generation prompt. Rules:
1. Composition: name a single bold focal point, the camera angle and the framing.
2. Style: state the visual style, lighting and a vivid, high-contrast color palette.
3. Detail: describe textures, expressions and any readable text explicitly.
4. Use the attached reference images only as guidance for subject, style and mood.
5. Answer with the prompt text only. No preamble, no quotes, no markdown.";

const FALLBACK_QUALIFIERS: &str = "Bold focal point, high contrast, vibrant colors, sharp details, \
clean composition, eye-catching design.";

const TECHNICAL_REQUIREMENTS: &str = "Technical requirements: professional thumbnail quality, sharp focus, \
high contrast, vibrant colors, clear focal point, no watermarks, no borders.";

pub const DEFAULT_FUSION_INSTRUCTION: &str =
    "Combine the provided images into one cohesive, eye-catching thumbnail.";

pub fn optimizer_system(aspect: AspectRatio) -> String {
    format!(
        "{OPTIMIZER_RULES}\n6. The thumbnail is {}. Mention the {} aspect ratio in the prompt and \
compose for it.",
        aspect.describe(),
        aspect.as_str()
    )
}

/// Local rewrite used whenever the text model is unavailable or answers with nothing.
pub fn fallback_prompt(prompt: &str, aspect: AspectRatio) -> String {
    format!(
        "Create a professional {} thumbnail: {}. {FALLBACK_QUALIFIERS}",
        aspect.as_str(),
        prompt.trim()
    )
}

/// Framing rules for image calls. Vertical output is repositioned, never cropped.
pub fn framing_instruction(aspect: AspectRatio) -> String {
    if aspect.is_vertical() {
        format!(
            "Produce a {} image. Do not crop the subject: reposition and rescale the content so \
every important element fits inside the vertical frame, extending the background where needed.",
            aspect.describe()
        )
    } else {
        format!(
            "Produce a {} image. Crop the composition to fit the {} frame exactly, keeping the \
focal point centered and fully visible.",
            aspect.describe(),
            aspect.as_str()
        )
    }
}

pub fn generation_system(aspect: AspectRatio, reference_count: usize) -> String {
    let mut system = format!(
        "You generate high-impact thumbnails. {}",
        framing_instruction(aspect)
    );
    if reference_count > 0 {
        system.push_str(&format!(
            " Use the {reference_count} attached reference image(s) for subject, style and \
color guidance. The first image sets the overall style."
        ));
    }
    system
}

pub fn edit_system(aspect: AspectRatio) -> String {
    format!(
        "You edit an existing thumbnail. Apply only the requested change and preserve everything \
else: subject identity, layout, colors and text. {}",
        framing_instruction(aspect)
    )
}

pub fn consistency_instruction(mode: ConsistencyMode) -> &'static str {
    match mode {
        ConsistencyMode::Character => {
            "Keep the character from the reference image identical: same face, hair, outfit and \
proportions."
        }
        ConsistencyMode::Style => {
            "Match the visual style of the reference image: same palette, lighting, rendering \
technique and typography."
        }
        ConsistencyMode::Theme => {
            "Keep the same theme and mood as the reference image across this series."
        }
        ConsistencyMode::None => "Each thumbnail stands on its own.",
    }
}

pub fn batch_prompt(base: &str, item: &str, mode: ConsistencyMode) -> String {
    let mut prompt = String::new();
    let base = base.trim();
    if !base.is_empty() {
        prompt.push_str(base);
        prompt.push_str(". ");
    }
    prompt.push_str(item.trim());
    prompt.push_str(". ");
    prompt.push_str(consistency_instruction(mode));
    prompt.push(' ');
    prompt.push_str(TECHNICAL_REQUIREMENTS);
    prompt
}

pub fn fusion_analysis_system() -> &'static str {
    "You are a visual analyst. For every attached image, in order, describe its main subject, \
dominant colors, lighting, style and composition in two sentences. Finish with one sentence on \
how the images could be combined. Plain text only."
}

pub fn fusion_style_instruction(style: FusionStyle) -> &'static str {
    match style {
        FusionStyle::Seamless => {
            "Merge the images seamlessly into a single scene with unified lighting and perspective."
        }
        FusionStyle::Collage => {
            "Arrange the images as a deliberate collage with clean, intentional divisions."
        }
        FusionStyle::Overlay => {
            "Layer the images with transparency so elements of each remain visible."
        }
        FusionStyle::Blend => "Blend colors and textures of the images into one harmonious look.",
        FusionStyle::Composite => {
            "Composite subjects from each image into one believable photographic scene."
        }
    }
}

pub fn creativity_instruction(level: CreativityLevel) -> &'static str {
    match level {
        CreativityLevel::Conservative => "Stay faithful to the source images; change as little as possible.",
        CreativityLevel::Balanced => "Balance fidelity to the sources with creative interpretation.",
        CreativityLevel::Creative => "Reinterpret the sources freely with bold creative choices.",
        CreativityLevel::Experimental => {
            "Experiment boldly: unexpected compositions, surreal touches and striking color are welcome."
        }
    }
}

pub fn fusion_prompt(
    instruction: &str,
    analysis: &str,
    style: FusionStyle,
    creativity: CreativityLevel,
    dominant: Option<usize>,
) -> String {
    let mut prompt = format!(
        "{}\n\nImage analysis:\n{}\n\n{} {}",
        instruction.trim(),
        analysis.trim(),
        fusion_style_instruction(style),
        creativity_instruction(creativity)
    );
    if let Some(index) = dominant {
        prompt.push_str(&format!(
            " Image {} is dominant: its subject and style lead the result.",
            index + 1
        ));
    }
    prompt
}

pub fn fusion_description(
    image_count: usize,
    style: FusionStyle,
    creativity: CreativityLevel,
    aspect: AspectRatio,
) -> String {
    format!(
        "Fused {image_count} images in {style} style with {creativity} creativity for a {} thumbnail.",
        aspect.describe()
    )
}

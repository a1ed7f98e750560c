mod batch;
mod editor;
mod fusion;
mod optimizer;
mod thumbnail;

pub use batch::{BatchGenerator, BatchOutcome, BatchRequest, DEFAULT_MAX_BATCH_PROMPTS};
pub use editor::{EditRequest, ThumbnailEditor};
pub use fusion::{FusionEngine, FusionOutcome, FusionRequest};
pub use optimizer::{OptimizedPrompt, PromptOptimizer};
pub use thumbnail::{GenerateRequest, ThumbnailGenerator};

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, StudioError};

/// Upper bound on reference images attached to a single optimize or generate call.
pub const MAX_REFERENCE_IMAGES: usize = 3;

/// An image carried inline as a `data:<mime>;base64,<payload>` string.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl InlineImage {
    #[cfg(test)]
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Builds an image from a provider payload that is already base64 encoded.
    pub fn from_base64(mime_type: impl Into<String>, encoded: &str) -> Result<Self> {
        let mime_type = mime_type.into();
        if !mime_type.starts_with("image/") {
            return Err(StudioError::invalid(format!(
                "unsupported media type: {mime_type}"
            )));
        }

        let data = BASE64_STANDARD
            .decode(encoded.trim())
            .map_err(|err| StudioError::invalid(format!("image payload is not base64: {err}")))?;

        if data.is_empty() {
            return Err(StudioError::invalid("image payload is empty"));
        }

        Ok(Self { mime_type, data })
    }

    pub fn from_data_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| StudioError::invalid("image must be a data URI"))?;

        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| StudioError::invalid("data URI is missing its payload"))?;

        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| StudioError::invalid("data URI must be base64 encoded"))?;

        Self::from_base64(mime_type, payload)
    }

    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.data)
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

impl fmt::Debug for InlineImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineImage")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl TryFrom<String> for InlineImage {
    type Error = StudioError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_data_uri(&value)
    }
}

impl From<InlineImage> for String {
    fn from(value: InlineImage) -> Self {
        value.to_data_uri()
    }
}

pub(crate) fn require_text(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StudioError::invalid(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn check_reference_count(images: &[InlineImage]) -> Result<()> {
    if images.len() > MAX_REFERENCE_IMAGES {
        return Err(StudioError::invalid(format!(
            "at most {MAX_REFERENCE_IMAGES} reference images are allowed, got {}",
            images.len()
        )));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_uri() {
        let image = InlineImage::from_data_uri("data:image/jpeg;base64,AQID").unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.data, vec![1, 2, 3]);
        assert_eq!(image.to_data_uri(), "data:image/jpeg;base64,AQID");
    }

    #[test]
    fn rejects_non_image_payloads() {
        assert!(InlineImage::from_data_uri("https://example.com/a.png").is_err());
        assert!(InlineImage::from_data_uri("data:text/plain;base64,AQID").is_err());
        assert!(InlineImage::from_data_uri("data:image/png,raw").is_err());
        assert!(InlineImage::from_data_uri("data:image/png;base64,").is_err());
        assert!(InlineImage::from_data_uri("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn deserializes_from_json_string() {
        let image: InlineImage = serde_json::from_str("\"data:image/png;base64,AQID\"").unwrap();
        assert_eq!(image.data, vec![1, 2, 3]);
        let back = serde_json::to_string(&image).unwrap();
        assert_eq!(back, "\"data:image/png;base64,AQID\"");
    }

    #[test]
    fn reference_count_is_bounded() {
        let image = testing::png(1);
        assert!(check_reference_count(&vec![image.clone(); 3]).is_ok());
        assert!(check_reference_count(&vec![image; 4]).unwrap_err().is_validation());
    }

    #[test]
    fn require_text_trims() {
        assert_eq!(require_text("  hi ", "prompt").unwrap(), "hi");
        assert!(require_text("   ", "prompt").is_err());
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    capabilities::InlineImage,
    config::GeminiConfig,
    errors::{Result, StudioError},
    providers::{GenerationProvider, GenerationRequest},
};

/// Gemini `generateContent` client.
///
/// Text calls go to the configured text model, image calls to the image model with
/// `responseModalities = ["IMAGE", "TEXT"]`. Images travel as `inlineData` parts in
/// both directions.
#[derive(Clone)]
pub struct GeminiProvider {
    http_client: HttpClient,
    api_key: String,
    api_base: String,
    text_model: String,
    image_model: String,
}

impl GeminiProvider {
    pub fn from_config(config: &GeminiConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .user_agent("ThumbnailStudio/0.1")
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http_client,
            api_key: config.api_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.api_base, model)
    }

    async fn send(&self, model: &str, payload: &GeminiRequest<'_>) -> Result<GeminiResponse> {
        let response = self
            .http_client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or(body);
            warn!(target: "gemini", %status, model, "provider rejected request");
            return Err(StudioError::provider(format!("{model} ({status}): {message}")));
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|err| StudioError::provider(format!("failed to decode response: {err}")))?;

        if let Some(reason) = parsed.block_reason() {
            return Err(StudioError::provider(format!("prompt blocked: {reason}")));
        }

        Ok(parsed)
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    async fn generate_text(&self, request: GenerationRequest) -> Result<String> {
        let payload = GeminiRequest::from_request(&request, false);
        debug!(target: "gemini", model = %self.text_model, images = request.images.len(), "text request");
        let response = self.send(&self.text_model, &payload).await?;
        Ok(response.text().unwrap_or_default())
    }

    async fn generate_image(&self, request: GenerationRequest) -> Result<Option<InlineImage>> {
        let payload = GeminiRequest::from_request(&request, true);
        debug!(target: "gemini", model = %self.image_model, images = request.images.len(), "image request");
        let response = self.send(&self.image_model, &payload).await?;
        let image = response.image()?;
        if image.is_none() {
            if let Some(reason) = response.abnormal_finish() {
                warn!(target: "gemini", model = %self.image_model, reason, "image generation stopped");
                return Err(StudioError::provider(format!(
                    "image generation stopped: {reason}"
                )));
            }
        }
        Ok(image)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent<'a>>,
    contents: Vec<GeminiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

impl<'a> GeminiRequest<'a> {
    fn from_request(request: &'a GenerationRequest, wants_image: bool) -> Self {
        let system_instruction = (!request.system.is_empty()).then(|| GeminiContent {
            role: None,
            parts: vec![RequestPart::Text {
                text: &request.system,
            }],
        });

        let mut parts: Vec<RequestPart<'a>> = request
            .images
            .iter()
            .map(|image| RequestPart::InlineData {
                inline_data: InlineDataOut {
                    mime_type: &image.mime_type,
                    data: image.to_base64(),
                },
            })
            .collect();
        parts.push(RequestPart::Text {
            text: &request.prompt,
        });

        let generation_config = wants_image.then(|| GenerationConfig {
            response_modalities: vec!["IMAGE", "TEXT"],
            image_config: request.aspect_ratio.map(|aspect| ImageConfig {
                aspect_ratio: aspect.as_str(),
            }),
        });

        Self {
            system_instruction,
            contents: vec![GeminiContent {
                role: Some("user"),
                parts,
            }],
            generation_config,
        }
    }
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineDataOut<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataOut<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<ImageConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    aspect_ratio: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

impl GeminiResponse {
    fn parts(&self) -> impl Iterator<Item = &ResponsePart> {
        self.candidates
            .iter()
            .filter_map(|candidate| candidate.content.as_ref())
            .flat_map(|content| content.parts.iter())
    }

    fn text(&self) -> Option<String> {
        let text = self
            .parts()
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    fn image(&self) -> Result<Option<InlineImage>> {
        self.parts()
            .find_map(|part| part.inline_data.as_ref())
            .map(|inline| InlineImage::from_base64(inline.mime_type.as_str(), &inline.data))
            .transpose()
            .map_err(|err| StudioError::provider(format!("malformed image payload: {err}")))
    }

    /// First finish reason other than a normal `STOP`, e.g. `IMAGE_SAFETY`.
    fn abnormal_finish(&self) -> Option<&str> {
        self.candidates
            .iter()
            .filter_map(|candidate| candidate.finish_reason.as_deref())
            .find(|reason| *reason != "STOP")
    }

    fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, alias = "inline_data")]
    inline_data: Option<InlineDataIn>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataIn {
    #[serde(default = "default_mime", alias = "mime_type")]
    mime_type: String,
    data: String,
}

fn default_mime() -> String {
    "image/png".to_string()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Deserialize)]
struct GeminiErrorBody {
    message: String,
}

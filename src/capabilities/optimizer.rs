use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    capabilities::{InlineImage, check_reference_count, require_text},
    errors::Result,
    options::AspectRatio,
    prompts,
    providers::{GenerationProvider, GenerationRequest},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizedPrompt {
    pub optimized_prompt: String,
    /// Set when the text model failed and the local template was used instead.
    pub fallback: bool,
}

pub struct PromptOptimizer {
    provider: Arc<dyn GenerationProvider>,
}

impl PromptOptimizer {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self { provider }
    }

    /// Rewrites the prompt with the text model. Provider trouble never fails the call;
    /// only invalid input does.
    pub async fn optimize(
        &self,
        prompt: &str,
        aspect: AspectRatio,
        references: &[InlineImage],
    ) -> Result<OptimizedPrompt> {
        let prompt = require_text(prompt, "prompt")?;
        check_reference_count(references)?;

        let request = GenerationRequest::new(prompts::optimizer_system(aspect), prompt.clone())
            .images(references.iter().cloned());

        match self.provider.generate_text(request).await {
            Ok(text) if !text.trim().is_empty() => {
                info!(target: "optimizer", %aspect, references = references.len(), "prompt optimized");
                Ok(OptimizedPrompt {
                    optimized_prompt: text.trim().to_string(),
                    fallback: false,
                })
            }
            Ok(_) => {
                warn!(target: "optimizer", "text model returned nothing, using template");
                Ok(Self::fallback(&prompt, aspect))
            }
            Err(err) => {
                warn!(target: "optimizer", error = %err, "optimization failed, using template");
                Ok(Self::fallback(&prompt, aspect))
            }
        }
    }

    fn fallback(prompt: &str, aspect: AspectRatio) -> OptimizedPrompt {
        OptimizedPrompt {
            optimized_prompt: prompts::fallback_prompt(prompt, aspect),
            fallback: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::{CallKind, Scripted, ScriptedProvider, png};

    #[tokio::test]
    async fn returns_model_text() {
        let provider = ScriptedProvider::new(vec![Scripted::Text(
            "  A glossy red sports car on golden sand, 1:1 square  ".to_string(),
        )]);
        let optimizer = PromptOptimizer::new(provider.clone());

        let result = optimizer
            .optimize("red car on a beach", AspectRatio::Square, &[png(1)])
            .await
            .unwrap();

        assert!(!result.fallback);
        assert_eq!(
            result.optimized_prompt,
            "A glossy red sports car on golden sand, 1:1 square"
        );

        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, CallKind::Text);
        assert_eq!(calls[0].1.images.len(), 1);
        assert!(calls[0].1.system.contains("1:1"));
    }

    #[tokio::test]
    async fn provider_failure_uses_fallback_template() {
        let provider = ScriptedProvider::new(vec![Scripted::Fail("quota exceeded".to_string())]);
        let optimizer = PromptOptimizer::new(provider);

        let result = optimizer
            .optimize("red car on a beach", AspectRatio::Landscape, &[])
            .await
            .unwrap();

        assert!(result.fallback);
        assert_eq!(
            result.optimized_prompt,
            prompts::fallback_prompt("red car on a beach", AspectRatio::Landscape)
        );
        assert!(result.optimized_prompt.contains("red car on a beach"));
        assert!(result.optimized_prompt.contains("16:9"));
    }

    #[tokio::test]
    async fn blank_answer_uses_fallback_template() {
        let provider = ScriptedProvider::new(vec![Scripted::Text("   ".to_string())]);
        let optimizer = PromptOptimizer::new(provider);

        let result = optimizer
            .optimize("podcast cover", AspectRatio::Portrait, &[])
            .await
            .unwrap();

        assert!(result.fallback);
        assert!(result.optimized_prompt.contains("9:16"));
    }

    #[tokio::test]
    async fn rejects_invalid_input_without_calling_provider() {
        let provider = ScriptedProvider::new(vec![]);
        let optimizer = PromptOptimizer::new(provider.clone());

        let err = optimizer
            .optimize("  ", AspectRatio::Square, &[])
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = optimizer
            .optimize("ok", AspectRatio::Square, &vec![png(1); 4])
            .await
            .unwrap_err();
        assert!(err.is_validation());

        assert!(provider.calls().is_empty());
    }
}

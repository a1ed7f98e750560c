use std::sync::Arc;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    capabilities::{
        BatchGenerator, BatchOutcome, BatchRequest, EditRequest, FusionEngine, FusionOutcome,
        FusionRequest, GenerateRequest, InlineImage, OptimizedPrompt, PromptOptimizer,
        ThumbnailEditor, ThumbnailGenerator,
    },
    config::AppConfig,
    errors::{Result, StudioError},
    events::{BroadcastSender, broadcast_json},
    options::AspectRatio,
    providers::GenerationProvider,
    session::{HistoryEntry, HistoryPage, SessionStore},
};

/// A single-image result, plus the history entry it produced when a session was named.
#[derive(Debug, Clone)]
pub struct ImageOutcome {
    pub image: InlineImage,
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub history_entry: Option<HistoryEntry>,
}

pub struct Studio {
    optimizer: PromptOptimizer,
    generator: ThumbnailGenerator,
    editor: ThumbnailEditor,
    batch: BatchGenerator,
    fusion: FusionEngine,
    sessions: SessionStore,
    broadcaster: Option<BroadcastSender>,
}

impl Studio {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        config: &AppConfig,
        broadcaster: Option<BroadcastSender>,
    ) -> Self {
        Self::with_limits(
            provider,
            config.max_batch_prompts,
            config.history_display_limit,
            config.max_sessions,
            broadcaster,
        )
    }

    pub fn with_limits(
        provider: Arc<dyn GenerationProvider>,
        max_batch_prompts: usize,
        history_display_limit: usize,
        max_sessions: usize,
        broadcaster: Option<BroadcastSender>,
    ) -> Self {
        Self {
            optimizer: PromptOptimizer::new(provider.clone()),
            generator: ThumbnailGenerator::new(provider.clone()),
            editor: ThumbnailEditor::new(provider.clone()),
            batch: BatchGenerator::new(provider.clone(), max_batch_prompts, broadcaster.clone()),
            fusion: FusionEngine::new(provider),
            sessions: SessionStore::new(history_display_limit, max_sessions),
            broadcaster,
        }
    }

    pub async fn optimize(
        &self,
        prompt: &str,
        aspect: AspectRatio,
        references: &[InlineImage],
    ) -> Result<OptimizedPrompt> {
        self.optimizer.optimize(prompt, aspect, references).await
    }

    pub async fn generate(
        &self,
        mut request: GenerateRequest,
        session_id: Option<Uuid>,
    ) -> Result<ImageOutcome> {
        if let Some(id) = session_id {
            self.ensure_session(id).await?;
            if request.style_reference.is_none() {
                request.style_reference = self.sessions.style_reference(id).await?;
            }
        }

        let image = self.generator.generate(&request).await?;
        self.finish(
            "thumbnail.generated",
            image,
            request.prompt.trim().to_string(),
            request.aspect_ratio,
            session_id,
        )
        .await
    }

    pub async fn edit(&self, request: EditRequest, session_id: Option<Uuid>) -> Result<ImageOutcome> {
        if let Some(id) = session_id {
            self.ensure_session(id).await?;
        }

        let image = self.editor.edit(&request).await?;
        self.finish(
            "thumbnail.edited",
            image,
            request.instruction.trim().to_string(),
            request.aspect_ratio,
            session_id,
        )
        .await
    }

    pub async fn batch(&self, request: BatchRequest) -> Result<BatchOutcome> {
        self.batch.run(&request).await
    }

    pub async fn fuse(
        &self,
        request: FusionRequest,
        session_id: Option<Uuid>,
    ) -> Result<(FusionOutcome, Option<HistoryEntry>)> {
        if let Some(id) = session_id {
            self.ensure_session(id).await?;
        }

        let outcome = self.fusion.fuse(&request).await?;
        let recorded = self
            .finish(
                "thumbnail.fused",
                outcome.image.clone(),
                outcome.description.clone(),
                request.aspect_ratio,
                session_id,
            )
            .await?;

        Ok((outcome, recorded.history_entry))
    }

    pub async fn create_session(&self) -> Uuid {
        self.sessions.create().await
    }

    pub async fn delete_session(&self, id: Uuid) -> Result<()> {
        self.sessions.remove(id).await
    }

    pub async fn history(&self, id: Uuid) -> Result<HistoryPage> {
        self.sessions.recent(id).await
    }

    pub async fn select_style_reference(&self, id: Uuid, index: Option<usize>) -> Result<bool> {
        self.sessions.select_style_reference(id, index).await
    }

    async fn ensure_session(&self, id: Uuid) -> Result<()> {
        if self.sessions.contains(id).await {
            Ok(())
        } else {
            Err(StudioError::SessionNotFound(id))
        }
    }

    async fn finish(
        &self,
        event: &str,
        image: InlineImage,
        prompt: String,
        aspect_ratio: AspectRatio,
        session_id: Option<Uuid>,
    ) -> Result<ImageOutcome> {
        let history_entry = match session_id {
            Some(id) => {
                let entry = HistoryEntry::new(prompt.clone(), image.clone(), aspect_ratio);
                self.sessions.append(id, entry.clone()).await?;
                Some(entry)
            }
            None => None,
        };

        info!(target: "studio", event, %aspect_ratio, recorded = history_entry.is_some(), "action completed");

        if let Some(broadcaster) = &self.broadcaster {
            broadcast_json(
                broadcaster,
                event,
                json!({
                    "aspect_ratio": aspect_ratio,
                    "bytes": image.data.len(),
                    "session_id": session_id,
                }),
            );
        }

        Ok(ImageOutcome {
            image,
            prompt,
            aspect_ratio,
            history_entry,
        })
    }
}

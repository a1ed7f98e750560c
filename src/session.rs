use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    capabilities::InlineImage,
    errors::{Result, StudioError},
    options::AspectRatio,
};

pub const DEFAULT_HISTORY_DISPLAY_LIMIT: usize = 6;
pub const DEFAULT_MAX_SESSIONS: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub prompt: String,
    pub image: InlineImage,
    pub timestamp: DateTime<Utc>,
    pub aspect_ratio: AspectRatio,
}

impl HistoryEntry {
    pub fn new(prompt: impl Into<String>, image: InlineImage, aspect_ratio: AspectRatio) -> Self {
        Self {
            prompt: prompt.into(),
            image,
            timestamp: Utc::now(),
            aspect_ratio,
        }
    }
}

#[derive(Debug)]
struct Session {
    created_at: DateTime<Utc>,
    last_active: u64,
    history: Vec<HistoryEntry>,
    style_reference: Option<InlineImage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    pub total: usize,
    pub created_at: DateTime<Utc>,
}

/// In-memory session state. History is append-only; nothing outlives the process.
///
/// At most `max_sessions` live at once. Creating one more evicts the session that was
/// least recently created, appended to or given a style reference.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    activity: Arc<AtomicU64>,
    display_limit: usize,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(display_limit: usize, max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            activity: Arc::new(AtomicU64::new(0)),
            display_limit: display_limit.max(1),
            max_sessions: max_sessions.max(1),
        }
    }

    fn tick(&self) -> u64 {
        self.activity.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        let mut sessions = self.sessions.write().await;

        while sessions.len() >= self.max_sessions {
            let Some(stale) = sessions
                .iter()
                .min_by_key(|(_, session)| session.last_active)
                .map(|(id, _)| *id)
            else {
                break;
            };
            sessions.remove(&stale);
            info!(target: "session", id = %stale, "idle session evicted");
        }

        sessions.insert(
            id,
            Session {
                created_at: Utc::now(),
                last_active: self.tick(),
                history: Vec::new(),
                style_reference: None,
            },
        );
        info!(target: "session", %id, active = sessions.len(), "session created");
        id
    }

    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&id).ok_or(StudioError::SessionNotFound(id))?;
        info!(target: "session", %id, active = sessions.len(), "session removed");
        Ok(())
    }

    pub async fn append(&self, id: Uuid, entry: HistoryEntry) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(StudioError::SessionNotFound(id))?;
        session.last_active = self.tick();
        session.history.push(entry);
        debug!(target: "session", %id, total = session.history.len(), "history entry appended");
        Ok(())
    }

    /// The newest entries up to the display limit, oldest first.
    pub async fn recent(&self, id: Uuid) -> Result<HistoryPage> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(&id).ok_or(StudioError::SessionNotFound(id))?;
        let total = session.history.len();
        let start = total.saturating_sub(self.display_limit);
        Ok(HistoryPage {
            entries: session.history[start..].to_vec(),
            total,
            created_at: session.created_at,
        })
    }

    /// Promotes a history image to style reference, or clears it with `None`.
    /// The index addresses the full history, not the displayed page.
    pub async fn select_style_reference(&self, id: Uuid, index: Option<usize>) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(StudioError::SessionNotFound(id))?;
        session.last_active = self.tick();

        session.style_reference = match index {
            Some(index) => {
                let entry = session.history.get(index).ok_or_else(|| {
                    StudioError::invalid(format!(
                        "history index {index} is out of range ({} entries)",
                        session.history.len()
                    ))
                })?;
                Some(entry.image.clone())
            }
            None => None,
        };

        Ok(session.style_reference.is_some())
    }

    pub async fn style_reference(&self, id: Uuid) -> Result<Option<InlineImage>> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(&id).ok_or(StudioError::SessionNotFound(id))?;
        Ok(session.style_reference.clone())
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.sessions.read().await.contains_key(&id)
    }
}

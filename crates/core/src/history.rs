use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Rio,
}

/// One finished exchange side. Turns are appended at turn-complete and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatTurn {
    pub speaker: Speaker,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    pub fn rio(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Rio,
            text: text.into(),
        }
    }
}

/// Persistent conversation history. The orchestrator loads on session
/// start, saves after every completed turn and clears on explicit request.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn load(&self) -> Result<Vec<ChatTurn>>;
    async fn save(&self, turns: &[ChatTurn]) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// In-memory store, used by tests and as a fallback when no persistence
/// path is configured.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    turns: tokio::sync::Mutex<Vec<ChatTurn>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn load(&self) -> Result<Vec<ChatTurn>> {
        Ok(self.turns.lock().await.clone())
    }

    async fn save(&self, turns: &[ChatTurn]) -> Result<()> {
        *self.turns.lock().await = turns.to_vec();
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.turns.lock().await.clear();
        Ok(())
    }
}

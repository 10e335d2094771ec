use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;

use rio_core::history::{ChatTurn, HistoryStore};

/// Chat history persisted as a JSON file next to the service.
pub struct FileHistoryStore {
    path: PathBuf,
}

impl FileHistoryStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn load(&self) -> Result<Vec<ChatTurn>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).context("Failed to parse the chat history file")
            }
            // A missing file just means no conversation has happened yet.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e).context("Failed to read the chat history file"),
        }
    }

    async fn save(&self, turns: &[ChatTurn]) -> Result<()> {
        let json =
            serde_json::to_vec_pretty(turns).context("Failed to serialize the chat history")?;
        tokio::fs::write(&self.path, json)
            .await
            .context("Failed to write the chat history file")
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove the chat history file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn history_round_trips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path().join("history.json"));

        let turns = vec![
            ChatTurn::user("Rio ơi"),
            ChatTurn::rio("Dạ, mình nghe đây!"),
        ];
        store.save(&turns).await.unwrap();
        assert_eq!(store.load().await.unwrap(), turns);
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path().join("none.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path().join("history.json"));
        store.save(&[ChatTurn::user("xin chào")]).await.unwrap();
        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        let store = FileHistoryStore::new(path);
        assert!(store.load().await.is_err());
    }
}

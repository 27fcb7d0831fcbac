//! File-backed persistence: one JSON Lines log per channel or direct
//! conversation, plus a JSON snapshot of the whole chat state.

use std::path::{Path, PathBuf};

use afterhours_core::{ChatState, MessageStore, PersistenceError, StorageKey};
use afterhours_types::Message;
use futures::future::{BoxFuture, FutureExt};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::RunnerError;

const SNAPSHOT_FILE: &str = "state.json";

/// Appends every saved message to `{dir}/{key}.jsonl`.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    dir: PathBuf,
}

impl JsonlStore {
    /// Store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Log file for `key`. Names are reduced to a filesystem-safe form,
    /// `channel:#lobby` becomes `channel_lobby.jsonl`.
    pub fn path_for(&self, key: &StorageKey) -> PathBuf {
        let mut name = String::new();
        for c in key.as_key().chars() {
            if c.is_alphanumeric() || c == '-' {
                name.push(c);
            } else if !name.ends_with('_') {
                name.push('_');
            }
        }
        self.dir.join(format!("{name}.jsonl"))
    }

    async fn append(&self, key: &StorageKey, message: &Message) -> Result<(), RunnerError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        let path = self.path_for(key);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        debug!(path = %path.display(), id = %message.id, "message appended");
        Ok(())
    }

    /// Write `state` to the snapshot file.
    pub async fn save_snapshot(&self, state: &ChatState) -> Result<(), RunnerError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(SNAPSHOT_FILE);
        tokio::fs::write(&path, state.to_json()?).await?;
        info!(path = %path.display(), "state snapshot saved");
        Ok(())
    }

    /// Read the snapshot file, if one exists.
    pub async fn load_snapshot(&self) -> Result<Option<ChatState>, RunnerError> {
        let path = self.dir.join(SNAPSHOT_FILE);
        if !exists(&path).await {
            return Ok(None);
        }
        let json = tokio::fs::read_to_string(&path).await?;
        Ok(Some(ChatState::from_json(&json)?))
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

impl MessageStore for JsonlStore {
    fn save_message<'a>(
        &'a self,
        key: &'a StorageKey,
        message: &'a Message,
    ) -> BoxFuture<'a, Result<(), PersistenceError>> {
        async move {
            self.append(key, message)
                .await
                .map_err(|e| PersistenceError(e.to_string()))
        }
        .boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use afterhours_core::SimulationConfig;
    use afterhours_types::MessageKind;
    use chrono::Utc;

    use super::*;

    fn scratch(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "afterhours_store_{label}_{}_{:?}",
            std::process::id(),
            std::thread::current().id(),
        ))
    }

    #[test]
    fn keys_map_to_safe_file_names() {
        let store = JsonlStore::new("/data");
        assert_eq!(
            store.path_for(&StorageKey::Channel("#lobby".into())),
            PathBuf::from("/data/channel_lobby.jsonl")
        );
        assert_eq!(
            store.path_for(&StorageKey::Direct("nova".into())),
            PathBuf::from("/data/dm_nova.jsonl")
        );
    }

    #[tokio::test]
    async fn messages_append_as_json_lines() {
        let dir = scratch("append");
        let store = JsonlStore::new(&dir);
        let key = StorageKey::Direct("nova".into());
        for text in ["hey", "you around?"] {
            let message = Message::new("nova", text, MessageKind::Pm, Utc::now());
            store.save_message(&key, &message).await.unwrap();
        }

        let contents = tokio::fs::read_to_string(store.path_for(&key)).await.unwrap();
        let lines: Vec<Message> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].content, "you around?");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn snapshot_round_trips() {
        let dir = scratch("snapshot");
        let store = JsonlStore::new(&dir);
        assert!(store.load_snapshot().await.unwrap().is_none());

        let state = ChatState::from_config(&SimulationConfig::default());
        store.save_snapshot(&state).await.unwrap();
        assert_eq!(store.load_snapshot().await.unwrap(), Some(state));

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}

//! Contracts for the external collaborators the core drives.
//!
//! The generation backend, the persistence layer and the bot-command
//! handler are all supplied by the embedding application. Each is an
//! object-safe trait returning a boxed future so a single simulation can
//! hold them as `Arc<dyn ...>`.

use std::collections::BTreeMap;
use std::sync::Mutex;

use afterhours_types::{Actor, BehaviorProfile, Message};
use futures::future::{BoxFuture, FutureExt};

use crate::error::{BotError, GenerationError, PersistenceError};

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// What the backend knows about one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    /// Nickname.
    pub name: String,
    /// Free-text personality.
    pub personality: String,
    /// Behavioral dials.
    pub profile: BehaviorProfile,
    /// Relationship memory digest relevant to this request.
    pub memory: String,
}

impl Persona {
    /// Persona for `actor` with the given memory digest.
    pub fn of(actor: &Actor, memory: String) -> Self {
        Self {
            name: actor.name.clone(),
            personality: actor.personality.clone(),
            profile: actor.profile,
            memory,
        }
    }
}

/// Everything the backend needs for one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationRequest {
    /// Spontaneous channel chatter. Reply shape: one `"name: content"` line.
    Channel {
        /// Channel name.
        channel: String,
        /// Current topic.
        topic: String,
        /// The human's nickname.
        human: String,
        /// Synthetic members who may speak.
        members: Vec<Persona>,
        /// Most recent messages, oldest first.
        recent: Vec<Message>,
        /// A message the reply should respond to, if any.
        trigger: Option<Message>,
    },
    /// A reaction to one specific recent message. Same reply shape.
    Reaction {
        /// Channel name.
        channel: String,
        /// Current topic.
        topic: String,
        /// The human's nickname.
        human: String,
        /// Synthetic members who may react.
        members: Vec<Persona>,
        /// Most recent messages, oldest first.
        recent: Vec<Message>,
        /// The message being reacted to.
        target: Message,
    },
    /// An in-character private message. Reply shape: raw text.
    Direct {
        /// The synthetic actor writing.
        actor: Persona,
        /// The human's nickname.
        human: String,
        /// The full conversation so far, oldest first.
        history: Vec<Message>,
        /// Cue for what kind of message to write.
        opener: Option<String>,
    },
}

impl GenerationRequest {
    /// Short label for logs and limiter tags.
    pub fn label(&self) -> String {
        match self {
            Self::Channel { channel, .. } => format!("chatter {channel}"),
            Self::Reaction { channel, .. } => format!("reaction {channel}"),
            Self::Direct { actor, .. } => format!("dm @{}", actor.name),
        }
    }
}

/// The language-generation service.
///
/// Returns `Ok(None)` when the backend produced nothing usable.
pub trait GenerationBackend: Send + Sync {
    /// Generate text for `request` with the given model.
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
        model_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>, GenerationError>>;
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Where a message is persisted. Direct conversations live in their own
/// namespace so a channel and an actor can never collide.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StorageKey {
    /// A channel log.
    Channel(String),
    /// A direct conversation with the named actor.
    Direct(String),
}

impl StorageKey {
    /// Flat string form, `channel:#lobby` or `dm:nova`.
    pub fn as_key(&self) -> String {
        match self {
            Self::Channel(name) => format!("channel:{name}"),
            Self::Direct(name) => format!("dm:{name}"),
        }
    }
}

/// Saves messages somewhere durable.
pub trait MessageStore: Send + Sync {
    /// Persist `message` under `key`.
    fn save_message<'a>(
        &'a self,
        key: &'a StorageKey,
        message: &'a Message,
    ) -> BoxFuture<'a, Result<(), PersistenceError>>;
}

/// A store that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<BTreeMap<StorageKey, Vec<Message>>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages saved under `key`, oldest first.
    pub fn saved(&self, key: &StorageKey) -> Vec<Message> {
        let saved = match self.saved.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        saved.get(key).cloned().unwrap_or_default()
    }
}

impl MessageStore for MemoryStore {
    fn save_message<'a>(
        &'a self,
        key: &'a StorageKey,
        message: &'a Message,
    ) -> BoxFuture<'a, Result<(), PersistenceError>> {
        let mut saved = match self.saved.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        saved.entry(key.clone()).or_default().push(message.clone());
        futures::future::ready(Ok(())).boxed()
    }
}

// ---------------------------------------------------------------------------
// Bot commands
// ---------------------------------------------------------------------------

/// Answers `!command` messages on behalf of a bot actor.
pub trait BotHandler: Send + Sync {
    /// Handle `command` typed in `channel`, answering as `bot`.
    fn handle<'a>(
        &'a self,
        command: &'a str,
        bot: &'a Actor,
        channel: &'a str,
        model_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Message>, BotError>>;
}

/// A handler that never answers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentBot;

impl BotHandler for SilentBot {
    fn handle<'a>(
        &'a self,
        _command: &'a str,
        _bot: &'a Actor,
        _channel: &'a str,
        _model_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Message>, BotError>> {
        futures::future::ready(Ok(None)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use afterhours_types::MessageKind;
    use chrono::Utc;

    use super::*;

    #[test]
    fn storage_keys_are_namespaced() {
        assert_eq!(StorageKey::Channel("#lobby".into()).as_key(), "channel:#lobby");
        assert_eq!(StorageKey::Direct("nova".into()).as_key(), "dm:nova");
    }

    #[tokio::test]
    async fn memory_store_keeps_messages_per_key() {
        let store = MemoryStore::new();
        let key = StorageKey::Direct("nova".into());
        let message = Message::new("nova", "hey", MessageKind::Pm, Utc::now());
        assert!(store.save_message(&key, &message).await.is_ok());
        assert_eq!(store.saved(&key), vec![message]);
        assert!(store.saved(&StorageKey::Channel("nova".into())).is_empty());
    }
}

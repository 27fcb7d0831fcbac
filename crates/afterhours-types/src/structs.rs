//! Core entity structs for the Afterhours chat simulation.
//!
//! Actors, channels, messages, direct conversations, and the relationship
//! records synthetic actors keep about everyone they talk to.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{ActorKind, InteractionKind, MessageKind, RelationshipLevel, Sentiment};
use crate::ids::MessageId;

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

/// Behavioral dials fed to the generation backend.
///
/// Every dial is on a 1 to 10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BehaviorProfile {
    /// How formal the actor's register is.
    pub formality: u8,
    /// How long the actor's messages tend to be.
    pub verbosity: u8,
    /// How often the actor jokes.
    pub humor: u8,
    /// How often the actor uses emoji.
    pub emoji_usage: u8,
    /// How carefully the actor punctuates.
    pub punctuation: u8,
}

impl Default for BehaviorProfile {
    fn default() -> Self {
        Self {
            formality: 5,
            verbosity: 5,
            humor: 5,
            emoji_usage: 3,
            punctuation: 5,
        }
    }
}

/// A chat participant.
///
/// Created at configuration load and mutated only by management actions
/// or by relationship memory updates. Never destroyed mid-simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Actor {
    /// Stable nickname, unique across the roster.
    pub name: String,
    /// What kind of participant this is.
    pub kind: ActorKind,
    /// Behavioral dials.
    #[serde(default)]
    pub profile: BehaviorProfile,
    /// Free-text personality description injected into prompts.
    #[serde(default)]
    pub personality: String,
    /// Per-tick probability (0 to 100) of opening a direct conversation
    /// with the human. `None` means the configured default.
    #[serde(default)]
    pub dm_probability: Option<u8>,
    /// Relationship memory keyed by the other identity's name.
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipRecord>,
}

impl Actor {
    /// Create an actor with a default profile and no memory.
    pub fn new(name: impl Into<String>, kind: ActorKind) -> Self {
        Self {
            name: name.into(),
            kind,
            profile: BehaviorProfile::default(),
            personality: String::new(),
            dm_probability: None,
            relationships: BTreeMap::new(),
        }
    }

    /// Whether this actor's utterances come from the generation backend.
    pub fn is_synthetic(&self) -> bool {
        self.kind == ActorKind::Synthetic
    }

    /// Whether this actor is the human user.
    pub fn is_human(&self) -> bool {
        self.kind == ActorKind::Human
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// An immutable chat message.
///
/// Once appended to a log a message is never mutated, only superseded.
/// Deduplication everywhere is by [`MessageId`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Message {
    /// Unique, time-ordered identity.
    pub id: MessageId,
    /// Author nickname.
    pub author: String,
    /// Display content with extracted links and images stripped.
    pub content: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// How the message is treated.
    pub kind: MessageKind,
    /// Safe links extracted from the original content.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    /// Safe image URLs extracted from the original content.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl Message {
    /// Create a new message with a fresh identity and no attachments.
    pub fn new(
        author: impl Into<String>,
        content: impl Into<String>,
        kind: MessageKind,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            author: author.into(),
            content: content.into(),
            timestamp,
            kind,
            links: Vec::new(),
            images: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

/// A named chat room.
///
/// Members are referenced by nickname; the roster owns the actors.
/// Nicknames are unique within `members`. Operators are a subset of
/// historical members and need not be current members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Channel {
    /// Channel name including the leading `#`.
    pub name: String,
    /// Current topic line.
    #[serde(default)]
    pub topic: String,
    /// Nicknames of current members.
    #[serde(default)]
    pub members: Vec<String>,
    /// Nicknames with operator status.
    #[serde(default)]
    pub operators: BTreeSet<String>,
    /// Ordered message log, oldest first.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Channel {
    /// Create an empty channel.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic: String::new(),
            members: Vec::new(),
            operators: BTreeSet::new(),
            messages: Vec::new(),
        }
    }

    /// Whether `nick` is a current member.
    pub fn has_member(&self, nick: &str) -> bool {
        self.members.iter().any(|m| m == nick)
    }

    /// Add a member, keeping nicknames unique. Returns `false` if already
    /// present.
    pub fn add_member(&mut self, nick: &str) -> bool {
        if self.has_member(nick) {
            return false;
        }
        self.members.push(nick.to_owned());
        true
    }

    /// Remove a member. Returns `false` if not present.
    pub fn remove_member(&mut self, nick: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != nick);
        self.members.len() != before
    }
}

/// A private conversation between the human and one other actor.
///
/// Keyed by the other actor's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DirectConversation {
    /// Nickname of the non-human party.
    pub with: String,
    /// Ordered message list, oldest first.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl DirectConversation {
    /// Create an empty conversation with `with`.
    pub fn new(with: impl Into<String>) -> Self {
        Self {
            with: with.into(),
            messages: Vec::new(),
        }
    }
}

/// Where a message lives: a channel or a direct conversation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "name", rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum Target {
    /// A channel by name.
    Channel(String),
    /// A direct conversation keyed by the other party's name.
    Direct(String),
}

impl Target {
    /// The channel name or conversation partner.
    pub fn name(&self) -> &str {
        match self {
            Self::Channel(name) | Self::Direct(name) => name,
        }
    }
}

impl core::fmt::Display for Target {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Channel(name) => write!(f, "{name}"),
            Self::Direct(name) => write!(f, "@{name}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Relationship memory
// ---------------------------------------------------------------------------

/// One remembered interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct InteractionRecord {
    /// When it happened.
    pub at: DateTime<Utc>,
    /// Channel (or direct conversation label) where it happened.
    pub channel: String,
    /// How it reached the owner.
    pub kind: InteractionKind,
    /// First 100 characters of the message.
    pub context: String,
    /// Keyword sentiment of the message.
    pub sentiment: Sentiment,
}

/// What a synthetic actor remembers about one other identity.
///
/// Created lazily on first interaction, updated on every later one, never
/// deleted. Timestamps are typed; they are reconstructed once when state
/// is deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RelationshipRecord {
    /// Current familiarity tier.
    pub level: RelationshipLevel,
    /// Channels where both have been seen together.
    #[serde(default)]
    pub shared_channels: BTreeSet<String>,
    /// Total number of recorded interactions.
    pub interaction_count: u32,
    /// First recorded interaction.
    pub first_seen: DateTime<Utc>,
    /// Most recent recorded interaction.
    pub last_seen: DateTime<Utc>,
    /// Most recent interactions, oldest first, at most 20.
    #[serde(default)]
    pub interactions: Vec<InteractionRecord>,
    /// Topic categories discussed together, oldest first, at most 10.
    #[serde(default)]
    pub shared_topics: Vec<String>,
}

impl RelationshipRecord {
    /// A fresh record for an identity first met at `now`.
    pub fn first_contact(now: DateTime<Utc>) -> Self {
        Self {
            level: RelationshipLevel::Stranger,
            shared_channels: BTreeSet::new(),
            interaction_count: 0,
            first_seen: now,
            last_seen: now,
            interactions: Vec::new(),
            shared_topics: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_members_stay_unique() {
        let mut channel = Channel::new("#lobby");
        assert!(channel.add_member("nova"));
        assert!(!channel.add_member("nova"));
        assert_eq!(channel.members.len(), 1);
        assert!(channel.remove_member("nova"));
        assert!(!channel.remove_member("nova"));
    }

    #[test]
    fn target_display() {
        assert_eq!(Target::Channel("#lobby".to_owned()).to_string(), "#lobby");
        assert_eq!(Target::Direct("nova".to_owned()).to_string(), "@nova");
    }

    #[test]
    fn relationship_record_restores_typed_timestamps() {
        let now = Utc::now();
        let record = RelationshipRecord::first_contact(now);
        let json = serde_json::to_string(&record).unwrap_or_default();
        let restored: Result<RelationshipRecord, _> = serde_json::from_str(&json);
        assert_eq!(restored.ok().map(|r| r.first_seen), Some(now));
    }

    #[test]
    fn actor_defaults_fill_missing_fields() {
        let json = r#"{"name":"nova","kind":"synthetic"}"#;
        let actor: Result<Actor, _> = serde_json::from_str(json);
        let actor = actor.ok();
        assert!(actor.as_ref().is_some_and(Actor::is_synthetic));
        assert_eq!(actor.and_then(|a| a.dm_probability), None);
    }
}

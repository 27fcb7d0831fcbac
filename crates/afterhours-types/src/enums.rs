//! Enumeration types for the Afterhours chat simulation.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

/// What kind of participant an [`Actor`](crate::Actor) is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum ActorKind {
    /// The one real user at the keyboard.
    Human,
    /// A participant whose utterances come from the generation backend.
    Synthetic,
    /// A command-answering bot.
    Bot,
    /// A participant mirrored from another context.
    Remote,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Discriminates how a [`Message`](crate::Message) is rendered and treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum MessageKind {
    /// Client-generated notice (errors, suggestions).
    System,
    /// Authored by the human.
    User,
    /// Authored by a synthetic actor in a channel.
    Ai,
    /// Private message in a direct conversation.
    Pm,
    /// `/me`-style action.
    Action,
    /// Server-style notice.
    Notice,
    /// Channel topic change.
    Topic,
    /// Member joined a channel.
    Join,
    /// Member left a channel.
    Part,
    /// Member quit the network.
    Quit,
    /// Member was kicked.
    Kick,
    /// Member was banned.
    Ban,
    /// Output of a bot command.
    Bot,
}

impl MessageKind {
    /// Whether this kind is membership or client chatter rather than
    /// conversational content.
    pub const fn is_housekeeping(self) -> bool {
        matches!(self, Self::System | Self::Join | Self::Part | Self::Quit)
    }
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

/// Ordinal summary of how well a synthetic actor knows another identity.
///
/// The four friendly tiers are ordered; `Enemy` sits outside the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum RelationshipLevel {
    /// No meaningful history.
    Stranger,
    /// Has talked a few times.
    Acquaintance,
    /// Regular, warm contact.
    Friendly,
    /// Long-standing, frequent contact.
    Close,
    /// Predominantly hostile history.
    Enemy,
}

impl RelationshipLevel {
    /// The tier directly below this one on the friendly ladder.
    ///
    /// `Stranger` and `Enemy` have nothing below them and return themselves.
    pub const fn demoted(self) -> Self {
        match self {
            Self::Close => Self::Friendly,
            Self::Friendly => Self::Acquaintance,
            Self::Acquaintance | Self::Stranger => Self::Stranger,
            Self::Enemy => Self::Enemy,
        }
    }

    /// Lowercase label used in prompts and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stranger => "stranger",
            Self::Acquaintance => "acquaintance",
            Self::Friendly => "friendly",
            Self::Close => "close",
            Self::Enemy => "enemy",
        }
    }
}

/// Coarse three-bucket sentiment of a single interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum Sentiment {
    /// More positive than negative keywords.
    Positive,
    /// Balanced or no keywords.
    Neutral,
    /// More negative than positive keywords.
    Negative,
}

/// How an interaction reached the owning actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum InteractionKind {
    /// Ordinary channel chatter seen by the owner.
    Message,
    /// The other party addressed the owner by name.
    Mention,
    /// Private message exchange.
    Private,
}

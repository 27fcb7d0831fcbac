//! Error types for the simulation core.
//!
//! Nothing in this crate terminates the scheduler loop. Collaborator
//! failures are typed here so callers can classify and log them; the
//! pipeline decides which ones surface to the user.

/// User-facing category of a generation backend failure.
///
/// Backends report failures as free text. The category is derived by
/// substring match, matching how upstream providers phrase their errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationFailureKind {
    /// Quota exhausted or rate limited.
    Quota,
    /// Network unreachable, reset, or timed out.
    Network,
    /// Credentials rejected or access denied.
    Permission,
    /// The request was rejected as malformed.
    InvalidArgument,
    /// The service is overloaded or down.
    Unavailable,
    /// Anything else.
    Unknown,
}

/// Substrings mapped to each category, checked in order.
const CLASSIFIERS: &[(GenerationFailureKind, &[&str])] = &[
    (
        GenerationFailureKind::Quota,
        &["quota", "rate limit", "rate_limit", "429", "resource_exhausted", "too many requests"],
    ),
    (
        GenerationFailureKind::Permission,
        &["permission", "unauthorized", "forbidden", "401", "403", "api key", "api_key"],
    ),
    (
        GenerationFailureKind::InvalidArgument,
        &["invalid argument", "invalid_argument", "invalid request", "400", "bad request"],
    ),
    (
        GenerationFailureKind::Unavailable,
        &["unavailable", "overloaded", "503", "502", "529"],
    ),
    (
        GenerationFailureKind::Network,
        &["network", "connection", "timed out", "timeout", "dns", "fetch"],
    ),
];

impl GenerationFailureKind {
    /// Classify a raw backend error message.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        CLASSIFIERS
            .iter()
            .find(|(_, needles)| needles.iter().any(|n| lower.contains(n)))
            .map_or(Self::Unknown, |(kind, _)| *kind)
    }

    /// Short explanation shown to the user as a system message.
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::Quota => {
                "The chat service is out of quota or rate limited. Activity will resume shortly."
            }
            Self::Network => "Network trouble reaching the chat service. Retrying on the next cycle.",
            Self::Permission => "The chat service rejected our credentials. Check the API key.",
            Self::InvalidArgument => "The chat service rejected a request as invalid.",
            Self::Unavailable => "The chat service is temporarily unavailable.",
            Self::Unknown => "Something went wrong generating chat activity.",
        }
    }
}

/// A generation backend call failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("generation failed: {message}")]
pub struct GenerationError {
    /// Raw backend error text.
    pub message: String,
}

impl GenerationError {
    /// Wrap a backend error message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// User-facing category of this failure.
    pub fn kind(&self) -> GenerationFailureKind {
        GenerationFailureKind::classify(&self.message)
    }
}

/// The persistence collaborator failed to save a message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("persistence failed: {0}")]
pub struct PersistenceError(pub String);

/// The bot-command handler failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("bot command failed: {0}")]
pub struct BotError(pub String);

/// Errors from management actions on simulation state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    /// No channel with this name exists.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// No actor with this name exists in the roster.
    #[error("unknown actor: {0}")]
    UnknownActor(String),

    /// An actor with this name is already on the roster.
    #[error("duplicate actor name: {0}")]
    DuplicateActor(String),

    /// A channel with this name already exists.
    #[error("duplicate channel name: {0}")]
    DuplicateChannel(String),
}

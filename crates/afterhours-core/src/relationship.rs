//! Relationship memory between synthetic actors and everyone they meet.
//!
//! Each synthetic actor keeps a [`RelationshipRecord`] per other identity,
//! created on first interaction and updated on every later one. The level
//! is recomputed from the interaction count, how long they have known each
//! other and how long it has been since they last talked:
//!
//! | Level          | Requirement                            |
//! |----------------|----------------------------------------|
//! | `close`        | 50+ interactions over 7+ days          |
//! | `friendly`     | 20+ interactions over 2+ days          |
//! | `acquaintance` | 5+ interactions                        |
//! | `stranger`     | otherwise                              |
//!
//! More than 7 days of silence demotes the result by one tier. A history
//! dominated by negative interactions marks the other party an `enemy`.
//!
//! [`context_summary`] renders the record as prose for generation prompts.

use afterhours_types::{
    Actor, InteractionKind, InteractionRecord, Message, MessageKind, RelationshipLevel,
    RelationshipRecord, Sentiment,
};
use chrono::{DateTime, TimeDelta, Utc};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Interaction history kept per record.
const MAX_INTERACTIONS: usize = 20;

/// Shared topics kept per record.
const MAX_SHARED_TOPICS: usize = 10;

/// Characters of message content kept as interaction context.
const CONTEXT_CHARS: usize = 100;

/// Silence longer than this demotes the level by one tier.
const DECAY_DAYS: i64 = 7;

/// Minimum history before a negative streak can make an enemy.
const ENEMY_MIN_INTERACTIONS: usize = 5;

/// Recent snippets included in a context summary.
const SUMMARY_SNIPPETS: usize = 3;

const POSITIVE_WORDS: &[&str] = &[
    "love", "great", "awesome", "thanks", "thank", "nice", "cool", "amazing", "lol", "haha",
    "agree", "good", "best", "happy", "glad", "fun", "yes", "wonderful", "excellent", "fantastic",
    "sweet", "perfect", "beautiful", "enjoy", "welcome", "lmao", "congrats", "brilliant",
];

const NEGATIVE_WORDS: &[&str] = &[
    "hate", "bad", "terrible", "awful", "stupid", "annoying", "wrong", "no", "ugh", "worst",
    "boring", "shut", "dumb", "sucks", "angry", "sad", "disagree", "idiot", "lame", "gross",
    "horrible", "useless", "trash", "whatever", "rude", "ridiculous",
];

/// The fixed topic categories and the keywords that tag them.
pub const TOPIC_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "music",
        &["music", "song", "album", "band", "concert", "playlist", "synth", "guitar", "vinyl", "spotify"],
    ),
    (
        "gaming",
        &["game", "gaming", "play", "steam", "console", "xbox", "playstation", "nintendo", "rpg", "fps"],
    ),
    (
        "technology",
        &["code", "computer", "linux", "programming", "software", "rust", "server", "tech", "ai", "app"],
    ),
    (
        "movies",
        &["movie", "film", "series", "show", "netflix", "episode", "anime", "cinema", "actor", "watch"],
    ),
    (
        "food",
        &["food", "pizza", "cook", "cooking", "dinner", "lunch", "coffee", "tea", "recipe", "eat"],
    ),
    (
        "sports",
        &["sport", "football", "soccer", "basketball", "gym", "run", "running", "match", "team", "workout"],
    ),
    (
        "books",
        &["book", "books", "read", "reading", "novel", "author", "library", "chapter", "poem", "story"],
    ),
    (
        "art",
        &["art", "draw", "drawing", "paint", "painting", "design", "photo", "photography", "sketch", "museum"],
    ),
    (
        "travel",
        &["travel", "trip", "flight", "vacation", "beach", "city", "country", "hotel", "visit", "abroad"],
    ),
    (
        "work",
        &["work", "job", "boss", "office", "meeting", "deadline", "career", "project", "shift", "salary"],
    ),
];

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

fn words(content: &str) -> impl Iterator<Item = String> + '_ {
    content
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Keyword sentiment. Ties and no matches are neutral.
pub fn sentiment(content: &str) -> Sentiment {
    let (mut positive, mut negative) = (0_u32, 0_u32);
    for word in words(content) {
        if POSITIVE_WORDS.contains(&word.as_str()) {
            positive = positive.saturating_add(1);
        } else if NEGATIVE_WORDS.contains(&word.as_str()) {
            negative = negative.saturating_add(1);
        }
    }
    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => Sentiment::Positive,
        std::cmp::Ordering::Less => Sentiment::Negative,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    }
}

/// Topic categories whose keywords appear in `content`, in table order.
pub fn topic_tags(content: &str) -> Vec<&'static str> {
    let found: Vec<String> = words(content).collect();
    TOPIC_CATEGORIES
        .iter()
        .filter(|(_, keywords)| found.iter().any(|w| keywords.contains(&w.as_str())))
        .map(|(category, _)| *category)
        .collect()
}

/// How `message` reached `owner`: private, a direct mention, or ordinary
/// chatter.
pub fn interaction_kind(owner: &str, message: &Message) -> InteractionKind {
    if message.kind == MessageKind::Pm {
        return InteractionKind::Private;
    }
    let owner = owner.to_lowercase();
    if words(&message.content).any(|w| w == owner) {
        InteractionKind::Mention
    } else {
        InteractionKind::Message
    }
}

// ---------------------------------------------------------------------------
// Level rule
// ---------------------------------------------------------------------------

/// The level implied by `count` interactions over `known` time, with
/// `silence` since the previous interaction.
pub fn compute_level(count: u32, known: TimeDelta, silence: TimeDelta) -> RelationshipLevel {
    let days_known = known.num_days();
    let tier = if count >= 50 && days_known >= 7 {
        RelationshipLevel::Close
    } else if count >= 20 && days_known >= 2 {
        RelationshipLevel::Friendly
    } else if count >= 5 {
        RelationshipLevel::Acquaintance
    } else {
        RelationshipLevel::Stranger
    };
    if silence > TimeDelta::days(DECAY_DAYS) {
        tier.demoted()
    } else {
        tier
    }
}

fn is_hostile(record: &RelationshipRecord) -> bool {
    if record.interactions.len() < ENEMY_MIN_INTERACTIONS {
        return false;
    }
    let negative = record
        .interactions
        .iter()
        .filter(|i| i.sentiment == Sentiment::Negative)
        .count();
    let positive = record
        .interactions
        .iter()
        .filter(|i| i.sentiment == Sentiment::Positive)
        .count();
    negative.saturating_mul(2) > record.interactions.len() && negative > positive
}

/// The level as of `now`, applying decay for the silence since
/// `last_seen` without mutating the record.
pub fn effective_level(record: &RelationshipRecord, now: DateTime<Utc>) -> RelationshipLevel {
    if record.level == RelationshipLevel::Enemy {
        return RelationshipLevel::Enemy;
    }
    compute_level(
        record.interaction_count,
        now.signed_duration_since(record.first_seen),
        now.signed_duration_since(record.last_seen),
    )
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// Record that `owner` saw `message` from `other` in `channel`.
///
/// Returns `false` (and changes nothing) when the owner is not synthetic or
/// `other` is the owner.
pub fn update(
    owner: &mut Actor,
    other: &str,
    channel: &str,
    message: &Message,
    now: DateTime<Utc>,
) -> bool {
    if !owner.is_synthetic() || other == owner.name {
        return false;
    }
    let kind = interaction_kind(&owner.name, message);
    let record = owner
        .relationships
        .entry(other.to_owned())
        .or_insert_with(|| RelationshipRecord::first_contact(now));

    let silence = now.signed_duration_since(record.last_seen);
    record.interaction_count = record.interaction_count.saturating_add(1);
    record.last_seen = now;
    record.shared_channels.insert(channel.to_owned());

    record.interactions.push(InteractionRecord {
        at: now,
        channel: channel.to_owned(),
        kind,
        context: message.content.chars().take(CONTEXT_CHARS).collect(),
        sentiment: sentiment(&message.content),
    });
    let excess = record.interactions.len().saturating_sub(MAX_INTERACTIONS);
    record.interactions.drain(..excess);

    for topic in topic_tags(&message.content) {
        record.shared_topics.retain(|t| t != topic);
        record.shared_topics.push(topic.to_owned());
    }
    let excess = record.shared_topics.len().saturating_sub(MAX_SHARED_TOPICS);
    record.shared_topics.drain(..excess);

    record.level = if is_hostile(record) {
        RelationshipLevel::Enemy
    } else {
        compute_level(
            record.interaction_count,
            now.signed_duration_since(record.first_seen),
            silence,
        )
    };
    true
}

// ---------------------------------------------------------------------------
// Prompt context
// ---------------------------------------------------------------------------

fn recency_phrase(since: TimeDelta) -> String {
    let minutes = since.num_minutes();
    let days = since.num_days();
    if minutes < 5 {
        "You were talking just now.".to_owned()
    } else if since.num_hours() < 12 {
        "You talked earlier today.".to_owned()
    } else if days <= 1 {
        "You last talked yesterday.".to_owned()
    } else if days <= DECAY_DAYS {
        format!("You last talked {days} days ago.")
    } else {
        "It has been a long time since you last talked.".to_owned()
    }
}

/// A short prose digest of what `owner` remembers about `other`.
pub fn context_summary(owner: &Actor, other: &str, channel: &str, now: DateTime<Utc>) -> String {
    let Some(record) = owner.relationships.get(other) else {
        return format!("You have never talked with {other} before.");
    };

    let level = effective_level(record, now);
    let mut parts = vec![format!(
        "{other} is {} {} to you; you have interacted {} times.",
        if level == RelationshipLevel::Acquaintance || level == RelationshipLevel::Enemy {
            "an"
        } else {
            "a"
        },
        level.as_str(),
        record.interaction_count
    )];

    if record.shared_channels.contains(channel) {
        parts.push(format!("You have chatted in {channel} together before."));
    } else {
        parts.push(format!("This is the first time you have seen them in {channel}."));
    }

    let snippets: Vec<String> = record
        .interactions
        .iter()
        .rev()
        .take(SUMMARY_SNIPPETS)
        .map(|i| format!("\"{}\" ({})", i.context, i.channel))
        .collect();
    if !snippets.is_empty() {
        parts.push(format!("Recently: {}.", snippets.join("; ")));
    }

    if !record.shared_topics.is_empty() {
        parts.push(format!("You have talked about {}.", record.shared_topics.join(", ")));
    }

    parts.push(recency_phrase(now.signed_duration_since(record.last_seen)));
    parts.join(" ")
}

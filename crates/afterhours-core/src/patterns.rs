//! Conversation staleness detection.
//!
//! A cheap approximate detector: recent word bigrams and trigrams go into a
//! rolling buffer, and when several of them keep recurring while the topic
//! has not changed for a while, the tracker asks for a topic-change nudge.
//! Greetings and farewells are skipped so onboarding chatter never counts
//! as repetition.

use std::collections::{HashMap, VecDeque};
use std::sync::LazyLock;
use std::time::Duration;

use afterhours_types::{Message, MessageKind};
use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;

use crate::config::PatternConfig;
use crate::random::{RandomExt, RandomSource};

/// A phrase must recur this many times to count as repeated.
const REPEAT_THRESHOLD: u32 = 3;

/// More than this many repeated phrases makes the conversation stale.
const STALE_PHRASES: usize = 3;

/// Words shorter than this (in characters) never enter a phrase, so filler
/// like "i am at the" cannot look like repetition.
const MIN_WORD_CHARS: usize = 4;

/// Greeting, farewell and check-in phrasing across several languages.
const GREETING_PATTERNS: &[&str] = &[
    r"^(hi|hey|hello|heya|hiya|yo|sup|howdy|greetings|hallo|hola|ola|olá|oi)\b",
    r"\b(good|gud) ?(morning|afternoon|evening|night|nite)\b",
    r"\b(bonjour|bonsoir|salut|coucou|ciao|buongiorno|buonasera|servus|moin)\b",
    r"\b(buenos d[ií]as|buenas (tardes|noches)|bom dia|boa (tarde|noite))\b",
    r"\b(guten (morgen|tag|abend)|gute nacht|hej|hei|tere|ahoj|cze[sś][cć])\b",
    r"\b(privet|привет|здравствуй|konnichiwa|こんにちは|ohayo|annyeong|안녕|ni ?hao|你好)\b",
    r"\b(namaste|salaam|salam|shalom|merhaba|selam|jambo|sawubona|xin ch[aà]o)\b",
    r"\b(welcome( back)?|wb|o/|\\o)\b",
    r"\b(bye|goodbye|good bye|cya|see (ya|you)|later all|gn|gnight|nn|ttyl|brb|afk)\b",
    r"\b(how('?s| is| are) (everyone|everybody|it going|you all|y'?all|things))\b",
    r"\b(what'?s up|wh?at'?s good|wassup|whats new)\b",
    r"\b(thanks|thank you|thx|ty|cheers|gracias|merci|danke|obrigad[oa]|arigato)\b",
];

static GREETINGS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    GREETING_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(&format!("(?i){p}")).ok())
        .collect()
});

/// Suggestions injected when a conversation goes stale.
const SUGGESTIONS: &[&str] = &[
    "Conversation seems to be going in circles. Maybe someone has a new topic?",
    "Anyone up for a change of subject? Weekend plans, music, anything.",
    "Quiet suggestion: what's everyone been reading or watching lately?",
    "Topic idea: what's the best thing that happened to you this week?",
    "Fresh topic anyone? Share a song you've had on repeat.",
    "Maybe time to switch it up. What's everyone working on right now?",
];

/// One recorded topic change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicChange {
    /// Channel where the topic changed.
    pub channel: String,
    /// The new topic text.
    pub topic: String,
    /// When it changed.
    pub at: DateTime<Utc>,
}

/// What one observation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Housekeeping or greeting; nothing recorded.
    Skipped,
    /// A topic change was recorded.
    TopicChanged,
    /// Phrases were recorded; no action needed.
    Recorded,
    /// Schedule a system message suggesting a new topic after `delay`.
    SuggestTopicChange {
        /// Channel the suggestion belongs to.
        channel: String,
        /// Suggestion text.
        text: String,
        /// How long to wait before posting it.
        delay: Duration,
    },
}

/// Per-process staleness state. Not persisted.
#[derive(Debug)]
pub struct PatternTracker {
    config: PatternConfig,
    phrases: VecDeque<String>,
    topics: VecDeque<TopicChange>,
    last_topic_change: Option<DateTime<Utc>>,
}

impl PatternTracker {
    /// Create an empty tracker.
    pub fn new(config: PatternConfig) -> Self {
        Self {
            phrases: VecDeque::with_capacity(config.phrase_capacity),
            topics: VecDeque::with_capacity(config.topic_capacity),
            last_topic_change: None,
            config,
        }
    }

    /// Feed one message seen in `channel`.
    pub fn observe(
        &mut self,
        message: &Message,
        channel: &str,
        now: DateTime<Utc>,
        rng: &dyn RandomSource,
    ) -> Observation {
        if message.kind == MessageKind::Topic {
            self.record_topic(channel, &message.content, now);
            return Observation::TopicChanged;
        }
        if message.kind.is_housekeeping() || is_greeting(&message.content) {
            return Observation::Skipped;
        }

        for phrase in extract_phrases(&message.content) {
            self.phrases.push_back(phrase);
        }
        while self.phrases.len() > self.config.phrase_capacity {
            self.phrases.pop_front();
        }

        let repeated = self.repeated_phrase_count();
        if repeated <= STALE_PHRASES || !self.topic_cooldown_elapsed(now) {
            return Observation::Recorded;
        }
        if !rng.chance(self.config.suggestion_probability) {
            return Observation::Recorded;
        }
        let Some(text) = rng.pick(SUGGESTIONS) else {
            return Observation::Recorded;
        };

        // A suggestion restarts the topic-change clock even though no
        // `topic` message was seen, so one stale stretch yields one nudge.
        // It is not added to the topic history.
        self.last_topic_change = Some(now);
        let delay = rng.delay_ms(self.config.suggestion_min_ms, self.config.suggestion_max_ms);
        debug!(channel = channel, repeated = repeated, "conversation stale, suggesting topic change");
        Observation::SuggestTopicChange {
            channel: channel.to_owned(),
            text: (*text).to_owned(),
            delay,
        }
    }

    /// Record an explicit topic change and restart the cooldown clock.
    pub fn record_topic(&mut self, channel: &str, topic: &str, now: DateTime<Utc>) {
        self.topics.push_back(TopicChange {
            channel: channel.to_owned(),
            topic: topic.to_owned(),
            at: now,
        });
        while self.topics.len() > self.config.topic_capacity {
            self.topics.pop_front();
        }
        self.last_topic_change = Some(now);
    }

    /// Phrases currently in the rolling buffer, oldest first.
    pub fn phrases(&self) -> impl Iterator<Item = &str> {
        self.phrases.iter().map(String::as_str)
    }

    /// Recent topic changes, oldest first.
    pub fn topics(&self) -> impl Iterator<Item = &TopicChange> {
        self.topics.iter()
    }

    /// When the topic last changed, if ever.
    pub const fn last_topic_change(&self) -> Option<DateTime<Utc>> {
        self.last_topic_change
    }

    /// Number of distinct buffered phrases seen at least
    /// [`REPEAT_THRESHOLD`] times.
    fn repeated_phrase_count(&self) -> usize {
        let mut counts: HashMap<&str, u32> = HashMap::new();
        for phrase in &self.phrases {
            let count = counts.entry(phrase.as_str()).or_insert(0);
            *count = count.saturating_add(1);
        }
        counts.values().filter(|c| **c >= REPEAT_THRESHOLD).count()
    }

    fn topic_cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.last_topic_change.is_none_or(|at| {
            let elapsed = now.signed_duration_since(at).num_milliseconds();
            elapsed > i64::try_from(self.config.topic_cooldown_ms).unwrap_or(i64::MAX)
        })
    }
}

/// Whether `content` reads as a greeting, farewell or pleasantry.
pub fn is_greeting(content: &str) -> bool {
    let trimmed = content.trim();
    GREETINGS.iter().any(|re| re.is_match(trimmed))
}

/// Contiguous word bigrams and trigrams of `content`, lowercased with
/// surrounding punctuation stripped. Short words are dropped before the
/// windows are built.
pub fn extract_phrases(content: &str) -> Vec<String> {
    let words: Vec<String> = content
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .filter(|w| w.chars().count() >= MIN_WORD_CHARS)
        .collect();

    let mut phrases = Vec::new();
    for size in [2_usize, 3] {
        for window in words.windows(size) {
            phrases.push(window.join(" "));
        }
    }
    phrases
}

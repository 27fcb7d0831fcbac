//! Rule-based openers for autonomous direct messages.
//!
//! The opener is the cue handed to the generation backend: it decides what
//! kind of message the actor sends (greeting, question, anecdote, new
//! topic). The backend then writes the actual in-character text. No
//! generation happens here.

use std::collections::HashMap;

use afterhours_types::Message;

use crate::random::{RandomExt, RandomSource};
use crate::relationship::{TOPIC_CATEGORIES, topic_tags};

/// Recent messages scanned for topic repetition.
const RECENT_WINDOW: usize = 10;

/// A topic discussed more than this often recently is avoided.
const MAX_RECENT_MENTIONS: usize = 2;

/// A topic discussed more than this often overall is avoided.
const MAX_TOTAL_MENTIONS: usize = 5;

const FIRST_CONTACT: &[&str] = &[
    "hey! saw you in the channels, figured I'd say hi",
    "hi there, hope you don't mind a random dm",
    "heyo, you seem cool, wanted to chat one on one",
    "hey, quick hello from the lurker corner",
    "sorry to slide into your dms, just bored and curious what you're up to",
];

const QUESTIONS: &[&str] = &[
    "so what are you up to right now?",
    "random question, what's keeping you busy this week?",
    "hey, how's your day been going?",
    "got any plans for later?",
    "what's the last thing that made you laugh?",
];

const STORIES: &[&str] = &[
    "ok so something weird just happened to me",
    "you won't believe the day I've had",
    "had the strangest dream last night, gotta tell someone",
    "just got back and wow, what a trip that was",
    "funny thing happened earlier, made me think of you",
];

/// Topic cues keyed by category from the relationship topic table.
const TOPIC_CUES: &[(&str, &str)] = &[
    ("music", "been looping the same album all day, what are you listening to lately?"),
    ("gaming", "been playing anything good recently? I need a new game"),
    ("technology", "did you see that new tech thing everyone's arguing about?"),
    ("movies", "watched anything good lately? need a movie rec"),
    ("food", "what's the best thing you've eaten this week? I'm starving"),
    ("sports", "you follow any sports? the match last night was wild"),
    ("books", "reading anything good? I just finished a great book"),
    ("art", "been trying to draw more lately, you into art at all?"),
    ("travel", "if you could fly anywhere tomorrow where would you go?"),
    ("work", "how's work treating you? mine's been chaos"),
];

/// What kind of opener was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenerKind {
    /// No prior history: introduce themselves.
    FirstContact,
    /// Continue with a question.
    Question,
    /// Continue with an anecdote.
    Story,
    /// Steer toward a topic category.
    Topic(&'static str),
}

/// The cue handed to the generation backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opener {
    /// Which bank it came from.
    pub kind: OpenerKind,
    /// The opener text.
    pub text: String,
}

fn mention_counts<'a>(messages: impl Iterator<Item = &'a Message>) -> HashMap<&'static str, usize> {
    let mut counts = HashMap::new();
    for message in messages {
        for tag in topic_tags(&message.content) {
            let count = counts.entry(tag).or_insert(0_usize);
            *count = count.saturating_add(1);
        }
    }
    counts
}

/// Pick a topic category not worn out by `history`, preferring ones never
/// discussed.
pub fn choose_topic(history: &[Message], rng: &dyn RandomSource) -> Option<&'static str> {
    let total = mention_counts(history.iter());
    let recent = mention_counts(history.iter().rev().take(RECENT_WINDOW));

    let allowed: Vec<&'static str> = TOPIC_CATEGORIES
        .iter()
        .map(|(category, _)| *category)
        .filter(|c| recent.get(c).copied().unwrap_or(0) <= MAX_RECENT_MENTIONS)
        .filter(|c| total.get(c).copied().unwrap_or(0) <= MAX_TOTAL_MENTIONS)
        .collect();
    let fresh: Vec<&'static str> = allowed
        .iter()
        .copied()
        .filter(|c| !total.contains_key(c))
        .collect();

    if fresh.is_empty() {
        rng.pick(&allowed).copied()
    } else {
        rng.pick(&fresh).copied()
    }
}

fn from_bank(kind: OpenerKind, bank: &[&str], rng: &dyn RandomSource) -> Opener {
    Opener {
        kind,
        text: rng.pick(bank).copied().unwrap_or_default().to_owned(),
    }
}

/// Build the opener for the next direct message given prior `history`.
pub fn contextual_opener(history: &[Message], rng: &dyn RandomSource) -> Opener {
    if history.is_empty() {
        return from_bank(OpenerKind::FirstContact, FIRST_CONTACT, rng);
    }
    let roll = rng.next_f64();
    if roll < 0.4 {
        return from_bank(OpenerKind::Question, QUESTIONS, rng);
    }
    if roll < 0.7 {
        return from_bank(OpenerKind::Story, STORIES, rng);
    }
    let cue = choose_topic(history, rng)
        .and_then(|topic| TOPIC_CUES.iter().find(|(c, _)| *c == topic));
    match cue {
        Some((topic, text)) => Opener {
            kind: OpenerKind::Topic(topic),
            text: (*text).to_owned(),
        },
        None => from_bank(OpenerKind::Question, QUESTIONS, rng),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use afterhours_types::MessageKind;
    use chrono::Utc;

    use super::*;
    use crate::random::ScriptedRandom;

    fn pm(content: &str) -> Message {
        Message::new("nova", content, MessageKind::Pm, Utc::now())
    }

    #[test]
    fn empty_history_introduces() {
        let rng = ScriptedRandom::constant(0.9);
        let opener = contextual_opener(&[], &rng);
        assert_eq!(opener.kind, OpenerKind::FirstContact);
        assert!(!opener.text.is_empty());
    }

    #[test]
    fn draw_selects_continuation_kind() {
        let history = vec![pm("hey")];
        let question = contextual_opener(&history, &ScriptedRandom::constant(0.1));
        assert_eq!(question.kind, OpenerKind::Question);
        let story = contextual_opener(&history, &ScriptedRandom::constant(0.5));
        assert_eq!(story.kind, OpenerKind::Story);
        let topic = contextual_opener(&history, &ScriptedRandom::constant(0.8));
        assert!(matches!(topic.kind, OpenerKind::Topic(_)));
    }

    #[test]
    fn every_category_has_a_cue() {
        for (category, _) in TOPIC_CATEGORIES {
            assert!(TOPIC_CUES.iter().any(|(c, _)| c == category), "{category}");
        }
    }

    #[test]
    fn overused_topics_are_avoided() {
        let history: Vec<Message> = (0..3).map(|_| pm("new album, great song")).collect();
        let rng = ScriptedRandom::constant(0.0);
        for _ in 0..20 {
            assert_ne!(choose_topic(&history, &rng), Some("music"));
        }
    }

    #[test]
    fn fresh_topics_are_preferred() {
        let history = vec![pm("pizza for dinner")];
        let rng = crate::random::SeededRandom::from_seed(9);
        for _ in 0..50 {
            assert_ne!(choose_topic(&history, &rng), Some("food"));
        }
    }
}

//! Integration tests for scheduling-side behavior: admission control,
//! auto-join, afterhours odds, staleness and relationship decay.

#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use afterhours_core::config::{LimiterConfig, PatternConfig};
use afterhours_core::limiter::ConcurrencyLimiter;
use afterhours_core::patterns::{Observation, PatternTracker};
use afterhours_core::{
    Collaborators, GenerationBackend, GenerationError, GenerationRequest, MemoryStore, SeededRandom,
    SilentBot, Simulation, SimulationConfig, relationship, temporal,
};
use afterhours_types::{Actor, ActorKind, Message, MessageKind, RelationshipLevel, Target};
use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use futures::future::{BoxFuture, FutureExt};

struct Quiet;

impl GenerationBackend for Quiet {
    fn generate<'a>(
        &'a self,
        _request: &'a GenerationRequest,
        _model_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>, GenerationError>> {
        futures::future::ready(Ok(None)).boxed()
    }
}

fn build(yaml: &str, seed: u64) -> Simulation {
    let config = SimulationConfig::parse(yaml).unwrap();
    let collaborators = Collaborators {
        backend: Arc::new(Quiet),
        store: Arc::new(MemoryStore::new()),
        bot: Arc::new(SilentBot),
    };
    Simulation::with_random(config, collaborators, Arc::new(SeededRandom::from_seed(seed)))
}

fn saturday_night() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 6, 15, 23, 30, 0).unwrap()
}

fn tuesday_afternoon() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 6, 18, 14, 0, 0).unwrap()
}

// ---------------------------------------------------------------------------
// Limiter
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn limiter_caps_concurrency_and_spaces_starts() {
    let limiter = ConcurrencyLimiter::new(&LimiterConfig::default());
    let running = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);
    let starts = std::sync::Mutex::new(Vec::new());

    let call = |i: usize| {
        let limiter = &limiter;
        let running = &running;
        let peak = &peak;
        let starts = &starts;
        async move {
            limiter
                .run_limited(&format!("call-{i}"), async {
                    starts.lock().unwrap().push(tokio::time::Instant::now());
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
        }
    };
    futures::future::join_all((0..4).map(call)).await;

    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert_eq!(limiter.in_flight(), 0);
    let mut starts = starts.into_inner().unwrap();
    starts.sort();
    assert_eq!(starts.len(), 4);
    for pair in starts.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(1500));
    }
}

// ---------------------------------------------------------------------------
// Auto-join
// ---------------------------------------------------------------------------

const EMPTY_CHANNEL: &str = "\
human: kit
actors:
  - name: ada
  - name: bo
  - name: cy
  - name: dee
  - name: eli
channels:
  - name: '#empty'
    members: [kit]
";

#[tokio::test]
async fn empty_channels_fill_with_two_to_four_actors() {
    for seed in 0..20 {
        let sim = build(EMPTY_CHANNEL, seed);
        let joined = sim.auto_join();
        assert!((2..=4).contains(&joined.len()), "seed {seed} joined {}", joined.len());

        let state = sim.snapshot();
        let channel = &state.channels["#empty"];
        let joins: Vec<&Message> = channel
            .messages
            .iter()
            .filter(|m| m.kind == MessageKind::Join)
            .collect();
        assert_eq!(joins.len(), joined.len());
        for (_, nick) in &joined {
            assert!(channel.has_member(nick));
            assert_eq!(joins.iter().filter(|m| &m.author == nick).count(), 1);
        }

        // Once populated, nothing else joins.
        assert!(sim.auto_join().is_empty());
    }
}

// ---------------------------------------------------------------------------
// Afterhours and DMs
// ---------------------------------------------------------------------------

const ONE_ACTOR: &str = "\
human: kit
actors:
  - name: nova
channels:
  - name: '#lobby'
    members: [kit, nova]
";

#[test]
fn afterhours_window_follows_the_calendar() {
    assert!(temporal::is_afterhours(&saturday_night()));
    assert!(!temporal::is_afterhours(&tuesday_afternoon()));
    assert_eq!(temporal::dm_probability(25, true, 1.5, 50), 38);
    assert_eq!(temporal::dm_probability(25, false, 1.5, 50), 25);
}

#[tokio::test]
async fn afterhours_raises_dm_odds() {
    let trials = 2000_u32;
    let sim = build(ONE_ACTOR, 11);
    let saturday = (0..trials)
        .filter(|_| sim.choose_dm_actor(&saturday_night()).is_some())
        .count();
    let tuesday = (0..trials)
        .filter(|_| sim.choose_dm_actor(&tuesday_afternoon()).is_some())
        .count();

    let rate = |hits: usize| f64::from(u32::try_from(hits).unwrap()) / f64::from(trials);
    assert!((0.33..0.43).contains(&rate(saturday)), "saturday rate {}", rate(saturday));
    assert!((0.20..0.30).contains(&rate(tuesday)), "tuesday rate {}", rate(tuesday));
}

#[tokio::test]
async fn zero_probability_actor_never_writes() {
    let yaml = "\
human: kit
actors:
  - name: hermit
    dm_probability: 0
channels:
  - name: '#lobby'
    members: [kit, hermit]
";
    let sim = build(yaml, 5);
    for _ in 0..1000 {
        assert_eq!(sim.choose_dm_actor(&saturday_night()), None);
    }
    sim.set_active_context(Some(Target::Direct("hermit".into())));
    for _ in 0..1000 {
        assert_eq!(sim.choose_dm_actor(&saturday_night()), None);
    }
}

// ---------------------------------------------------------------------------
// Staleness
// ---------------------------------------------------------------------------

#[test]
fn stale_chatter_suggests_once_per_cooldown() {
    let rng = SeededRandom::from_seed(42);
    let mut tracker = PatternTracker::new(PatternConfig::default());
    let now = Utc::now();

    for _ in 0..20 {
        let greeting = Message::new("nova", "hey everyone", MessageKind::Ai, now);
        assert_eq!(tracker.observe(&greeting, "#lobby", now, &rng), Observation::Skipped);
    }

    let stale = Message::new("nova", "pizza party tonight everyone", MessageKind::Ai, now);
    let mut suggested = false;
    for _ in 0..200 {
        if let Observation::SuggestTopicChange { delay, .. } = tracker.observe(&stale, "#lobby", now, &rng) {
            assert!((2000..=5000).contains(&delay.as_millis()));
            suggested = true;
            break;
        }
    }
    assert!(suggested);

    // The cooldown restarted, so the same instant yields nothing more.
    for _ in 0..50 {
        assert_eq!(tracker.observe(&stale, "#lobby", now, &rng), Observation::Recorded);
    }

    let later = now + TimeDelta::minutes(6);
    let again = (0..200).any(|_| {
        matches!(
            tracker.observe(&stale, "#lobby", later, &rng),
            Observation::SuggestTopicChange { .. }
        )
    });
    assert!(again);
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

#[test]
fn levels_climb_then_decay_one_tier() {
    let mut nova = Actor::new("nova", ActorKind::Synthetic);
    let start = Utc::now() - TimeDelta::days(30);
    let mut previous = RelationshipLevel::Stranger;
    let mut at = start;

    for _ in 0..60 {
        let message = Message::new("kit", "saw the compiler thread", MessageKind::User, at);
        assert!(relationship::update(&mut nova, "kit", "#lobby", &message, at));
        let level = nova.relationships["kit"].level;
        assert!(level >= previous, "{level:?} fell below {previous:?}");
        previous = level;
        at += TimeDelta::hours(4);
    }
    let last_seen = nova.relationships["kit"].last_seen;
    assert_eq!(previous, RelationshipLevel::Close);

    let record = &nova.relationships["kit"];
    assert_eq!(
        relationship::effective_level(record, last_seen + TimeDelta::days(6)),
        RelationshipLevel::Close
    );
    assert_eq!(
        relationship::effective_level(record, last_seen + TimeDelta::days(8)),
        RelationshipLevel::Friendly
    );

    let after = last_seen + TimeDelta::days(8);
    let message = Message::new("kit", "back from vacation", MessageKind::User, after);
    relationship::update(&mut nova, "kit", "#lobby", &message, after);
    assert_eq!(nova.relationships["kit"].level, RelationshipLevel::Friendly);
}

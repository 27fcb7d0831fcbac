//! Configuration loading and typed config structures.
//!
//! The canonical configuration lives in `afterhours-config.yaml`. Every
//! field has a default, so an empty file (or no file at all) yields a
//! working simulation. The probabilities and delay ranges here are tuned
//! pacing parameters, not invariants.

use std::path::Path;

use afterhours_types::{Actor, ActorKind, BehaviorProfile};
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but is inconsistent.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Nickname of the human user.
    #[serde(default = "default_human")]
    pub human: String,

    /// Model identifier passed through to the generation backend.
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Seed for the random source. `None` seeds from the OS.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Whether the afterhours activity table and DM boost apply at night.
    #[serde(default = "default_true")]
    pub afterhours_protocol: bool,

    /// Scheduler pacing.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Generation admission control.
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Autonomous direct messages.
    #[serde(default)]
    pub dm: DmConfig,

    /// Staleness detection.
    #[serde(default)]
    pub patterns: PatternConfig,

    /// Typing indicator timing.
    #[serde(default)]
    pub typing: TypingConfig,

    /// Command prefixes dispatched to the bot handler.
    #[serde(default = "default_bot_commands")]
    pub bot_commands: Vec<String>,

    /// The configured roster (the human is added automatically).
    #[serde(default)]
    pub actors: Vec<ActorConfig>,

    /// The configured channels.
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            human: default_human(),
            model_id: default_model_id(),
            seed: None,
            afterhours_protocol: true,
            scheduler: SchedulerConfig::default(),
            limiter: LimiterConfig::default(),
            dm: DmConfig::default(),
            patterns: PatternConfig::default(),
            typing: TypingConfig::default(),
            bot_commands: default_bot_commands(),
            actors: Vec::new(),
            channels: default_channels(),
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Invalid`] if it fails validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] or [`ConfigError::Invalid`].
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::BTreeSet::new();
        seen.insert(self.human.as_str());
        for actor in &self.actors {
            if !seen.insert(actor.name.as_str()) {
                return Err(ConfigError::Invalid {
                    reason: format!("duplicate actor name: {}", actor.name),
                });
            }
            if actor.dm_probability.is_some_and(|p| p > 100) {
                return Err(ConfigError::Invalid {
                    reason: format!("dm_probability above 100 for {}", actor.name),
                });
            }
        }
        for channel in &self.channels {
            if !channel.name.starts_with('#') {
                return Err(ConfigError::Invalid {
                    reason: format!("channel name must start with '#': {}", channel.name),
                });
            }
        }
        if self.limiter.max_in_flight == 0 {
            return Err(ConfigError::Invalid {
                reason: "limiter.max_in_flight must be at least 1".to_owned(),
            });
        }
        Ok(())
    }

    /// Build the roster: the human plus every configured actor.
    pub fn roster(&self) -> Vec<Actor> {
        let mut roster = Vec::with_capacity(self.actors.len().saturating_add(1));
        roster.push(Actor::new(self.human.clone(), ActorKind::Human));
        roster.extend(self.actors.iter().map(ActorConfig::to_actor));
        roster
    }
}

/// Simulation speed, selecting the scheduler's base interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    /// Scheduler disarmed.
    Off,
    /// Long base interval.
    Slow,
    /// Default pacing.
    Normal,
    /// Short base interval.
    Fast,
}

/// Scheduler pacing parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SchedulerConfig {
    /// Speed at startup.
    #[serde(default = "default_speed")]
    pub speed: Speed,
    /// Base interval at `slow` speed.
    #[serde(default = "default_slow_ms")]
    pub slow_interval_ms: u64,
    /// Base interval at `normal` speed.
    #[serde(default = "default_normal_ms")]
    pub normal_interval_ms: u64,
    /// Base interval at `fast` speed.
    #[serde(default = "default_fast_ms")]
    pub fast_interval_ms: u64,
    /// Probability a non-burst tick enters quiet mode.
    #[serde(default = "default_quiet_probability")]
    pub quiet_probability: f64,
    /// Probability a quiet tick reacts to a recent message.
    #[serde(default = "default_quiet_reaction_probability")]
    pub quiet_reaction_probability: f64,
    /// A human message within this window puts the tick in burst mode.
    #[serde(default = "default_burst_window_ms")]
    pub burst_window_ms: u64,
    /// Follow-up odds and delays in burst mode.
    #[serde(default = "FollowUpConfig::burst")]
    pub burst_follow_up: FollowUpConfig,
    /// Follow-up odds and delays in normal mode.
    #[serde(default = "FollowUpConfig::normal")]
    pub normal_follow_up: FollowUpConfig,
    /// Lower bound of the per-channel staleness period.
    #[serde(default = "default_stale_min_ms")]
    pub stale_min_ms: u64,
    /// Upper bound of the per-channel staleness period.
    #[serde(default = "default_stale_max_ms")]
    pub stale_max_ms: u64,
    /// At most one generation error is surfaced per channel in this window.
    #[serde(default = "default_error_window_ms")]
    pub error_window_ms: u64,
    /// How many recent messages are sent as generation context.
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            slow_interval_ms: default_slow_ms(),
            normal_interval_ms: default_normal_ms(),
            fast_interval_ms: default_fast_ms(),
            quiet_probability: default_quiet_probability(),
            quiet_reaction_probability: default_quiet_reaction_probability(),
            burst_window_ms: default_burst_window_ms(),
            burst_follow_up: FollowUpConfig::burst(),
            normal_follow_up: FollowUpConfig::normal(),
            stale_min_ms: default_stale_min_ms(),
            stale_max_ms: default_stale_max_ms(),
            error_window_ms: default_error_window_ms(),
            context_messages: default_context_messages(),
        }
    }
}

impl SchedulerConfig {
    /// Base interval for `speed`, or `None` when the scheduler is off.
    pub const fn base_interval_ms(&self, speed: Speed) -> Option<u64> {
        match speed {
            Speed::Off => None,
            Speed::Slow => Some(self.slow_interval_ms),
            Speed::Normal => Some(self.normal_interval_ms),
            Speed::Fast => Some(self.fast_interval_ms),
        }
    }
}

/// Odds and delays for extra asynchronous generations after a tick.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FollowUpConfig {
    /// Probability of a first follow-up.
    pub first_probability: f64,
    /// Probability of a second follow-up, given a first.
    pub second_probability: f64,
    /// Shortest delay before a follow-up.
    pub min_delay_ms: u64,
    /// Longest delay before a follow-up.
    pub max_delay_ms: u64,
}

impl FollowUpConfig {
    /// Burst-mode defaults: likelier and sooner.
    pub const fn burst() -> Self {
        Self {
            first_probability: 0.5,
            second_probability: 0.25,
            min_delay_ms: 1000,
            max_delay_ms: 3000,
        }
    }

    /// Normal-mode defaults.
    pub const fn normal() -> Self {
        Self {
            first_probability: 0.2,
            second_probability: 0.1,
            min_delay_ms: 3000,
            max_delay_ms: 7000,
        }
    }
}

/// Generation admission control.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LimiterConfig {
    /// Maximum concurrent generation calls.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Minimum spacing between call starts.
    #[serde(default = "default_min_spacing_ms")]
    pub min_spacing_ms: u64,
    /// How often a blocked caller re-checks for a free slot.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            min_spacing_ms: default_min_spacing_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Autonomous direct-message parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DmConfig {
    /// Trigger probability (percent) for actors without their own.
    #[serde(default = "default_dm_probability")]
    pub default_probability: u8,
    /// Multiplier applied during afterhours.
    #[serde(default = "default_afterhours_multiplier")]
    pub afterhours_multiplier: f64,
    /// Cap (percent) on the boosted probability.
    #[serde(default = "default_afterhours_cap")]
    pub afterhours_cap: u8,
    /// Probability that a second message follows the first.
    #[serde(default = "default_second_message_probability")]
    pub second_message_probability: f64,
    /// Shortest gap between the two messages.
    #[serde(default = "default_dm_gap_min_ms")]
    pub gap_min_ms: u64,
    /// Longest gap between the two messages.
    #[serde(default = "default_dm_gap_max_ms")]
    pub gap_max_ms: u64,
}

impl Default for DmConfig {
    fn default() -> Self {
        Self {
            default_probability: default_dm_probability(),
            afterhours_multiplier: default_afterhours_multiplier(),
            afterhours_cap: default_afterhours_cap(),
            second_message_probability: default_second_message_probability(),
            gap_min_ms: default_dm_gap_min_ms(),
            gap_max_ms: default_dm_gap_max_ms(),
        }
    }
}

/// Staleness detector parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PatternConfig {
    /// Rolling phrase buffer capacity.
    #[serde(default = "default_phrase_capacity")]
    pub phrase_capacity: usize,
    /// Topic-change history capacity.
    #[serde(default = "default_topic_capacity")]
    pub topic_capacity: usize,
    /// Minimum time since the last topic change before suggesting one.
    #[serde(default = "default_topic_cooldown_ms")]
    pub topic_cooldown_ms: u64,
    /// Chance per stale observation of scheduling a suggestion.
    #[serde(default = "default_suggestion_probability")]
    pub suggestion_probability: f64,
    /// Shortest delay before the suggestion appears.
    #[serde(default = "default_suggestion_min_ms")]
    pub suggestion_min_ms: u64,
    /// Longest delay before the suggestion appears.
    #[serde(default = "default_suggestion_max_ms")]
    pub suggestion_max_ms: u64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            phrase_capacity: default_phrase_capacity(),
            topic_capacity: default_topic_capacity(),
            topic_cooldown_ms: default_topic_cooldown_ms(),
            suggestion_probability: default_suggestion_probability(),
            suggestion_min_ms: default_suggestion_min_ms(),
            suggestion_max_ms: default_suggestion_max_ms(),
        }
    }
}

/// Typing indicator timing: `base + per_char * len`, jittered, capped.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TypingConfig {
    /// Fixed reaction time.
    #[serde(default = "default_typing_base_ms")]
    pub base_ms: u64,
    /// Time per character of content.
    #[serde(default = "default_typing_per_char_ms")]
    pub per_char_ms: u64,
    /// Random extra time, up to this much.
    #[serde(default = "default_typing_jitter_ms")]
    pub jitter_ms: u64,
    /// Upper bound on the whole delay.
    #[serde(default = "default_typing_max_ms")]
    pub max_ms: u64,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            base_ms: default_typing_base_ms(),
            per_char_ms: default_typing_per_char_ms(),
            jitter_ms: default_typing_jitter_ms(),
            max_ms: default_typing_max_ms(),
        }
    }
}

/// One configured actor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActorConfig {
    /// Nickname.
    pub name: String,
    /// Actor kind; defaults to synthetic.
    #[serde(default = "default_actor_kind")]
    pub kind: ActorKind,
    /// Free-text personality.
    #[serde(default)]
    pub personality: String,
    /// Behavioral dials.
    #[serde(default)]
    pub profile: BehaviorProfile,
    /// DM trigger probability in percent.
    #[serde(default)]
    pub dm_probability: Option<u8>,
}

impl ActorConfig {
    /// Materialize the configured actor.
    pub fn to_actor(&self) -> Actor {
        let mut actor = Actor::new(self.name.clone(), self.kind);
        actor.personality.clone_from(&self.personality);
        actor.profile = self.profile;
        actor.dm_probability = self.dm_probability;
        actor
    }
}

/// One configured channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelConfig {
    /// Channel name including `#`.
    pub name: String,
    /// Initial topic.
    #[serde(default)]
    pub topic: String,
    /// Initial members (nicknames).
    #[serde(default)]
    pub members: Vec<String>,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_human() -> String {
    "you".to_owned()
}
fn default_model_id() -> String {
    "default".to_owned()
}
const fn default_true() -> bool {
    true
}
fn default_bot_commands() -> Vec<String> {
    ["!help", "!image", "!weather", "!time", "!roll", "!8ball", "!quote"]
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}
fn default_channels() -> Vec<ChannelConfig> {
    vec![ChannelConfig {
        name: "#lobby".to_owned(),
        topic: "Welcome to the lobby".to_owned(),
        members: Vec::new(),
    }]
}
const fn default_speed() -> Speed {
    Speed::Normal
}
const fn default_slow_ms() -> u64 {
    30_000
}
const fn default_normal_ms() -> u64 {
    15_000
}
const fn default_fast_ms() -> u64 {
    7_000
}
const fn default_quiet_probability() -> f64 {
    0.3
}
const fn default_quiet_reaction_probability() -> f64 {
    0.4
}
const fn default_burst_window_ms() -> u64 {
    30_000
}
const fn default_stale_min_ms() -> u64 {
    2 * 60 * 60 * 1000
}
const fn default_stale_max_ms() -> u64 {
    3 * 60 * 60 * 1000
}
const fn default_error_window_ms() -> u64 {
    5 * 60 * 1000
}
const fn default_context_messages() -> usize {
    20
}
const fn default_max_in_flight() -> usize {
    2
}
const fn default_min_spacing_ms() -> u64 {
    1500
}
const fn default_poll_interval_ms() -> u64 {
    200
}
const fn default_dm_probability() -> u8 {
    25
}
const fn default_afterhours_multiplier() -> f64 {
    1.5
}
const fn default_afterhours_cap() -> u8 {
    50
}
const fn default_second_message_probability() -> f64 {
    0.3
}
const fn default_dm_gap_min_ms() -> u64 {
    2000
}
const fn default_dm_gap_max_ms() -> u64 {
    5000
}
const fn default_phrase_capacity() -> usize {
    50
}
const fn default_topic_capacity() -> usize {
    10
}
const fn default_topic_cooldown_ms() -> u64 {
    5 * 60 * 1000
}
const fn default_suggestion_probability() -> f64 {
    0.3
}
const fn default_suggestion_min_ms() -> u64 {
    2000
}
const fn default_suggestion_max_ms() -> u64 {
    5000
}
const fn default_typing_base_ms() -> u64 {
    800
}
const fn default_typing_per_char_ms() -> u64 {
    45
}
const fn default_typing_jitter_ms() -> u64 {
    600
}
const fn default_typing_max_ms() -> u64 {
    8000
}
const fn default_actor_kind() -> ActorKind {
    ActorKind::Synthetic
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config = SimulationConfig::parse("{}").unwrap();
        assert_eq!(config, SimulationConfig::default());
        assert_eq!(config.limiter.max_in_flight, 2);
        assert_eq!(config.limiter.min_spacing_ms, 1500);
        assert!((config.scheduler.quiet_probability - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_roster_and_channels() {
        let yaml = r"
human: kit
actors:
  - name: nova
    personality: night owl who loves synthwave
    dm_probability: 40
  - name: helperbot
    kind: bot
channels:
  - name: '#lobby'
    topic: hangout
    members: [nova]
";
        let config = SimulationConfig::parse(yaml).unwrap();
        let roster = config.roster();
        assert_eq!(roster.len(), 3);
        assert!(roster.first().is_some_and(Actor::is_human));
        assert_eq!(roster.get(1).and_then(|a| a.dm_probability), Some(40));
        assert_eq!(roster.get(2).map(|a| a.kind), Some(ActorKind::Bot));
    }

    #[test]
    fn rejects_duplicate_actor_names() {
        let yaml = "actors:\n  - name: nova\n  - name: nova\n";
        let result = SimulationConfig::parse(yaml);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn rejects_channel_without_hash() {
        let yaml = "channels:\n  - name: lobby\n";
        assert!(SimulationConfig::parse(yaml).is_err());
    }

    #[test]
    fn off_speed_has_no_interval() {
        let config = SchedulerConfig::default();
        assert_eq!(config.base_interval_ms(Speed::Off), None);
        assert_eq!(config.base_interval_ms(Speed::Fast), Some(7_000));
    }
}

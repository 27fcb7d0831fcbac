//! How long a synthetic actor "types" before a message appears.

use std::time::Duration;

use crate::config::TypingConfig;
use crate::random::{RandomExt, RandomSource};

/// Typing delay for `content`: base plus per-character time plus jitter,
/// capped at the configured maximum.
pub fn typing_delay(config: &TypingConfig, content: &str, rng: &dyn RandomSource) -> Duration {
    let chars = u64::try_from(content.chars().count()).unwrap_or(u64::MAX);
    let jitter = rng.between(0, config.jitter_ms);
    let total = config
        .base_ms
        .saturating_add(config.per_char_ms.saturating_mul(chars))
        .saturating_add(jitter)
        .min(config.max_ms);
    Duration::from_millis(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::ScriptedRandom;

    #[test]
    fn longer_messages_type_longer() {
        let config = TypingConfig::default();
        let rng = ScriptedRandom::constant(0.0);
        let short = typing_delay(&config, "hi", &rng);
        let long = typing_delay(&config, "this one takes a good while longer", &rng);
        assert!(long > short);
        assert_eq!(short, Duration::from_millis(800 + 2 * 45));
    }

    #[test]
    fn delay_is_capped() {
        let config = TypingConfig::default();
        let rng = ScriptedRandom::constant(0.999);
        let delay = typing_delay(&config, &"x".repeat(10_000), &rng);
        assert_eq!(delay, Duration::from_millis(config.max_ms));
    }
}

//! Built-in answers for `!command` messages.
//!
//! Commands without a built-in answer are left unanswered.

use std::sync::Arc;

use afterhours_core::{BotError, BotHandler, RandomExt, RandomSource};
use afterhours_types::{Actor, Message, MessageKind};
use chrono::{Local, Utc};
use futures::future::{BoxFuture, FutureExt};

const EIGHT_BALL: &[&str] = &[
    "It is certain.",
    "Without a doubt.",
    "Signs point to yes.",
    "Ask again later.",
    "Better not tell you now.",
    "Cannot predict now.",
    "Don't count on it.",
    "My sources say no.",
    "Very doubtful.",
    "Outlook good.",
];

/// Largest dice pool and die size `!roll` accepts.
const MAX_DICE: u64 = 20;
const MAX_SIDES: u64 = 1000;

/// Answers `!help`, `!time`, `!roll` and `!8ball`.
pub struct BuiltinBot {
    rng: Arc<dyn RandomSource>,
}

impl BuiltinBot {
    /// Bot drawing dice and 8-ball answers from `rng`.
    pub fn new(rng: Arc<dyn RandomSource>) -> Self {
        Self { rng }
    }

    /// The reply text for `command`, if it has one.
    pub fn answer(&self, command: &str) -> Option<String> {
        let mut parts = command.split_whitespace();
        let name = parts.next()?.to_lowercase();
        let arg = parts.next();
        match name.as_str() {
            "!help" => Some("commands: !help, !time, !roll [NdM], !8ball <question>".to_owned()),
            "!time" => Some(format!("it's {}", Local::now().format("%H:%M on %A"))),
            "!roll" => Some(self.roll(arg.unwrap_or("1d6"))),
            "!8ball" => self.rng.pick(EIGHT_BALL).map(|a| (*a).to_owned()),
            _ => None,
        }
    }

    fn roll(&self, spec: &str) -> String {
        let Some((count, sides)) = parse_dice(spec) else {
            return format!("can't roll '{spec}', try something like 2d6");
        };
        let rolls: Vec<u64> = (0..count).map(|_| self.rng.between(1, sides)).collect();
        let total = rolls.iter().fold(0_u64, |acc, r| acc.saturating_add(*r));
        let shown: Vec<String> = rolls.iter().map(u64::to_string).collect();
        format!("rolled {spec}: {} = {total}", shown.join(" + "))
    }
}

/// Parse `NdM` (or `dM`) into a bounded dice pool.
fn parse_dice(spec: &str) -> Option<(u64, u64)> {
    let lower = spec.to_lowercase();
    let (count, sides) = lower.split_once('d')?;
    let count: u64 = if count.is_empty() { 1 } else { count.parse().ok()? };
    let sides: u64 = sides.parse().ok()?;
    ((1..=MAX_DICE).contains(&count) && (2..=MAX_SIDES).contains(&sides)).then_some((count, sides))
}

impl BotHandler for BuiltinBot {
    fn handle<'a>(
        &'a self,
        command: &'a str,
        bot: &'a Actor,
        _channel: &'a str,
        _model_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Message>, BotError>> {
        let reply = self
            .answer(command)
            .map(|text| Message::new(bot.name.clone(), text, MessageKind::Bot, Utc::now()));
        futures::future::ready(Ok(reply)).boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use afterhours_core::ScriptedRandom;
    use afterhours_types::ActorKind;

    use super::*;

    fn bot(value: f64) -> BuiltinBot {
        BuiltinBot::new(Arc::new(ScriptedRandom::constant(value)))
    }

    #[test]
    fn dice_specs_are_bounded() {
        assert_eq!(parse_dice("2d6"), Some((2, 6)));
        assert_eq!(parse_dice("d20"), Some((1, 20)));
        assert_eq!(parse_dice("0d6"), None);
        assert_eq!(parse_dice("99d6"), None);
        assert_eq!(parse_dice("2d1"), None);
        assert_eq!(parse_dice("banana"), None);
    }

    #[test]
    fn rolls_use_the_random_source() {
        assert_eq!(bot(0.0).answer("!roll 3d6").unwrap(), "rolled 3d6: 1 + 1 + 1 = 3");
        assert_eq!(bot(0.999_999).answer("!roll 2d6").unwrap(), "rolled 2d6: 6 + 6 = 12");
        assert!(bot(0.5).answer("!roll").unwrap().starts_with("rolled 1d6"));
    }

    #[test]
    fn eight_ball_and_help_answer() {
        assert_eq!(bot(0.0).answer("!8ball will it rain?").unwrap(), "It is certain.");
        assert!(bot(0.0).answer("!help").unwrap().contains("!roll"));
        assert!(bot(0.0).answer("!image a cat").is_none());
    }

    #[tokio::test]
    async fn replies_are_authored_by_the_bot() {
        let helper = Actor::new("helper", ActorKind::Bot);
        let reply = bot(0.0)
            .handle("!8ball ok?", &helper, "#lobby", "default")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.author, "helper");
        assert_eq!(reply.kind, MessageKind::Bot);
    }
}

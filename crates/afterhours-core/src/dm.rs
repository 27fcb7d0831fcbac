//! Autonomous direct messages from synthetic actors to the human.
//!
//! Evaluated once per scheduler tick. When the human is viewing a direct
//! conversation, only that actor may write; otherwise every synthetic
//! actor rolls against their own trigger probability and one survivor is
//! picked. The chosen actor sends one message, or two with a short gap.
//! Only one autonomous conversation runs at a time.

use std::sync::atomic::Ordering;

use afterhours_types::{Message, MessageKind, Target};
use chrono::{DateTime, Local, Utc};
use tracing::{debug, info, warn};

use crate::opener;
use crate::parse;
use crate::random::RandomExt;
use crate::simulation::Simulation;
use crate::temporal;

/// Clears the in-flight flag when the DM task ends, however it ends.
struct InFlight<'a>(&'a std::sync::atomic::AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Simulation {
    /// Effective trigger probability (percent) for `actor` at `now`.
    fn trigger_probability(&self, configured: Option<u8>, now: &DateTime<Local>) -> u8 {
        let dm = &self.inner.config.dm;
        let base = configured.unwrap_or(dm.default_probability).min(100);
        let afterhours = self.inner.config.afterhours_protocol && temporal::is_afterhours(now);
        temporal::dm_probability(base, afterhours, dm.afterhours_multiplier, dm.afterhours_cap)
    }

    /// Decide which actor, if any, opens a direct message at `now`.
    pub fn choose_dm_actor(&self, now: &DateTime<Local>) -> Option<String> {
        let (viewing, candidates) = {
            let state = self.state();
            let viewing = match &state.active {
                Some(Target::Direct(name)) => state
                    .roster
                    .get(name)
                    .filter(|a| a.is_synthetic())
                    .map(|a| (a.name.clone(), a.dm_probability)),
                _ => None,
            };
            let candidates: Vec<(String, Option<u8>)> = state
                .roster
                .values()
                .filter(|a| a.is_synthetic())
                .map(|a| (a.name.clone(), a.dm_probability))
                .collect();
            (viewing, candidates)
        };

        if let Some((name, configured)) = viewing {
            let p = self.trigger_probability(configured, now);
            return self.rng().chance(f64::from(p) / 100.0).then_some(name);
        }

        let survivors: Vec<String> = candidates
            .into_iter()
            .filter(|(_, configured)| {
                let p = self.trigger_probability(*configured, now);
                self.rng().chance(f64::from(p) / 100.0)
            })
            .map(|(name, _)| name)
            .collect();
        self.rng().pick(&survivors).cloned()
    }

    /// Maybe start an autonomous direct conversation. Returns the chosen
    /// actor when one was started.
    pub fn maybe_trigger_dm_at(&self, now: DateTime<Local>) -> Option<String> {
        if self.inner.dm_in_flight.load(Ordering::Acquire) {
            debug!("autonomous dm already in flight");
            return None;
        }
        let actor = self.choose_dm_actor(&now)?;
        if self.inner.dm_in_flight.swap(true, Ordering::AcqRel) {
            return None;
        }
        let count = if self.rng().chance(self.inner.config.dm.second_message_probability) {
            2
        } else {
            1
        };
        info!(actor = %actor, messages = count, "autonomous dm triggered");
        let sim = self.clone();
        let chosen = actor.clone();
        tokio::spawn(async move {
            let _flag = InFlight(&sim.inner.dm_in_flight);
            sim.send_dms(&chosen, count).await;
        });
        Some(actor)
    }

    async fn send_dms(&self, actor: &str, count: u8) {
        let dm = &self.inner.config.dm;
        for i in 0..count {
            if i > 0 {
                tokio::time::sleep(self.rng().delay_ms(dm.gap_min_ms, dm.gap_max_ms)).await;
            }
            let history = self
                .state()
                .directs
                .get(actor)
                .map(|d| d.messages.clone())
                .unwrap_or_default();
            let cue = opener::contextual_opener(&history, self.rng());
            let Some(request) = self.direct_request(actor, Some(cue.text.clone())) else {
                return;
            };
            let text = match self.generate(&request).await {
                Ok(Some(raw)) => parse::strip_echo(actor, &raw),
                Ok(None) => cue.text,
                Err(e) => {
                    warn!(actor = actor, kind = ?e.kind(), error = %e, "autonomous dm generation failed");
                    return;
                }
            };
            if text.is_empty() {
                return;
            }
            let message = Message::new(actor, text, MessageKind::Pm, Utc::now());
            self.type_and_send(Target::Direct(actor.to_owned()), message).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;
    use crate::simulation::tests::sim_with;

    fn tuesday_afternoon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 6, 18, 14, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn viewing_a_dm_prioritizes_that_actor() {
        // 0.2 passes a 25% draw.
        let sim = sim_with(None, 0.2);
        sim.set_active_context(Some(Target::Direct("juno".into())));
        for _ in 0..10 {
            assert_eq!(sim.choose_dm_actor(&tuesday_afternoon()).as_deref(), Some("juno"));
        }
    }

    #[tokio::test]
    async fn failed_draw_while_viewing_picks_nobody() {
        let sim = sim_with(None, 0.3);
        sim.set_active_context(Some(Target::Direct("juno".into())));
        assert_eq!(sim.choose_dm_actor(&tuesday_afternoon()), None);
    }

    #[tokio::test]
    async fn afterhours_boost_raises_odds() {
        // 0.3 fails 25% but passes the boosted 38%.
        let sim = sim_with(None, 0.3);
        let saturday_night = Local.with_ymd_and_hms(2024, 6, 15, 23, 30, 0).unwrap();
        assert!(sim.choose_dm_actor(&saturday_night).is_some());
        assert!(sim.choose_dm_actor(&tuesday_afternoon()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn null_generation_falls_back_to_opener() {
        let sim = sim_with(None, 0.2);
        let chosen = sim.maybe_trigger_dm_at(tuesday_afternoon()).unwrap();
        // A second trigger while the first is in flight is refused.
        assert_eq!(sim.maybe_trigger_dm_at(tuesday_afternoon()), None);
        tokio::time::sleep(Duration::from_secs(60)).await;
        let state = sim.snapshot();
        let log = state.log(&Target::Direct(chosen.clone())).unwrap();
        assert!(!log.is_empty());
        assert!(log.iter().all(|m| m.kind == MessageKind::Pm && m.author == chosen));
        assert!(!sim.inner.dm_in_flight.load(Ordering::Acquire));
    }

    #[tokio::test(start_paused = true)]
    async fn reply_echo_is_stripped() {
        let sim = sim_with(Some("nova: couldn't sleep, you up?"), 0.2);
        sim.set_active_context(Some(Target::Direct("nova".into())));
        assert_eq!(sim.maybe_trigger_dm_at(tuesday_afternoon()).as_deref(), Some("nova"));
        tokio::time::sleep(Duration::from_secs(60)).await;
        let state = sim.snapshot();
        let log = state.log(&Target::Direct("nova".into())).unwrap();
        assert_eq!(log.first().unwrap().content, "couldn't sleep, you up?");
    }
}

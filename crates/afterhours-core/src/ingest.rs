//! The single funnel every message passes through.
//!
//! One [`Simulation::ingest`] call extracts links, appends with id-based
//! dedup, updates relationship memory and staleness tracking, marks unread
//! state, mirrors synthetic messages to other contexts and hands the
//! message to persistence. Local state is fully updated before the call
//! returns; broadcast and persistence complete later, in any order.

use std::sync::Arc;

use afterhours_types::{Envelope, Message, MessageKind, Target, VirtualMessage};
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::BusEndpoint;
use crate::collaborators::StorageKey;
use crate::links;
use crate::patterns::Observation;
use crate::relationship;
use crate::simulation::{SYSTEM_AUTHOR, SimEvent, Simulation};

/// Where a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Produced in this context; this context is its source of truth.
    Local,
    /// Mirrored from another context over the bus.
    Remote,
}

impl Simulation {
    /// Ingest `message` into `target`.
    ///
    /// Returns `false` when the message was dropped: a duplicate id or an
    /// unknown channel.
    ///
    /// # Panics
    ///
    /// Persistence and topic suggestions are spawned onto the current Tokio
    /// runtime, so this panics when called outside one.
    pub fn ingest(&self, mut message: Message, target: &Target, origin: Origin) -> bool {
        let extracted = links::extract(&message.content);
        message.content = extracted.content;
        for link in extracted.links {
            if !message.links.contains(&link) {
                message.links.push(link);
            }
        }
        for image in extracted.images {
            if !message.images.contains(&image) {
                message.images.push(image);
            }
        }

        let now = Utc::now();
        let (author_synthetic, marked_unread) = {
            let mut state = self.state();
            if !state.append(target, message.clone()) {
                debug!(target = %target, id = %message.id, "message dropped (duplicate or unknown target)");
                return false;
            }

            let label = target.to_string();
            let owners: Vec<String> = match target {
                Target::Channel(name) => state.synthetic_members(name),
                Target::Direct(name) => vec![name.clone()],
            };
            for owner in owners.iter().filter(|o| **o != message.author) {
                if let Some(actor) = state.roster.get_mut(owner) {
                    relationship::update(actor, &message.author, &label, &message, now);
                }
            }

            let viewing = state.active.as_ref() == Some(target);
            let by_human = message.author == state.human;
            let marked_unread = !viewing && !by_human && state.unread.insert(target.clone());

            let author_synthetic = state
                .roster
                .get(&message.author)
                .is_some_and(afterhours_types::Actor::is_synthetic);
            (author_synthetic, marked_unread)
        };

        if let Target::Channel(channel) = target {
            let observation = self.patterns().observe(&message, channel, now, self.rng());
            if let Observation::SuggestTopicChange { channel, text, delay } = observation {
                self.schedule_suggestion(channel, text, delay);
            }
        }

        self.emit(SimEvent::MessageAdded {
            target: target.clone(),
            message: message.clone(),
        });
        if marked_unread {
            self.emit(SimEvent::Unread {
                target: target.clone(),
            });
        }

        // Remote messages are marked processed so they are never mirrored
        // back; local synthetic ones are mirrored exactly once.
        let first_time = self.processed().insert(message.id);
        if origin == Origin::Local && author_synthetic && first_time {
            self.mirror(target, &message);
        }

        self.persist(target, message);
        true
    }

    fn mirror(&self, target: &Target, message: &Message) {
        let Target::Channel(channel) = target else {
            return;
        };
        if let Some(bus) = self.inner.bus.get() {
            bus.publish(Envelope::VirtualMessage(VirtualMessage {
                message: message.clone(),
                channel_name: channel.clone(),
            }));
        }
    }

    fn persist(&self, target: &Target, message: Message) {
        let key = match target {
            Target::Channel(name) => StorageKey::Channel(name.clone()),
            Target::Direct(name) => StorageKey::Direct(name.clone()),
        };
        let store = Arc::clone(&self.inner.collaborators.store);
        tokio::spawn(async move {
            if let Err(e) = store.save_message(&key, &message).await {
                warn!(key = %key.as_key(), id = %message.id, error = %e, "failed to persist message");
            }
        });
    }

    fn schedule_suggestion(&self, channel: String, text: String, delay: std::time::Duration) {
        let sim = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let notice = Message::new(SYSTEM_AUTHOR, text, MessageKind::System, Utc::now());
            sim.ingest(notice, &Target::Channel(channel), Origin::Local);
        });
    }

    /// Attach this simulation to a cross-context bus.
    ///
    /// Synthetic messages produced here are published from now on, and
    /// messages from other contexts are ingested idempotently. Returns the
    /// listener task; a second call keeps the first endpoint.
    pub fn connect_bus(&self, endpoint: Arc<BusEndpoint>) -> JoinHandle<()> {
        let mut receiver = endpoint.subscribe();
        if self.inner.bus.set(endpoint).is_err() {
            warn!("bus already connected, keeping the existing endpoint");
        }
        let sim = self.clone();
        tokio::spawn(async move {
            while let Some(vm) = receiver.recv().await {
                if sim.processed().contains(&vm.message.id) {
                    continue;
                }
                sim.ingest(vm.message, &Target::Channel(vm.channel_name), Origin::Remote);
            }
            info!("cross-context bus closed, continuing single-context");
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::simulation::tests::sim_with;

    fn lobby() -> Target {
        Target::Channel("#lobby".into())
    }

    #[tokio::test]
    async fn reingesting_the_same_id_is_a_noop() {
        let sim = sim_with(None, 0.5);
        let message = Message::new("nova", "synth meetup saturday", MessageKind::Ai, Utc::now());
        assert!(sim.ingest(message.clone(), &lobby(), Origin::Local));
        assert!(!sim.ingest(message, &lobby(), Origin::Local));
        assert_eq!(sim.snapshot().log(&lobby()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn links_are_extracted_before_append() {
        let sim = sim_with(None, 0.5);
        let message = Message::new(
            "nova",
            "docs https://www.rust-lang.org/learn and https://i.imgur.com/cat.png",
            MessageKind::Ai,
            Utc::now(),
        );
        sim.ingest(message, &lobby(), Origin::Local);
        let state = sim.snapshot();
        let stored = state.log(&lobby()).unwrap().last().unwrap();
        assert_eq!(stored.content, "docs and");
        assert_eq!(stored.links, vec!["https://www.rust-lang.org/learn"]);
        assert_eq!(stored.images, vec!["https://i.imgur.com/cat.png"]);
    }

    #[tokio::test]
    async fn synthetic_members_remember_the_author() {
        let sim = sim_with(None, 0.5);
        let message = Message::new("kit", "anyone into synthwave?", MessageKind::User, Utc::now());
        sim.ingest(message, &lobby(), Origin::Local);
        let state = sim.snapshot();
        let record = state.roster["nova"].relationships.get("kit").unwrap();
        assert_eq!(record.interaction_count, 1);
        // The human keeps no memory, and authors do not remember themselves.
        assert!(state.roster["kit"].relationships.is_empty());
    }

    #[tokio::test]
    async fn human_and_active_messages_stay_read() {
        let sim = sim_with(None, 0.5);
        sim.ingest(
            Message::new("kit", "typing away", MessageKind::User, Utc::now()),
            &lobby(),
            Origin::Local,
        );
        assert!(sim.unread().is_empty());
        sim.set_active_context(Some(lobby()));
        sim.ingest(
            Message::new("nova", "hey", MessageKind::Ai, Utc::now()),
            &lobby(),
            Origin::Local,
        );
        assert!(sim.unread().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_chatter_gets_a_suggestion() {
        // Every draw is 0.0, so the 30% gate always passes.
        let sim = sim_with(None, 0.0);
        for _ in 0..3 {
            sim.ingest(
                Message::new("nova", "pizza party tonight everyone", MessageKind::Ai, Utc::now()),
                &lobby(),
                Origin::Local,
            );
        }
        tokio::time::sleep(Duration::from_secs(6)).await;
        let state = sim.snapshot();
        let last = state.log(&lobby()).unwrap().last().unwrap();
        assert_eq!(last.kind, MessageKind::System);
        assert_eq!(last.author, SYSTEM_AUTHOR);
    }
}

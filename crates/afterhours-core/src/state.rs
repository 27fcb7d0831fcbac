//! In-memory chat state: roster, channels, direct conversations, unread
//! markers and the active context.
//!
//! All mutation happens synchronously under the simulation's state lock,
//! so a reader never observes a half-applied update. The whole state
//! serializes to JSON; timestamps are typed and reconstructed once at load.

use std::collections::{BTreeMap, BTreeSet};

use afterhours_types::{Actor, ActorKind, Channel, DirectConversation, Message, Target};
use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;

/// Maximum entries kept in any channel or direct conversation log.
pub const MAX_LOG: usize = 1000;

/// Everything the simulation knows about the chat network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatState {
    /// Nickname of the human user.
    pub human: String,
    /// Every actor keyed by nickname.
    pub roster: BTreeMap<String, Actor>,
    /// Channels keyed by name.
    pub channels: BTreeMap<String, Channel>,
    /// Direct conversations keyed by the other party's nickname.
    pub directs: BTreeMap<String, DirectConversation>,
    /// Targets with messages the human has not seen.
    #[serde(default)]
    pub unread: BTreeSet<Target>,
    /// What the human is looking at, if anything.
    #[serde(default)]
    pub active: Option<Target>,
}

impl ChatState {
    /// Build the initial state from configuration.
    pub fn from_config(config: &SimulationConfig) -> Self {
        let roster: BTreeMap<String, Actor> = config
            .roster()
            .into_iter()
            .map(|actor| (actor.name.clone(), actor))
            .collect();
        let channels = config
            .channels
            .iter()
            .map(|c| {
                let mut channel = Channel::new(c.name.clone());
                channel.topic.clone_from(&c.topic);
                for member in c.members.iter().filter(|m| roster.contains_key(*m)) {
                    channel.add_member(member);
                }
                (c.name.clone(), channel)
            })
            .collect();
        Self {
            human: config.human.clone(),
            roster,
            channels,
            directs: BTreeMap::new(),
            unread: BTreeSet::new(),
            active: None,
        }
    }

    /// Serialize the whole state.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Restore state from [`ChatState::to_json`] output.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error for malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The log for `target`, if it exists.
    pub fn log(&self, target: &Target) -> Option<&[Message]> {
        match target {
            Target::Channel(name) => self.channels.get(name).map(|c| c.messages.as_slice()),
            Target::Direct(name) => self.directs.get(name).map(|d| d.messages.as_slice()),
        }
    }

    /// Append `message` to `target`'s log, trimming to [`MAX_LOG`].
    ///
    /// Direct conversations are created on demand. Returns `false` if the
    /// target channel does not exist or a message with the same id is
    /// already in the log.
    pub fn append(&mut self, target: &Target, message: Message) -> bool {
        let log = match target {
            Target::Channel(name) => match self.channels.get_mut(name) {
                Some(channel) => &mut channel.messages,
                None => return false,
            },
            Target::Direct(name) => {
                &mut self
                    .directs
                    .entry(name.clone())
                    .or_insert_with(|| DirectConversation::new(name.clone()))
                    .messages
            }
        };
        if log.iter().any(|m| m.id == message.id) {
            return false;
        }
        log.push(message);
        trim_log(log, MAX_LOG);
        true
    }

    /// Nicknames of synthetic actors in `channel`.
    pub fn synthetic_members(&self, channel: &str) -> Vec<String> {
        self.channels
            .get(channel)
            .map(|c| {
                c.members
                    .iter()
                    .filter(|m| self.roster.get(*m).is_some_and(Actor::is_synthetic))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `channel` has any member besides the human.
    pub fn has_non_human_members(&self, channel: &Channel) -> bool {
        channel.members.iter().any(|m| *m != self.human)
    }

    /// Synthetic actors that are not a member of any channel.
    pub fn idle_synthetic_actors(&self) -> Vec<String> {
        self.roster
            .values()
            .filter(|a| a.is_synthetic())
            .filter(|a| !self.channels.values().any(|c| c.has_member(&a.name)))
            .map(|a| a.name.clone())
            .collect()
    }

    /// The first bot-kind actor in `channel`, falling back to any bot on
    /// the roster.
    pub fn bot_for(&self, channel: &str) -> Option<&Actor> {
        let is_bot = |a: &&Actor| a.kind == ActorKind::Bot;
        self.channels
            .get(channel)
            .and_then(|c| {
                c.members
                    .iter()
                    .filter_map(|m| self.roster.get(m))
                    .find(is_bot)
            })
            .or_else(|| self.roster.values().find(is_bot))
    }
}

/// Drop the oldest entries so at most `cap` remain.
pub fn trim_log(log: &mut Vec<Message>, cap: usize) {
    let excess = log.len().saturating_sub(cap);
    if excess > 0 {
        log.drain(..excess);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use afterhours_types::MessageKind;
    use chrono::Utc;

    use super::*;

    fn config() -> SimulationConfig {
        SimulationConfig::parse(
            "human: kit\nactors:\n  - name: nova\n  - name: helper\n    kind: bot\nchannels:\n  - name: '#lobby'\n    members: [nova, ghost]\n",
        )
        .unwrap()
    }

    #[test]
    fn from_config_skips_unknown_members() {
        let state = ChatState::from_config(&config());
        let lobby = state.channels.get("#lobby").unwrap();
        assert_eq!(lobby.members, vec!["nova"]);
        assert_eq!(state.roster.len(), 3);
    }

    #[test]
    fn append_dedups_by_id() {
        let mut state = ChatState::from_config(&config());
        let target = Target::Channel("#lobby".into());
        let message = Message::new("nova", "hi", MessageKind::Ai, Utc::now());
        assert!(state.append(&target, message.clone()));
        assert!(!state.append(&target, message));
        assert_eq!(state.log(&target).unwrap().len(), 1);
    }

    #[test]
    fn append_to_unknown_channel_fails() {
        let mut state = ChatState::from_config(&config());
        let message = Message::new("nova", "hi", MessageKind::Ai, Utc::now());
        assert!(!state.append(&Target::Channel("#nope".into()), message));
    }

    #[test]
    fn direct_conversations_are_created_on_demand() {
        let mut state = ChatState::from_config(&config());
        let target = Target::Direct("nova".into());
        let message = Message::new("nova", "psst", MessageKind::Pm, Utc::now());
        assert!(state.append(&target, message));
        assert!(state.directs.contains_key("nova"));
    }

    #[test]
    fn logs_are_capped() {
        let mut state = ChatState::from_config(&config());
        let target = Target::Direct("nova".into());
        for i in 0..1005 {
            state.append(&target, Message::new("nova", i.to_string(), MessageKind::Pm, Utc::now()));
        }
        let log = state.log(&target).unwrap();
        assert_eq!(log.len(), MAX_LOG);
        assert_eq!(log.first().unwrap().content, "5");
    }

    #[test]
    fn json_roundtrip_restores_typed_state() {
        let mut state = ChatState::from_config(&config());
        state.active = Some(Target::Channel("#lobby".into()));
        state
            .append(&Target::Direct("nova".into()), Message::new("nova", "hey", MessageKind::Pm, Utc::now()));
        let restored = ChatState::from_json(&state.to_json().unwrap()).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn bot_lookup_falls_back_to_roster() {
        let state = ChatState::from_config(&config());
        assert_eq!(state.bot_for("#lobby").map(|b| b.name.as_str()), Some("helper"));
    }
}

//! The simulation handle: shared state, collaborators and the operations
//! the embedding application calls.
//!
//! [`Simulation`] is a cheap clone around one shared [`Inner`]. Spawned
//! tasks (scheduler timer, follow-ups, DMs, persistence) each hold a clone.
//! Shared state sits behind `std::sync::Mutex` and no lock is ever held
//! across an `.await`.
//!
//! Construction and read-only queries work anywhere. Every operation that
//! ingests a message or arms a timer spawns onto the current Tokio runtime
//! and panics outside one.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use afterhours_types::{Actor, Channel, Message, MessageId, MessageKind, Target};
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::bus::BusEndpoint;
use crate::collaborators::{BotHandler, GenerationBackend, GenerationRequest, MessageStore, Persona};
use crate::config::SimulationConfig;
use crate::dedup::SeenIds;
use crate::error::{GenerationError, SimulationError};
use crate::ingest::Origin;
use crate::limiter::ConcurrencyLimiter;
use crate::parse;
use crate::patterns::PatternTracker;
use crate::random::{RandomSource, SeededRandom};
use crate::relationship;
use crate::scheduler::Control;
use crate::state::ChatState;

/// Capacity of the UI event channel.
const EVENT_CAPACITY: usize = 512;

/// Author used for client-generated system notices.
pub const SYSTEM_AUTHOR: &str = "*";

/// Something the UI should render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    /// A message landed in a log.
    MessageAdded {
        /// Where it landed.
        target: Target,
        /// The message as stored.
        message: Message,
    },
    /// An actor started typing.
    TypingStarted {
        /// Where they are typing.
        target: Target,
        /// Who is typing.
        actor: String,
    },
    /// An actor stopped typing.
    TypingStopped {
        /// Where they were typing.
        target: Target,
        /// Who was typing.
        actor: String,
    },
    /// A target gained unread messages.
    Unread {
        /// The target now marked unread.
        target: Target,
    },
}

/// The external collaborators a simulation drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Text generation.
    pub backend: Arc<dyn GenerationBackend>,
    /// Message persistence.
    pub store: Arc<dyn MessageStore>,
    /// Bot-command answers.
    pub bot: Arc<dyn BotHandler>,
}

/// State shared by every clone of a [`Simulation`].
pub(crate) struct Inner {
    pub(crate) config: SimulationConfig,
    pub(crate) state: Mutex<ChatState>,
    pub(crate) patterns: Mutex<PatternTracker>,
    pub(crate) processed: Mutex<SeenIds>,
    pub(crate) control: Mutex<Control>,
    pub(crate) limiter: ConcurrencyLimiter,
    pub(crate) rng: Arc<dyn RandomSource>,
    pub(crate) collaborators: Collaborators,
    pub(crate) bus: OnceLock<Arc<BusEndpoint>>,
    pub(crate) events: broadcast::Sender<SimEvent>,
    pub(crate) dm_in_flight: std::sync::atomic::AtomicBool,
}

/// Handle on a running chat simulation.
#[derive(Clone)]
pub struct Simulation {
    pub(crate) inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Simulation {
    /// Create a simulation. The random source is seeded from
    /// `config.seed`, or from the OS when unset.
    pub fn new(config: SimulationConfig, collaborators: Collaborators) -> Self {
        let rng: Arc<dyn RandomSource> = match config.seed {
            Some(seed) => Arc::new(SeededRandom::from_seed(seed)),
            None => Arc::new(SeededRandom::from_os()),
        };
        Self::with_random(config, collaborators, rng)
    }

    /// Create a simulation drawing every random decision from `rng`.
    pub fn with_random(
        config: SimulationConfig,
        collaborators: Collaborators,
        rng: Arc<dyn RandomSource>,
    ) -> Self {
        let state = ChatState::from_config(&config);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        info!(
            actors = state.roster.len(),
            channels = state.channels.len(),
            human = %state.human,
            "simulation created"
        );
        Self {
            inner: Arc::new(Inner {
                patterns: Mutex::new(PatternTracker::new(config.patterns.clone())),
                processed: Mutex::new(SeenIds::default()),
                control: Mutex::new(Control::new(config.scheduler.speed)),
                limiter: ConcurrencyLimiter::new(&config.limiter),
                state: Mutex::new(state),
                rng,
                collaborators,
                bus: OnceLock::new(),
                events,
                dm_in_flight: std::sync::atomic::AtomicBool::new(false),
                config,
            }),
        }
    }

    /// The configuration this simulation was built from.
    pub fn config(&self) -> &SimulationConfig {
        &self.inner.config
    }

    /// Receive UI events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SimEvent> {
        self.inner.events.subscribe()
    }

    /// A copy of the current chat state.
    pub fn snapshot(&self) -> ChatState {
        self.state().clone()
    }

    /// Replace the chat state, e.g. with one loaded from disk.
    pub fn restore(&self, state: ChatState) {
        *self.state() = state;
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ChatState> {
        lock(&self.inner.state)
    }

    pub(crate) fn patterns(&self) -> MutexGuard<'_, PatternTracker> {
        lock(&self.inner.patterns)
    }

    pub(crate) fn processed(&self) -> MutexGuard<'_, SeenIds> {
        lock(&self.inner.processed)
    }

    pub(crate) fn control(&self) -> MutexGuard<'_, Control> {
        lock(&self.inner.control)
    }

    pub(crate) fn rng(&self) -> &dyn RandomSource {
        &*self.inner.rng
    }

    pub(crate) fn emit(&self, event: SimEvent) {
        // No subscribers is normal for headless runs.
        let _ = self.inner.events.send(event);
    }

    // -----------------------------------------------------------------------
    // Active context
    // -----------------------------------------------------------------------

    /// Switch what the human is looking at and clear its unread marker.
    pub fn set_active_context(&self, target: Option<Target>) {
        let mut state = self.state();
        if let Some(t) = &target {
            state.unread.remove(t);
        }
        state.active = target;
    }

    /// Targets with unseen messages.
    pub fn unread(&self) -> Vec<Target> {
        self.state().unread.iter().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Generation plumbing
    // -----------------------------------------------------------------------

    /// Run one generation through the concurrency limiter.
    pub(crate) async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Option<String>, GenerationError> {
        let label = request.label();
        let model = self.inner.config.model_id.as_str();
        self.inner
            .limiter
            .run_limited(&label, self.inner.collaborators.backend.generate(request, model))
            .await
    }

    /// Build a chatter or reaction request for `channel`.
    pub(crate) fn channel_request(
        &self,
        channel: &str,
        trigger: Option<Message>,
        reaction_to: Option<Message>,
    ) -> Option<GenerationRequest> {
        let state = self.state();
        let chan = state.channels.get(channel)?;
        let now = Utc::now();
        let members: Vec<Persona> = chan
            .members
            .iter()
            .filter_map(|m| state.roster.get(m))
            .filter(|a| a.is_synthetic())
            .map(|a| Persona::of(a, relationship::context_summary(a, &state.human, channel, now)))
            .collect();
        if members.is_empty() {
            return None;
        }
        let keep = self.inner.config.scheduler.context_messages;
        let recent: Vec<Message> = chan
            .messages
            .iter()
            .skip(chan.messages.len().saturating_sub(keep))
            .cloned()
            .collect();
        let topic = chan.topic.clone();
        let human = state.human.clone();
        Some(match reaction_to {
            Some(target) => GenerationRequest::Reaction {
                channel: channel.to_owned(),
                topic,
                human,
                members,
                recent,
                target,
            },
            None => GenerationRequest::Channel {
                channel: channel.to_owned(),
                topic,
                human,
                members,
                recent,
                trigger,
            },
        })
    }

    /// Build a direct-message request for `actor`.
    pub(crate) fn direct_request(&self, actor: &str, opener: Option<String>) -> Option<GenerationRequest> {
        let state = self.state();
        let owner = state.roster.get(actor)?;
        let label = Target::Direct(actor.to_owned()).to_string();
        let memory = relationship::context_summary(owner, &state.human, &label, Utc::now());
        let history = state
            .directs
            .get(actor)
            .map(|d| d.messages.clone())
            .unwrap_or_default();
        Some(GenerationRequest::Direct {
            actor: Persona::of(owner, memory),
            human: state.human.clone(),
            history,
            opener,
        })
    }

    /// Show a typing indicator for `content`, then ingest `message`.
    pub(crate) async fn type_and_send(&self, target: Target, message: Message) {
        let delay = crate::typing::typing_delay(&self.inner.config.typing, &message.content, self.rng());
        self.emit(SimEvent::TypingStarted {
            target: target.clone(),
            actor: message.author.clone(),
        });
        tokio::time::sleep(delay).await;
        self.emit(SimEvent::TypingStopped {
            target: target.clone(),
            actor: message.author.clone(),
        });
        self.ingest(message, &target, Origin::Local);
    }

    /// Deliver one parsed channel line. Returns whether anything was
    /// posted.
    pub(crate) async fn deliver_line(&self, channel: &str, line: parse::ParsedLine) -> bool {
        let (speaker_ok, bot) = {
            let state = self.state();
            let speaker_ok = state.roster.get(&line.author).is_some_and(|a| !a.is_human())
                && state.channels.get(channel).is_some_and(|c| c.has_member(&line.author));
            let bot = state.bot_for(channel).cloned();
            (speaker_ok, bot)
        };
        if !speaker_ok {
            debug!(channel = channel, author = %line.author, "discarding line from non-member");
            return false;
        }

        let target = Target::Channel(channel.to_owned());
        let kind = if line.action { MessageKind::Action } else { MessageKind::Ai };
        let message = Message::new(line.author, line.content, kind, Utc::now());

        if parse::is_bot_command(&message.content, &self.inner.config.bot_commands) {
            let command = message.content.clone();
            self.ingest(message, &target, Origin::Local);
            if let Some(bot) = bot {
                self.dispatch_bot(command, bot, channel.to_owned());
            }
            return true;
        }
        self.type_and_send(target, message).await;
        true
    }

    /// Hand `command` to the bot handler; its answer lands in `channel`.
    pub(crate) fn dispatch_bot(&self, command: String, bot: Actor, channel: String) {
        let sim = self.clone();
        tokio::spawn(async move {
            let handler = Arc::clone(&sim.inner.collaborators.bot);
            let model = sim.inner.config.model_id.clone();
            match handler.handle(&command, &bot, &channel, &model).await {
                Ok(Some(reply)) => {
                    sim.ingest(reply, &Target::Channel(channel), Origin::Local);
                }
                Ok(None) => debug!(command = %command, "bot had no answer"),
                Err(e) => tracing::warn!(error = %e, command = %command, "bot command failed"),
            }
        });
    }

    // -----------------------------------------------------------------------
    // Human input
    // -----------------------------------------------------------------------

    /// The human says `text` in `target`.
    ///
    /// Starts the burst window, ingests the message and schedules a reply:
    /// channel members respond to it, or the addressed actor answers in a
    /// direct conversation.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::UnknownChannel`] or
    /// [`SimulationError::UnknownActor`] when the target does not exist.
    pub fn send_human_message(&self, target: &Target, text: &str) -> Result<MessageId, SimulationError> {
        let human = {
            let state = self.state();
            match target {
                Target::Channel(name) if !state.channels.contains_key(name) => {
                    return Err(SimulationError::UnknownChannel(name.clone()));
                }
                Target::Direct(name) if !state.roster.get(name).is_some_and(|a| !a.is_human()) => {
                    return Err(SimulationError::UnknownActor(name.clone()));
                }
                _ => state.human.clone(),
            }
        };

        self.control().last_human_message = Some(tokio::time::Instant::now());

        let (kind, content) = match text.strip_prefix("/me ") {
            Some(action) => (MessageKind::Action, action),
            None => (MessageKind::User, text),
        };
        let message = Message::new(human, content, kind, Utc::now());
        let id = message.id;
        self.ingest(message.clone(), target, Origin::Local);

        match target {
            Target::Channel(channel) => {
                if parse::is_bot_command(content, &self.inner.config.bot_commands) {
                    let bot = self.state().bot_for(channel).cloned();
                    if let Some(bot) = bot {
                        self.dispatch_bot(content.to_owned(), bot, channel.clone());
                    }
                }
                let sim = self.clone();
                let channel = channel.clone();
                tokio::spawn(async move { sim.reply_in_channel(&channel, message).await });
            }
            Target::Direct(actor) => {
                let sim = self.clone();
                let actor = actor.clone();
                tokio::spawn(async move { sim.reply_in_direct(&actor).await });
            }
        }
        Ok(id)
    }

    async fn reply_in_channel(&self, channel: &str, trigger: Message) {
        let Some(request) = self.channel_request(channel, Some(trigger), None) else {
            return;
        };
        match self.generate(&request).await {
            Ok(Some(raw)) => {
                if let Some(line) = parse::parse_channel_reply(&raw) {
                    self.deliver_line(channel, line).await;
                }
            }
            Ok(None) => debug!(channel = channel, "backend returned nothing for reply"),
            Err(e) => self.surface_error(channel, &e),
        }
    }

    async fn reply_in_direct(&self, actor: &str) {
        let Some(request) = self.direct_request(actor, None) else {
            return;
        };
        match self.generate(&request).await {
            Ok(Some(raw)) => {
                let text = parse::strip_echo(actor, &raw);
                if text.is_empty() {
                    return;
                }
                let message = Message::new(actor, text, MessageKind::Pm, Utc::now());
                self.type_and_send(Target::Direct(actor.to_owned()), message).await;
            }
            Ok(None) => debug!(actor = actor, "backend returned nothing for direct reply"),
            Err(e) => tracing::warn!(actor = actor, error = %e, "direct reply failed"),
        }
    }

    // -----------------------------------------------------------------------
    // Management actions
    // -----------------------------------------------------------------------

    /// Add an actor to the roster.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::DuplicateActor`] if the name is taken.
    pub fn add_actor(&self, actor: Actor) -> Result<(), SimulationError> {
        let mut state = self.state();
        if state.roster.contains_key(&actor.name) {
            return Err(SimulationError::DuplicateActor(actor.name));
        }
        info!(actor = %actor.name, kind = ?actor.kind, "actor added");
        state.roster.insert(actor.name.clone(), actor);
        Ok(())
    }

    /// Replace an actor's profile, personality and DM probability, keeping
    /// their relationship memory.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::UnknownActor`] if no such actor exists.
    pub fn edit_actor(&self, actor: Actor) -> Result<(), SimulationError> {
        let mut state = self.state();
        let existing = state
            .roster
            .get_mut(&actor.name)
            .ok_or_else(|| SimulationError::UnknownActor(actor.name.clone()))?;
        existing.kind = actor.kind;
        existing.profile = actor.profile;
        existing.personality = actor.personality;
        existing.dm_probability = actor.dm_probability;
        Ok(())
    }

    /// Remove an actor from the roster and every channel, announcing a
    /// quit wherever they were present.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::UnknownActor`] if no such actor exists.
    pub fn remove_actor(&self, name: &str) -> Result<(), SimulationError> {
        let channels: Vec<String> = {
            let mut state = self.state();
            if state.roster.remove(name).is_none() {
                return Err(SimulationError::UnknownActor(name.to_owned()));
            }
            state
                .channels
                .values_mut()
                .filter_map(|c| c.remove_member(name).then(|| c.name.clone()))
                .collect()
        };
        for channel in channels {
            let quit = Message::new(name, format!("{name} has quit"), MessageKind::Quit, Utc::now());
            self.ingest(quit, &Target::Channel(channel), Origin::Local);
        }
        info!(actor = name, "actor removed");
        Ok(())
    }

    /// Create an empty channel.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::DuplicateChannel`] if it already exists.
    pub fn create_channel(&self, name: &str, topic: &str) -> Result<(), SimulationError> {
        let mut state = self.state();
        if state.channels.contains_key(name) {
            return Err(SimulationError::DuplicateChannel(name.to_owned()));
        }
        let mut channel = Channel::new(name);
        channel.topic = topic.to_owned();
        state.channels.insert(name.to_owned(), channel);
        info!(channel = name, "channel created");
        Ok(())
    }

    /// Add `nick` to `channel`, announcing the join. Joining a channel one
    /// is already in does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::UnknownChannel`] or
    /// [`SimulationError::UnknownActor`].
    pub fn join_channel(&self, channel: &str, nick: &str) -> Result<(), SimulationError> {
        let joined = {
            let mut state = self.state();
            if !state.roster.contains_key(nick) {
                return Err(SimulationError::UnknownActor(nick.to_owned()));
            }
            let chan = state
                .channels
                .get_mut(channel)
                .ok_or_else(|| SimulationError::UnknownChannel(channel.to_owned()))?;
            chan.add_member(nick)
        };
        if joined {
            self.announce_join(channel, nick);
        }
        Ok(())
    }

    /// Remove `nick` from `channel`, announcing the part.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::UnknownChannel`].
    pub fn part_channel(&self, channel: &str, nick: &str) -> Result<(), SimulationError> {
        let parted = self
            .state()
            .channels
            .get_mut(channel)
            .ok_or_else(|| SimulationError::UnknownChannel(channel.to_owned()))?
            .remove_member(nick);
        if parted {
            let part = Message::new(nick, format!("{nick} has left {channel}"), MessageKind::Part, Utc::now());
            self.ingest(part, &Target::Channel(channel.to_owned()), Origin::Local);
        }
        Ok(())
    }

    /// Change `channel`'s topic on behalf of `by`.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::UnknownChannel`].
    pub fn set_topic(&self, channel: &str, topic: &str, by: &str) -> Result<(), SimulationError> {
        self.state()
            .channels
            .get_mut(channel)
            .ok_or_else(|| SimulationError::UnknownChannel(channel.to_owned()))?
            .topic = topic.to_owned();
        let message = Message::new(by, topic, MessageKind::Topic, Utc::now());
        self.ingest(message, &Target::Channel(channel.to_owned()), Origin::Local);
        Ok(())
    }

    pub(crate) fn announce_join(&self, channel: &str, nick: &str) {
        let join = Message::new(nick, format!("{nick} has joined {channel}"), MessageKind::Join, Utc::now());
        self.ingest(join, &Target::Channel(channel.to_owned()), Origin::Local);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use futures::future::{BoxFuture, FutureExt};

    use super::*;
    use crate::collaborators::{MemoryStore, SilentBot};
    use crate::random::ScriptedRandom;

    /// Backend that always answers with the same text.
    pub(crate) struct Canned(pub Option<String>);

    impl GenerationBackend for Canned {
        fn generate<'a>(
            &'a self,
            _request: &'a GenerationRequest,
            _model_id: &'a str,
        ) -> BoxFuture<'a, Result<Option<String>, GenerationError>> {
            futures::future::ready(Ok(self.0.clone())).boxed()
        }
    }

    pub(crate) fn sim_with(reply: Option<&str>, rng: f64) -> Simulation {
        let config = SimulationConfig::parse(
            "human: kit\nactors:\n  - name: nova\n  - name: juno\nchannels:\n  - name: '#lobby'\n    members: [kit, nova]\n",
        )
        .unwrap();
        let collaborators = Collaborators {
            backend: Arc::new(Canned(reply.map(str::to_owned))),
            store: Arc::new(MemoryStore::new()),
            bot: Arc::new(SilentBot),
        };
        Simulation::with_random(config, collaborators, Arc::new(ScriptedRandom::constant(rng)))
    }

    #[tokio::test(start_paused = true)]
    async fn human_message_gets_a_reply() {
        let sim = sim_with(Some("nova: hey kit!"), 0.5);
        let lobby = Target::Channel("#lobby".into());
        sim.send_human_message(&lobby, "hello all").unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        let state = sim.snapshot();
        let log = state.log(&lobby).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].kind, MessageKind::User);
        assert_eq!(log[1].author, "nova");
        assert_eq!(log[1].content, "hey kit!");
    }

    #[tokio::test(start_paused = true)]
    async fn direct_reply_strips_echo() {
        let sim = sim_with(Some("nova: oh hey"), 0.5);
        let dm = Target::Direct("nova".into());
        sim.send_human_message(&dm, "hi nova").unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        let state = sim.snapshot();
        let log = state.log(&dm).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].content, "oh hey");
        assert_eq!(log[1].kind, MessageKind::Pm);
    }

    #[test]
    fn construction_and_queries_need_no_runtime() {
        let sim = sim_with(None, 0.5);
        sim.set_active_context(Some(Target::Channel("#lobby".into())));
        assert!(sim.unread().is_empty());
        assert_eq!(sim.snapshot().channels.len(), 1);
        assert_eq!(sim.phase(), crate::scheduler::SchedulerPhase::Idle);
    }

    #[tokio::test]
    async fn unknown_targets_are_rejected() {
        let sim = sim_with(None, 0.5);
        let err = sim.send_human_message(&Target::Channel("#nope".into()), "hi");
        assert_eq!(err, Err(SimulationError::UnknownChannel("#nope".into())));
        let err = sim.send_human_message(&Target::Direct("kit".into()), "hi");
        assert_eq!(err, Err(SimulationError::UnknownActor("kit".into())));
    }

    #[tokio::test]
    async fn management_actions_announce() {
        let sim = sim_with(None, 0.5);
        sim.create_channel("#synth", "modular talk").unwrap();
        assert_eq!(
            sim.create_channel("#synth", "again"),
            Err(SimulationError::DuplicateChannel("#synth".into()))
        );
        sim.join_channel("#synth", "juno").unwrap();
        sim.join_channel("#synth", "juno").unwrap();
        sim.set_topic("#synth", "patch cables", "juno").unwrap();
        sim.part_channel("#synth", "juno").unwrap();

        let state = sim.snapshot();
        let kinds: Vec<MessageKind> = state
            .log(&Target::Channel("#synth".into()))
            .unwrap()
            .iter()
            .map(|m| m.kind)
            .collect();
        assert_eq!(kinds, vec![MessageKind::Join, MessageKind::Topic, MessageKind::Part]);
        assert_eq!(state.channels["#synth"].topic, "patch cables");
        assert!(sim.patterns().last_topic_change().is_some());
    }

    #[tokio::test]
    async fn removing_an_actor_quits_their_channels() {
        let sim = sim_with(None, 0.5);
        sim.remove_actor("nova").unwrap();
        let state = sim.snapshot();
        assert!(!state.roster.contains_key("nova"));
        let lobby = state.channels.get("#lobby").unwrap();
        assert!(!lobby.has_member("nova"));
        assert_eq!(lobby.messages.last().unwrap().kind, MessageKind::Quit);
        assert!(sim.remove_actor("nova").is_err());
    }

    #[tokio::test]
    async fn viewing_a_target_clears_unread() {
        let sim = sim_with(None, 0.5);
        let lobby = Target::Channel("#lobby".into());
        sim.ingest(
            Message::new("nova", "anyone here", MessageKind::Ai, Utc::now()),
            &lobby,
            Origin::Local,
        );
        assert_eq!(sim.unread(), vec![lobby.clone()]);
        sim.set_active_context(Some(lobby));
        assert!(sim.unread().is_empty());
    }
}

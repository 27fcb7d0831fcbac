//! The simulation scheduler: an adaptive timer that decides when synthetic
//! chatter happens and how much of it.
//!
//! # States
//!
//! `Idle -> Scheduled -> Running -> (Idle | Scheduled)`
//!
//! Every control change (start, stop, speed, visibility, settings) goes
//! through [`Simulation::activate`], which cancels the pending timer and
//! re-arms it only when the speed is not `off`, the view is visible and no
//! settings surface is open. A tick already running is never cancelled;
//! results that arrive after the scheduler was disarmed are discarded.
//!
//! # Tick body
//!
//! 1. Auto-join idle synthetic actors into channels with nobody but the
//!    human.
//! 2. Burst mode if the human spoke within the burst window.
//! 3. Outside burst, maybe a quiet tick: at most one reaction to a recent
//!    message, nothing spontaneous.
//! 4. Otherwise pick the active channel (or a random one), generate a line
//!    and deliver it, then maybe schedule follow-ups.
//! 5. Evaluate the autonomous DM engine.

use std::collections::HashMap;
use std::time::Duration;

use afterhours_types::{Message, MessageKind, Target};
use chrono::{DateTime, Local, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{FollowUpConfig, Speed};
use crate::error::GenerationError;
use crate::ingest::Origin;
use crate::parse;
use crate::random::RandomExt;
use crate::simulation::{SYSTEM_AUTHOR, Simulation};
use crate::state::{MAX_LOG, trim_log};
use crate::temporal;

/// How many recent non-housekeeping messages a quiet tick may react to.
const QUIET_REACTION_WINDOW: usize = 3;

/// Minimum and maximum actors auto-joined into an empty channel.
const AUTO_JOIN_MIN: u64 = 2;
const AUTO_JOIN_MAX: u64 = 4;

/// Where the scheduler is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// No timer armed.
    Idle,
    /// A timer is armed and waiting.
    Scheduled,
    /// A tick body is executing.
    Running,
}

/// Scheduler control state, owned by the simulation.
#[derive(Debug)]
pub(crate) struct Control {
    pub(crate) started: bool,
    pub(crate) speed: Speed,
    pub(crate) visible: bool,
    pub(crate) settings_open: bool,
    pub(crate) phase: SchedulerPhase,
    pub(crate) timer: Option<JoinHandle<()>>,
    pub(crate) last_human_message: Option<Instant>,
    pub(crate) stale_deadlines: HashMap<String, Instant>,
    pub(crate) last_error: HashMap<String, Instant>,
}

impl Control {
    pub(crate) fn new(speed: Speed) -> Self {
        Self {
            started: false,
            speed,
            visible: true,
            settings_open: false,
            phase: SchedulerPhase::Idle,
            timer: None,
            last_human_message: None,
            stale_deadlines: HashMap::new(),
            last_error: HashMap::new(),
        }
    }

    fn armable(&self) -> bool {
        self.started && self.speed != Speed::Off && self.visible && !self.settings_open
    }
}

/// How a tick ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickMode {
    /// The human spoke recently.
    Burst,
    /// Only a reaction, if anything.
    Quiet,
    /// Ordinary pacing.
    Normal,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// `(channel, actor)` pairs auto-joined this tick.
    pub joined: Vec<(String, String)>,
    /// Mode the tick ran in.
    pub mode: TickMode,
    /// Channel the tick targeted, if any.
    pub channel: Option<String>,
    /// Whether a message was delivered.
    pub delivered: bool,
    /// Follow-up generations scheduled.
    pub follow_ups: u8,
    /// Actor chosen by the DM engine, if any.
    pub dm: Option<String>,
}

impl Simulation {
    // -----------------------------------------------------------------------
    // Controls
    // -----------------------------------------------------------------------

    /// Start the scheduler.
    pub fn start(&self) {
        self.control().started = true;
        info!(speed = ?self.control().speed, "scheduler started");
        self.activate();
    }

    /// Stop the scheduler and cancel any pending timer.
    pub fn stop(&self) {
        self.control().started = false;
        self.activate();
        info!("scheduler stopped");
    }

    /// Change simulation speed. `off` disarms the timer.
    pub fn set_speed(&self, speed: Speed) {
        self.control().speed = speed;
        self.activate();
    }

    /// Report whether the view is visible.
    pub fn set_visible(&self, visible: bool) {
        self.control().visible = visible;
        self.activate();
    }

    /// Report whether a settings surface is open.
    pub fn set_settings_open(&self, open: bool) {
        self.control().settings_open = open;
        self.activate();
    }

    /// Current scheduler phase.
    pub fn phase(&self) -> SchedulerPhase {
        self.control().phase
    }

    /// Whether scheduler-driven results are still wanted.
    pub(crate) fn is_armable(&self) -> bool {
        self.control().armable()
    }

    /// Clear any pending timer, then arm a new one if allowed.
    pub fn activate(&self) {
        let mut control = self.control();
        if let Some(timer) = control.timer.take() {
            timer.abort();
        }
        if !control.armable() {
            if control.phase == SchedulerPhase::Scheduled {
                control.phase = SchedulerPhase::Idle;
            }
            return;
        }
        if control.phase != SchedulerPhase::Running {
            control.phase = SchedulerPhase::Scheduled;
        }
        let sim = self.clone();
        control.timer = Some(tokio::spawn(async move { sim.timer_loop().await }));
    }

    async fn timer_loop(&self) {
        loop {
            let Some(delay) = self.next_interval() else {
                return;
            };
            debug!(delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "next tick armed");
            tokio::time::sleep(delay).await;

            self.control().phase = SchedulerPhase::Running;
            // The tick runs as its own task so cancelling the timer never
            // cancels an in-flight generation.
            let sim = self.clone();
            let tick = tokio::spawn(async move {
                sim.tick().await;
                sim.finish_tick();
            });
            if let Err(e) = tick.await {
                warn!(error = %e, "tick task failed");
            }
        }
    }

    fn finish_tick(&self) {
        let mut control = self.control();
        control.phase = if control.armable() && control.timer.is_some() {
            SchedulerPhase::Scheduled
        } else {
            SchedulerPhase::Idle
        };
    }

    /// Base interval for the current speed scaled by the time of day.
    fn next_interval(&self) -> Option<Duration> {
        let speed = self.control().speed;
        let base = self.inner.config.scheduler.base_interval_ms(speed)?;
        let multiplier = temporal::activity_multiplier(&Local::now(), self.inner.config.afterhours_protocol);
        Some(temporal::adjusted_interval(Duration::from_millis(base), multiplier))
    }

    // -----------------------------------------------------------------------
    // Tick body
    // -----------------------------------------------------------------------

    /// Run one tick against the local wall clock.
    pub async fn tick(&self) -> TickReport {
        self.tick_at(Local::now()).await
    }

    /// Run one tick as if the local time were `now`.
    pub async fn tick_at(&self, now: DateTime<Local>) -> TickReport {
        let joined = self.auto_join();

        let burst = {
            let control = self.control();
            let window = Duration::from_millis(self.inner.config.scheduler.burst_window_ms);
            control.last_human_message.is_some_and(|t| t.elapsed() < window)
        };

        let mut report = TickReport {
            joined,
            mode: if burst { TickMode::Burst } else { TickMode::Normal },
            channel: None,
            delivered: false,
            follow_ups: 0,
            dm: None,
        };

        if !burst && self.rng().chance(self.inner.config.scheduler.quiet_probability) {
            report.mode = TickMode::Quiet;
            let (channel, delivered) = self.quiet_tick().await;
            report.channel = channel;
            report.delivered = delivered;
        } else if let Some(channel) = self.pick_target_channel() {
            self.check_staleness(&channel);
            report.delivered = self.chatter(&channel, None).await;
            let follow = if burst {
                self.inner.config.scheduler.burst_follow_up.clone()
            } else {
                self.inner.config.scheduler.normal_follow_up.clone()
            };
            report.follow_ups = self.schedule_follow_ups(&channel, &follow);
            report.channel = Some(channel);
        }

        report.dm = self.maybe_trigger_dm_at(now);
        debug!(
            mode = ?report.mode,
            channel = ?report.channel,
            delivered = report.delivered,
            follow_ups = report.follow_ups,
            dm = ?report.dm,
            "tick complete"
        );
        report
    }

    /// Fill every channel that has nobody but the human with 2 to 4 idle
    /// synthetic actors, announcing each join once.
    ///
    /// # Panics
    ///
    /// Each join is ingested, which spawns onto the current Tokio runtime;
    /// this panics when called outside one.
    pub fn auto_join(&self) -> Vec<(String, String)> {
        let mut planned = Vec::new();
        {
            let mut state = self.state();
            let empty: Vec<String> = state
                .channels
                .values()
                .filter(|c| !state.has_non_human_members(c))
                .map(|c| c.name.clone())
                .collect();
            for channel in empty {
                let mut pool = state.idle_synthetic_actors();
                if pool.is_empty() {
                    pool = state
                        .roster
                        .values()
                        .filter(|a| a.is_synthetic())
                        .map(|a| a.name.clone())
                        .collect();
                }
                let count = usize::try_from(self.rng().between(AUTO_JOIN_MIN, AUTO_JOIN_MAX)).unwrap_or(0);
                for nick in self.rng().sample(&pool, count) {
                    if let Some(chan) = state.channels.get_mut(&channel)
                        && chan.add_member(&nick)
                    {
                        planned.push((channel.clone(), nick));
                    }
                }
            }
        }
        for (channel, nick) in &planned {
            info!(channel = %channel, actor = %nick, "auto-joined");
            self.announce_join(channel, nick);
        }
        planned
    }

    /// Quiet tick: maybe react to one of the last few messages somewhere.
    async fn quiet_tick(&self) -> (Option<String>, bool) {
        let channels: Vec<String> = self.state().channels.keys().cloned().collect();
        let Some(channel) = self.rng().pick(&channels).cloned() else {
            return (None, false);
        };
        if !self.rng().chance(self.inner.config.scheduler.quiet_reaction_probability) {
            return (Some(channel), false);
        }
        let candidates: Vec<Message> = {
            let state = self.state();
            state
                .channels
                .get(&channel)
                .map(|c| {
                    c.messages
                        .iter()
                        .rev()
                        .filter(|m| !m.kind.is_housekeeping())
                        .take(QUIET_REACTION_WINDOW)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };
        let Some(target) = self.rng().pick(&candidates).cloned() else {
            return (Some(channel), false);
        };
        let delivered = self.chatter(&channel, Some(target)).await;
        (Some(channel), delivered)
    }

    /// The active channel if the human is viewing one, else a random one.
    fn pick_target_channel(&self) -> Option<String> {
        let state = self.state();
        if let Some(Target::Channel(name)) = &state.active
            && state.channels.contains_key(name)
        {
            return Some(name.clone());
        }
        let names: Vec<String> = state.channels.keys().cloned().collect();
        drop(state);
        self.rng().pick(&names).cloned()
    }

    /// Trim `channel` when its staleness period has elapsed, then restart
    /// the period.
    fn check_staleness(&self, channel: &str) {
        let now = Instant::now();
        let period = {
            let cfg = &self.inner.config.scheduler;
            self.rng().delay_ms(cfg.stale_min_ms, cfg.stale_max_ms)
        };
        let expired = {
            let mut control = self.control();
            let next = now.checked_add(period).unwrap_or(now);
            match control.stale_deadlines.get(channel) {
                Some(deadline) if *deadline > now => false,
                Some(_) => {
                    control.stale_deadlines.insert(channel.to_owned(), next);
                    true
                }
                None => {
                    control.stale_deadlines.insert(channel.to_owned(), next);
                    false
                }
            }
        };
        if expired && let Some(chan) = self.state().channels.get_mut(channel) {
            trim_log(&mut chan.messages, MAX_LOG);
            debug!(channel = channel, "staleness period elapsed, log trimmed");
        }
    }

    /// Generate and deliver one line in `channel`, optionally as a reaction
    /// to `reaction_to`. Errors are surfaced, never returned.
    pub(crate) async fn chatter(&self, channel: &str, reaction_to: Option<Message>) -> bool {
        let Some(request) = self.channel_request(channel, None, reaction_to) else {
            debug!(channel = channel, "no synthetic members to speak");
            return false;
        };
        let reply = self.generate(&request).await;
        if !self.is_armable() {
            debug!(channel = channel, "scheduler disarmed mid-call, discarding result");
            return false;
        }
        match reply {
            Ok(Some(raw)) => match parse::parse_channel_reply(&raw) {
                Some(line) => self.deliver_line(channel, line).await,
                None => false,
            },
            Ok(None) => false,
            Err(e) => {
                self.surface_error(channel, &e);
                false
            }
        }
    }

    /// Schedule 0 to 2 delayed extra generations in `channel`.
    fn schedule_follow_ups(&self, channel: &str, follow: &FollowUpConfig) -> u8 {
        let mut scheduled = 0_u8;
        if !self.rng().chance(follow.first_probability) {
            return scheduled;
        }
        let mut delays = vec![self.rng().delay_ms(follow.min_delay_ms, follow.max_delay_ms)];
        if self.rng().chance(follow.second_probability) {
            let extra = self.rng().delay_ms(follow.min_delay_ms, follow.max_delay_ms);
            delays.push(delays.first().copied().unwrap_or_default().saturating_add(extra));
        }
        for delay in delays {
            let react = self.rng().chance(0.5);
            let sim = self.clone();
            let channel = channel.to_owned();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let target = if react { sim.latest_message(&channel) } else { None };
                sim.chatter(&channel, target).await;
            });
            scheduled = scheduled.saturating_add(1);
        }
        scheduled
    }

    fn latest_message(&self, channel: &str) -> Option<Message> {
        self.state()
            .channels
            .get(channel)
            .and_then(|c| c.messages.iter().rev().find(|m| !m.kind.is_housekeeping()).cloned())
    }

    /// Post one rate-limited notice about a generation failure.
    pub(crate) fn surface_error(&self, channel: &str, error: &GenerationError) {
        let window = Duration::from_millis(self.inner.config.scheduler.error_window_ms);
        let now = Instant::now();
        let surface = {
            let mut control = self.control();
            let recent = control
                .last_error
                .get(channel)
                .is_some_and(|at| now.saturating_duration_since(*at) < window);
            if !recent {
                control.last_error.insert(channel.to_owned(), now);
            }
            !recent
        };
        let kind = error.kind();
        if !surface {
            debug!(channel = channel, kind = ?kind, error = %error, "generation error suppressed");
            return;
        }
        warn!(channel = channel, kind = ?kind, error = %error, "generation failed");
        let notice = Message::new(SYSTEM_AUTHOR, kind.user_message(), MessageKind::System, Utc::now());
        self.ingest(notice, &Target::Channel(channel.to_owned()), Origin::Local);
    }
}

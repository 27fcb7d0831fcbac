//! Admission control for generation backend calls.
//!
//! Two independent gates sit in front of every call:
//!
//! - at most `max_in_flight` calls run concurrently; callers wait, polling
//!   every `poll_interval`, until a slot frees;
//! - consecutive call *starts* are at least `min_spacing` apart, measured
//!   from the previous start, not its completion.
//!
//! The limiter never retries. A failed task's error goes straight back to
//! the caller, and the slot is released on every exit path (including a
//! dropped future) by an RAII guard.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::config::LimiterConfig;

/// Mutable admission state.
#[derive(Debug, Default)]
struct LimiterState {
    /// Calls currently running.
    in_flight: usize,
    /// Start time of the most recent admitted call.
    last_start: Option<Instant>,
}

/// Outcome of one admission attempt.
enum Admission {
    /// A slot was reserved; the call may start now.
    Admitted,
    /// Wait this long, then try again.
    Retry(Duration),
}

/// Two-axis gate: max concurrency plus minimum inter-start spacing.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    max_in_flight: usize,
    min_spacing: Duration,
    poll_interval: Duration,
    state: Mutex<LimiterState>,
}

impl ConcurrencyLimiter {
    /// Create a limiter from configuration.
    pub fn new(config: &LimiterConfig) -> Self {
        Self {
            max_in_flight: config.max_in_flight.max(1),
            min_spacing: Duration::from_millis(config.min_spacing_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Number of calls currently running.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Run `task` once both gates admit it.
    ///
    /// `label` only tags log lines.
    pub async fn run_limited<F, T>(&self, label: &str, task: F) -> T
    where
        F: Future<Output = T>,
    {
        let mut waited = Duration::ZERO;
        loop {
            match self.try_admit() {
                Admission::Admitted => break,
                Admission::Retry(pause) => {
                    waited = waited.saturating_add(pause);
                    tokio::time::sleep(pause).await;
                }
            }
        }

        debug!(
            label = label,
            waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
            "generation call admitted"
        );

        let _slot = SlotGuard { limiter: self };
        task.await
    }

    /// Reserve a slot if both gates are open.
    fn try_admit(&self) -> Admission {
        let mut state = self.lock();
        if state.in_flight >= self.max_in_flight {
            return Admission::Retry(self.poll_interval);
        }

        let now = Instant::now();
        if let Some(last) = state.last_start {
            let since = now.saturating_duration_since(last);
            if since < self.min_spacing {
                return Admission::Retry(self.min_spacing.saturating_sub(since));
            }
        }

        state.in_flight = state.in_flight.saturating_add(1);
        state.last_start = Some(now);
        Admission::Admitted
    }

    fn release(&self) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LimiterState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Releases a reserved slot when dropped.
struct SlotGuard<'a> {
    limiter: &'a ConcurrencyLimiter,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

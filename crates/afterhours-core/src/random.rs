//! Injected random source for every probabilistic branch.
//!
//! Components never call a global RNG. They take a [`RandomSource`] so a
//! seeded source reproduces any run exactly, and a scripted source can
//! force specific branches in tests.

use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A source of uniform floats in `[0, 1)`.
///
/// Shared across tasks, so implementations handle their own locking.
pub trait RandomSource: Send + Sync {
    /// Next uniform float in `[0, 1)`.
    fn next_f64(&self) -> f64;
}

/// Convenience draws built on [`RandomSource::next_f64`].
pub trait RandomExt: RandomSource {
    /// `true` with probability `p` (clamped to `[0, 1]`). `p <= 0` is never
    /// true.
    fn chance(&self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        self.next_f64() < p.min(1.0)
    }

    /// Uniform index in `0..len`. Returns `None` for an empty range.
    fn index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let idx = (self.next_f64() * len as f64) as usize;
        Some(idx.min(len.saturating_sub(1)))
    }

    /// Uniform integer in `lo..=hi`. Returns `lo` when `hi < lo`.
    fn between(&self, lo: u64, hi: u64) -> u64 {
        let span = hi.saturating_sub(lo).saturating_add(1);
        let span_usize = usize::try_from(span).unwrap_or(usize::MAX);
        let offset = self.index(span_usize).unwrap_or(0);
        lo.saturating_add(u64::try_from(offset).unwrap_or(0))
    }

    /// Uniform duration between `lo_ms` and `hi_ms` inclusive.
    fn delay_ms(&self, lo_ms: u64, hi_ms: u64) -> Duration {
        Duration::from_millis(self.between(lo_ms, hi_ms))
    }

    /// Uniformly pick one element of a slice.
    fn pick<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        self.index(items.len()).and_then(|i| items.get(i))
    }

    /// Choose `count` distinct elements without replacement, in draw order.
    fn sample<T: Clone>(&self, items: &[T], count: usize) -> Vec<T> {
        let mut pool: Vec<T> = items.to_vec();
        let mut chosen = Vec::with_capacity(count.min(pool.len()));
        while chosen.len() < count {
            let Some(i) = self.index(pool.len()) else {
                break;
            };
            chosen.push(pool.swap_remove(i));
        }
        chosen
    }
}

impl<R: RandomSource + ?Sized> RandomExt for R {}

/// A [`RandomSource`] backed by [`StdRng`].
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    /// Deterministic source: the same seed yields the same sequence.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Source seeded from the operating system.
    pub fn from_os() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&self) -> f64 {
        // A poisoned lock still holds a valid RNG state.
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.random::<f64>()
    }
}

/// A [`RandomSource`] that replays a fixed sequence, cycling forever.
///
/// Used to force branches deterministically: a value below `p` takes a
/// `chance(p)` branch, a value at or above skips it.
pub struct ScriptedRandom {
    values: Vec<f64>,
    cursor: Mutex<usize>,
}

impl ScriptedRandom {
    /// Replay `values` in order. An empty script always yields `0.0`.
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            cursor: Mutex::new(0),
        }
    }

    /// A source that always returns `value`.
    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }
}

impl RandomSource for ScriptedRandom {
    fn next_f64(&self) -> f64 {
        let mut cursor = match self.cursor.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let value = self.values.get(*cursor).copied().unwrap_or(0.0);
        let len = self.values.len().max(1);
        *cursor = cursor.saturating_add(1).checked_rem(len).unwrap_or(0);
        value.clamp(0.0, 0.999_999)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_sources_are_reproducible() {
        let a = SeededRandom::from_seed(7);
        let b = SeededRandom::from_seed(7);
        for _ in 0..32 {
            assert!((a.next_f64() - b.next_f64()).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn chance_zero_never_fires() {
        let rng = ScriptedRandom::constant(0.0);
        assert!(!rng.chance(0.0));
        assert!(rng.chance(0.01));
    }

    #[test]
    fn scripted_cycles() {
        let rng = ScriptedRandom::new(vec![0.1, 0.9]);
        assert!(rng.chance(0.5));
        assert!(!rng.chance(0.5));
        assert!(rng.chance(0.5));
    }

    #[test]
    fn index_stays_in_bounds() {
        let rng = SeededRandom::from_seed(1);
        for _ in 0..1000 {
            let i = rng.index(3);
            assert!(i.is_some_and(|i| i < 3));
        }
        assert_eq!(rng.index(0), None);
    }

    #[test]
    fn between_is_inclusive() {
        let low = ScriptedRandom::constant(0.0);
        let high = ScriptedRandom::constant(0.999_999);
        assert_eq!(low.between(2000, 5000), 2000);
        assert_eq!(high.between(2000, 5000), 5000);
    }

    #[test]
    fn sample_draws_distinct() {
        let rng = SeededRandom::from_seed(3);
        let picked = rng.sample(&["a", "b", "c", "d"], 3);
        assert_eq!(picked.len(), 3);
        let mut sorted = picked.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 3);
    }
}

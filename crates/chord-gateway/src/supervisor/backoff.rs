//! Reconnect backoff
//!
//! Pure delay schedule: no timers, no I/O. The supervisor asks for the next
//! delay after each failed attempt and resets it once a session is steady.

use chord_common::BackoffConfig;
use rand::Rng;
use rand_distr::StandardNormal;
use std::f64::consts::E;
use std::time::Duration;

/// Growth factor between consecutive delays
pub const MULTIPLIER: f64 = E;

/// Standard deviation of the jitter, as a fraction of the delay
pub const JITTER_FRACTION: f64 = 0.119_626_564_72;

/// Backoff state
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    current_delay: Duration,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_fraction: f64,
    attempt_count: u32,
    retry_budget: Option<u32>,
}

impl Backoff {
    #[must_use]
    pub fn new(initial_delay: Duration, max_delay: Duration, retry_budget: Option<u32>) -> Self {
        let initial_delay = initial_delay.min(max_delay);
        Self {
            current_delay: initial_delay,
            initial_delay,
            max_delay,
            multiplier: MULTIPLIER,
            jitter_fraction: JITTER_FRACTION,
            attempt_count: 0,
            retry_budget,
        }
    }

    #[must_use]
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.initial_delay(), config.max_delay(), config.retry_budget)
    }

    /// Disable jitter, for deterministic schedules in tests
    #[cfg(any(test, feature = "testing"))]
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter_fraction = 0.0;
        self
    }

    /// Delay before the next attempt, or `None` once the retry budget is spent
    ///
    /// The first call after a reset returns `initial_delay` (jittered); each
    /// later call grows the base by the multiplier, capped at `max_delay`.
    /// Jitter never feeds back into the base.
    pub fn next_delay<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Duration> {
        self.attempt_count = self.attempt_count.saturating_add(1);
        if self.is_exhausted() {
            return None;
        }

        let base = self.current_delay;
        let grown = (base.as_secs_f64() * self.multiplier).min(self.max_delay.as_secs_f64());
        self.current_delay = Duration::try_from_secs_f64(grown).unwrap_or(self.max_delay);

        Some(self.jitter(base, rng))
    }

    /// Back to `initial_delay` with no attempts counted
    pub fn reset(&mut self) {
        self.current_delay = self.initial_delay;
        self.attempt_count = 0;
    }

    /// Failed attempts since the last reset
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Base of the next delay, before jitter
    #[must_use]
    pub const fn current_delay(&self) -> Duration {
        self.current_delay
    }

    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Whether more failures were counted than the budget allows
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.retry_budget
            .is_some_and(|budget| self.attempt_count > budget)
    }

    fn jitter<R: Rng + ?Sized>(&self, base: Duration, rng: &mut R) -> Duration {
        if self.jitter_fraction == 0.0 {
            return base;
        }
        let secs = base.as_secs_f64();
        let z: f64 = rng.sample(StandardNormal);
        let jittered = (secs + secs * self.jitter_fraction * z).max(0.0);
        Duration::try_from_secs_f64(jittered).unwrap_or(base)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

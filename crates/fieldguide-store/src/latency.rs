//! Simulated variable commit latency.
//!
//! Background commits may finish out of the order they were started in;
//! the stores' compare-and-swap exists precisely to survive that. This
//! module makes the reordering reproducible on a laptop by injecting a
//! randomized delay into the commit body. Tests and the diagnostic binary
//! use [`CommitLatency::fixed`] to make the race deterministic.

use std::time::Duration;

use rand::Rng;

/// Default chance that a delayed commit actually sleeps.
const DEFAULT_PROBABILITY: f64 = 0.5;

/// Default lower bound of the sleep interval.
const DEFAULT_FLOOR: Duration = Duration::from_millis(50);

/// Default upper bound of the sleep interval.
const DEFAULT_CEILING: Duration = Duration::from_millis(800);

/// A randomized sleep applied to commit bodies that opt into delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommitLatency {
    probability: f64,
    floor: Duration,
    ceiling: Duration,
}

impl CommitLatency {
    /// Create a latency profile.
    ///
    /// `probability` is clamped to `0.0..=1.0`. When it fires, the sleep
    /// duration is drawn uniformly from `floor..=ceiling`.
    pub fn new(probability: f64, floor: Duration, ceiling: Duration) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            floor,
            ceiling,
        }
    }

    /// A profile that never sleeps.
    pub const fn disabled() -> Self {
        Self {
            probability: 0.0,
            floor: Duration::ZERO,
            ceiling: Duration::ZERO,
        }
    }

    /// A profile that always sleeps exactly `delay`. Deterministic; used by
    /// tests and the diagnostic binary to force a known completion order.
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            probability: 1.0,
            floor: delay,
            ceiling: delay,
        }
    }

    /// Sleep for a sampled interval, or return immediately when the
    /// probability roll does not fire.
    pub async fn maybe_sleep(&self) {
        let Some(delay) = self.sample() else {
            return;
        };
        tokio::time::sleep(delay).await;
    }

    /// Draw the next sleep interval, if any.
    fn sample(&self) -> Option<Duration> {
        if self.probability <= 0.0 {
            return None;
        }
        let mut rng = rand::rng();
        if !rng.random_bool(self.probability) {
            return None;
        }
        if self.floor >= self.ceiling {
            return Some(self.floor);
        }
        Some(rng.random_range(self.floor..=self.ceiling))
    }
}

impl Default for CommitLatency {
    fn default() -> Self {
        Self::new(DEFAULT_PROBABILITY, DEFAULT_FLOOR, DEFAULT_CEILING)
    }
}

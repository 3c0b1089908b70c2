//! Exponential backoff with jitter.
//!
//! Delay for the n-th tick (n starting at 1):
//! ```text
//! ((2^n - 1) / 2) * base + uniform(0, jitter), clamped to max
//! ```
//! The halving is integer division, so the first tick fires after `0 * base`
//! plus jitter. Once the exponential part reaches `max` the generator keeps
//! ticking at the `max` cadence.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

use super::{ticks_from, RetryEvents, Ticks};

/// Smallest accepted base delay.
pub const MIN_BASE: Duration = Duration::from_millis(1);

/// Largest accepted maximum delay.
pub const MAX_CEILING: Duration = Duration::from_secs(64);

/// Deterministic part of the delay for tick `n`, clamped to `max`.
pub fn backoff_delay(n: u32, base: Duration, max: Duration) -> Duration {
    if n == 0 {
        return Duration::ZERO;
    }

    let multiplier = match 1u128.checked_shl(n) {
        Some(pow) => (pow - 1) / 2,
        None => u128::MAX,
    };
    let nanos = base.as_nanos().saturating_mul(multiplier);

    if nanos >= max.as_nanos() {
        max
    } else {
        // nanos < max <= 64s, fits in u64
        Duration::from_nanos(nanos as u64)
    }
}

/// Exponential backoff tick policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    jitter: Duration,
    max: Duration,
    seed: Option<u64>,
}

impl ExponentialBackoff {
    /// `base` is floored at 1ms and `max` capped at 64s.
    pub fn new(base: Duration, jitter: Duration, max: Duration) -> Self {
        Self {
            base: base.max(MIN_BASE),
            jitter,
            max: max.min(MAX_CEILING),
            seed: None,
        }
    }

    /// Use a fixed seed for the jitter source.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn jitter(&self) -> Duration {
        self.jitter
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// A fresh (infinite) delay schedule.
    pub fn delays(&self) -> BackoffDelays {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        BackoffDelays {
            n: 1,
            saturated: false,
            base: self.base,
            jitter: self.jitter,
            max: self.max,
            rng,
        }
    }
}

impl RetryEvents for ExponentialBackoff {
    fn generate(&self, token: CancellationToken) -> Ticks {
        ticks_from(self.delays(), token)
    }
}

/// Iterator over backoff delays. Never ends.
#[derive(Debug)]
pub struct BackoffDelays {
    n: u32,
    saturated: bool,
    base: Duration,
    jitter: Duration,
    max: Duration,
    rng: StdRng,
}

impl BackoffDelays {
    fn sample_jitter(&mut self) -> Duration {
        let spread = u64::try_from(self.jitter.as_nanos()).unwrap_or(u64::MAX);
        if spread == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.rng.gen_range(0..spread))
    }
}

impl Iterator for BackoffDelays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let step = if self.saturated {
            self.max
        } else {
            let step = backoff_delay(self.n, self.base, self.max);
            if step >= self.max {
                self.saturated = true;
            } else {
                self.n += 1;
            }
            step
        };

        Some(step.saturating_add(self.sample_jitter()).min(self.max))
    }
}

//! Fixed-interval tick policy.

use std::iter;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{ticks_from, RetryEvents, Ticks};

/// Emits a tick every `interval` until cancelled. No jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixed {
    interval: Duration,
}

impl Fixed {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The (infinite) delay schedule.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + Send + 'static {
        iter::repeat(self.interval)
    }
}

impl RetryEvents for Fixed {
    fn generate(&self, token: CancellationToken) -> Ticks {
        ticks_from(self.delays(), token)
    }
}

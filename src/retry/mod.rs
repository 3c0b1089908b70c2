//! Retry event generators.
//!
//! # Data Flow
//! ```text
//! RetryEvents::generate(token)
//!     → delay schedule (fixed.rs / backoff.rs, plain iterator)
//!     → ticks_from(): sleep for next delay, race against token
//!     → Ticks stream, pulled one tick at a time by the request
//! ```
//!
//! # Design Decisions
//! - Streams are pull-based: the next delay only starts once the consumer
//!   asks for it, so ticks are never queued
//! - Cancellation is checked before every wait and wins any tie with the timer
//! - Every `generate()` call starts a fresh schedule; a stream cannot be restarted

pub mod backoff;
pub mod fixed;

use std::time::Duration;

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

pub use backoff::ExponentialBackoff;
pub use fixed::Fixed;

/// A signal that a backup attempt may be considered now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// 1-based position in the sequence.
    pub seq: u64,
    /// Delay waited before this tick fired.
    pub delay: Duration,
}

/// Lazy, infinite tick sequence. Ends when its token is cancelled.
pub type Ticks = BoxStream<'static, Tick>;

/// Event policy: produces a tick sequence governed by a cancellation token.
pub trait RetryEvents: Send + Sync {
    fn generate(&self, token: CancellationToken) -> Ticks;
}

impl<F> RetryEvents for F
where
    F: Fn(CancellationToken) -> Ticks + Send + Sync,
{
    fn generate(&self, token: CancellationToken) -> Ticks {
        self(token)
    }
}

/// Turn a delay schedule into a tick stream governed by `token`.
///
/// A schedule that runs dry leaves the stream pending until cancellation.
pub fn ticks_from<I>(delays: I, token: CancellationToken) -> Ticks
where
    I: Iterator<Item = Duration> + Send + 'static,
{
    stream::unfold((delays, token, 0u64), |(mut delays, token, seq)| async move {
        if token.is_cancelled() {
            return None;
        }
        let Some(delay) = delays.next() else {
            token.cancelled().await;
            return None;
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => None,
            _ = tokio::time::sleep(delay) => {
                let tick = Tick { seq: seq + 1, delay };
                Some((tick, (delays, token, seq + 1)))
            }
        }
    })
    .fuse()
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_ticks_follow_schedule() {
        let token = CancellationToken::new();
        let delays = vec![Duration::from_millis(5), Duration::from_millis(10)];
        let mut ticks = ticks_from(delays.into_iter(), token.clone());

        let start = Instant::now();
        let first = ticks.next().await.unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(first.delay, Duration::from_millis(5));

        let second = ticks.next().await.unwrap();
        assert_eq!(second.seq, 2);
        assert!(start.elapsed() >= Duration::from_millis(15));

        // Exhausted schedule parks until cancellation.
        token.cancel();
        assert!(ticks.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_token_yields_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let mut ticks = ticks_from(std::iter::repeat(Duration::ZERO), token);
        assert!(ticks.next().await.is_none());
    }

    #[tokio::test]
    async fn test_closure_policy() {
        let policy = |token: CancellationToken| {
            ticks_from(std::iter::repeat(Duration::from_millis(1)), token)
        };
        let token = CancellationToken::new();
        let mut ticks = policy.generate(token.clone());
        assert_eq!(ticks.next().await.map(|t| t.seq), Some(1));
        token.cancel();
        assert!(ticks.next().await.is_none());
    }
}

//! Request orchestration: the hedged call itself.
//!
//! # Data Flow
//! ```text
//! Request::execute()
//!     → group.launch()               first attempt, never gated
//!     → spawn tick task:
//!         for tick in events.generate(token):
//!             token cancelled? → stop
//!             admission.admit(token)?
//!                 yes → group.launch()      backup attempt
//!                 no  → group.kill(), mark denied, stop
//!     → group.wait()                 first outcome (or Killed)
//!     → join tick task               denied? → NoAccess
//! ```
//!
//! # Design Decisions
//! - Denial wins over a winner that completes while the tick is being handled:
//!   the tick task commits to `kill()` before looking at the group again
//! - A winner that lands before the tick is delivered cancels the stream, so
//!   no denial can be recorded after it
//! - No event policy means an explicit `Fixed(DEFAULT_EVENT_INTERVAL)`
//! - Parent cancellation only stops ticking; the outcome still comes from the
//!   group, so callers bound the wait themselves if they need a deadline

pub mod admission;

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::HedgeConfig;
use crate::error::{classify, BackupError, BackupResult};
use crate::group::{GroupHandle, RetryGroup};
use crate::observability::metrics;
use crate::retry::{Fixed, RetryEvents, Ticks};

pub use admission::{Admission, BackupBudget, DenyAll};

/// Tick interval installed when no event policy is configured.
pub const DEFAULT_EVENT_INTERVAL: Duration = Duration::from_secs(1);

/// Builder for [`Request`].
pub struct RequestBuilder<T, E> {
    group: RetryGroup<T, E>,
    events: Option<Arc<dyn RetryEvents>>,
    admission: Option<Arc<dyn Admission>>,
}

impl<T, E> RequestBuilder<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Event policy deciding when backups are considered.
    pub fn events<R>(mut self, events: R) -> Self
    where
        R: RetryEvents + 'static,
    {
        self.events = Some(Arc::new(events));
        self
    }

    pub fn shared_events(mut self, events: Arc<dyn RetryEvents>) -> Self {
        self.events = Some(events);
        self
    }

    /// Admission policy consulted on every tick.
    pub fn admission<A>(mut self, admission: A) -> Self
    where
        A: Admission + 'static,
    {
        self.admission = Some(Arc::new(admission));
        self
    }

    /// Admission policy shared with other requests.
    pub fn shared_admission(mut self, admission: Arc<dyn Admission>) -> Self {
        self.admission = Some(admission);
        self
    }

    /// Take the event policy and admission budget from configuration.
    pub fn configure(mut self, config: &HedgeConfig) -> Self {
        self.events = Some(config.events.build());
        if let Some(budget) = config.admission.build() {
            self.admission = Some(Arc::new(budget));
        }
        self
    }

    pub fn build(self) -> Request<T, E> {
        let events = self.events.unwrap_or_else(|| {
            tracing::debug!(interval = ?DEFAULT_EVENT_INTERVAL, "No event policy, using fixed default");
            Arc::new(Fixed::new(DEFAULT_EVENT_INTERVAL))
        });
        if self.admission.is_none() {
            tracing::debug!("No admission policy, backups are unbounded");
        }

        Request {
            token: self.group.token(),
            group: self.group,
            events,
            admission: self.admission,
        }
    }
}

/// A hedged call over one retry group.
pub struct Request<T, E> {
    group: RetryGroup<T, E>,
    token: CancellationToken,
    events: Arc<dyn RetryEvents>,
    admission: Option<Arc<dyn Admission>>,
}

impl<T, E> Request<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn builder(group: RetryGroup<T, E>) -> RequestBuilder<T, E> {
        RequestBuilder {
            group,
            events: None,
            admission: None,
        }
    }

    /// Request configured from `config`.
    pub fn from_config(group: RetryGroup<T, E>, config: &HedgeConfig) -> Self {
        Self::builder(group).configure(config).build()
    }

    /// Token bound to this request; cancelled when the group closes.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Run the hedged call and return the first outcome.
    ///
    /// Returns `BackupError::NoAccess` if admission denied a tick, even when
    /// an attempt finished successfully at the same time.
    pub async fn execute(self) -> BackupResult<T, E> {
        let start = Instant::now();
        let handle = self.group.handle();

        handle.launch();

        let ticks = self.events.generate(self.token.clone());
        let ticker = tokio::spawn(drive_ticks(handle, ticks, self.admission, self.token));

        let outcome = self.group.wait().await;
        let denied = match ticker.await {
            Ok(denied) => denied,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => false,
        };

        let result = if denied {
            Err(BackupError::NoAccess)
        } else {
            outcome
        };

        let verdict = classify(&result);
        metrics::record_call(verdict, start);
        tracing::debug!(verdict = verdict.as_str(), elapsed = ?start.elapsed(), "Request finished");
        result
    }
}

/// Consume ticks until the stream ends or admission denies.
///
/// Returns true if a tick was denied.
async fn drive_ticks<T, E>(
    handle: GroupHandle<T, E>,
    mut ticks: Ticks,
    admission: Option<Arc<dyn Admission>>,
    token: CancellationToken,
) -> bool
where
    T: Send + 'static,
    E: Send + 'static,
{
    while let Some(tick) = ticks.next().await {
        // Group closed or parent cancelled after the tick was yielded.
        if token.is_cancelled() {
            tracing::trace!(seq = tick.seq, "Tick arrived after cancellation, stopping");
            break;
        }

        if let Some(admission) = &admission {
            if !admission.admit(&token) {
                metrics::record_denied();
                tracing::warn!(
                    seq = tick.seq,
                    launched = handle.launched(),
                    "Backup denied by admission policy"
                );
                if handle.kill().is_err() {
                    tracing::debug!(seq = tick.seq, "Retry group already closed at denial");
                }
                return true;
            }
        }

        let attempt = handle.launch();
        tracing::debug!(seq = tick.seq, delay = ?tick.delay, attempt, "Backup attempt launched");
    }
    false
}

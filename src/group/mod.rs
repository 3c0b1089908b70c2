//! Completion arbiter: races attempts of one operation, keeps the first outcome.
//!
//! # Data Flow
//! ```text
//! launch() → tokio::spawn(attempt)
//!     → attempt finishes → claim (CAS on closed flag)
//!         won:  outcome → oneshot slot, cancel token
//!         lost: failure → on_loser_failure, value dropped
//!         panicked: payload → oneshot slot, re-raised by wait()
//! kill()   → claim → Killed → oneshot slot, cancel token
//! wait()   → receive from oneshot slot
//! ```
//!
//! # Design Decisions
//! - The closed flag is the only shared mutable state; the outcome slot is
//!   only touched by whoever won the claim
//! - Attempts are never aborted, only told to stop through the token
//! - Loser callbacks run outside the claim, after the flag has flipped
//! - A panicking attempt settles like any other; its panic surfaces in `wait()`

use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::{AlreadyDone, BackupError, BackupResult};
use crate::observability::metrics;

type Task<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;
type LoserHandler<E> = Arc<dyn Fn(E) + Send + Sync>;

/// What closed the group.
enum Settled<T, E> {
    Won {
        attempt: usize,
        outcome: Result<T, E>,
    },
    Killed,
    Panicked {
        attempt: usize,
        payload: Box<dyn Any + Send>,
    },
}

struct Shared<T, E> {
    task: Task<T, E>,
    on_loser_failure: Option<LoserHandler<E>>,
    token: CancellationToken,
    closed: AtomicBool,
    launched: AtomicUsize,
    slot: Mutex<Option<oneshot::Sender<Settled<T, E>>>>,
}

impl<T, E> Shared<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn launch(self: &Arc<Self>) -> usize {
        let attempt = self.launched.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::record_attempt(attempt > 1);
        tracing::debug!(attempt, closed = self.is_closed(), "Launching attempt");

        let shared = self.clone();
        let run = (self.task)();
        tokio::spawn(async move {
            match AssertUnwindSafe(run).catch_unwind().await {
                Ok(outcome) => shared.complete(attempt, outcome),
                Err(payload) => shared.abort(attempt, payload),
            }
        });
        attempt
    }

    /// Flip the closed flag. True for exactly one caller.
    fn claim(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn settle(&self, settled: Settled<T, E>) {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            // Receiver gone means nobody is waiting any more.
            let _ = sender.send(settled);
        }
        self.token.cancel();
    }

    fn complete(&self, attempt: usize, outcome: Result<T, E>) {
        if self.claim() {
            tracing::debug!(attempt, success = outcome.is_ok(), "Attempt won");
            self.settle(Settled::Won { attempt, outcome });
            return;
        }

        match outcome {
            Ok(_) => {
                tracing::trace!(attempt, "Discarding late success");
            }
            Err(err) => {
                metrics::record_loser_failure();
                tracing::debug!(attempt, "Routing late failure to cleanup");
                if let Some(handler) = &self.on_loser_failure {
                    handler(err);
                }
            }
        }
    }

    fn abort(&self, attempt: usize, payload: Box<dyn Any + Send>) {
        if self.claim() {
            tracing::warn!(attempt, "Attempt panicked before any other settled");
            self.settle(Settled::Panicked { attempt, payload });
            return;
        }
        tracing::warn!(attempt, "Late attempt panicked, discarding");
    }

    fn kill(&self) -> Result<(), AlreadyDone> {
        self.assert_launched("kill");
        if !self.claim() {
            return Err(AlreadyDone);
        }
        metrics::record_killed();
        tracing::info!(launched = self.launched(), "Retry group killed");
        self.settle(Settled::Killed);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn launched(&self) -> usize {
        self.launched.load(Ordering::Acquire)
    }

    fn assert_launched(&self, op: &str) {
        if self.launched() == 0 {
            panic!("retry group: {} called before any launch()", op);
        }
    }
}

/// Builder for [`RetryGroup`].
pub struct RetryGroupBuilder<T, E> {
    token: CancellationToken,
    on_loser_failure: Option<LoserHandler<E>>,
    _output: PhantomData<fn() -> T>,
}

impl<T, E> RetryGroupBuilder<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Token attempts can watch to stop early. Cancelled once the group closes.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Callback for failures of attempts that did not win.
    pub fn on_loser_failure<F>(mut self, handler: F) -> Self
    where
        F: Fn(E) + Send + Sync + 'static,
    {
        self.on_loser_failure = Some(Arc::new(handler));
        self
    }

    /// Bind the operation and finish the group.
    pub fn task<F, Fut>(self, task: F) -> RetryGroup<T, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let task: Task<T, E> = Arc::new(move || task().boxed());
        let (tx, rx) = oneshot::channel();

        let shared = Arc::new(Shared {
            task,
            on_loser_failure: self.on_loser_failure,
            token: self.token,
            closed: AtomicBool::new(false),
            launched: AtomicUsize::new(0),
            slot: Mutex::new(Some(tx)),
        });

        RetryGroup { shared, outcome: rx }
    }
}

/// Runs concurrent attempts of one operation and keeps the first outcome.
pub struct RetryGroup<T, E> {
    shared: Arc<Shared<T, E>>,
    outcome: oneshot::Receiver<Settled<T, E>>,
}

impl<T, E> RetryGroup<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Start building a group whose token is a child of `parent`.
    pub fn builder(parent: &CancellationToken) -> RetryGroupBuilder<T, E> {
        RetryGroupBuilder {
            token: parent.child_token(),
            on_loser_failure: None,
            _output: PhantomData,
        }
    }

    /// Shorthand for a group without a loser callback.
    pub fn new<F, Fut>(parent: &CancellationToken, task: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::builder(parent).task(task)
    }

    /// Start one attempt. Returns its 1-based index.
    ///
    /// Allowed after closure; the late attempt still runs and its outcome is
    /// treated as a loser.
    pub fn launch(&self) -> usize {
        self.shared.launch()
    }

    /// Close the group without a winner.
    ///
    /// # Panics
    /// If called before any `launch()`.
    pub fn kill(&self) -> Result<(), AlreadyDone> {
        self.shared.kill()
    }

    /// Cloneable handle for launching or killing from other tasks.
    pub fn handle(&self) -> GroupHandle<T, E> {
        GroupHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.shared.token.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn launched(&self) -> usize {
        self.shared.launched()
    }

    /// Wait for the group to close and return the captured outcome.
    ///
    /// # Panics
    /// If called before any `launch()`, or with the attempt's own panic if
    /// the first attempt to finish panicked.
    pub async fn wait(self) -> BackupResult<T, E> {
        self.shared.assert_launched("wait");
        match self.outcome.await {
            Ok(Settled::Won { attempt, outcome }) => {
                tracing::debug!(attempt, "Retry group settled");
                outcome.map_err(BackupError::Operation)
            }
            Ok(Settled::Panicked { attempt, payload }) => {
                tracing::debug!(attempt, "Re-raising attempt panic");
                panic::resume_unwind(payload)
            }
            Ok(Settled::Killed) | Err(_) => Err(BackupError::Killed),
        }
    }
}

/// Shared handle onto a [`RetryGroup`].
pub struct GroupHandle<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for GroupHandle<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T, E> GroupHandle<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn launch(&self) -> usize {
        self.shared.launch()
    }

    pub fn kill(&self) -> Result<(), AlreadyDone> {
        self.shared.kill()
    }

    pub fn token(&self) -> CancellationToken {
        self.shared.token.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn launched(&self) -> usize {
        self.shared.launched()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[tokio::test]
    async fn test_single_attempt_wins() {
        let parent = CancellationToken::new();
        let group = RetryGroup::new(&parent, || async { Ok::<_, String>(42) });
        let token = group.token();

        assert_eq!(group.launch(), 1);
        assert_eq!(group.wait().await.unwrap(), 42);
        assert!(token.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_winner_failure_surfaces() {
        let parent = CancellationToken::new();
        let group = RetryGroup::new(&parent, || async { Err::<u32, _>("boom") });
        group.launch();

        match group.wait().await {
            Err(BackupError::Operation(e)) => assert_eq!(e, "boom"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_kill_is_idempotent() {
        let parent = CancellationToken::new();
        let group = RetryGroup::new(&parent, || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, String>(1)
        });
        group.launch();

        assert_eq!(group.kill(), Ok(()));
        assert_eq!(group.kill(), Err(AlreadyDone));
        assert_eq!(group.handle().kill(), Err(AlreadyDone));
        assert!(group.token().is_cancelled());
        assert!(matches!(group.wait().await, Err(BackupError::Killed)));
    }

    #[tokio::test]
    async fn test_kill_after_win_is_already_done() {
        let parent = CancellationToken::new();
        let group = RetryGroup::new(&parent, || async { Ok::<_, String>(()) });
        let handle = group.handle();
        group.launch();

        handle.token().cancelled().await;
        assert_eq!(handle.kill(), Err(AlreadyDone));
        assert!(group.wait().await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_kills_close_once() {
        let parent = CancellationToken::new();
        let group = RetryGroup::new(&parent, || async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, String>(())
        });
        group.launch();

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let handle = group.handle();
            tasks.push(tokio::spawn(async move { handle.kill().is_ok() }));
        }
        let mut killed = 0;
        for task in tasks {
            if task.await.unwrap() {
                killed += 1;
            }
        }
        assert_eq!(killed, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_at_most_one_winner() {
        for _ in 0..20 {
            let parent = CancellationToken::new();
            let wins = Arc::new(AtomicU32::new(0));
            let losers = Arc::new(AtomicU32::new(0));
            let seq = Arc::new(AtomicU32::new(0));

            let l = losers.clone();
            let s = seq.clone();
            let group = RetryGroup::builder(&parent)
                .on_loser_failure(move |_: u32| {
                    l.fetch_add(1, Ordering::SeqCst);
                })
                .task(move || {
                    let id = s.fetch_add(1, Ordering::SeqCst);
                    async move {
                        let jitter = rand::thread_rng().gen_range(0..5);
                        tokio::time::sleep(Duration::from_millis(jitter)).await;
                        Err::<(), u32>(id)
                    }
                });

            let attempts = 8;
            for _ in 0..attempts {
                group.launch();
            }
            if let Err(BackupError::Operation(_)) = group.wait().await {
                wins.fetch_add(1, Ordering::SeqCst);
            }

            // Give stragglers time to report.
            tokio::time::sleep(Duration::from_millis(30)).await;
            assert_eq!(wins.load(Ordering::SeqCst), 1);
            assert_eq!(losers.load(Ordering::SeqCst), attempts - 1);
        }
    }

    #[tokio::test]
    async fn test_loser_successes_skip_cleanup() {
        let parent = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let seq = Arc::new(AtomicU32::new(0));

        let c = calls.clone();
        let s = seq.clone();
        let group = RetryGroup::builder(&parent)
            .on_loser_failure(move |_: String| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .task(move || {
                let id = s.fetch_add(1, Ordering::SeqCst);
                async move {
                    tokio::time::sleep(Duration::from_millis(5 * id as u64)).await;
                    if id == 2 {
                        Err("late failure".to_string())
                    } else {
                        Ok(id)
                    }
                }
            });

        for _ in 0..3 {
            group.launch();
        }
        assert_eq!(group.wait().await.unwrap(), 0);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_launch_after_close_routes_to_cleanup() {
        let parent = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let group = RetryGroup::builder(&parent)
            .on_loser_failure(move |_: &'static str| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .task(|| async { Err::<(), _>("nope") });

        let handle = group.handle();
        group.launch();
        handle.token().cancelled().await;
        assert!(handle.is_closed());

        assert_eq!(handle.launch(), 2);
        assert!(matches!(group.wait().await, Err(BackupError::Operation("nope"))));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_builder_token_reaches_attempts() {
        let parent = CancellationToken::new();
        let builder = RetryGroup::<bool, String>::builder(&parent);
        let token = builder.token();
        let group = builder.task(move || {
            let token = token.clone();
            async move {
                token.cancelled().await;
                Ok(true)
            }
        });

        group.launch();
        group.kill().unwrap();
        assert!(matches!(group.wait().await, Err(BackupError::Killed)));
    }

    #[tokio::test]
    async fn test_parent_cancel_reaches_child() {
        let parent = CancellationToken::new();
        let group = RetryGroup::new(&parent, || async { Ok::<_, String>(()) });
        parent.cancel();
        assert!(group.token().is_cancelled());
        assert!(!group.is_closed());
    }

    #[tokio::test]
    async fn test_panicking_attempt_settles_group() {
        let parent = CancellationToken::new();
        let group = RetryGroup::new(&parent, || async {
            if true {
                panic!("attempt exploded");
            }
            Ok::<u32, String>(0)
        });
        let token = group.token();
        group.launch();

        let waited = tokio::time::timeout(
            Duration::from_millis(500),
            AssertUnwindSafe(group.wait()).catch_unwind(),
        )
        .await
        .expect("wait() must not hang after a panic");

        let payload = waited.expect_err("panic should surface from wait()");
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"attempt exploded"));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_late_panic_does_not_disturb_winner() {
        let parent = CancellationToken::new();
        let seq = Arc::new(AtomicU32::new(0));
        let s = seq.clone();
        let group = RetryGroup::new(&parent, move || {
            let id = s.fetch_add(1, Ordering::SeqCst);
            async move {
                if id == 1 {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    panic!("late attempt exploded");
                }
                Ok::<_, String>(id)
            }
        });

        group.launch();
        group.launch();
        assert_eq!(group.wait().await.unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(40)).await;
    }

    #[tokio::test]
    #[should_panic(expected = "called before any launch()")]
    async fn test_wait_before_launch_panics() {
        let parent = CancellationToken::new();
        let group = RetryGroup::new(&parent, || async { Ok::<_, String>(()) });
        let _ = group.wait().await;
    }

    #[tokio::test]
    #[should_panic(expected = "called before any launch()")]
    async fn test_kill_before_launch_panics() {
        let parent = CancellationToken::new();
        let group = RetryGroup::new(&parent, || async { Ok::<_, String>(()) });
        let _ = group.kill();
    }
}

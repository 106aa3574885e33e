//! The [`Operation`] handle and its atomic state machine.

use super::status::{OperationStatus, Outcome};
use super::task::OperationTask;
use super::PROGRESS_TOLERANCE;
use crate::error::OperationError;
use crate::utils::catch_panic;
use crate::worker::WorkerPool;
use crossbeam::queue::SegQueue;
use crossbeam::utils::Backoff;
use std::sync::atomic::{fence, AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Set in the progress word once the operation is terminal.
const PROGRESS_FROZEN: u64 = 1 << 32;
const PROGRESS_BITS: u64 = u32::MAX as u64;

pub(crate) type Continuation<T> = Box<dyn FnOnce(&Operation<T>) + Send + 'static>;

struct Inner<T> {
    status: AtomicU8,
    /// First terminal writer flips this; only the winner touches `result`/`error`.
    settled: AtomicBool,
    started: AtomicBool,
    canceled: AtomicBool,
    disposed: AtomicBool,
    /// Low 32 bits hold the `f32` progress, bit 32 freezes it.
    progress: AtomicU64,
    result: OnceLock<T>,
    error: OnceLock<OperationError>,
    continuations: SegQueue<Continuation<T>>,
    token: CancellationToken,
    pool: WorkerPool,
}

/// A single-assignment result produced asynchronously.
///
/// `Operation` is a cheap, cloneable handle; every clone observes the same
/// state. Producers call [`set_result`](Self::set_result),
/// [`set_error`](Self::set_error) or [`cancel`](Self::cancel), and the first
/// of those to run decides the outcome. Consumers either block with
/// [`wait`](Self::wait), suspend with [`completion`](Self::completion), or
/// register continuations with [`on_completed`](Self::on_completed).
///
/// # Examples
///
/// ```rust
/// use scarlet_core::{Operation, Outcome};
///
/// let op = Operation::spawn(|op: &Operation<u32>, _token| {
///     op.set_progress(0.5);
///     Ok(42)
/// });
///
/// match op.wait() {
///     Outcome::Completed(value) => assert_eq!(value, 42),
///     other => panic!("unexpected outcome: {:?}", other),
/// }
/// ```
pub struct Operation<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Operation<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> Operation<T> {
    /// Creates an idle operation backed by the shared worker pool.
    pub fn new() -> Self {
        Self::with_pool(WorkerPool::shared())
    }

    /// Creates an idle operation whose work and continuations run on `pool`.
    pub fn with_pool(pool: WorkerPool) -> Self {
        Self::build(pool, CancellationToken::new())
    }

    /// Creates an operation canceled together with `parent`.
    ///
    /// Canceling `parent` signals this operation's token; canceling the
    /// operation does not touch `parent`.
    pub fn linked(pool: WorkerPool, parent: &CancellationToken) -> Self {
        Self::build(pool, parent.child_token())
    }

    fn build(pool: WorkerPool, token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                status: AtomicU8::new(OperationStatus::None as u8),
                settled: AtomicBool::new(false),
                started: AtomicBool::new(false),
                canceled: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                progress: AtomicU64::new(0f32.to_bits() as u64),
                result: OnceLock::new(),
                error: OnceLock::new(),
                continuations: SegQueue::new(),
                token,
                pool,
            }),
        }
    }

    /// Creates an operation and starts `body` on the shared worker pool.
    pub fn spawn<F>(body: F) -> Self
    where
        F: FnOnce(&Operation<T>, &CancellationToken) -> Result<T, OperationError> + Send + 'static,
    {
        let operation = Self::new();
        operation.start(body);
        operation
    }

    /// An operation that is already completed with `value`.
    pub fn from_result(value: T) -> Self {
        let operation = Self::new();
        operation.set_result(value);
        operation
    }

    /// An operation that has already failed with `error`.
    pub fn from_error(error: OperationError) -> Self {
        let operation = Self::new();
        operation.set_error(error);
        operation
    }

    pub fn status(&self) -> OperationStatus {
        OperationStatus::from_u8(self.inner.status.load(Ordering::SeqCst))
    }

    /// True once the operation reached any terminal state.
    pub fn is_completed(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn has_error(&self) -> bool {
        self.inner.error.get().is_some() && self.is_completed()
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::Acquire)
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Current progress in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        f32::from_bits((self.inner.progress.load(Ordering::Acquire) & PROGRESS_BITS) as u32)
    }

    /// The result, once the operation completed successfully.
    pub fn result(&self) -> Option<&T> {
        if self.is_completed() {
            self.inner.result.get()
        } else {
            None
        }
    }

    /// The error, once the operation failed.
    pub fn error(&self) -> Option<&OperationError> {
        if self.is_completed() {
            self.inner.error.get()
        } else {
            None
        }
    }

    /// The token handed to the running task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    pub(crate) fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// Completes the operation with `value`.
    ///
    /// Returns `false`, leaving the operation untouched, if it is already
    /// terminal or canceled.
    pub fn set_result(&self, value: T) -> bool {
        if self.is_completed() || self.is_canceled() || !self.claim() {
            return false;
        }

        let _ = self.inner.result.set(value);
        self.inner
            .progress
            .store(PROGRESS_FROZEN | 1f32.to_bits() as u64, Ordering::Release);
        self.finish(OperationStatus::Completed);
        true
    }

    /// Fails the operation with `error`. No-op once terminal.
    pub fn set_error(&self, error: OperationError) -> bool {
        if self.is_completed() || !self.claim() {
            return false;
        }

        debug!("Operation failed: {}", error);
        let _ = self.inner.error.set(error);
        self.freeze_progress();
        self.finish(OperationStatus::Failed);
        true
    }

    /// Records progress, clamped to `[0, 1]`.
    ///
    /// Concurrent reporters race through a compare-and-swap loop; the value
    /// is not required to increase. Ignored once terminal or canceled.
    pub fn set_progress(&self, progress: f32) {
        if progress.is_nan() || self.is_completed() || self.is_canceled() {
            return;
        }

        let progress = progress.clamp(0.0, 1.0);
        let target = progress.to_bits() as u64;
        let backoff = Backoff::new();
        let mut current = self.inner.progress.load(Ordering::Acquire);

        loop {
            if current & PROGRESS_FROZEN != 0 {
                return;
            }
            let previous = f32::from_bits((current & PROGRESS_BITS) as u32);
            if (previous - progress).abs() < PROGRESS_TOLERANCE {
                return;
            }

            match self.inner.progress.compare_exchange_weak(
                current,
                target,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => {
                    current = actual;
                    backoff.snooze();
                }
            }
        }
    }

    /// Cancels the operation and signals its token.
    ///
    /// Returns `false` if it was already canceled or terminal.
    pub fn cancel(&self) -> bool {
        if self.is_canceled() || self.is_completed() || !self.claim() {
            return false;
        }

        self.inner.canceled.store(true, Ordering::Release);
        self.freeze_progress();

        let token = self.inner.token.clone();
        match catch_panic(move || token.cancel()) {
            Ok(()) => self.finish(OperationStatus::Canceled),
            Err(panic) => {
                // The claim is already ours, so the error is written directly.
                let _ = self
                    .inner
                    .error
                    .set(OperationError::Panicked(format!("cancel failed: {panic}")));
                self.finish(OperationStatus::Failed);
            }
        }
        true
    }

    /// Runs `task` on a worker thread. Only the first call has any effect.
    pub fn start<K>(&self, task: K) -> bool
    where
        K: OperationTask<T>,
    {
        if !self.mark_started() {
            return false;
        }

        let operation = self.clone();
        self.inner.pool.spawn(move || operation.execute(task));
        true
    }

    /// Runs `task` on the calling thread. Only the first start has any effect.
    pub fn start_inline<K>(&self, task: K) -> bool
    where
        K: OperationTask<T>,
    {
        if !self.mark_started() {
            return false;
        }

        self.execute(task);
        true
    }

    fn mark_started(&self) -> bool {
        if self
            .inner
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let _ = self.inner.status.compare_exchange(
            OperationStatus::None as u8,
            OperationStatus::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        true
    }

    fn execute<K>(&self, task: K)
    where
        K: OperationTask<T>,
    {
        if self.is_completed() {
            return;
        }
        if self.inner.token.is_cancelled() {
            self.cancel();
            return;
        }

        let token = self.inner.token.clone();
        match catch_panic(|| task.run(self, &token)) {
            Ok(Ok(value)) => {
                self.set_result(value);
            }
            Ok(Err(OperationError::Canceled)) => {
                self.cancel();
            }
            Ok(Err(error)) => {
                self.set_error(error);
            }
            Err(panic) => {
                self.set_error(OperationError::Panicked(panic));
            }
        }
    }

    /// Registers `callback` to run once the operation is terminal.
    ///
    /// If the operation is already terminal the callback runs right away on
    /// the calling thread. Otherwise it runs exactly once on a worker thread
    /// after the terminal transition. A panicking callback is logged and
    /// does not affect other callbacks.
    pub fn on_completed<F>(&self, callback: F)
    where
        F: FnOnce(&Operation<T>) + Send + 'static,
    {
        if self.is_completed() {
            run_continuation(Box::new(callback), self);
            return;
        }

        self.inner.continuations.push(Box::new(callback));
        // Pairs with the fence in `finish`: either we see the terminal status
        // here or the finishing thread sees our continuation.
        fence(Ordering::SeqCst);
        if self.is_completed() {
            self.dispatch_continuations();
        }
    }

    /// Blocks the calling thread until the operation is terminal.
    ///
    /// Never call this from a worker of the operation's own pool when every
    /// worker may be blocked the same way.
    pub fn wait(&self) -> Outcome<T>
    where
        T: Clone,
    {
        if !self.is_completed() {
            let (tx, rx) = crossbeam::channel::bounded(1);
            self.on_completed(move |_| {
                let _ = tx.send(());
            });
            let _ = rx.recv();
        }
        self.outcome()
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome<T>>
    where
        T: Clone,
    {
        if !self.is_completed() {
            let (tx, rx) = crossbeam::channel::bounded(1);
            self.on_completed(move |_| {
                let _ = tx.send(());
            });
            if rx.recv_timeout(timeout).is_err() && !self.is_completed() {
                return None;
            }
        }
        Some(self.outcome())
    }

    /// Suspends the calling task until the operation is terminal.
    pub async fn completion(&self) -> Outcome<T>
    where
        T: Clone,
    {
        if !self.is_completed() {
            let (tx, rx) = futures::channel::oneshot::channel();
            self.on_completed(move |_| {
                let _ = tx.send(());
            });
            let _ = rx.await;
        }
        self.outcome()
    }

    /// Releases the operation.
    ///
    /// A never-started operation is canceled first; a running one has its
    /// token signalled and its waiters released with a canceled outcome.
    /// Either way the status ends as `Disposed`.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        if !self.is_started() {
            self.inner.started.store(true, Ordering::Release);
            self.cancel();
        } else {
            self.inner.token.cancel();
        }

        if self.claim() {
            self.inner.canceled.store(true, Ordering::Release);
            self.freeze_progress();
            self.finish(OperationStatus::Disposed);
        } else {
            self.inner
                .status
                .fetch_max(OperationStatus::Disposed as u8, Ordering::SeqCst);
        }
    }

    fn outcome(&self) -> Outcome<T>
    where
        T: Clone,
    {
        if let Some(value) = self.inner.result.get() {
            Outcome::Completed(value.clone())
        } else if let Some(error) = self.inner.error.get() {
            Outcome::Failed(error.clone())
        } else {
            Outcome::Canceled
        }
    }

    fn claim(&self) -> bool {
        self.inner
            .settled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn freeze_progress(&self) {
        self.inner
            .progress
            .fetch_or(PROGRESS_FROZEN, Ordering::AcqRel);
    }

    fn finish(&self, status: OperationStatus) {
        // Status only ever moves forward, so a racing dispose cannot be undone.
        self.inner.status.fetch_max(status as u8, Ordering::SeqCst);
        fence(Ordering::SeqCst);
        self.dispatch_continuations();
    }

    fn dispatch_continuations(&self) {
        while let Some(continuation) = self.inner.continuations.pop() {
            let operation = self.clone();
            self.inner
                .pool
                .spawn(move || run_continuation(continuation, &operation));
        }
    }
}

impl<T: Send + Sync + 'static> Default for Operation<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("status", &self.status())
            .field("progress", &self.progress())
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

fn run_continuation<T>(continuation: Continuation<T>, operation: &Operation<T>) {
    if let Err(panic) = catch_panic(|| continuation(operation)) {
        warn!("⚠️ Operation continuation panicked: {}", panic);
    }
}

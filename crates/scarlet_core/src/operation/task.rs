//! Start strategies for operations.
//!
//! A task is whatever an operation runs when started: a closure, a
//! [`Loader`], or a retrying send. Each one receives the operation (to report
//! progress) and its cancellation token, and returns the value or an error.

use super::handle::Operation;
use crate::error::OperationError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Work executed by [`Operation::start`].
///
/// Returning `Err(OperationError::Canceled)` cancels the operation; any other
/// error fails it.
pub trait OperationTask<T>: Send + 'static {
    fn run(self, operation: &Operation<T>, token: &CancellationToken) -> Result<T, OperationError>;
}

impl<T, F> OperationTask<T> for F
where
    F: FnOnce(&Operation<T>, &CancellationToken) -> Result<T, OperationError> + Send + 'static,
{
    fn run(self, operation: &Operation<T>, token: &CancellationToken) -> Result<T, OperationError> {
        self(operation, token)
    }
}

/// Progress sink handed to a loader.
#[derive(Clone)]
pub struct ProgressReporter {
    report: Arc<dyn Fn(f32) + Send + Sync>,
}

impl ProgressReporter {
    pub fn new<F>(report: F) -> Self
    where
        F: Fn(f32) + Send + Sync + 'static,
    {
        Self {
            report: Arc::new(report),
        }
    }

    /// Reports progress in `[0, 1]`; out-of-range values are clamped by the receiver.
    pub fn report(&self, progress: f32) {
        (self.report)(progress)
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProgressReporter")
    }
}

/// A task built from a loader function.
///
/// The loader does the actual work (reading bytes, parsing, decoding) and
/// knows nothing about operations. Cancellation is checked again after the
/// loader returns, so a value produced after cancellation is discarded.
pub struct Loader<F> {
    loader: F,
}

impl<F> Loader<F> {
    pub fn new(loader: F) -> Self {
        Self { loader }
    }
}

impl<T, F> OperationTask<T> for Loader<F>
where
    T: Send + Sync + 'static,
    F: FnOnce(&ProgressReporter, &CancellationToken) -> Result<T, OperationError> + Send + 'static,
{
    fn run(self, operation: &Operation<T>, token: &CancellationToken) -> Result<T, OperationError> {
        let target = operation.clone();
        let reporter = ProgressReporter::new(move |progress| target.set_progress(progress));

        let value = (self.loader)(&reporter, token)?;
        if token.is_cancelled() {
            return Err(OperationError::Canceled);
        }
        Ok(value)
    }
}

impl<T: Send + Sync + 'static> Operation<T> {
    /// Starts `loader` on the shared worker pool and returns its operation.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use scarlet_core::Operation;
    ///
    /// let op = Operation::load(|progress, _token| {
    ///     progress.report(0.5);
    ///     Ok(String::from("level-1.map"))
    /// });
    /// assert_eq!(op.wait().into_result().unwrap(), "level-1.map");
    /// ```
    pub fn load<F>(loader: F) -> Self
    where
        F: FnOnce(&ProgressReporter, &CancellationToken) -> Result<T, OperationError>
            + Send
            + 'static,
    {
        let operation = Self::new();
        operation.start(Loader::new(loader));
        operation
    }
}

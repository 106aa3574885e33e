//! Retrying send operation.

use super::CoreMessage;
use crate::error::{OperationError, SendError};
use crate::operation::{Operation, OperationTask, Outcome};
use crate::types::SandboxId;
use crate::worker::WorkerPool;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Blocking delivery of a message to a target sandbox.
pub type SendAction<M> = Arc<dyn Fn(SandboxId, &M) -> Result<(), SendError> + Send + Sync>;

/// How often, and how far apart, a failed send is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts before giving up.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl RetryPolicy {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

#[derive(Debug, Default)]
struct RetryState {
    current_retry: AtomicU32,
    retrying: AtomicBool,
}

/// Task that sends one message, retrying failures with a fixed delay.
///
/// The delay is a blocking sleep on the worker running the task.
pub struct RetrySend<M> {
    target: SandboxId,
    message: M,
    send: SendAction<M>,
    policy: RetryPolicy,
    state: Arc<RetryState>,
}

impl<M: CoreMessage> RetrySend<M> {
    pub fn new<F>(target: SandboxId, message: M, send: F, policy: RetryPolicy) -> Self
    where
        F: Fn(SandboxId, &M) -> Result<(), SendError> + Send + Sync + 'static,
    {
        Self::with_action(target, message, Arc::new(send), policy)
    }

    /// Like [`new`](Self::new) but reuses a shared send action.
    pub fn with_action(target: SandboxId, message: M, send: SendAction<M>, policy: RetryPolicy) -> Self {
        Self {
            target,
            message,
            send,
            policy,
            state: Arc::new(RetryState::default()),
        }
    }
}

impl<M: CoreMessage> OperationTask<bool> for RetrySend<M> {
    fn run(self, operation: &Operation<bool>, token: &CancellationToken) -> Result<bool, OperationError> {
        let max = self.policy.max_retries.max(1);

        loop {
            if token.is_cancelled() {
                self.state.retrying.store(false, Ordering::Release);
                return Err(OperationError::Canceled);
            }

            match (self.send)(self.target, &self.message) {
                Ok(()) => {
                    self.state.retrying.store(false, Ordering::Release);
                    operation.set_progress(1.0);
                    debug!(
                        "📨 Sent {} to {} after {} retries",
                        self.message.message_type(),
                        self.target,
                        self.state.current_retry.load(Ordering::Acquire)
                    );
                    return Ok(true);
                }
                Err(error) => {
                    let attempts = self.state.current_retry.fetch_add(1, Ordering::AcqRel) + 1;
                    if attempts >= max {
                        self.state.retrying.store(false, Ordering::Release);
                        warn!(
                            "❌ Giving up on {} to {} after {} attempts: {}",
                            self.message.message_type(),
                            self.target,
                            attempts,
                            error
                        );
                        return Err(OperationError::RetryExhausted {
                            target: self.target,
                            attempts,
                            source: error,
                        });
                    }

                    self.state.retrying.store(true, Ordering::Release);
                    warn!(
                        "⚠️ Send of {} to {} failed (attempt {}/{}): {}",
                        self.message.message_type(),
                        self.target,
                        attempts,
                        max,
                        error
                    );
                    operation.set_progress(attempts as f32 / max as f32);
                    std::thread::sleep(self.policy.retry_delay());
                }
            }
        }
    }
}

/// Handle to a running [`RetrySend`].
///
/// # Examples
///
/// ```rust
/// use scarlet_core::*;
///
/// struct Ping;
///
/// impl CoreMessage for Ping {
///     fn message_type(&self) -> &str {
///         "ping"
///     }
/// }
///
/// let send = send_with_retry(
///     &WorkerPool::shared(),
///     SandboxId::new(),
///     Ping,
///     |_target, _msg: &Ping| Ok(()),
///     RetryPolicy::default(),
/// );
/// assert!(send.wait().into_result().unwrap());
/// assert_eq!(send.current_retry_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MessageOperation {
    operation: Operation<bool>,
    state: Arc<RetryState>,
}

impl MessageOperation {
    pub fn operation(&self) -> &Operation<bool> {
        &self.operation
    }

    /// Failed attempts so far.
    pub fn current_retry_count(&self) -> u32 {
        self.state.current_retry.load(Ordering::Acquire)
    }

    /// True while waiting to make another attempt.
    pub fn is_retrying(&self) -> bool {
        self.state.retrying.load(Ordering::Acquire)
    }

    pub fn cancel(&self) -> bool {
        self.operation.cancel()
    }

    pub fn wait(&self) -> Outcome<bool> {
        self.operation.wait()
    }

    pub async fn completion(&self) -> Outcome<bool> {
        self.operation.completion().await
    }
}

/// Starts sending `message` to `target` on `pool`, retrying per `policy`.
pub fn send_with_retry<M, F>(
    pool: &WorkerPool,
    target: SandboxId,
    message: M,
    send: F,
    policy: RetryPolicy,
) -> MessageOperation
where
    M: CoreMessage,
    F: Fn(SandboxId, &M) -> Result<(), SendError> + Send + Sync + 'static,
{
    let task = RetrySend::new(target, message, send, policy);
    let state = Arc::clone(&task.state);
    let operation = Operation::with_pool(pool.clone());
    operation.start(task);
    MessageOperation { operation, state }
}

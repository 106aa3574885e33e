//! Error types for every layer of the runtime.
//!
//! Errors that travel through an [`Operation`](crate::Operation) are `Clone`,
//! because an operation hands its error to every observer.

use crate::types::SandboxId;

/// Terminal failure of an operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OperationError {
    /// Cooperative cancellation observed by the task.
    #[error("operation was canceled")]
    Canceled,
    #[error("operation failed: {0}")]
    Failed(String),
    #[error("operation panicked: {0}")]
    Panicked(String),
    /// A send kept failing until the retry budget ran out.
    #[error("failed to send message to {target} after {attempts} attempts")]
    RetryExhausted {
        target: SandboxId,
        attempts: u32,
        #[source]
        source: SendError,
    },
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl OperationError {
    /// Shorthand for [`OperationError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Failure reported by a send action.
#[derive(Debug, Clone, thiserror::Error)]
#[error("send failed: {0}")]
pub struct SendError(pub String);

impl SendError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Failure inside a managed service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("service {service} failed to initialize: {reason}")]
    InitializationFailed { service: String, reason: String },
    #[error("service {service} failed to update: {reason}")]
    UpdateFailed { service: String, reason: String },
    #[error("service {service} failed to clean up: {reason}")]
    CleanupFailed { service: String, reason: String },
    #[error("service {0} is not available")]
    NotAvailable(String),
}

/// Contract violations and lifecycle errors of a [`Sandbox`](crate::Sandbox).
#[derive(Debug, Clone, thiserror::Error)]
pub enum SandboxError {
    #[error("update must be called from the main thread")]
    NotMainThread,
    #[error("service {service} belongs to sandbox {owner}, not {sandbox}")]
    ForeignOwner {
        service: &'static str,
        owner: SandboxId,
        sandbox: SandboxId,
    },
    #[error("service of type {0} is already registered")]
    AlreadyRegistered(&'static str),
    #[error("sandbox {0} is already initialized")]
    AlreadyInitialized(SandboxId),
    #[error("sandbox {0} has been disposed")]
    Disposed(SandboxId),
    #[error("worker pool could not be built: {0}")]
    WorkerPool(String),
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised while publishing or dispatching events.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EventError {
    /// The queue was full and the bus is configured to reject.
    #[error("event queue is full")]
    QueueFull,
    #[error("handler limit of {limit} reached for {event}")]
    HandlerLimit { event: &'static str, limit: usize },
    #[error("Handler execution error: {0}")]
    HandlerExecution(String),
}

/// Errors raised by a log sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink {0} is closed")]
    Closed(String),
    #[error("could not format record: {0}")]
    Format(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors returned by a [`ServiceProvider`](crate::ServiceProvider).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("service is not initialized")]
    NotInitialized,
    #[error("recursive initialization detected")]
    RecursiveInitialization,
    #[error("service initialization failed: {0}")]
    InitializationFailed(#[from] ServiceError),
}

/// Errors raised while loading or saving configuration files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

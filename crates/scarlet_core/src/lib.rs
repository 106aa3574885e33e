//! # Scarlet Core
//!
//! The concurrency substrate of the Scarlet game runtime. Worker threads
//! produce results and records in the background while a single designated
//! main thread drains queues, dispatches events and ticks every service.
//!
//! ## Core Features
//!
//! - **Operations**: single-assignment, lock-free [`Operation`] with progress,
//!   cooperative cancellation and exactly-once continuations
//! - **Ring Buffers**: power-of-two [`RingBuffer`] with monotonic cursors, the
//!   bounded queue behind every other component
//! - **Event Bus**: priority-ordered subscribers over a bounded event queue,
//!   drained a capped number of events per tick
//! - **Log Pipeline**: double-buffered records flushed by a background thread
//!   into pluggable sinks
//! - **Retrying Sends**: [`MessageOperation`] wraps a blocking send with bounded
//!   retries and a fixed backoff
//! - **Sandbox**: the composition root owning the service registry, the
//!   main-thread action queue and the tick loop
//!
//! ## Architecture Overview
//!
//! ```text
//!  worker threads                         main thread
//!  ──────────────                         ───────────
//!  Operation::start ──┐                ┌─► Sandbox::update
//!  EventBus::publish ─┼─► RingBuffer ──┤     ├─ main-thread actions (capped)
//!  Sandbox::enqueue ──┘                │     └─ Updatable services (EventBus, ...)
//!  Logger::log ─────────► LogPipeline ─┴─► background flush ─► sinks
//! ```
//!
//! ## Quick Start Example
//!
//! ```rust,no_run
//! use scarlet_core::*;
//!
//! #[derive(Debug)]
//! struct PlayerJoined {
//!     name: String,
//! }
//!
//! let sandbox = Sandbox::create_async(SandboxConfig::default())
//!     .wait()
//!     .into_result()
//!     .expect("sandbox failed to start");
//!
//! let bus = sandbox.event_bus().expect("event bus is a baseline service");
//! let greet = Handler::new(|event: &PlayerJoined| {
//!     println!("welcome, {}", event.name);
//!     Ok(())
//! });
//! bus.subscribe(&greet, EventPriority::NORMAL).unwrap();
//! bus.publish(PlayerJoined { name: "ayla".into() }).unwrap();
//!
//! sandbox.update().unwrap();
//! sandbox.dispose();
//! ```

pub mod collections;
pub mod error;
pub mod event_bus;
pub mod logging;
pub mod messaging;
pub mod operation;
pub mod sandbox;
pub mod service;
pub mod types;
pub mod utils;
pub mod worker;

pub use collections::RingBuffer;
pub use error::{
    ConfigError, EventError, OperationError, ProviderError, SandboxError, SendError, ServiceError,
    SinkError,
};
pub use event_bus::{
    BufferFullPolicy, EventBus, EventBusConfig, EventBusStats, EventPriority, GameEvent, Handler,
};
pub use logging::{
    ConsoleSink, FileSink, LogConfig, LogFilter, LogFormatter, LogLevel, LogPipeline,
    LogPipelineStats, LogRecord, LogSink, Logger, MemorySink, TracingLogger, TracingSink,
};
pub use messaging::{send_with_retry, CoreMessage, MessageOperation, RetryPolicy, RetrySend};
pub use operation::{
    Loader, Operation, OperationStatus, OperationTask, Outcome, ProgressReporter, ProgressTracker,
    DEFAULT_PROGRESS_INTERVAL,
};
pub use sandbox::{MainThreadAction, Sandbox, SandboxConfig};
pub use service::{Service, ServiceProvider, Updatable};
pub use types::SandboxId;
pub use worker::WorkerPool;

/// Re-exported so callers can build linked tokens without naming the crate.
pub use tokio_util::sync::CancellationToken;

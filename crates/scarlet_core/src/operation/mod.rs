//! Single-assignment asynchronous operations.
//!
//! An [`Operation`] is a handle to a value that will be produced later,
//! typically on a worker thread. It moves through
//! `None → Running → {Completed | Failed | Canceled}` (and may be marked
//! `Disposed` afterwards); the first terminal transition wins and every
//! later attempt is a no-op.
//!
//! ## Module Organization
//!
//! - [`status`] - lifecycle states and the final [`Outcome`]
//! - [`handle`] - the operation handle itself
//! - [`task`] - start strategies: closures, loaders and progress reporting
//! - [`extensions`] - result-specific callbacks and progress tracking

pub mod handle;
pub mod extensions;
pub mod status;
pub mod task;

pub use handle::Operation;
pub use extensions::{ProgressTracker, DEFAULT_PROGRESS_INTERVAL};
pub use status::{OperationStatus, Outcome};
pub use task::{Loader, OperationTask, ProgressReporter};

/// Two progress values closer than this are considered equal.
pub const PROGRESS_TOLERANCE: f32 = 1e-5;

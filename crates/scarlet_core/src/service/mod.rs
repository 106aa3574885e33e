//! Service contracts shared by everything a sandbox manages.

mod provider;

pub use provider::ServiceProvider;

use crate::error::ServiceError;
use crate::types::SandboxId;

/// A component owned and driven by a [`Sandbox`](crate::Sandbox).
///
/// All lifecycle methods have no-op defaults so simple services only need to
/// name their owner.
///
/// # Examples
///
/// ```rust
/// use scarlet_core::{SandboxId, Service, ServiceError, Updatable};
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// struct FrameCounter {
///     owner: SandboxId,
///     frames: AtomicU64,
/// }
///
/// impl Service for FrameCounter {
///     fn owner_id(&self) -> SandboxId {
///         self.owner
///     }
///
///     fn as_updatable(&self) -> Option<&dyn Updatable> {
///         Some(self)
///     }
/// }
///
/// impl Updatable for FrameCounter {
///     fn update(&self) -> Result<(), ServiceError> {
///         self.frames.fetch_add(1, Ordering::Relaxed);
///         Ok(())
///     }
/// }
/// ```
pub trait Service: Send + Sync + 'static {
    /// The sandbox this service belongs to.
    fn owner_id(&self) -> SandboxId;

    /// Name used in logs and errors.
    fn service_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn initialize(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    fn cleanup(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Returns the per-tick capability, if the service has one.
    fn as_updatable(&self) -> Option<&dyn Updatable> {
        None
    }
}

/// A service ticked once per sandbox update, always on the main thread.
pub trait Updatable: Send + Sync {
    fn update(&self) -> Result<(), ServiceError>;
}

//! The sandbox: composition root of the runtime.
//!
//! A [`Sandbox`] owns the service registry, the main-thread action queue and
//! the tick loop. The thread that constructs it becomes its main thread: only
//! that thread may call [`Sandbox::update`], and every queued main-thread
//! action and every service update runs there.
//!
//! ## Module Organization
//!
//! - [`config`] - [`SandboxConfig`] and its presets
//! - `registry` - type-keyed service storage
//! - `scheduling` - main-thread queue and the per-tick update
//! - `lifecycle` - initialization and disposal

pub mod config;
mod lifecycle;
mod registry;
mod scheduling;

pub use config::SandboxConfig;

use crate::collections::RingBuffer;
use crate::error::SandboxError;
use crate::event_bus::EventBus;
use crate::logging::{LogLevel, LogPipeline, Logger, TracingLogger};
use crate::service::Service;
use crate::types::SandboxId;
use crate::worker::WorkerPool;
use parking_lot::{Mutex, RwLock};
use registry::{RegisteredService, ServiceRegistry};
use std::any::TypeId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, info};

/// Work marshaled onto the main thread.
pub type MainThreadAction = Box<dyn FnOnce() + Send + 'static>;

/// Owner of services, the main-thread queue and the update loop.
///
/// # Examples
///
/// ```rust,no_run
/// use scarlet_core::{Sandbox, SandboxConfig};
///
/// let sandbox = Sandbox::new(SandboxConfig::default()).unwrap();
/// sandbox.initialize_async().wait().into_result().unwrap();
///
/// let handle = sandbox.clone();
/// std::thread::spawn(move || {
///     handle.enqueue_main_thread(|| println!("back on the main thread"));
/// })
/// .join()
/// .unwrap();
///
/// sandbox.update().unwrap();
/// sandbox.dispose();
/// ```
pub struct Sandbox {
    id: SandboxId,
    config: SandboxConfig,
    main_thread: ThreadId,
    workers: WorkerPool,
    registry: Mutex<ServiceRegistry>,
    main_thread_actions: RingBuffer<MainThreadAction>,
    logger: RwLock<Arc<dyn Logger>>,
    initializing: AtomicBool,
    initialized: AtomicBool,
    disposed: AtomicBool,
}

impl Sandbox {
    /// Creates a sandbox whose main thread is the calling thread.
    pub fn new(config: SandboxConfig) -> Result<Arc<Self>, SandboxError> {
        let workers = match config.worker_threads {
            Some(threads) => WorkerPool::new(threads)?,
            None => WorkerPool::shared(),
        };
        Ok(Self::with_workers(config, workers))
    }

    /// Creates a sandbox that runs its asynchronous work on `workers`.
    pub fn with_workers(config: SandboxConfig, workers: WorkerPool) -> Arc<Self> {
        let sandbox = Arc::new(Self {
            id: SandboxId::new(),
            main_thread: thread::current().id(),
            workers,
            registry: Mutex::new(ServiceRegistry::default()),
            main_thread_actions: RingBuffer::new(config.action_buffer_size),
            logger: RwLock::new(Arc::new(TracingLogger)),
            initializing: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            config,
        });

        info!("🏗️ Sandbox {} created", sandbox.id);
        sandbox
    }

    pub fn id(&self) -> SandboxId {
        self.id
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    pub fn is_main_thread(&self) -> bool {
        thread::current().id() == self.main_thread
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// The logging service, or a `tracing` forwarder before it exists.
    pub fn logger(&self) -> Arc<dyn Logger> {
        Arc::clone(&self.logger.read())
    }

    pub fn event_bus(&self) -> Option<Arc<EventBus>> {
        self.get_service::<EventBus>()
    }

    pub fn log_pipeline(&self) -> Option<Arc<LogPipeline>> {
        self.get_service::<LogPipeline>()
    }

    /// The registered service of type `T`.
    pub fn get_service<T: Service>(&self) -> Option<Arc<T>> {
        self.registry.lock().get::<T>()
    }

    pub fn service_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Adds `service` to the registry.
    ///
    /// The service must name this sandbox as its owner and its type must not
    /// be registered yet. When the sandbox is already initialized, the
    /// service's `initialize` is queued for the main thread.
    pub fn register_service<T: Service>(&self, service: Arc<T>) -> Result<(), SandboxError> {
        if self.is_disposed() {
            return Err(SandboxError::Disposed(self.id));
        }
        if service.owner_id() != self.id {
            return Err(SandboxError::ForeignOwner {
                service: std::any::type_name::<T>(),
                owner: service.owner_id(),
                sandbox: self.id,
            });
        }

        {
            let mut registry = self.registry.lock();
            if registry.contains(TypeId::of::<T>()) {
                return Err(SandboxError::AlreadyRegistered(std::any::type_name::<T>()));
            }
            registry.push(RegisteredService::new(Arc::clone(&service)));
        }
        debug!("📦 Registered {} in sandbox {}", service.service_name(), self.id);

        if self.is_initialized() {
            let logger = self.logger();
            self.enqueue_main_thread(move || {
                if let Err(e) = service.initialize() {
                    logger.error(&format!(
                        "Late initialization of {} failed: {}",
                        service.service_name(),
                        e
                    ));
                }
            });
        }
        Ok(())
    }

    /// Logs through the sandbox logger.
    pub(crate) fn report(&self, level: LogLevel, message: &str) {
        self.logger().log(level, message);
    }

    pub(crate) fn set_logger(&self, logger: Arc<dyn Logger>) {
        *self.logger.write() = logger;
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("id", &self.id)
            .field("services", &self.service_count())
            .field("pending_actions", &self.main_thread_actions.len())
            .field("initialized", &self.is_initialized())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

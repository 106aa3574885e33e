//! Lazily initialized access point for a single service instance.

use super::Service;
use crate::error::ProviderError;
use crate::utils::catch_panic;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, error, warn};

type InitCallback<S> = Arc<dyn Fn(&Arc<S>) + Send + Sync>;
type ResetCallback = Arc<dyn Fn() + Send + Sync>;

struct Installed<S: ?Sized, C> {
    instance: Arc<S>,
    config: Option<Arc<C>>,
}

/// Holds one initialized service plus its optional configuration.
///
/// The provider is an explicit context object: create one, share it, and
/// initialize it once. Callbacks registered before initialization fire when
/// it happens; callbacks registered afterwards fire immediately. A service
/// whose `initialize` reenters the same provider is reported as
/// [`ProviderError::RecursiveInitialization`] instead of deadlocking.
pub struct ServiceProvider<S: Service + ?Sized, C = ()> {
    installed: RwLock<Option<Installed<S, C>>>,
    init_lock: Mutex<()>,
    initializing_thread: Mutex<Option<ThreadId>>,
    on_initialized: Mutex<Vec<InitCallback<S>>>,
    on_reset: Mutex<Vec<ResetCallback>>,
}

impl<S: Service + ?Sized, C: Send + Sync + 'static> ServiceProvider<S, C> {
    pub fn new() -> Self {
        Self {
            installed: RwLock::new(None),
            init_lock: Mutex::new(()),
            initializing_thread: Mutex::new(None),
            on_initialized: Mutex::new(Vec::new()),
            on_reset: Mutex::new(Vec::new()),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.installed.read().is_some()
    }

    /// The installed service.
    pub fn get(&self) -> Result<Arc<S>, ProviderError> {
        self.installed
            .read()
            .as_ref()
            .map(|installed| Arc::clone(&installed.instance))
            .ok_or(ProviderError::NotInitialized)
    }

    /// The configuration passed at initialization, if any.
    pub fn config(&self) -> Option<Arc<C>> {
        self.installed
            .read()
            .as_ref()
            .and_then(|installed| installed.config.clone())
    }

    /// Initializes `service` and installs it.
    ///
    /// Returns the already installed instance when called again.
    pub fn initialize(&self, service: Arc<S>, config: Option<C>) -> Result<Arc<S>, ProviderError> {
        if let Ok(existing) = self.get() {
            return Ok(existing);
        }

        let current = thread::current().id();
        if *self.initializing_thread.lock() == Some(current) {
            warn!("⚠️ Recursive initialization of {}", service.service_name());
            return Err(ProviderError::RecursiveInitialization);
        }

        let _init = self.init_lock.lock();
        if let Ok(existing) = self.get() {
            return Ok(existing);
        }

        *self.initializing_thread.lock() = Some(current);
        let initialized = service.initialize();
        *self.initializing_thread.lock() = None;

        if let Err(e) = initialized {
            error!("❌ {} failed to initialize: {}", service.service_name(), e);
            return Err(e.into());
        }

        *self.installed.write() = Some(Installed {
            instance: Arc::clone(&service),
            config: config.map(Arc::new),
        });
        debug!("✅ {} installed", service.service_name());

        let callbacks = self.on_initialized.lock().clone();
        for callback in callbacks {
            if let Err(panic) = catch_panic(|| callback(&service)) {
                warn!("⚠️ Initialization callback panicked: {}", panic);
            }
        }
        Ok(service)
    }

    /// Cleans up and removes the installed service, then runs reset callbacks.
    pub fn reset(&self) {
        let current = thread::current().id();
        if *self.initializing_thread.lock() == Some(current) {
            warn!("⚠️ Reset requested during initialization; ignored");
            return;
        }

        let _init = self.init_lock.lock();
        let Some(installed) = self.installed.write().take() else {
            return;
        };

        if let Err(e) = installed.instance.cleanup() {
            error!("❌ {} failed to clean up: {}", installed.instance.service_name(), e);
        }

        let callbacks = self.on_reset.lock().clone();
        for callback in callbacks {
            if let Err(panic) = catch_panic(|| callback()) {
                warn!("⚠️ Reset callback panicked: {}", panic);
            }
        }
    }

    /// Runs `callback` once the service is installed, or right away if it already is.
    pub fn register_initialization_callback<F>(&self, callback: F)
    where
        F: Fn(&Arc<S>) + Send + Sync + 'static,
    {
        let callback: InitCallback<S> = Arc::new(callback);
        self.on_initialized.lock().push(Arc::clone(&callback));

        if let Ok(instance) = self.get() {
            if let Err(panic) = catch_panic(|| callback(&instance)) {
                warn!("⚠️ Initialization callback panicked: {}", panic);
            }
        }
    }

    /// Runs `callback` after every reset.
    pub fn register_reset_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_reset.lock().push(Arc::new(callback));
    }
}

impl<S: Service + ?Sized, C: Send + Sync + 'static> Default for ServiceProvider<S, C> {
    fn default() -> Self {
        Self::new()
    }
}

use super::registry::RegisteredService;
use super::{Sandbox, SandboxConfig};
use crate::error::{OperationError, SandboxError, ServiceError};
use crate::event_bus::EventBus;
use crate::logging::{LogLevel, LogPipeline, Logger, TracingLogger};
use crate::operation::Operation;
use crate::utils::catch_panic;
use std::any::TypeId;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};

impl Sandbox {
    /// Builds and initializes a sandbox in one step.
    ///
    /// The calling thread becomes the sandbox's main thread.
    pub fn create_async(config: SandboxConfig) -> Operation<Arc<Sandbox>> {
        let sandbox = match Sandbox::new(config) {
            Ok(sandbox) => sandbox,
            Err(e) => return Operation::from_error(e.into()),
        };

        let created = Operation::with_pool(sandbox.workers.clone());
        let initialization = sandbox.initialize_async();
        let target = created.clone();
        initialization.on_completed(move |initialization| {
            if let Some(error) = initialization.error() {
                target.set_error(error.clone());
            } else if initialization.is_canceled() {
                target.cancel();
            } else {
                target.set_result(sandbox);
            }
        });
        created
    }

    /// Registers the baseline services, then initializes every service in
    /// registration order.
    ///
    /// Initialization runs on the calling thread, so the returned operation
    /// is already terminal. Progress advances by `1 / n` per service; the
    /// first failure fails the operation and leaves the services before it
    /// initialized. Only the first call does anything; later calls return
    /// a failed operation.
    pub fn initialize_async(&self) -> Operation<bool> {
        let operation = Operation::with_pool(self.workers.clone());

        if self.is_disposed() {
            operation.set_error(SandboxError::Disposed(self.id).into());
            return operation;
        }
        if self
            .initializing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            operation.set_error(SandboxError::AlreadyInitialized(self.id).into());
            return operation;
        }

        if let Err(e) = self.register_baseline_services() {
            error!("❌ Sandbox {} could not create baseline services: {}", self.id, e);
            operation.set_error(e);
            return operation;
        }

        let services = self.registry.lock().snapshot();
        let total = services.len().max(1) as f32;
        for (index, service) in services.iter().enumerate() {
            let result = catch_panic(|| service.initialize()).unwrap_or_else(|panic| {
                Err(ServiceError::InitializationFailed {
                    service: service.service_name().to_string(),
                    reason: format!("panicked: {panic}"),
                })
            });

            if let Err(e) = result {
                self.report(
                    LogLevel::Error,
                    &format!("Failed to initialize {}: {}", service.service_name(), e),
                );
                operation.set_error(OperationError::Service(e));
                return operation;
            }
            operation.set_progress((index + 1) as f32 / total);
        }

        self.initialized.store(true, Ordering::Release);
        self.report(
            LogLevel::Info,
            &format!("Sandbox {} initialized with {} services", self.id, services.len()),
        );
        operation.set_result(true);
        operation
    }

    /// Puts the log pipeline and the event bus at the front of the registry,
    /// so they are initialized first and torn down last.
    ///
    /// A baseline type that is already registered is left as it is.
    fn register_baseline_services(&self) -> Result<(), OperationError> {
        let mut slot = 0;

        let pipeline = match self.get_service::<LogPipeline>() {
            Some(existing) => existing,
            None => {
                let pipeline = LogPipeline::from_config(self.id, self.config.log.clone())
                    .map_err(|e| ServiceError::InitializationFailed {
                        service: "LogPipeline".to_string(),
                        reason: e.to_string(),
                    })?;
                let pipeline = Arc::new(pipeline);
                self.install(slot, Arc::clone(&pipeline));
                slot += 1;
                pipeline
            }
        };
        self.set_logger(pipeline as Arc<dyn Logger>);

        if self.get_service::<EventBus>().is_none() {
            let bus = EventBus::with_logger(self.id, self.config.event_bus.clone(), self.logger());
            self.install(slot, Arc::new(bus));
        }
        Ok(())
    }

    fn install<T: crate::service::Service>(&self, index: usize, service: Arc<T>) {
        let mut registry = self.registry.lock();
        if !registry.contains(TypeId::of::<T>()) {
            registry.insert(index, RegisteredService::new(service));
        }
    }

    /// Cleans up every service in reverse registration order and empties the
    /// registry. Safe to call more than once.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let entries = self.registry.lock().drain();
        for entry in entries.iter().rev() {
            let result = catch_panic(|| entry.service.cleanup());
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self.report(
                    LogLevel::Error,
                    &format!("Error cleaning up {}: {}", entry.type_name, e),
                ),
                Err(panic) => self.report(
                    LogLevel::Error,
                    &format!("{} panicked during cleanup: {}", entry.type_name, panic),
                ),
            }
        }
        drop(entries);

        self.set_logger(Arc::new(TracingLogger));
        let discarded = self.main_thread_actions.clear();
        if discarded > 0 {
            warn!("⚠️ Sandbox {} discarded {} pending actions", self.id, discarded);
        }
        info!("🛑 Sandbox {} disposed", self.id);
    }
}

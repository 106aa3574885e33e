use super::{MainThreadAction, Sandbox};
use crate::error::SandboxError;
use crate::logging::LogLevel;
use crate::utils::catch_panic;
use tracing::warn;

impl Sandbox {
    /// Runs `action` on the main thread.
    ///
    /// On the main thread the action runs immediately. Elsewhere it is
    /// queued for the next [`update`](Self::update); when the queue is full
    /// the action is dropped with a warning and `false` is returned.
    pub fn enqueue_main_thread<F>(&self, action: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_main_thread() {
            self.run_action(Box::new(action));
            return true;
        }

        if self.main_thread_actions.try_enqueue(Box::new(action)).is_err() {
            warn!(
                "⚠️ Main-thread queue of sandbox {} is full ({} actions), dropping action",
                self.id,
                self.main_thread_actions.capacity()
            );
            return false;
        }
        true
    }

    /// Actions waiting for the next update.
    pub fn pending_main_thread_actions(&self) -> usize {
        self.main_thread_actions.len()
    }

    /// Runs one tick: queued main-thread actions, then every updatable service.
    ///
    /// Fails with [`SandboxError::NotMainThread`] on any other thread and does
    /// nothing once the sandbox is disposed. Failures inside actions and
    /// services are logged and never abort the tick.
    pub fn update(&self) -> Result<(), SandboxError> {
        if !self.is_main_thread() {
            return Err(SandboxError::NotMainThread);
        }
        if self.is_disposed() {
            return Ok(());
        }

        self.process_main_thread_actions();
        self.update_services();
        Ok(())
    }

    fn process_main_thread_actions(&self) -> usize {
        let mut processed = 0;
        while processed < self.config.max_actions_per_update {
            let Some(action) = self.main_thread_actions.try_dequeue() else {
                break;
            };
            self.run_action(action);
            processed += 1;
        }
        processed
    }

    fn run_action(&self, action: MainThreadAction) {
        if let Err(panic) = catch_panic(action) {
            self.report(
                LogLevel::Error,
                &format!("Main-thread action panicked: {panic}"),
            );
        }
    }

    fn update_services(&self) {
        let services = self.registry.lock().snapshot();
        for service in services {
            let Some(updatable) = service.as_updatable() else {
                continue;
            };
            match catch_panic(|| updatable.update()) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self.report(
                    LogLevel::Error,
                    &format!("Error updating {}: {}", service.service_name(), e),
                ),
                Err(panic) => self.report(
                    LogLevel::Error,
                    &format!("{} panicked during update: {}", service.service_name(), panic),
                ),
            }
        }
    }
}

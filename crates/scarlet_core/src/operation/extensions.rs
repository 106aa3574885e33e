//! Outcome-specific callbacks and progress tracking.

use super::handle::Operation;
use super::PROGRESS_TOLERANCE;
use crate::error::OperationError;
use crate::utils::catch_panic;
use crossbeam::channel::{self, Sender};
use std::time::Duration;
use tracing::warn;

/// Default polling period of [`Operation::on_progress`], one frame at 60 Hz.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(16);

impl<T: Send + Sync + 'static> Operation<T> {
    /// Runs `callback` on a worker with the result if the operation completes.
    pub fn on_success<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.on_completed(move |operation| {
            if operation.result().is_none() {
                return;
            }
            let target = operation.clone();
            operation.pool().spawn(move || {
                if let Some(value) = target.result() {
                    guarded("on_success", || callback(value));
                }
            });
        });
        self
    }

    /// Runs `callback` on a worker with the error if the operation fails.
    pub fn on_error<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&OperationError) + Send + 'static,
    {
        self.on_completed(move |operation| {
            if operation.error().is_none() {
                return;
            }
            let target = operation.clone();
            operation.pool().spawn(move || {
                if let Some(error) = target.error() {
                    guarded("on_error", || callback(error));
                }
            });
        });
        self
    }

    /// Runs `callback` on a worker if the operation is canceled.
    pub fn on_canceled<F>(&self, callback: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_completed(move |operation| {
            if operation.is_canceled() {
                operation.pool().spawn(move || guarded("on_canceled", callback));
            }
        });
        self
    }

    /// Polls progress every `interval` and reports changes to `callback`.
    ///
    /// The tracker runs on its own thread, calls `callback` whenever progress
    /// moved by more than the tolerance, and stops by itself once the
    /// operation is terminal, after one last report if needed.
    pub fn on_progress<F>(&self, callback: F, interval: Duration) -> ProgressTracker
    where
        F: Fn(f32) + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let tracker = ProgressTracker { stop: stop_tx };

        let operation = self.clone();
        let spawned = std::thread::Builder::new()
            .name("scarlet-progress".to_string())
            .spawn(move || {
                let ticker = channel::tick(interval);
                let mut last = operation.progress();
                report(&callback, last);

                loop {
                    channel::select! {
                        recv(ticker) -> _ => {}
                        recv(stop_rx) -> _ => break,
                    }

                    let current = operation.progress();
                    if (current - last).abs() > PROGRESS_TOLERANCE {
                        last = current;
                        report(&callback, current);
                    }
                    if operation.is_completed() {
                        break;
                    }
                }
            });

        if let Err(e) = spawned {
            warn!("⚠️ Could not start progress tracker: {}", e);
        }
        tracker
    }
}

fn guarded(kind: &str, callback: impl FnOnce()) {
    if let Err(panic) = catch_panic(callback) {
        warn!("⚠️ Operation {} callback panicked: {}", kind, panic);
    }
}

fn report<F: Fn(f32)>(callback: &F, progress: f32) {
    if let Err(panic) = catch_panic(|| callback(progress)) {
        warn!("⚠️ Progress callback panicked: {}", panic);
    }
}

/// Handle to a running progress tracker.
#[derive(Debug)]
pub struct ProgressTracker {
    stop: Sender<()>,
}

impl ProgressTracker {
    /// Stops tracking before the operation finishes.
    pub fn stop(&self) {
        let _ = self.stop.try_send(());
    }
}

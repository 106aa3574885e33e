//! The runtime host: builds a sandbox, wires demo services and drives ticks.

use crate::config::AppConfig;
use crate::signals::shutdown_signal;
use anyhow::Context;
use scarlet_core::{
    send_with_retry, CoreMessage, EventBus, EventPriority, Handler, Logger,
    Operation, OperationError, RetryPolicy, Sandbox, SandboxId, SendError, Service,
    ServiceError, Updatable, DEFAULT_PROGRESS_INTERVAL,
};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Published by [`HeartbeatService`] every few ticks.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    pub tick: u64,
}

/// Published on the main thread once the asset warm-up finishes.
#[derive(Debug, Clone)]
pub struct AssetsReady {
    pub bytes: usize,
}

/// Counts ticks and publishes a [`Heartbeat`] every `every` ticks.
pub struct HeartbeatService {
    owner: SandboxId,
    bus: Arc<EventBus>,
    every: u64,
    ticks: AtomicU64,
}

impl HeartbeatService {
    pub fn new(owner: SandboxId, bus: Arc<EventBus>, every: u64) -> Self {
        Self {
            owner,
            bus,
            every: every.max(1),
            ticks: AtomicU64::new(0),
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl Service for HeartbeatService {
    fn owner_id(&self) -> SandboxId {
        self.owner
    }

    fn service_name(&self) -> &'static str {
        "Heartbeat"
    }

    fn as_updatable(&self) -> Option<&dyn Updatable> {
        Some(self)
    }
}

impl Updatable for HeartbeatService {
    fn update(&self) -> Result<(), ServiceError> {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if tick % self.every != 0 {
            return Ok(());
        }
        self.bus
            .publish(Heartbeat { tick })
            .map(|_| ())
            .map_err(|e| ServiceError::UpdateFailed {
                service: "Heartbeat".to_string(),
                reason: e.to_string(),
            })
    }
}

/// Final statistics shipped to the telemetry endpoint on shutdown.
#[derive(Debug, Clone)]
struct SessionReport {
    ticks: u64,
    events: u64,
}

impl CoreMessage for SessionReport {
    fn message_type(&self) -> &str {
        "session_report"
    }
}

pub struct Application {
    config: AppConfig,
    sandbox: Arc<Sandbox>,
    heartbeat: Arc<HeartbeatService>,
    warm_up: Operation<usize>,
}

impl Application {
    /// Creates and initializes the sandbox on the calling thread.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let sandbox = Sandbox::new(config.sandbox.clone())?;
        sandbox
            .initialize_async()
            .wait()
            .into_result()
            .context("sandbox initialization failed")?;

        let bus = sandbox.event_bus().context("sandbox has no event bus")?;
        let heartbeat = Arc::new(HeartbeatService::new(
            sandbox.id(),
            Arc::clone(&bus),
            config.runtime.heartbeat_every,
        ));
        sandbox.register_service(Arc::clone(&heartbeat))?;

        let logger = sandbox.logger();
        bus.subscribe(
            &Handler::named("heartbeat-log", {
                let logger = Arc::clone(&logger);
                move |beat: &Heartbeat| {
                    logger.debug(&format!("Heartbeat at tick {}", beat.tick));
                    Ok(())
                }
            }),
            EventPriority::LOW,
        )?;
        bus.subscribe(
            &Handler::named("assets-ready", {
                let logger = Arc::clone(&logger);
                move |ready: &AssetsReady| {
                    logger.info(&format!("Assets ready ({} bytes)", ready.bytes));
                    Ok(())
                }
            }),
            EventPriority::HIGH,
        )?;

        let warm_up = Self::start_warm_up(&sandbox, &bus);
        info!("🏗️ Runtime host ready with {} services", sandbox.service_count());

        Ok(Self {
            config,
            sandbox,
            heartbeat,
            warm_up,
        })
    }

    /// Loads assets on the worker pool and hands the result to the main thread.
    fn start_warm_up(sandbox: &Arc<Sandbox>, bus: &Arc<EventBus>) -> Operation<usize> {
        const CHUNKS: usize = 8;

        let operation = Operation::load(|progress, token| {
            let mut bytes = 0;
            for chunk in 0..CHUNKS {
                if token.is_cancelled() {
                    return Err(OperationError::Canceled);
                }
                std::thread::sleep(Duration::from_millis(25));
                bytes += 4096 * (chunk + 1);
                progress.report((chunk + 1) as f32 / CHUNKS as f32);
            }
            Ok(bytes)
        });

        let logger = sandbox.logger();
        // The tracker stops by itself once the load is terminal.
        let _tracker = operation.on_progress(
            move |progress| logger.trace(&format!("Warm-up {:.0}%", progress * 100.0)),
            DEFAULT_PROGRESS_INTERVAL,
        );

        let main = Arc::clone(sandbox);
        let bus = Arc::clone(bus);
        operation.on_success(move |bytes| {
            let bytes = *bytes;
            main.enqueue_main_thread(move || {
                if let Err(e) = bus.publish(AssetsReady { bytes }) {
                    warn!("⚠️ Could not announce warm-up result: {}", e);
                }
            });
        });
        operation.on_error(|e| warn!("⚠️ Asset warm-up failed: {}", e));
        operation
    }

    /// Ticks the sandbox until a signal arrives or the tick budget is spent.
    pub async fn run(self, max_ticks: Option<u64>) -> anyhow::Result<()> {
        let period = Duration::from_millis(self.config.runtime.tick_interval_ms);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "✅ Sandbox {} running every {}ms",
            self.sandbox.id(),
            self.config.runtime.tick_interval_ms
        );

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        let mut ticks = 0u64;
        loop {
            tokio::select! {
                result = &mut shutdown => {
                    result?;
                    info!("🛑 Shutdown signal received after {} ticks", ticks);
                    break;
                }
                _ = interval.tick() => {
                    self.sandbox.update()?;
                    ticks += 1;
                    if max_ticks.is_some_and(|limit| ticks >= limit) {
                        info!("🏁 Tick budget of {} reached", ticks);
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(self) {
        self.warm_up.cancel();

        let events = self
            .sandbox
            .event_bus()
            .map(|bus| bus.stats().dispatched)
            .unwrap_or_default();
        let report = SessionReport {
            ticks: self.heartbeat.ticks(),
            events,
        };

        let logger = self.sandbox.logger();
        let attempts = Arc::new(AtomicU32::new(0));
        let delivery = send_with_retry(
            self.sandbox.workers(),
            self.sandbox.id(),
            report,
            move |_target, report: &SessionReport| {
                if attempts.fetch_add(1, Ordering::Relaxed) == 0 {
                    return Err(SendError::new("telemetry endpoint warming up"));
                }
                logger.info(&format!(
                    "Session report: {} ticks, {} events dispatched",
                    report.ticks, report.events
                ));
                Ok(())
            },
            RetryPolicy::default(),
        );

        match delivery.completion().await.into_result() {
            Ok(_) => info!(
                "📨 Session report delivered after {} retries",
                delivery.current_retry_count()
            ),
            Err(e) => warn!("⚠️ Session report not delivered: {}", e),
        }

        if let Some(pipeline) = self.sandbox.log_pipeline() {
            let stats = pipeline.stats();
            info!(
                "📊 Log pipeline: {} accepted, {} written, {} dropped",
                stats.accepted, stats.written, stats.dropped
            );
        }

        self.sandbox.dispose();
        info!("👋 Runtime host stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scarlet_core::SandboxConfig;

    fn quiet_sandbox() -> Arc<Sandbox> {
        let mut config = SandboxConfig::minimal();
        config.log.console_output = false;
        let sandbox = Sandbox::new(config).unwrap();
        sandbox.initialize_async().wait().into_result().unwrap();
        sandbox
    }

    #[test]
    fn test_heartbeat_publishes_on_schedule() {
        let sandbox = quiet_sandbox();
        let bus = sandbox.event_bus().unwrap();
        let service = Arc::new(HeartbeatService::new(sandbox.id(), Arc::clone(&bus), 3));
        sandbox.register_service(Arc::clone(&service)).unwrap();

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(
            &Handler::new(move |beat: &Heartbeat| {
                sink.lock().push(beat.tick);
                Ok(())
            }),
            EventPriority::NORMAL,
        )
        .unwrap();

        for _ in 0..6 {
            sandbox.update().unwrap();
        }
        assert_eq!(service.ticks(), 6);
        // A heartbeat published during a tick is dispatched on the next one.
        assert_eq!(*seen.lock(), vec![3]);
        sandbox.update().unwrap();
        assert_eq!(*seen.lock(), vec![3, 6]);
        sandbox.dispose();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_run_stops_after_tick_budget() {
        let mut config = AppConfig::default();
        config.runtime.tick_interval_ms = 1;
        config.runtime.heartbeat_every = 2;
        config.sandbox = SandboxConfig::minimal();
        config.sandbox.log.console_output = false;

        let app = Application::new(config).unwrap();
        let heartbeat = Arc::clone(&app.heartbeat);
        let sandbox = Arc::clone(&app.sandbox);

        app.run(Some(5)).await.unwrap();
        assert_eq!(heartbeat.ticks(), 5);
        assert!(sandbox.is_disposed());
    }
}

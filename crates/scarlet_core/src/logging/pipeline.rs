//! Double-buffered asynchronous log pipeline.
//!
//! Producers append to whichever of the two ring buffers is active. The drain
//! side flips the active index and empties the buffer it just retired into
//! every sink, so producers never wait on sink I/O.

use super::config::LogConfig;
use super::format::LogFormatter;
use super::level::LogLevel;
use super::logger::{format_error_chain, Logger};
use super::record::LogRecord;
use super::sinks::{ConsoleSink, FileSink, LogSink};
use crate::collections::RingBuffer;
use crate::error::{ServiceError, SinkError};
use crate::service::Service;
use crate::types::SandboxId;
use crate::utils::catch_panic;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Counters describing what the pipeline did with submitted records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogPipelineStats {
    /// Records buffered for delivery.
    pub accepted: u64,
    /// Records rejected by level or custom filter.
    pub filtered: u64,
    /// Records lost because the active buffer was full or the pipeline closed.
    pub dropped: u64,
    /// Records at least one sink accepted.
    pub written: u64,
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    filtered: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
}

struct PipelineShared {
    config: LogConfig,
    sinks: Vec<Arc<dyn LogSink>>,
    buffers: [RingBuffer<LogRecord>; 2],
    active: AtomicUsize,
    in_flight: AtomicUsize,
    drain_lock: Mutex<()>,
    signal: Sender<()>,
    closed: AtomicBool,
    counters: Counters,
}

impl PipelineShared {
    /// Retires the active buffer and writes its records to every sink.
    fn swap_and_drain(&self) -> usize {
        let _guard = self.drain_lock.lock();
        let retired = self.active.fetch_add(1, Ordering::AcqRel) & 1;
        self.drain(&self.buffers[retired])
    }

    /// Drains both buffers, oldest first.
    fn drain_all(&self) -> usize {
        let _guard = self.drain_lock.lock();
        let retired = self.active.fetch_add(1, Ordering::AcqRel) & 1;
        let mut written = self.drain(&self.buffers[retired]);
        written += self.drain(&self.buffers[retired ^ 1]);
        written
    }

    /// Empties `buffer` into the sinks and returns how many records left it.
    fn drain(&self, buffer: &RingBuffer<LogRecord>) -> usize {
        let mut drained = 0;
        let mut written = 0u64;
        while let Some(record) = buffer.try_dequeue() {
            let mut delivered = false;
            for sink in &self.sinks {
                match catch_panic(|| sink.append(&record)) {
                    Ok(Ok(())) => delivered = true,
                    Ok(Err(e)) => error!("Log sink '{}' failed: {}", sink.name(), e),
                    Err(panic) => error!("Log sink '{}' panicked: {}", sink.name(), panic),
                }
            }
            drained += 1;
            if delivered {
                written += 1;
            }
        }

        if drained > 0 {
            let _ = self
                .in_flight
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    Some(current.saturating_sub(drained))
                });
            self.counters.written.fetch_add(written, Ordering::Relaxed);
        }
        drained
    }

    fn flush_sinks(&self) {
        for sink in &self.sinks {
            if let Err(e) = sink.flush() {
                error!("Log sink '{}' failed to flush: {}", sink.name(), e);
            }
        }
    }
}

/// The asynchronous, double-buffered logger service.
///
/// # Examples
///
/// ```rust
/// use scarlet_core::*;
/// use std::sync::Arc;
///
/// let memory = Arc::new(MemorySink::new(LogFormatter::default()));
/// let pipeline = LogPipeline::new(
///     SandboxId::new(),
///     LogConfig::default(),
///     vec![memory.clone() as Arc<dyn LogSink>],
/// );
///
/// pipeline.info("server ready");
/// pipeline.shutdown();
/// assert_eq!(memory.len(), 1);
/// ```
pub struct LogPipeline {
    owner: SandboxId,
    shared: Arc<PipelineShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    threaded: bool,
}

impl LogPipeline {
    /// Creates a pipeline writing to `sinks`, starting the background drain
    /// thread when asynchronous logging is enabled.
    pub fn new(owner: SandboxId, config: LogConfig, sinks: Vec<Arc<dyn LogSink>>) -> Self {
        if let Err(e) = config.validate() {
            warn!("⚠️ Log pipeline for {} started with {}", owner, e);
        }
        let capacity = config.max_queue_size;
        let (signal, wake) = channel::bounded(1);
        let shared = Arc::new(PipelineShared {
            buffers: [RingBuffer::new(capacity), RingBuffer::new(capacity)],
            active: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            drain_lock: Mutex::new(()),
            signal,
            closed: AtomicBool::new(false),
            counters: Counters::default(),
            sinks,
            config,
        });

        let worker = if shared.config.enable_async_logging {
            Self::spawn_worker(Arc::clone(&shared), wake)
        } else {
            None
        };

        debug!(
            "📜 Log pipeline ready ({} sinks, async: {})",
            shared.sinks.len(),
            worker.is_some()
        );

        Self {
            owner,
            shared,
            threaded: worker.is_some(),
            worker: Mutex::new(worker),
        }
    }

    /// Creates a pipeline with the sinks described by `config`: the console
    /// when `console_output` is set and a file when `file_path` is set.
    pub fn from_config(owner: SandboxId, config: LogConfig) -> Result<Self, SinkError> {
        config.validate()?;
        let formatter = LogFormatter::new(&config);
        let mut sinks: Vec<Arc<dyn LogSink>> = Vec::new();

        if config.console_output {
            sinks.push(Arc::new(ConsoleSink::new(
                formatter.clone(),
                config.colored_console,
            )));
        }
        if let Some(path) = &config.file_path {
            sinks.push(Arc::new(FileSink::new(path, formatter)?));
        }

        Ok(Self::new(owner, config, sinks))
    }

    fn spawn_worker(shared: Arc<PipelineShared>, wake: Receiver<()>) -> Option<JoinHandle<()>> {
        let interval = shared.config.flush_interval();
        let spawned = std::thread::Builder::new()
            .name("scarlet-log-pipeline".to_string())
            .spawn(move || {
                while !shared.closed.load(Ordering::Acquire) {
                    match wake.recv_timeout(interval) {
                        Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if shared.closed.load(Ordering::Acquire) {
                        break;
                    }
                    shared.swap_and_drain();
                }
            });

        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("⚠️ Log pipeline falling back to inline draining: {}", e);
                None
            }
        }
    }

    pub fn config(&self) -> &LogConfig {
        &self.shared.config
    }

    /// Records accepted but not yet written.
    pub fn pending(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> LogPipelineStats {
        let counters = &self.shared.counters;
        LogPipelineStats {
            accepted: counters.accepted.load(Ordering::Relaxed),
            filtered: counters.filtered.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            written: counters.written.load(Ordering::Relaxed),
        }
    }

    /// Buffers a record for delivery.
    pub fn submit(&self, record: LogRecord) {
        let shared = &self.shared;
        if record.level < shared.config.min_level {
            shared.counters.filtered.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if let Some(filter) = &shared.config.custom_filter {
            if !filter(&record) {
                shared.counters.filtered.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        if self.is_closed() {
            shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        // Counted before the enqueue so a concurrent drain never sees more
        // records than the counter.
        let in_flight = shared.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        let index = shared.active.load(Ordering::Acquire) & 1;
        if shared.buffers[index].try_enqueue(record).is_err() {
            shared.in_flight.fetch_sub(1, Ordering::AcqRel);
            shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        shared.counters.accepted.fetch_add(1, Ordering::Relaxed);

        if in_flight >= shared.config.batch_size {
            if self.threaded {
                let _ = shared.signal.try_send(());
            } else {
                shared.swap_and_drain();
            }
        }
    }

    /// Writes everything buffered so far and flushes every sink.
    pub fn flush(&self) {
        self.shared.drain_all();
        self.shared.flush_sinks();
    }

    /// Stops the drain thread, writes every buffered record, then flushes
    /// and closes the sinks. Safe to call more than once.
    pub fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = self.shared.signal.try_send(());
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!("Log pipeline drain thread panicked");
            }
        }

        let written = self.shared.drain_all();
        self.shared.flush_sinks();
        for sink in &self.shared.sinks {
            if let Err(e) = sink.close() {
                error!("Log sink '{}' failed to close: {}", sink.name(), e);
            }
        }

        info!("📜 Log pipeline shut down ({} records in final drain)", written);
    }
}

impl Logger for LogPipeline {
    fn log(&self, level: LogLevel, message: &str) {
        self.submit(LogRecord::new(level, message));
    }

    fn log_error_with(&self, message: &str, error: &dyn Error) {
        let config = &self.shared.config;
        let backtrace = config.include_stack_trace || config.include_stack_trace_for_error;
        self.submit(LogRecord::new(
            LogLevel::Error,
            format_error_chain(message, error, backtrace),
        ));
    }
}

impl Service for LogPipeline {
    fn owner_id(&self) -> SandboxId {
        self.owner
    }

    fn service_name(&self) -> &'static str {
        "LogPipeline"
    }

    fn cleanup(&self) -> Result<(), ServiceError> {
        self.shutdown();
        Ok(())
    }
}

impl Drop for LogPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for LogPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogPipeline")
            .field("owner", &self.owner)
            .field("sinks", &self.shared.sinks.len())
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

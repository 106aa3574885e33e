//! Log pipeline delivery, filtering and shutdown behaviour.

use scarlet_core::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn memory_pipeline(config: LogConfig) -> (LogPipeline, Arc<MemorySink>, Arc<MemorySink>) {
    let formatter = LogFormatter::new(&config);
    let first = Arc::new(MemorySink::new(formatter.clone()));
    let second = Arc::new(MemorySink::new(formatter));
    let pipeline = LogPipeline::new(
        SandboxId::new(),
        config,
        vec![
            Arc::clone(&first) as Arc<dyn LogSink>,
            Arc::clone(&second) as Arc<dyn LogSink>,
        ],
    );
    (pipeline, first, second)
}

/// Sink that fails every write.
struct BrokenSink {
    attempts: AtomicUsize,
}

impl LogSink for BrokenSink {
    fn name(&self) -> &str {
        "broken"
    }

    fn append(&self, _record: &LogRecord) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::Closed("broken".to_string()))
    }

    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[test]
fn test_shutdown_delivers_every_record_to_every_sink() {
    let config = LogConfig {
        batch_size: 100,
        flush_interval_ms: 60_000,
        include_timestamp: false,
        ..LogConfig::default()
    };
    let (pipeline, first, second) = memory_pipeline(config);

    for index in 0..42 {
        pipeline.info(&format!("record {index}"));
    }
    pipeline.shutdown();

    for sink in [&first, &second] {
        let lines = sink.lines();
        assert_eq!(lines.len(), 42);
        assert_eq!(lines[0], "[Info] record 0");
        assert_eq!(lines[41], "[Info] record 41");
    }
    assert_eq!(pipeline.stats().written, 42);
    assert_eq!(pipeline.pending(), 0);
}

#[test]
fn test_batch_threshold_triggers_background_flush() {
    let config = LogConfig {
        batch_size: 10,
        flush_interval_ms: 60_000,
        ..LogConfig::default()
    };
    let (pipeline, sink, _) = memory_pipeline(config);

    for index in 0..10 {
        pipeline.warn(&format!("spike {index}"));
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while sink.len() < 10 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(sink.len(), 10);
    pipeline.shutdown();
}

#[test]
fn test_flush_interval_drains_small_batches() {
    let config = LogConfig {
        batch_size: 1_000,
        flush_interval_ms: 10,
        ..LogConfig::default()
    };
    let (pipeline, sink, _) = memory_pipeline(config);
    pipeline.error("lonely record");

    let deadline = Instant::now() + Duration::from_secs(5);
    while sink.is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(sink.len(), 1);
}

#[test]
fn test_level_and_custom_filter() {
    let config = LogConfig {
        min_level: LogLevel::Warning,
        include_timestamp: false,
        ..LogConfig::default()
    }
    .with_filter(|record| !record.message.contains("secret"));
    let (pipeline, sink, _) = memory_pipeline(config);

    pipeline.debug("too quiet");
    pipeline.info("still too quiet");
    pipeline.warn("secret handshake");
    pipeline.error("disk full");
    pipeline.fatal("reactor breach");
    pipeline.shutdown();

    assert_eq!(
        sink.lines(),
        vec!["[Error] disk full".to_string(), "[Fatal] reactor breach".to_string()]
    );
    assert_eq!(pipeline.stats().filtered, 3);
}

#[test]
fn test_failing_sink_does_not_starve_others() {
    let config = LogConfig {
        include_timestamp: false,
        ..LogConfig::default()
    };
    let broken = Arc::new(BrokenSink {
        attempts: AtomicUsize::new(0),
    });
    let memory = Arc::new(MemorySink::new(LogFormatter::new(&config)));
    let pipeline = LogPipeline::new(
        SandboxId::new(),
        config,
        vec![
            Arc::clone(&broken) as Arc<dyn LogSink>,
            Arc::clone(&memory) as Arc<dyn LogSink>,
        ],
    );

    pipeline.info("one");
    pipeline.info("two");
    pipeline.shutdown();

    assert_eq!(broken.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(memory.len(), 2);
}

#[test]
fn test_synchronous_mode_drains_inline() {
    let config = LogConfig {
        enable_async_logging: false,
        batch_size: 3,
        ..LogConfig::default()
    };
    let (pipeline, sink, _) = memory_pipeline(config);

    pipeline.info("a");
    pipeline.info("b");
    assert_eq!(sink.len(), 0);
    pipeline.info("c");
    assert_eq!(sink.len(), 3);

    pipeline.info("d");
    pipeline.flush();
    assert_eq!(sink.len(), 4);
}

#[test]
fn test_records_after_shutdown_are_dropped() {
    let (pipeline, sink, _) = memory_pipeline(LogConfig::default());
    pipeline.shutdown();
    pipeline.shutdown();
    pipeline.info("too late");
    assert!(sink.is_empty());
    assert_eq!(pipeline.stats().dropped, 1);
}

#[test]
fn test_full_buffer_drops_records() {
    let config = LogConfig {
        enable_async_logging: false,
        max_queue_size: 4,
        batch_size: 1_000,
        ..LogConfig::default()
    };
    let (pipeline, sink, _) = memory_pipeline(config);
    for index in 0..6 {
        pipeline.info(&format!("{index}"));
    }
    assert_eq!(pipeline.stats().dropped, 2);
    pipeline.shutdown();
    assert_eq!(sink.len(), 4);
}

#[test]
fn test_file_sink_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs").join("core.log");
    let config = LogConfig {
        console_output: false,
        file_path: Some(path.clone()),
        ..LogConfig::default()
    };

    let pipeline = LogPipeline::from_config(SandboxId::new(), config).unwrap();
    pipeline.info("persisted");
    pipeline.log_error_with(
        "save failed",
        &std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only volume"),
    );
    pipeline.shutdown();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("[Info] persisted"));
    assert!(contents.contains("[Error] save failed: read-only volume"));
}

#[test]
fn test_unformattable_records_are_not_counted_as_written() {
    let config = LogConfig {
        timestamp_format: "%Q".to_string(),
        flush_interval_ms: 60_000,
        ..LogConfig::default()
    };
    let (pipeline, first, second) = memory_pipeline(config);

    for index in 0..3 {
        pipeline.info(&format!("record {index}"));
    }
    pipeline.shutdown();

    assert!(first.is_empty());
    assert!(second.is_empty());
    let stats = pipeline.stats();
    assert_eq!(stats.accepted, 3);
    assert_eq!(stats.written, 0);
    assert_eq!(pipeline.pending(), 0);
}

#[test]
fn test_from_config_rejects_bad_timestamp_format() {
    let config = LogConfig {
        console_output: false,
        timestamp_format: "%Y-%Q".to_string(),
        ..LogConfig::default()
    };
    let result = LogPipeline::from_config(SandboxId::new(), config);
    assert!(matches!(
        result,
        Err(SinkError::Config(ConfigError::Invalid(_)))
    ));
}

#[test]
fn test_single_slot_buffers_still_deliver() {
    let config = LogConfig {
        enable_async_logging: false,
        max_queue_size: 1,
        batch_size: 1,
        include_timestamp: false,
        ..LogConfig::default()
    };
    let (pipeline, sink, _) = memory_pipeline(config);

    for index in 0..5 {
        pipeline.info(&format!("tick {index}"));
    }
    pipeline.shutdown();

    assert_eq!(sink.len(), 5);
    assert_eq!(pipeline.stats().dropped, 0);
}

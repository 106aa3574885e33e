//! Operation lifecycle tests: terminal transitions, continuations, loaders.

use scarlet_core::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn test_racing_producers_settle_exactly_once() {
    for _ in 0..200 {
        let op = Operation::<u32>::new();
        let barrier = Arc::new(Barrier::new(3));

        let results = {
            let op = op.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                op.set_result(1)
            })
        };
        let errors = {
            let op = op.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                op.set_error(OperationError::failed("lost"))
            })
        };
        let cancels = {
            let op = op.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                op.cancel()
            })
        };

        let winners = [results, errors, cancels]
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);

        match op.wait() {
            Outcome::Completed(value) => {
                assert_eq!(value, 1);
                assert_eq!(op.status(), OperationStatus::Completed);
            }
            Outcome::Failed(_) => assert_eq!(op.status(), OperationStatus::Failed),
            Outcome::Canceled => assert_eq!(op.status(), OperationStatus::Canceled),
        }
    }
}

#[test]
fn test_each_continuation_runs_exactly_once() {
    for _ in 0..100 {
        let op = Operation::<u8>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let registrar = {
            let op = op.clone();
            let calls = Arc::clone(&calls);
            thread::spawn(move || {
                for _ in 0..20 {
                    let calls = Arc::clone(&calls);
                    op.on_completed(move |_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                    });
                }
            })
        };

        op.set_result(7);
        registrar.join().unwrap();
        op.wait();

        let deadline = std::time::Instant::now() + TIMEOUT;
        while calls.load(Ordering::SeqCst) < 20 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        thread::sleep(Duration::from_millis(5));
        assert_eq!(calls.load(Ordering::SeqCst), 20);
    }
}

#[test]
fn test_pending_continuation_runs_on_a_worker() {
    let op = Operation::<()>::new();
    let (tx, rx) = crossbeam::channel::bounded(1);
    op.on_completed(move |_| {
        tx.send(thread::current().id()).unwrap();
    });

    op.set_result(());
    let worker = rx.recv_timeout(TIMEOUT).unwrap();
    assert_ne!(worker, thread::current().id());
}

#[test]
fn test_panicking_continuation_does_not_block_others() {
    let op = Operation::<()>::new();
    let (tx, rx) = crossbeam::channel::bounded(1);
    op.on_completed(|_| panic!("bad subscriber"));
    op.on_completed(move |_| tx.send(()).unwrap());

    op.set_result(());
    assert!(rx.recv_timeout(TIMEOUT).is_ok());
}

#[test]
fn test_start_runs_once_and_reports_progress() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let op = Operation::spawn(move |op: &Operation<String>, _token| {
        counter.fetch_add(1, Ordering::SeqCst);
        op.set_progress(0.5);
        Ok("loaded".to_string())
    });
    assert!(!op.start(|_: &Operation<String>, _: &CancellationToken| Ok("again".to_string())));

    assert_eq!(op.wait().into_result().unwrap(), "loaded");
    assert_eq!(op.progress(), 1.0);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_start_inline_runs_on_the_calling_thread() {
    let caller = thread::current().id();
    let op = Operation::<bool>::new();

    let started = op.start_inline(
        move |op: &Operation<bool>, _: &CancellationToken| -> Result<bool, OperationError> {
            op.set_progress(0.25);
            Ok(thread::current().id() == caller)
        },
    );
    assert!(started);
    // Terminal before `start_inline` returns.
    assert!(op.is_completed());
    assert_eq!(op.result(), Some(&true));

    let again = op.start_inline(|_: &Operation<bool>, _: &CancellationToken| Ok(false));
    assert!(!again);
    assert!(!op.start(|_: &Operation<bool>, _: &CancellationToken| Ok(false)));
    assert_eq!(op.result(), Some(&true));
}

#[test]
fn test_start_inline_contains_panics() {
    let op = Operation::<u8>::new();
    let started = op.start_inline(
        |_: &Operation<u8>, _: &CancellationToken| -> Result<u8, OperationError> {
            panic!("inline boom")
        },
    );
    assert!(started);
    assert!(matches!(
        op.error(),
        Some(OperationError::Panicked(message)) if message == "inline boom"
    ));
}

#[test]
fn test_task_errors_and_panics_fail_the_operation() {
    let failed = Operation::<u8>::spawn(|_, _| Err(OperationError::failed("disk on fire")));
    assert!(matches!(failed.wait(), Outcome::Failed(OperationError::Failed(_))));

    let panicked = Operation::<u8>::spawn(|_, _| panic!("unexpected"));
    match panicked.wait() {
        Outcome::Failed(OperationError::Panicked(message)) => assert_eq!(message, "unexpected"),
        other => panic!("expected panic failure, got {:?}", other),
    }
}

#[test]
fn test_cooperative_cancellation() {
    let (started_tx, started_rx) = crossbeam::channel::bounded(1);
    let op = Operation::<u64>::spawn(move |_, token| {
        started_tx.send(()).unwrap();
        while !token.is_cancelled() {
            thread::sleep(Duration::from_millis(1));
        }
        Err(OperationError::Canceled)
    });

    started_rx.recv_timeout(TIMEOUT).unwrap();
    assert!(op.cancel());
    assert!(op.wait().is_canceled());
    assert!(op.is_canceled());
}

#[test]
fn test_already_canceled_token_skips_task() {
    let parent = CancellationToken::new();
    parent.cancel();

    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    let op = Operation::<u8>::linked(WorkerPool::shared(), &parent);
    op.start(move |_: &Operation<u8>, _: &CancellationToken| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(1)
    });

    assert!(op.wait().is_canceled());
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn test_loader_discards_value_after_cancellation() {
    let (release_tx, release_rx) = crossbeam::channel::bounded::<()>(1);
    let (started_tx, started_rx) = crossbeam::channel::bounded(1);

    let op = Operation::load(move |progress, _token| {
        progress.report(0.3);
        started_tx.send(()).unwrap();
        release_rx.recv().unwrap();
        Ok(vec![1u8, 2, 3])
    });

    started_rx.recv_timeout(TIMEOUT).unwrap();
    assert!((op.progress() - 0.3).abs() < 1e-6);
    op.cancel();
    release_tx.send(()).unwrap();

    assert!(op.wait().is_canceled());
    assert!(op.result().is_none());
}

#[test]
fn test_wait_timeout_on_idle_operation() {
    let op = Operation::<u8>::new();
    assert!(op.wait_timeout(Duration::from_millis(20)).is_none());
    op.set_result(4);
    assert!(op.wait_timeout(Duration::from_millis(20)).unwrap().is_completed());
}

#[tokio::test]
async fn test_async_completion() {
    let op = Operation::spawn(|_: &Operation<u32>, _| {
        thread::sleep(Duration::from_millis(10));
        Ok(99)
    });
    assert_eq!(op.completion().await.into_result().unwrap(), 99);

    let ready = Operation::from_result(5u32);
    assert_eq!(ready.completion().await.into_result().unwrap(), 5);
}

#[test]
fn test_concurrent_progress_reporters_stay_in_range() {
    let op = Operation::<()>::new();
    let reporters: Vec<_> = (0..4)
        .map(|seed| {
            let op = op.clone();
            thread::spawn(move || {
                for step in 0..1_000 {
                    op.set_progress(((step + seed) % 120) as f32 / 100.0);
                }
            })
        })
        .collect();
    for reporter in reporters {
        reporter.join().unwrap();
    }

    let progress = op.progress();
    assert!((0.0..=1.0).contains(&progress));
}

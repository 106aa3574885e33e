//! Worker pool that runs operation bodies and continuations off the main thread.

use crate::error::SandboxError;
use crate::utils::{catch_panic, panic_message};
use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::{debug, warn};

static SHARED_POOL: Lazy<WorkerPool> = Lazy::new(|| {
    let threads = num_cpus::get().max(4);
    match WorkerPool::new(threads) {
        Ok(pool) => pool,
        Err(e) => {
            warn!("⚠️ Falling back to the global rayon pool: {}", e);
            WorkerPool {
                kind: PoolKind::Global,
            }
        }
    }
});

#[derive(Clone)]
enum PoolKind {
    Dedicated(Arc<rayon::ThreadPool>),
    Global,
}

/// Handle to a set of worker threads.
///
/// Cloning is cheap; all clones submit to the same threads.
#[derive(Clone)]
pub struct WorkerPool {
    kind: PoolKind,
}

impl WorkerPool {
    /// Builds a dedicated pool with `threads` workers.
    pub fn new(threads: usize) -> Result<Self, SandboxError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|index| format!("scarlet-worker-{index}"))
            .panic_handler(|payload| {
                warn!("⚠️ Worker job panicked: {}", panic_message(payload.as_ref()));
            })
            .build()
            .map_err(|e| SandboxError::WorkerPool(e.to_string()))?;

        debug!("🧵 Worker pool started with {} threads", pool.current_num_threads());
        Ok(Self {
            kind: PoolKind::Dedicated(Arc::new(pool)),
        })
    }

    /// The process-wide pool, sized from the number of logical CPUs.
    pub fn shared() -> Self {
        SHARED_POOL.clone()
    }

    /// Queues `job` on a worker thread.
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.kind {
            PoolKind::Dedicated(pool) => pool.spawn(job),
            PoolKind::Global => rayon::spawn(move || {
                if let Err(panic) = catch_panic(job) {
                    warn!("⚠️ Worker job panicked: {}", panic);
                }
            }),
        }
    }

    pub fn threads(&self) -> usize {
        match &self.kind {
            PoolKind::Dedicated(pool) => pool.current_num_threads(),
            PoolKind::Global => rayon::current_num_threads(),
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::shared()
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_spawn_runs_off_the_calling_thread() {
        let pool = WorkerPool::new(2).unwrap();
        assert_eq!(pool.threads(), 2);

        let caller = std::thread::current().id();
        let (tx, rx) = crossbeam::channel::bounded(1);
        pool.spawn(move || {
            tx.send(std::thread::current().id()).unwrap();
        });

        let worker = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(worker, caller);
    }

    #[test]
    fn test_panicking_job_keeps_the_pool_alive() {
        let pool = WorkerPool::new(1).unwrap();
        pool.spawn(|| panic!("bad job"));

        let (tx, rx) = crossbeam::channel::bounded(1);
        pool.spawn(move || tx.send("still running").unwrap());
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            "still running"
        );
    }

    #[test]
    fn test_shared_pool_is_usable() {
        let (tx, rx) = crossbeam::channel::bounded(1);
        WorkerPool::shared().spawn(move || tx.send(42).unwrap());
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }
}

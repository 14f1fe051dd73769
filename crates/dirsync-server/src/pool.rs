//! Named, fixed-size worker pools.
//!
//! A [`WorkerPool`] runs submitted futures on the tokio runtime with at most
//! `size` of them executing at once. How a submission behaves while every
//! worker is busy depends on the pool's [`QueueMode`].
//!
//! [`PoolRegistry`] hands out pools by name. A pool is created on the first
//! request and keeps its size for the life of the registry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// Behaviour of a submission when every worker is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueMode {
    /// Accept the task immediately; it waits for a free worker.
    Unbounded,
    /// Hand-off queue: the submitter waits until a worker is free.
    #[default]
    Rendezvous,
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("worker pool '{pool}' is shut down")]
    Closed { pool: String },
}

/// Fixed-size pool of tokio tasks.
#[derive(Debug)]
pub struct WorkerPool {
    name: String,
    size: usize,
    mode: QueueMode,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    closed: AtomicBool,
}

impl WorkerPool {
    /// Creates a pool. A size of zero is treated as one.
    pub fn new(name: impl Into<String>, size: usize, mode: QueueMode) -> Self {
        let size = size.max(1);
        Self {
            name: name.into(),
            size,
            mode,
            permits: Arc::new(Semaphore::new(size)),
            tracker: TaskTracker::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn mode(&self) -> QueueMode {
        self.mode
    }

    /// Workers not currently running a task.
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Tasks submitted and not yet finished, queued ones included.
    pub fn pending_tasks(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Submits a task.
    ///
    /// In [`QueueMode::Rendezvous`] this waits for a free worker before
    /// returning; dropping the returned future abandons the submission.
    pub async fn submit<F, T>(&self, task: F) -> Result<JoinHandle<T>, PoolError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return Err(PoolError::Closed {
                pool: self.name.clone(),
            });
        }

        match self.mode {
            QueueMode::Rendezvous => {
                let permit = Arc::clone(&self.permits)
                    .acquire_owned()
                    .await
                    .map_err(|_| PoolError::Closed {
                        pool: self.name.clone(),
                    })?;
                Ok(self.tracker.spawn(async move {
                    let _permit = permit;
                    task.await
                }))
            }
            QueueMode::Unbounded => {
                let permits = Arc::clone(&self.permits);
                Ok(self.tracker.spawn(async move {
                    // The semaphore is never closed, so this only waits.
                    let _permit = permits.acquire_owned().await;
                    task.await
                }))
            }
        }
    }

    /// Rejects further submissions and waits for every submitted task.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.tracker.close();
        self.tracker.wait().await;
        debug!(pool = %self.name, "Worker pool drained");
    }
}

/// Registry of named pools.
#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: Mutex<HashMap<String, Arc<WorkerPool>>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pool called `name`, creating it with `size` workers on
    /// first use. An existing pool is returned unchanged, whatever `size` says.
    pub fn get_or_create(&self, name: &str, size: usize, mode: QueueMode) -> Arc<WorkerPool> {
        let mut pools = self.pools.lock();
        if let Some(pool) = pools.get(name) {
            if pool.size() != size.max(1) {
                debug!(
                    pool = %name,
                    size = pool.size(),
                    requested = size,
                    "Pool exists with a different size, keeping it"
                );
            }
            return Arc::clone(pool);
        }

        info!(pool = %name, size = size.max(1), mode = ?mode, "Creating worker pool");
        let pool = Arc::new(WorkerPool::new(name, size, mode));
        pools.insert(name.to_string(), Arc::clone(&pool));
        pool
    }

    pub fn get(&self, name: &str) -> Option<Arc<WorkerPool>> {
        self.pools.lock().get(name).cloned()
    }

    /// Pool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Shuts every pool down and waits for their tasks.
    pub async fn shutdown_all(&self) {
        let pools: Vec<Arc<WorkerPool>> = self.pools.lock().values().cloned().collect();
        for pool in pools {
            pool.shutdown().await;
        }
        info!("All worker pools shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    // ==== Pool ====

    #[tokio::test]
    async fn test_pool_never_runs_more_than_size_tasks() {
        // Arrange
        let pool = WorkerPool::new("test", 2, QueueMode::Unbounded);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        // Act
        let mut handles = Vec::new();
        for _ in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(
                pool.submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
                .unwrap(),
            );
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Assert
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.idle_workers(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rendezvous_submit_waits_for_free_worker() {
        // Arrange
        let pool = WorkerPool::new("handoff", 1, QueueMode::Rendezvous);
        let first = pool
            .submit(tokio::time::sleep(Duration::from_secs(5)))
            .await
            .unwrap();

        // Act: a second submission cannot complete while the worker is busy
        let blocked =
            tokio::time::timeout(Duration::from_secs(1), pool.submit(async { 42 })).await;

        // Assert
        assert!(blocked.is_err());

        first.await.unwrap();
        let handle = pool.submit(async { 42 }).await.unwrap();
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_unbounded_submit_returns_immediately() {
        let pool = WorkerPool::new("queue", 1, QueueMode::Unbounded);

        let handles: Vec<_> = futures_of(&pool, 5).await;

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
    }

    async fn futures_of(pool: &WorkerPool, n: usize) -> Vec<JoinHandle<usize>> {
        let mut handles = Vec::new();
        for i in 0..n {
            handles.push(pool.submit(async move { i }).await.unwrap());
        }
        handles
    }

    #[tokio::test]
    async fn test_shutdown_waits_and_rejects_new_tasks() {
        // Arrange
        let pool = WorkerPool::new("closing", 2, QueueMode::Unbounded);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let done = Arc::clone(&done);
            pool.submit(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }

        // Act
        pool.shutdown().await;

        // Assert
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert!(pool.is_closed());
        assert!(matches!(
            pool.submit(async {}).await,
            Err(PoolError::Closed { .. })
        ));
    }

    // ==== Registry ====

    #[test]
    fn test_registry_creates_lazily_and_never_resizes() {
        // Arrange
        let registry = PoolRegistry::new();
        assert!(registry.get("sync").is_none());

        // Act
        let first = registry.get_or_create("sync", 4, QueueMode::Rendezvous);
        let second = registry.get_or_create("sync", 16, QueueMode::Unbounded);

        // Assert
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.size(), 4);
        assert_eq!(second.mode(), QueueMode::Rendezvous);
        assert_eq!(registry.names(), vec!["sync".to_string()]);
    }

    #[test]
    fn test_zero_size_pool_gets_one_worker() {
        let pool = WorkerPool::new("tiny", 0, QueueMode::Unbounded);
        assert_eq!(pool.size(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_all_closes_every_pool() {
        let registry = PoolRegistry::new();
        let a = registry.get_or_create("a", 1, QueueMode::Unbounded);
        let b = registry.get_or_create("b", 1, QueueMode::Rendezvous);

        registry.shutdown_all().await;

        assert!(a.is_closed());
        assert!(b.is_closed());
    }
}

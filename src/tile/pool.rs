//! Bounded pool for blocking tile work.
//!
//! Raster reads, color math and encoding run on tokio's blocking threads.
//! A semaphore caps how many run at once; extra requests wait for a permit
//! instead of being rejected.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::TileError;

/// Default number of concurrent tile workers.
pub const DEFAULT_WORKERS: usize = 16;

/// Fixed-size pool of blocking workers.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool running at most `size` jobs at once (minimum 1).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `job` on a blocking thread once a worker slot is free.
    ///
    /// The slot is held until the job returns, even if the caller stops
    /// waiting. A panicking job fails only its own request.
    pub async fn run<F, T>(&self, job: F) -> Result<T, TileError>
    where
        F: FnOnce() -> Result<T, TileError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| TileError::Worker {
                message: e.to_string(),
            })?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| TileError::Worker {
            message: e.to_string(),
        })?
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_returns_result() {
        let pool = WorkerPool::new(2);
        assert_eq!(pool.run(|| Ok(21 * 2)).await.unwrap(), 42);

        let err = pool
            .run(|| -> Result<(), TileError> {
                Err(TileError::EncodeError {
                    message: "boom".to_string(),
                })
            })
            .await;
        assert!(matches!(err, Err(TileError::EncodeError { .. })));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let pool = WorkerPool::new(1);
        let result = pool.run(|| -> Result<(), TileError> { panic!("worker panic") }).await;
        assert!(matches!(result, Err(TileError::Worker { .. })));

        // The slot is released and the pool keeps working
        assert_eq!(pool.run(|| Ok(1)).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..12 {
            let pool = pool.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                pool.run(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.size(), 3);
        assert_eq!(WorkerPool::new(0).size(), 1);
    }
}

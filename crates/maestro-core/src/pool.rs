//! Bounded worker pool for subtask execution
//!
//! Concurrency is bounded by a FIFO semaphore: submissions beyond the pool
//! size queue in arrival order. Every submission gets a hard wall-clock
//! timeout. Cancellation is cooperative: the running future is given a
//! grace period to observe its token and wind down, then force-dropped.

use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default number of workers
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default grace period after cancellation before force-termination
const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Bounded execution pool
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
    grace: Duration,
}

impl WorkerPool {
    /// Create a pool with the given worker count
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
            grace: DEFAULT_GRACE,
        }
    }

    /// Override the cancellation grace period
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Pool size
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Currently idle workers
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run a future on a worker slot.
    ///
    /// Waits FIFO for a free worker, then runs the future under the
    /// wall-clock timeout. When the cancellation token fires, the future
    /// keeps running for the grace period so it can observe its own token
    /// and finish cleanly; after that it is dropped and the submission
    /// fails with `cancelled`.
    pub async fn run<T, F>(
        &self,
        timeout: Duration,
        cancel: CancellationToken,
        future: F,
    ) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| Error::Internal("worker pool closed".into()))?;
        debug!(available = self.available(), "Worker slot acquired");

        let timed = tokio::time::timeout(timeout, future);
        tokio::pin!(timed);

        tokio::select! {
            result = &mut timed => match result {
                Ok(inner) => inner,
                Err(_) => Err(Error::Timeout(timeout.as_millis() as u64)),
            },
            () = cancel.cancelled() => {
                match tokio::time::timeout(self.grace, &mut timed).await {
                    Ok(Ok(inner)) => inner,
                    Ok(Err(_)) => Err(Error::Timeout(timeout.as_millis() as u64)),
                    Err(_) => Err(Error::Cancelled),
                }
            }
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = Arc::new(WorkerPool::new(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let pool = Arc::clone(&pool);
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                pool.run(Duration::from_secs(5), CancellationToken::new(), async {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_timeout_fails_submission() {
        let pool = WorkerPool::new(1);
        let result: Result<()> = pool
            .run(Duration::from_millis(20), CancellationToken::new(), async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_cooperative_cancellation_result_passes_through() {
        let pool = WorkerPool::new(1);
        let cancel = CancellationToken::new();
        let observed = cancel.clone();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        // A future that honors its token finishes within the grace period
        let result: Result<()> = pool
            .run(Duration::from_secs(10), cancel, async move {
                observed.cancelled().await;
                Err(Error::Cancelled)
            })
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_uncooperative_future_force_terminated() {
        let pool = WorkerPool::new(1).with_grace(Duration::from_millis(30));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        // Ignores the token entirely: dropped once the grace period ends
        let started = std::time::Instant::now();
        let result: Result<()> = pool
            .run(Duration::from_secs(10), cancel, async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}

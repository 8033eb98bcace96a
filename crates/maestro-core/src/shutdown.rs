//! Graceful shutdown coordination
//!
//! A single controller owns the cancellation token tree and tracks active
//! work. Shutdown stops intake, cancels everything, waits for active tasks
//! up to a deadline, then force-terminates.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default drain deadline
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shutdown lifecycle phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Normal operation
    Running,
    /// Draining: work cancelled, waiting for completion
    Draining,
    /// Shutdown complete
    Terminated,
}

/// Coordinates graceful shutdown across components
pub struct ShutdownController {
    cancel_token: CancellationToken,
    initiated: AtomicBool,
    draining: AtomicBool,
    terminated: AtomicBool,
    active_tasks: AtomicU32,
    timeout: Duration,
}

impl ShutdownController {
    /// Create a controller with the default drain deadline
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Create a controller with a custom drain deadline
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            cancel_token: CancellationToken::new(),
            initiated: AtomicBool::new(false),
            draining: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            active_tasks: AtomicU32::new(0),
            timeout,
        })
    }

    /// A child cancellation token for a component
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> ShutdownPhase {
        if self.terminated.load(Ordering::SeqCst) {
            ShutdownPhase::Terminated
        } else if self.draining.load(Ordering::SeqCst) {
            ShutdownPhase::Draining
        } else {
            ShutdownPhase::Running
        }
    }

    /// Whether new work may still be accepted
    #[must_use]
    pub fn is_accepting_work(&self) -> bool {
        !self.initiated.load(Ordering::SeqCst)
    }

    /// Register a unit of active work; the guard decrements on drop
    pub fn register_task(self: &Arc<Self>) -> TaskGuard {
        self.active_tasks.fetch_add(1, Ordering::SeqCst);
        TaskGuard {
            controller: Arc::clone(self),
        }
    }

    /// Number of active work units
    #[must_use]
    pub fn active_task_count(&self) -> u32 {
        self.active_tasks.load(Ordering::SeqCst)
    }

    /// Initiate graceful shutdown. Safe to call more than once; only the
    /// first call drains.
    pub async fn shutdown(&self) {
        if self
            .initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Shutdown already initiated");
            return;
        }

        info!("Initiating graceful shutdown");
        self.draining.store(true, Ordering::SeqCst);
        self.cancel_token.cancel();

        let drain_start = std::time::Instant::now();
        loop {
            let active = self.active_task_count();
            if active == 0 {
                info!("All tasks drained");
                break;
            }
            if drain_start.elapsed() >= self.timeout {
                warn!(active_tasks = active, "Drain deadline exceeded, terminating");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        self.terminated.store(true, Ordering::SeqCst);
        info!("Shutdown complete");
    }
}

/// Guard that decrements the active task count when dropped
pub struct TaskGuard {
    controller: Arc<ShutdownController>,
}

impl TaskGuard {
    /// Whether shutdown was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.controller.cancel_token.is_cancelled()
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.controller.active_tasks.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_phases() {
        let controller = ShutdownController::new();
        assert_eq!(controller.phase(), ShutdownPhase::Running);
        assert!(controller.is_accepting_work());

        controller.shutdown().await;
        assert_eq!(controller.phase(), ShutdownPhase::Terminated);
        assert!(!controller.is_accepting_work());
    }

    #[tokio::test]
    async fn test_task_guard_counts() {
        let controller = ShutdownController::new();
        assert_eq!(controller.active_task_count(), 0);
        {
            let _a = controller.register_task();
            let _b = controller.register_task();
            assert_eq!(controller.active_task_count(), 2);
        }
        assert_eq!(controller.active_task_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_propagates_to_children() {
        let controller = ShutdownController::new();
        let token = controller.token();
        assert!(!token.is_cancelled());

        controller.shutdown().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_drain_deadline() {
        let controller = ShutdownController::with_timeout(Duration::from_millis(50));
        let _guard = controller.register_task();

        let started = std::time::Instant::now();
        controller.shutdown().await;
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(controller.phase(), ShutdownPhase::Terminated);
    }
}

//! Tick-driven orchestration of speculative training and prediction jobs.
//!
//! Two orchestrators share the same skeleton: jobs are submitted into an
//! active set, a single-threaded loop advances every job one step per tick,
//! and each job produces exactly one terminal [`ResultsMessage`] before it
//! leaves the set. All waiting is done with cooperative sleeps; nothing
//! spins.
//!
//! [`ResultsMessage`]: crate::results::ResultsMessage

/// Shared active-job set with take/restore semantics.
pub mod active;
/// Builders wiring orchestrators from explicit dependencies.
pub mod builder;
/// Single-candidate prediction orchestration.
pub mod predict;
/// Multi-candidate speculative training orchestration.
pub mod train;

pub use active::ActiveJobs;
pub use builder::{PredictionOrchestratorBuilder, TrainingOrchestratorBuilder};
pub use predict::PredictionOrchestrator;
pub use train::TrainingOrchestrator;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Token for signaling graceful shutdown to orchestrator loops.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    inner: Arc<ShutdownTokenInner>,
}

#[derive(Debug)]
struct ShutdownTokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShutdownTokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Check if cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.inner.notify.notified().await;
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::job::{DistributedJob, JobId};

/// Set of jobs currently owned by an orchestrator loop.
///
/// The tick loop drains the whole set with [`ActiveJobs::take_all`], steps
/// every job while holding no lock, and puts the survivors back with
/// [`ActiveJobs::restore`]. Draining gives single-flight processing for
/// free: a job can never be stepped twice concurrently because at most one
/// holder has it outside the set. Jobs submitted mid-tick land in the
/// already-drained set and are picked up on the next tick.
#[derive(Clone, Debug, Default)]
pub struct ActiveJobs {
    inner: Arc<Mutex<Vec<DistributedJob>>>,
}

impl ActiveJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job to the set.
    pub async fn push(&self, job: DistributedJob) {
        self.inner.lock().await.push(job);
    }

    /// Remove and return every job in the set.
    pub async fn take_all(&self) -> Vec<DistributedJob> {
        std::mem::take(&mut *self.inner.lock().await)
    }

    /// Return surviving jobs to the set.
    pub async fn restore(&self, jobs: Vec<DistributedJob>) {
        self.inner.lock().await.extend(jobs);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// True when a job with `id` is currently in the set.
    pub async fn contains(&self, id: JobId) -> bool {
        self.inner.lock().await.iter().any(|job| job.id == id)
    }
}

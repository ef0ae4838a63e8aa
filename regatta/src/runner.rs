use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::backend::{
    ExecutionLane, TaskBackend, TaskOp, TaskOutcome, TaskPayload, TaskStatus,
};
use crate::error::{Result, SchedulerError};
use crate::job::SubJob;

/// Typed facade over the task backend.
///
/// Owns lane selection, attempt tagging, and the retry reset contract: a
/// sub-job is dispatched only while its handle is clear, and a retry first
/// clears the handle so the abandoned attempt is never polled again.
#[derive(Clone)]
pub struct Runner {
    backend: Arc<dyn TaskBackend>,
}

impl Runner {
    pub fn new(backend: Arc<dyn TaskBackend>) -> Self {
        Self { backend }
    }

    /// Submit the sub-job's task on the lane its candidate asks for.
    ///
    /// A GPU submit failure falls back to the CPU lane once, logged at WARN;
    /// a CPU submit failure is transient and feeds the retry policy. On
    /// success the sub-job holds the new handle and a bumped attempt tag.
    pub async fn dispatch(
        &self,
        sub: &mut SubJob,
        op: TaskOp,
        params: &serde_json::Value,
    ) -> Result<()> {
        if sub.handle.is_some() {
            return Err(SchedulerError::InvalidJob(format!(
                "sub-job for {} already dispatched",
                sub.candidate.method_name
            )));
        }

        sub.attempt += 1;
        let payload = TaskPayload {
            op,
            method_name: sub.candidate.method_name.clone(),
            extraction: sub.candidate.extraction.clone(),
            params: params.clone(),
            attempt: sub.attempt,
        };

        let preferred = if sub.candidate.requires_gpu {
            ExecutionLane::Gpu
        } else {
            ExecutionLane::Cpu
        };

        let (handle, lane) = match self.backend.submit(preferred, payload.clone()).await {
            Ok(handle) => (handle, preferred),
            Err(err) if preferred == ExecutionLane::Gpu => {
                tracing::warn!(
                    method = %sub.candidate.method_name,
                    attempt = sub.attempt,
                    error = %err,
                    "gpu submit failed, falling back to cpu lane"
                );
                let handle = self
                    .backend
                    .submit(ExecutionLane::Cpu, payload)
                    .await
                    .map_err(|e| SchedulerError::TransientBackend(e.to_string()))?;
                (handle, ExecutionLane::Cpu)
            }
            Err(err) => {
                return Err(SchedulerError::TransientBackend(err.to_string()));
            }
        };

        sub.handle = Some(handle);
        sub.dispatched_at = Some(Utc::now());
        tracing::info!(
            method = %sub.candidate.method_name,
            op = %op,
            lane = %lane,
            handle = %handle,
            attempt = sub.attempt,
            "task dispatched"
        );
        crate::telemetry::record_probe_dispatched(&sub.candidate.method_name, lane.as_str());
        Ok(())
    }

    /// Status of the current attempt. A sub-job with no handle is pending.
    pub async fn status(&self, sub: &SubJob) -> Result<TaskStatus> {
        match sub.handle {
            Some(handle) => self
                .backend
                .status(handle)
                .await
                .map_err(|e| SchedulerError::TransientBackend(e.to_string())),
            None => Ok(TaskStatus::Pending),
        }
    }

    /// Terminal outcome of the current attempt.
    pub async fn result(&self, sub: &SubJob) -> Result<TaskOutcome> {
        let handle = sub.handle.ok_or_else(|| {
            SchedulerError::TransientBackend(
                "result requested before dispatch".to_string(),
            )
        })?;
        self.backend
            .result(handle)
            .await
            .map_err(|e| SchedulerError::TransientBackend(e.to_string()))
    }

    /// Best-effort cancellation of the current attempt.
    ///
    /// The revoke is issued synchronously but takes effect asynchronously;
    /// the task may still finish, and its late report is ignored because the
    /// owning job leaves the active set.
    pub async fn cancel(&self, sub: &SubJob) {
        let Some(handle) = sub.handle else { return };
        if let Err(err) = self.backend.revoke(handle, true).await {
            tracing::warn!(
                method = %sub.candidate.method_name,
                handle = %handle,
                error = %err,
                "revoke failed"
            );
        } else {
            tracing::info!(
                method = %sub.candidate.method_name,
                handle = %handle,
                attempt = sub.attempt,
                "task revoked"
            );
        }
    }

    /// Reset a sub-job for re-dispatch, consuming one retry.
    ///
    /// The old handle is abandoned; any report it later produces carries a
    /// stale attempt tag and is never polled.
    pub fn prepare_retry(&self, sub: &mut SubJob) {
        sub.retry_count += 1;
        tracing::info!(
            method = %sub.candidate.method_name,
            abandoned_attempt = sub.attempt,
            retry = sub.retry_count,
            max_retries = sub.max_retries,
            "retrying sub-job"
        );
        sub.handle = None;
        sub.dispatched_at = None;
    }

    /// Wait until the current attempt reaches a terminal status.
    ///
    /// Cooperative wait: between polls the task yields for `poll_interval`.
    /// Gives up with [`SchedulerError::DeadlineExceeded`] once `deadline`
    /// has elapsed without a terminal report.
    pub async fn await_terminal(
        &self,
        sub: &SubJob,
        poll_interval: Duration,
        deadline: Duration,
    ) -> Result<TaskStatus> {
        let started = tokio::time::Instant::now();
        loop {
            let status = self.status(sub).await?;
            if status.is_terminal() {
                return Ok(status);
            }
            if started.elapsed() >= deadline {
                return Err(SchedulerError::DeadlineExceeded {
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::timeout;

    use crate::backend::TaskHandle;
    use crate::job::{Candidate, ExtractionIdentifier};

    /// Backend that rejects GPU submits and records the lanes it saw.
    struct GpuRejectingBackend {
        lanes: Mutex<Vec<ExecutionLane>>,
    }

    impl GpuRejectingBackend {
        fn new() -> Self {
            Self {
                lanes: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TaskBackend for GpuRejectingBackend {
        async fn submit(
            &self,
            lane: ExecutionLane,
            _payload: TaskPayload,
        ) -> anyhow::Result<TaskHandle> {
            self.lanes.lock().unwrap().push(lane);
            match lane {
                ExecutionLane::Gpu => bail!("no gpu workers available"),
                ExecutionLane::Cpu => Ok(TaskHandle::new()),
            }
        }

        async fn status(&self, _handle: TaskHandle) -> anyhow::Result<TaskStatus> {
            Ok(TaskStatus::Running)
        }

        async fn result(&self, _handle: TaskHandle) -> anyhow::Result<TaskOutcome> {
            bail!("not terminal")
        }

        async fn revoke(
            &self,
            _handle: TaskHandle,
            _terminate: bool,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn gpu_sub() -> SubJob {
        SubJob::new(
            Candidate::new(
                "setfit",
                true,
                ExtractionIdentifier::new("run-a", "total"),
            ),
            3,
        )
    }

    #[tokio::test]
    async fn test_gpu_submit_falls_back_to_cpu() {
        let backend = Arc::new(GpuRejectingBackend::new());
        let runner = Runner::new(backend.clone());
        let mut sub = gpu_sub();

        runner
            .dispatch(&mut sub, TaskOp::Probe, &serde_json::json!({}))
            .await
            .unwrap();

        assert!(sub.is_dispatched());
        assert_eq!(sub.attempt, 1);
        let lanes = backend.lanes.lock().unwrap().clone();
        assert_eq!(lanes, vec![ExecutionLane::Gpu, ExecutionLane::Cpu]);
    }

    #[tokio::test]
    async fn test_dispatch_requires_cleared_handle() {
        let runner = Runner::new(Arc::new(GpuRejectingBackend::new()));
        let mut sub = gpu_sub();
        sub.handle = Some(TaskHandle::new());

        let err = runner
            .dispatch(&mut sub, TaskOp::Probe, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidJob(_)));
    }

    #[tokio::test]
    async fn test_status_pending_without_handle() {
        let runner = Runner::new(Arc::new(GpuRejectingBackend::new()));
        let sub = gpu_sub();
        assert_eq!(runner.status(&sub).await.unwrap(), TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_prepare_retry_clears_handle_and_counts() {
        let runner = Runner::new(Arc::new(GpuRejectingBackend::new()));
        let mut sub = gpu_sub();
        sub.handle = Some(TaskHandle::new());
        sub.dispatched_at = Some(Utc::now());
        sub.attempt = 1;

        runner.prepare_retry(&mut sub);

        assert!(sub.handle.is_none());
        assert!(sub.dispatched_at.is_none());
        assert_eq!(sub.retry_count, 1);
        // Attempt tag survives so the next dispatch gets a higher one.
        assert_eq!(sub.attempt, 1);
    }

    #[tokio::test]
    async fn test_await_terminal_deadline() {
        let runner = Runner::new(Arc::new(GpuRejectingBackend::new()));
        let mut sub = gpu_sub();
        sub.handle = Some(TaskHandle::new());

        // Backend always reports Running, so only the deadline can end this.
        let result = timeout(
            Duration::from_secs(2),
            runner.await_terminal(
                &sub,
                Duration::from_millis(10),
                Duration::from_millis(50),
            ),
        )
        .await
        .expect("await_terminal did not observe its deadline");

        assert!(matches!(
            result,
            Err(SchedulerError::DeadlineExceeded { .. })
        ));
    }
}

use std::sync::Arc;

use crate::backend::{TaskBackend, TaskOp, TaskOutcome, TaskStatus};
use crate::config::OrchestratorConfig;
use crate::error::{Result, SchedulerError};
use crate::job::{DistributedJob, JobId, JobKind, SubJob};
use crate::orchestrator::ShutdownToken;
use crate::orchestrator::active::ActiveJobs;
use crate::results::{ResultsMessage, ResultsPublisher};
use crate::runner::Runner;
use crate::telemetry;

/// Terminal failure text once a sub-job's retry budget is spent.
const RETRIES_EXHAUSTED: &str = "max retries reached";

/// Outcome of advancing a single sub-job by one tick.
enum SubStep {
    /// Still working; poll again next tick.
    InFlight,
    /// Worker reported a successful completion.
    Succeeded,
    /// Terminal failure carrying the outbound error text.
    Failed { message: String },
}

/// Drives single-candidate prediction jobs to a terminal message.
///
/// Each tick advances every active job by at most one transition: dispatch
/// if undispatched, otherwise poll and react. A job leaves the active set
/// in the same tick it produces its terminal [`ResultsMessage`], so exactly
/// one message is published per job and ticks in between are idempotent.
pub struct PredictionOrchestrator {
    config: OrchestratorConfig,
    runner: Runner,
    publisher: Arc<dyn ResultsPublisher>,
    active: ActiveJobs,
}

impl PredictionOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        backend: Arc<dyn TaskBackend>,
        publisher: Arc<dyn ResultsPublisher>,
    ) -> Self {
        Self {
            config,
            runner: Runner::new(backend),
            publisher,
            active: ActiveJobs::new(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Get a handle to the active-job set.
    pub fn active_jobs(&self) -> ActiveJobs {
        self.active.clone()
    }

    /// Accept a prediction job into the active set.
    pub async fn submit(&self, job: DistributedJob) -> Result<JobId> {
        if job.kind != JobKind::Predict {
            return Err(SchedulerError::InvalidJob(format!(
                "prediction orchestrator received {} job {}",
                job.kind, job.id
            )));
        }
        job.validate()?;

        let id = job.id;
        telemetry::record_job_submitted(&job.request.tenant, job.kind.as_str());
        self.active.push(job).await;
        Ok(id)
    }

    /// Run the tick loop until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: ShutdownToken) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval_ms,
            "prediction orchestrator started"
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("prediction orchestrator shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.config.poll_interval()) => {
                    self.tick().await;
                }
            }
        }
    }

    /// Advance every active job by one step.
    ///
    /// Returns the number of jobs that reached a terminal state this tick.
    pub async fn tick(&self) -> usize {
        let jobs = self.active.take_all().await;
        let mut survivors = Vec::with_capacity(jobs.len());
        let mut completed = 0;

        for mut job in jobs {
            match self.step(&mut job).await {
                Some(message) => {
                    completed += 1;
                    let status = if message.success { "success" } else { "failure" };
                    telemetry::record_job_completed(
                        &job.request.tenant,
                        job.kind.as_str(),
                        status,
                    );
                    telemetry::observe_job_duration(
                        &job.request.tenant,
                        job.kind.as_str(),
                        status,
                        job.elapsed_secs(),
                    );
                    if let Err(err) = self.publisher.publish(&job.queue_name, message).await {
                        tracing::error!(job_id = %job.id, error = %err, "results publish failed");
                    }
                }
                None => survivors.push(job),
            }
        }

        self.active.restore(survivors).await;
        telemetry::set_active_jobs(JobKind::Predict.as_str(), self.active.len().await);
        completed
    }

    async fn step(&self, job: &mut DistributedJob) -> Option<ResultsMessage> {
        let params = job.request.params.clone();
        let outcome = match job.sub_jobs.first_mut() {
            Some(sub) => self.advance_sub(sub, &params).await,
            None => SubStep::Failed {
                message: "prediction job has no sub-job".to_string(),
            },
        };

        match outcome {
            SubStep::InFlight => None,
            SubStep::Succeeded => {
                let data_url = job
                    .sub_jobs
                    .first()
                    .map(|sub| self.config.suggestions_url(&sub.candidate.extraction));
                Some(ResultsMessage::success(job, data_url))
            }
            SubStep::Failed { message } => Some(ResultsMessage::failure(job, message)),
        }
    }

    async fn advance_sub(&self, sub: &mut SubJob, params: &serde_json::Value) -> SubStep {
        if !sub.is_dispatched() {
            return match self.runner.dispatch(sub, TaskOp::Predict, params).await {
                Ok(()) => SubStep::InFlight,
                Err(err) => self.fail_or_retry(sub, &format!("dispatch failed: {err}")),
            };
        }

        // The deadline applies whatever the poll returns, errors included;
        // a backend that stops answering cannot hold the sub-job open.
        let expired = self.deadline_expired(sub);

        let status = match self.runner.status(sub).await {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(
                    method = %sub.candidate.method_name,
                    error = %err,
                    "status poll failed"
                );
                if expired {
                    self.runner.cancel(sub).await;
                    return self.fail_or_retry(sub, "task deadline exceeded");
                }
                return SubStep::InFlight;
            }
        };

        match status {
            TaskStatus::Pending | TaskStatus::Running => {
                if expired {
                    self.runner.cancel(sub).await;
                    return self.fail_or_retry(sub, "task deadline exceeded");
                }
                SubStep::InFlight
            }
            TaskStatus::Success => match self.runner.result(sub).await {
                Ok(TaskOutcome::Completion { success: true, .. }) => SubStep::Succeeded,
                // A worker-reported failure is terminal: the task ran to
                // completion and said no, so retrying cannot help.
                Ok(TaskOutcome::Completion {
                    success: false,
                    error_message,
                }) => SubStep::Failed {
                    message: error_message
                        .unwrap_or_else(|| "prediction failed".to_string()),
                },
                Ok(TaskOutcome::Performance { score }) => self.fail_or_retry(
                    sub,
                    &format!("unexpected performance outcome with score {score}"),
                ),
                Err(err) => {
                    tracing::warn!(
                        method = %sub.candidate.method_name,
                        error = %err,
                        "result fetch failed"
                    );
                    // The worker already finished, so there is nothing to
                    // revoke when the deadline cuts the fetch loop short.
                    if expired {
                        return self.fail_or_retry(sub, "task deadline exceeded");
                    }
                    // Fetch again next tick without consuming a retry.
                    SubStep::InFlight
                }
            },
            TaskStatus::Failure => self.fail_or_retry(sub, "worker reported failure"),
        }
    }

    /// Consume a retry if any remain, otherwise fail the job terminally.
    ///
    /// The terminal text is always [`RETRIES_EXHAUSTED`]; `reason` is only
    /// logged.
    fn fail_or_retry(&self, sub: &mut SubJob, reason: &str) -> SubStep {
        if sub.retries_exhausted() {
            tracing::warn!(
                method = %sub.candidate.method_name,
                retry_count = sub.retry_count,
                reason,
                "sub-job failed with retry budget spent"
            );
            SubStep::Failed {
                message: RETRIES_EXHAUSTED.to_string(),
            }
        } else {
            tracing::info!(
                method = %sub.candidate.method_name,
                reason,
                "sub-job failed, will retry"
            );
            self.runner.prepare_retry(sub);
            SubStep::InFlight
        }
    }

    fn deadline_expired(&self, sub: &SubJob) -> bool {
        let (Some(deadline), Some(dispatched_at)) =
            (self.config.sub_job_deadline(), sub.dispatched_at)
        else {
            return false;
        };
        match (chrono::Utc::now() - dispatched_at).to_std() {
            Ok(elapsed) => elapsed > deadline,
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for PredictionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ExecutionLane, TaskHandle, TaskPayload};
    use crate::job::{Candidate, ExtractionIdentifier, TaskRequest};
    use crate::results::InProcResultsBus;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    struct ScriptedBackend {
        statuses: Mutex<VecDeque<TaskStatus>>,
        outcome: TaskOutcome,
        submits: Mutex<usize>,
    }

    impl ScriptedBackend {
        fn new(statuses: impl IntoIterator<Item = TaskStatus>, outcome: TaskOutcome) -> Self {
            Self {
                statuses: Mutex::new(statuses.into_iter().collect()),
                outcome,
                submits: Mutex::new(0),
            }
        }

        fn submit_count(&self) -> usize {
            *self.submits.lock().unwrap()
        }
    }

    #[async_trait]
    impl TaskBackend for ScriptedBackend {
        async fn submit(
            &self,
            _lane: ExecutionLane,
            _payload: TaskPayload,
        ) -> anyhow::Result<TaskHandle> {
            *self.submits.lock().unwrap() += 1;
            Ok(TaskHandle::new())
        }

        async fn status(&self, _handle: TaskHandle) -> anyhow::Result<TaskStatus> {
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                return Ok(statuses.pop_front().unwrap());
            }
            statuses
                .front()
                .copied()
                .ok_or_else(|| anyhow::anyhow!("no scripted status"))
        }

        async fn result(&self, _handle: TaskHandle) -> anyhow::Result<TaskOutcome> {
            Ok(self.outcome.clone())
        }

        async fn revoke(&self, _handle: TaskHandle, _terminate: bool) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn prediction_job() -> DistributedJob {
        DistributedJob::prediction(
            TaskRequest::new("tenant-a", "extract", serde_json::json!({"pages": 2})),
            Candidate::new("fast_text", false, ExtractionIdentifier::new("run-a", "total")),
            2,
        )
    }

    fn orchestrator(
        backend: Arc<ScriptedBackend>,
        bus: Arc<InProcResultsBus>,
    ) -> PredictionOrchestrator {
        PredictionOrchestrator::new(OrchestratorConfig::default(), backend, bus)
    }

    #[tokio::test]
    async fn test_submit_rejects_training_jobs() {
        let backend = Arc::new(ScriptedBackend::new([TaskStatus::Running], sample_outcome()));
        let orchestrator = orchestrator(backend, Arc::new(InProcResultsBus::new(8)));

        let request = TaskRequest::new("tenant-a", "extract", serde_json::json!({}));
        let candidates = vec![Candidate::new(
            "fast_text",
            false,
            ExtractionIdentifier::new("run-a", "total"),
        )];
        let job = DistributedJob::training(request, candidates, 2);

        let err = orchestrator.submit(job).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidJob(_)));
    }

    fn sample_outcome() -> TaskOutcome {
        TaskOutcome::Completion {
            success: true,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn test_successful_prediction_publishes_suggestions_link() {
        let backend = Arc::new(ScriptedBackend::new([TaskStatus::Success], sample_outcome()));
        let bus = Arc::new(InProcResultsBus::new(8));
        let mut rx = bus.subscribe();
        let orchestrator = orchestrator(backend, bus);

        let id = orchestrator.submit(prediction_job()).await.unwrap();
        assert!(orchestrator.active_jobs().contains(id).await);

        // First tick dispatches, second observes success.
        assert_eq!(orchestrator.tick().await, 0);
        assert_eq!(orchestrator.tick().await, 1);

        let outbound = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(outbound.message.success);
        assert_eq!(
            outbound.message.data_url.as_deref(),
            Some("http://localhost:5056/get_suggestions/run-a/total")
        );
        assert!(orchestrator.active_jobs().is_empty().await);
    }

    #[tokio::test]
    async fn test_worker_reported_failure_is_not_retried() {
        let backend = Arc::new(ScriptedBackend::new(
            [TaskStatus::Success],
            TaskOutcome::Completion {
                success: false,
                error_message: Some("model diverged".to_string()),
            },
        ));
        let bus = Arc::new(InProcResultsBus::new(8));
        let mut rx = bus.subscribe();
        let orchestrator = orchestrator(Arc::clone(&backend), bus);

        orchestrator.submit(prediction_job()).await.unwrap();
        orchestrator.tick().await;
        orchestrator.tick().await;

        let outbound = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(!outbound.message.success);
        assert_eq!(outbound.message.error_message, "model diverged");
        // Terminal despite retries remaining: only one dispatch happened.
        assert_eq!(backend.submit_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_budget_bounds_dispatches() {
        let backend = Arc::new(ScriptedBackend::new([TaskStatus::Failure], sample_outcome()));
        let bus = Arc::new(InProcResultsBus::new(8));
        let mut rx = bus.subscribe();
        let orchestrator = orchestrator(Arc::clone(&backend), bus);

        let request = TaskRequest::new("tenant-a", "extract", serde_json::json!({}));
        let candidate =
            Candidate::new("fast_text", false, ExtractionIdentifier::new("run-a", "total"));
        orchestrator
            .submit(DistributedJob::prediction(request, candidate, 1))
            .await
            .unwrap();

        // dispatch, fail+retry, dispatch, fail terminally
        for _ in 0..4 {
            orchestrator.tick().await;
        }

        let outbound = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outbound.message.error_message, "max retries reached");
        assert_eq!(backend.submit_count(), 2);
        assert!(orchestrator.active_jobs().is_empty().await);
    }
}

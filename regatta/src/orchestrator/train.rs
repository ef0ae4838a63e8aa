use std::sync::Arc;

use tracing::Instrument;

use crate::backend::{TaskBackend, TaskOp, TaskOutcome, TaskStatus};
use crate::config::OrchestratorConfig;
use crate::error::{Result, SchedulerError};
use crate::job::{
    DistributedJob, ExtractionIdentifier, JobId, JobKind, PerformanceResult, ProbeResolution,
    SubJob,
};
use crate::orchestrator::ShutdownToken;
use crate::orchestrator::active::ActiveJobs;
use crate::registry::{WinnerRecord, WinnerRegistry};
use crate::replication::ArtifactReplicator;
use crate::results::{ResultsMessage, ResultsPublisher};
use crate::runner::Runner;
use crate::telemetry;

/// Score at which a probe wins the race outright.
pub const PERFECT_SCORE: f64 = 100.0;

/// Tolerance for float noise in scores reported as 100.
const PERFECT_EPSILON: f64 = 1e-9;

/// True when `score` counts as a perfect probe result.
pub fn is_perfect_score(score: f64) -> bool {
    score >= PERFECT_SCORE - PERFECT_EPSILON
}

/// Pick the winning sub-job index: highest score, earliest index on ties.
///
/// Returns `None` when no sub-job produced a score.
fn select_winner(sub_jobs: &[SubJob]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, sub) in sub_jobs.iter().enumerate() {
        let Some(score) = sub.score() else {
            continue;
        };
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}

/// Where a job's candidate race stands after a tick.
enum RaceState {
    /// Probes still running or retrying.
    InFlight,
    /// A winner was selected; holds its sub-job index.
    Winner(usize),
    /// Every probe resolved and none produced a score.
    Exhausted,
}

/// Races candidate methods with cheap probes, then trains the winner.
///
/// Per tick and per job: undispatched probes are dispatched, finished
/// probes are scored, and failed ones retried within their budget. A
/// perfect score short-circuits the race, cancelling every other
/// dispatched probe; otherwise the best score wins once all probes have
/// resolved. The winner then runs one full training task, and the job
/// publishes its artifact and exactly one terminal message.
pub struct TrainingOrchestrator {
    config: OrchestratorConfig,
    runner: Runner,
    replicator: ArtifactReplicator,
    registry: Arc<dyn WinnerRegistry>,
    publisher: Arc<dyn ResultsPublisher>,
    active: ActiveJobs,
}

impl TrainingOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        backend: Arc<dyn TaskBackend>,
        replicator: ArtifactReplicator,
        registry: Arc<dyn WinnerRegistry>,
        publisher: Arc<dyn ResultsPublisher>,
    ) -> Self {
        Self {
            config,
            runner: Runner::new(backend),
            replicator,
            registry,
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

    /// Accept a training job into the active set.
    pub async fn submit(&self, job: DistributedJob) -> Result<JobId> {
        if job.kind != JobKind::Train {
            return Err(SchedulerError::InvalidJob(format!(
                "training orchestrator received {} job {}",
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
            "training orchestrator started"
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("training orchestrator shutting down");
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
    /// A job whose race just concluded runs its full training inside this
    /// call, suspending on the task rather than spinning.
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
        telemetry::set_active_jobs(JobKind::Train.as_str(), self.active.len().await);
        completed
    }

    async fn step(&self, job: &mut DistributedJob) -> Option<ResultsMessage> {
        match self.advance_race(job).await {
            RaceState::InFlight => None,
            RaceState::Exhausted => {
                tracing::warn!(job_id = %job.id, "every probe failed, no winner to train");
                Some(ResultsMessage::failure(
                    job,
                    SchedulerError::NoSuitableMethod.to_string(),
                ))
            }
            RaceState::Winner(index) => Some(self.finalize(job, index).await),
        }
    }

    /// Advance each unresolved probe by one transition, in race order.
    async fn advance_race(&self, job: &mut DistributedJob) -> RaceState {
        let params = job.request.params.clone();
        let mut perfect = None;

        for index in 0..job.sub_jobs.len() {
            let sub = &mut job.sub_jobs[index];
            if sub.resolution.is_some() {
                continue;
            }

            if !sub.is_dispatched() {
                if let Err(err) = self.runner.dispatch(sub, TaskOp::Probe, &params).await {
                    tracing::warn!(
                        method = %sub.candidate.method_name,
                        error = %err,
                        "probe dispatch failed"
                    );
                    self.fail_or_retry(sub);
                }
                continue;
            }

            // The deadline applies whatever the poll returns, errors
            // included; a backend that stops answering cannot hold the
            // probe open.
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
                        self.fail_or_retry(sub);
                    }
                    continue;
                }
            };

            match status {
                TaskStatus::Pending | TaskStatus::Running => {
                    if expired {
                        self.runner.cancel(sub).await;
                        self.fail_or_retry(sub);
                    }
                }
                TaskStatus::Success => match self.runner.result(sub).await {
                    Ok(TaskOutcome::Performance { score }) => {
                        tracing::info!(
                            job_id = %job.id,
                            method = %sub.candidate.method_name,
                            score,
                            "probe scored"
                        );
                        sub.resolution =
                            Some(ProbeResolution::Scored(PerformanceResult { score }));
                        if is_perfect_score(score) {
                            // Short-circuit: later probes are not dispatched
                            // this tick and never will be.
                            perfect = Some(index);
                            break;
                        }
                    }
                    Ok(TaskOutcome::Completion { .. }) => {
                        tracing::warn!(
                            method = %sub.candidate.method_name,
                            "probe returned a completion outcome instead of a score"
                        );
                        self.fail_or_retry(sub);
                    }
                    Err(err) => {
                        tracing::warn!(
                            method = %sub.candidate.method_name,
                            error = %err,
                            "result fetch failed"
                        );
                        // The worker already finished; past the deadline the
                        // fetch loop ends, otherwise fetch again next tick
                        // without consuming a retry.
                        if expired {
                            self.fail_or_retry(sub);
                        }
                    }
                },
                TaskStatus::Failure => self.fail_or_retry(sub),
            }
        }

        if let Some(winner) = perfect {
            self.cancel_rivals(job, winner).await;
            return RaceState::Winner(winner);
        }

        if job.sub_jobs.iter().all(|sub| sub.resolution.is_some()) {
            return match select_winner(&job.sub_jobs) {
                Some(index) => RaceState::Winner(index),
                None => RaceState::Exhausted,
            };
        }

        RaceState::InFlight
    }

    /// Revoke every dispatched probe other than the winner's.
    async fn cancel_rivals(&self, job: &DistributedJob, winner: usize) {
        let mut cancelled = 0;
        for (index, sub) in job.sub_jobs.iter().enumerate() {
            if index == winner || !sub.is_dispatched() {
                continue;
            }
            self.runner.cancel(sub).await;
            telemetry::record_cancellation(&sub.candidate.method_name);
            cancelled += 1;
        }
        tracing::info!(
            job_id = %job.id,
            winner = %job.sub_jobs[winner].candidate.method_name,
            cancelled,
            "perfect score short-circuited the race"
        );
    }

    /// Run the winner's full training and build the terminal message.
    async fn finalize(&self, job: &mut DistributedJob, winner: usize) -> ResultsMessage {
        let (method_name, extraction, winning_score) = {
            let sub = &job.sub_jobs[winner];
            (
                sub.candidate.method_name.clone(),
                sub.candidate.extraction.clone(),
                sub.score(),
            )
        };
        tracing::info!(
            job_id = %job.id,
            method = %method_name,
            score = ?winning_score,
            "winner selected, starting full training"
        );

        // Single-shot: the full run gets a fresh handle and no retries.
        {
            let params = job.request.params.clone();
            let sub = &mut job.sub_jobs[winner];
            sub.handle = None;
            sub.dispatched_at = None;
            if let Err(err) = self.runner.dispatch(sub, TaskOp::Train, &params).await {
                tracing::error!(
                    job_id = %job.id,
                    method = %method_name,
                    error = %err,
                    "full training dispatch failed"
                );
                return ResultsMessage::failure(job, SchedulerError::NoSuitableMethod.to_string());
            }
        }

        let span = telemetry::final_training_span(job.id.to_string(), &method_name);
        let outcome = self
            .await_training(&job.sub_jobs[winner])
            .instrument(span)
            .await;

        match outcome {
            Ok(()) => {
                tracing::info!(
                    job_id = %job.id,
                    method = %method_name,
                    "full training completed"
                );
                self.publish_artifact(&extraction);
                if let Some(score) = winning_score {
                    let record = WinnerRecord::new(extraction.clone(), &method_name, score);
                    if let Err(err) = self.registry.record_winner(record).await {
                        tracing::warn!(
                            extraction = %extraction,
                            error = %err,
                            "winner record write failed"
                        );
                    }
                }
                ResultsMessage::success(job, None)
            }
            Err(reason) => {
                tracing::error!(
                    job_id = %job.id,
                    method = %method_name,
                    error = %reason,
                    "full training failed"
                );
                ResultsMessage::failure(job, SchedulerError::NoSuitableMethod.to_string())
            }
        }
    }

    /// Suspend until the dispatched training task reaches a terminal state.
    async fn await_training(&self, sub: &SubJob) -> std::result::Result<(), String> {
        let status = self
            .runner
            .await_terminal(
                sub,
                self.config.poll_interval(),
                self.config.final_training_deadline(),
            )
            .await
            .map_err(|err| err.to_string())?;

        if status != TaskStatus::Success {
            return Err(format!("training task ended with status {status}"));
        }

        match self.runner.result(sub).await {
            Ok(TaskOutcome::Completion { success: true, .. }) => Ok(()),
            Ok(TaskOutcome::Completion {
                success: false,
                error_message,
            }) => Err(error_message
                .unwrap_or_else(|| "training task failed".to_string())),
            Ok(TaskOutcome::Performance { score }) => {
                Err(format!("unexpected performance outcome with score {score}"))
            }
            Err(err) => Err(err.to_string()),
        }
    }

    /// Replicate the trained artifact in the background.
    ///
    /// Upload failure is logged and does not fail the job; the local copy
    /// stays authoritative.
    fn publish_artifact(&self, extraction: &ExtractionIdentifier) {
        let replicator = self.replicator.clone();
        let extraction = extraction.clone();
        let artifact_dir = self.config.artifact_dir(&extraction);
        tokio::spawn(async move {
            match replicator.publish(&extraction, &artifact_dir).await {
                Ok(()) => telemetry::record_artifact_transfer("upload", "ok"),
                Err(err) => {
                    telemetry::record_artifact_transfer("upload", "error");
                    tracing::warn!(
                        extraction = %extraction,
                        error = %err,
                        "artifact publish failed, keeping local copy"
                    );
                }
            }
        });
    }

    fn fail_or_retry(&self, sub: &mut SubJob) {
        if sub.retries_exhausted() {
            tracing::warn!(
                method = %sub.candidate.method_name,
                retry_count = sub.retry_count,
                "probe failed with retry budget spent"
            );
            sub.resolution = Some(ProbeResolution::Failed);
        } else {
            self.runner.prepare_retry(sub);
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

impl std::fmt::Debug for TrainingOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingOrchestrator")
            .field("config", &self.config)
            .field("replication", self.replicator.config())
            .finish_non_exhaustive()
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

use crate::backend::TaskHandle;
use crate::error::{Result, SchedulerError};

/// Unique identifier for a scheduled job.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl JobId {
    /// Create a new job ID using UUID v7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Names the extraction a job trains or serves: one run, one field.
///
/// The pair doubles as the remote-storage namespace for trained artifacts
/// and their completion signals.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ExtractionIdentifier {
    pub run_name: String,
    pub extraction_name: String,
}

impl ExtractionIdentifier {
    pub fn new(
        run_name: impl Into<String>,
        extraction_name: impl Into<String>,
    ) -> Self {
        Self {
            run_name: run_name.into(),
            extraction_name: extraction_name.into(),
        }
    }

    /// Storage namespace holding this extraction's artifact objects.
    pub fn namespace(&self) -> String {
        format!("{}/{}", self.run_name, self.extraction_name)
    }

    /// Name of the marker object written after a complete artifact upload.
    pub fn completion_signal_name(&self) -> String {
        format!("{}.completed", self.extraction_name)
    }
}

impl Display for ExtractionIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.run_name, self.extraction_name)
    }
}

/// One extraction method entered into a job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Identifier of the extraction method, e.g. `"fuzzy"` or `"setfit"`.
    pub method_name: String,
    /// Whether the method wants the GPU execution lane.
    pub requires_gpu: bool,
    /// Extraction this candidate trains or serves.
    pub extraction: ExtractionIdentifier,
}

impl Candidate {
    pub fn new(
        method_name: impl Into<String>,
        requires_gpu: bool,
        extraction: ExtractionIdentifier,
    ) -> Self {
        Self {
            method_name: method_name.into(),
            requires_gpu,
            extraction,
        }
    }
}

/// Request context carried from intake to the terminal record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub tenant: String,
    pub task: String,
    /// Opaque parameters echoed back on the outbound record.
    pub params: serde_json::Value,
}

impl TaskRequest {
    pub fn new(
        tenant: impl Into<String>,
        task: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            task: task.into(),
            params,
        }
    }
}

/// What a job is for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    /// Race candidate probes, then train the winner.
    Train,
    /// Run a single candidate's inference.
    Predict,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Train => "train",
            JobKind::Predict => "predict",
        }
    }
}

impl Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Score reported by a finished performance probe, on a 0-100 scale.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceResult {
    pub score: f64,
}

/// Terminal resolution of a probe's attempt series.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ProbeResolution {
    /// The probe finished and reported a score.
    Scored(PerformanceResult),
    /// The probe burned its retry budget without producing a score.
    Failed,
}

/// A candidate's live execution state within a job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubJob {
    /// The method being raced or served.
    pub candidate: Candidate,
    /// Backend handle of the current attempt. `None` until dispatched and
    /// after a retry reset.
    pub handle: Option<TaskHandle>,
    /// Retries consumed so far. Never exceeds `max_retries`.
    pub retry_count: u32,
    /// Retry budget for this sub-job.
    pub max_retries: u32,
    /// Monotonically increasing dispatch counter. Every submitted payload is
    /// tagged with it so a late report from an abandoned attempt is
    /// identifiable in logs.
    pub attempt: u32,
    /// When the current attempt was submitted.
    pub dispatched_at: Option<DateTime<Utc>>,
    /// How the race resolved this sub-job, once it did.
    pub resolution: Option<ProbeResolution>,
}

impl SubJob {
    pub fn new(candidate: Candidate, max_retries: u32) -> Self {
        Self {
            candidate,
            handle: None,
            retry_count: 0,
            max_retries,
            attempt: 0,
            dispatched_at: None,
            resolution: None,
        }
    }

    /// True while the current attempt holds a backend handle.
    pub fn is_dispatched(&self) -> bool {
        self.handle.is_some()
    }

    /// True once the retry budget is spent.
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Score recorded for this sub-job, if its probe succeeded.
    pub fn score(&self) -> Option<f64> {
        match self.resolution {
            Some(ProbeResolution::Scored(result)) => Some(result.score),
            _ => None,
        }
    }
}

/// A tracked unit of work: one request racing one or more candidates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DistributedJob {
    pub id: JobId,
    pub kind: JobKind,
    pub request: TaskRequest,
    /// Candidates in race order. Exactly one for prediction jobs.
    pub sub_jobs: Vec<SubJob>,
    pub start_time: DateTime<Utc>,
    /// Outbound queue the terminal record is routed to.
    pub queue_name: String,
}

/// Default outbound queue for terminal records.
pub const DEFAULT_RESULTS_QUEUE: &str = "results";

impl DistributedJob {
    /// Create a training job racing the given candidates in order.
    pub fn training(
        request: TaskRequest,
        candidates: Vec<Candidate>,
        max_retries: u32,
    ) -> Self {
        Self {
            id: JobId::new(),
            kind: JobKind::Train,
            request,
            sub_jobs: candidates
                .into_iter()
                .map(|candidate| SubJob::new(candidate, max_retries))
                .collect(),
            start_time: Utc::now(),
            queue_name: DEFAULT_RESULTS_QUEUE.to_string(),
        }
    }

    /// Create a prediction job for a single candidate.
    pub fn prediction(
        request: TaskRequest,
        candidate: Candidate,
        max_retries: u32,
    ) -> Self {
        Self {
            id: JobId::new(),
            kind: JobKind::Predict,
            request,
            sub_jobs: vec![SubJob::new(candidate, max_retries)],
            start_time: Utc::now(),
            queue_name: DEFAULT_RESULTS_QUEUE.to_string(),
        }
    }

    /// Route the terminal record to a different outbound queue.
    pub fn with_queue_name(mut self, queue_name: impl Into<String>) -> Self {
        self.queue_name = queue_name.into();
        self
    }

    /// Check the structural invariants for this job's kind.
    pub fn validate(&self) -> Result<()> {
        if self.sub_jobs.is_empty() {
            return Err(SchedulerError::InvalidJob(
                "job has no candidates".to_string(),
            ));
        }
        if self.kind == JobKind::Predict && self.sub_jobs.len() != 1 {
            return Err(SchedulerError::InvalidJob(format!(
                "prediction job must have exactly one candidate, got {}",
                self.sub_jobs.len()
            )));
        }
        Ok(())
    }

    /// Seconds since the job was accepted.
    pub fn elapsed_secs(&self) -> f64 {
        (Utc::now() - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}

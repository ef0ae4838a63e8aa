use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

use crate::job::ExtractionIdentifier;

/// Handle to a task accepted by the distributed backend.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TaskHandle(pub Uuid);

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskHandle {
    /// Create a new task handle using UUID v7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse lifecycle state the backend reports for a task.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Accepted but not yet picked up by a worker.
    Pending,
    /// Executing on a worker.
    Running,
    /// Finished; a result is available.
    Success,
    /// Finished without a usable result.
    Failure,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failure => "failure",
        }
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Hardware lane a task is submitted to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ExecutionLane {
    Gpu,
    Cpu,
}

impl ExecutionLane {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionLane::Gpu => "gpu",
            ExecutionLane::Cpu => "cpu",
        }
    }
}

impl Display for ExecutionLane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operation a submitted task performs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TaskOp {
    /// Cheap, bounded evaluation used to rank candidates.
    Probe,
    /// Full training of a single method.
    Train,
    /// Inference over the request's samples.
    Predict,
}

impl TaskOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOp::Probe => "probe",
            TaskOp::Train => "train",
            TaskOp::Predict => "predict",
        }
    }
}

impl Display for TaskOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything the backend needs to run one task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub op: TaskOp,
    pub method_name: String,
    pub extraction: ExtractionIdentifier,
    /// Opaque request parameters, forwarded untouched.
    pub params: serde_json::Value,
    /// Dispatch counter of the owning sub-job. A worker report tagged with
    /// an older attempt than the sub-job's current one is stale.
    pub attempt: u32,
}

/// Terminal output retrieved for a finished task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TaskOutcome {
    /// A performance probe finished with a score on the 0-100 scale.
    Performance { score: f64 },
    /// A training or prediction task finished, successfully or not.
    Completion {
        success: bool,
        error_message: Option<String>,
    },
}

/// Opaque distributed-task backend the scheduler submits work to.
///
/// The actual ML execution happens out of process; the scheduler only ever
/// holds handles and polls them. All methods are fallible at the transport
/// level; task-level failure is reported through [`TaskStatus::Failure`].
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Submit a task to the given lane, returning a handle for later polls.
    async fn submit(
        &self,
        lane: ExecutionLane,
        payload: TaskPayload,
    ) -> anyhow::Result<TaskHandle>;

    /// Report the current lifecycle status of a submitted task.
    async fn status(&self, handle: TaskHandle) -> anyhow::Result<TaskStatus>;

    /// Fetch the terminal outcome of a finished task.
    ///
    /// Only meaningful once `status` reported [`TaskStatus::Success`] or
    /// [`TaskStatus::Failure`].
    async fn result(&self, handle: TaskHandle) -> anyhow::Result<TaskOutcome>;

    /// Request cancellation of an in-flight task. Best effort: the task may
    /// still run to completion, and its late report must be ignored.
    async fn revoke(
        &self,
        handle: TaskHandle,
        terminate: bool,
    ) -> anyhow::Result<()>;
}

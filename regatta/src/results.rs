use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::job::DistributedJob;

/// Outcome notification sent back to the coordinating service.
///
/// This is the wire shape consumers deserialize; field names are part of
/// the outbound contract and must not change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultsMessage {
    pub tenant: String,
    pub task: String,
    pub params: serde_json::Value,
    pub success: bool,
    pub error_message: String,
    pub data_url: Option<String>,
}

impl ResultsMessage {
    /// Build a success message for `job`.
    ///
    /// Pure and infallible: echoes the job's request fields regardless of
    /// how consistent the rest of the job state is.
    pub fn success(job: &DistributedJob, data_url: Option<String>) -> Self {
        Self {
            tenant: job.request.tenant.clone(),
            task: job.request.task.clone(),
            params: job.request.params.clone(),
            success: true,
            error_message: String::new(),
            data_url,
        }
    }

    /// Build a failure message for `job` carrying `message`.
    ///
    /// Pure and infallible, same as [`ResultsMessage::success`].
    pub fn failure(job: &DistributedJob, message: impl Into<String>) -> Self {
        Self {
            tenant: job.request.tenant.clone(),
            task: job.request.task.clone(),
            params: job.request.params.clone(),
            success: false,
            error_message: message.into(),
            data_url: None,
        }
    }
}

/// A results message paired with the queue it was published to.
#[derive(Clone, Debug)]
pub struct OutboundResult {
    pub queue: String,
    pub message: ResultsMessage,
}

/// Sink for terminal job outcomes.
///
/// The orchestrators publish exactly one message per job through this
/// trait; implementations bridge to whatever transport the deployment
/// uses (message queue, HTTP callback, in-process channel).
#[async_trait]
pub trait ResultsPublisher: Send + Sync {
    /// Publish a terminal message to the named queue.
    async fn publish(&self, queue: &str, message: ResultsMessage) -> anyhow::Result<()>;
}

/// In-process results bus using a tokio broadcast channel.
///
/// Fan-out: every active subscriber receives every published message.
/// Publishing is non-blocking; a subscriber that falls behind receives
/// `RecvError::Lagged` instead of stalling the orchestrator, and messages
/// published with no subscribers are silently dropped.
pub struct InProcResultsBus {
    sender: broadcast::Sender<OutboundResult>,
    capacity: usize,
}

impl InProcResultsBus {
    /// Create a bus buffering up to `capacity` messages per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Subscribe to all messages published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundResult> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Configured channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for InProcResultsBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcResultsBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

#[async_trait]
impl ResultsPublisher for InProcResultsBus {
    async fn publish(&self, queue: &str, message: ResultsMessage) -> anyhow::Result<()> {
        let _ = self.sender.send(OutboundResult {
            queue: queue.to_string(),
            message,
        });
        Ok(())
    }
}

use thiserror::Error;

/// Errors produced while scheduling distributed training and prediction work.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The task backend rejected or lost a request. Retried per sub-job up
    /// to its `max_retries` budget, then converted into a terminal failure.
    #[error("transient backend error: {0}")]
    TransientBackend(String),

    /// The artifact payload could not be uploaded. Never fails the training
    /// outcome; the local copy stays usable, remote consumers may time out.
    #[error("artifact upload failed for {extraction}: {message}")]
    ArtifactUpload { extraction: String, message: String },

    /// Download failed after the completion signal was seen. Hard failure,
    /// not retried.
    #[error("artifact download failed for {extraction}: {message}")]
    ArtifactDownload { extraction: String, message: String },

    /// The completion signal never appeared within the polling budget.
    #[error("completion signal for {extraction} not seen after {attempts} attempts")]
    CompletionTimeout { extraction: String, attempts: u32 },

    /// Every training candidate failed or produced no usable score.
    #[error("No suitable method found or training failed")]
    NoSuitableMethod,

    /// A cooperative wait on a running task outlived its deadline.
    #[error("task did not reach a terminal status within {waited_secs}s")]
    DeadlineExceeded { waited_secs: u64 },

    /// The job shape violates a structural invariant.
    #[error("invalid job: {0}")]
    InvalidJob(String),
}

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

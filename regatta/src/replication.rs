use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};
use crate::job::ExtractionIdentifier;
use crate::storage::ObjectStorage;

/// Tuning for the completion-signal poll loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Base delay in seconds before the second poll.
    pub base_delay_secs: u64,
    /// Ceiling on the delay between polls, in seconds.
    pub max_delay_secs: u64,
    /// Number of polls before giving up.
    pub max_attempts: u32,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: 30,
            max_delay_secs: 900, // 15 minutes
            max_attempts: 10,
        }
    }
}

/// Computes the wait after the completion-signal poll number `attempt`.
///
/// Formula: delay = min(base_delay * 2^attempt, max_delay)
///
/// The sequence is non-decreasing; with the defaults it runs
/// 30s, 60s, 120s, 240s, 480s and stays capped at 900s from the sixth
/// attempt onward.
pub fn completion_poll_delay(attempt: u32, config: &ReplicationConfig) -> Duration {
    let scaled = (config.base_delay_secs as f64) * 2f64.powi(attempt.min(63) as i32);
    let capped = scaled.min(config.max_delay_secs as f64);
    Duration::from_secs_f64(capped.max(0.0))
}

/// Moves trained artifacts between processes through object storage.
///
/// Producer side uploads the artifact payload and only then writes the
/// completion signal; consumer side polls for the signal with exponential
/// backoff before downloading. The signal-after-payload ordering is the
/// correctness invariant: a consumer that sees the signal never reads a
/// partial artifact.
#[derive(Clone)]
pub struct ArtifactReplicator {
    storage: Arc<dyn ObjectStorage>,
    config: ReplicationConfig,
}

impl ArtifactReplicator {
    pub fn new(storage: Arc<dyn ObjectStorage>, config: ReplicationConfig) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Upload the artifact directory, then write the completion signal.
    ///
    /// On upload failure no signal is written: the local copy stays
    /// authoritative and remote consumers will time out instead of reading
    /// a partial artifact.
    pub async fn publish(
        &self,
        extraction: &ExtractionIdentifier,
        artifact_dir: &Path,
    ) -> Result<()> {
        let namespace = extraction.namespace();

        let uploaded = self
            .storage
            .upload_dir(&namespace, artifact_dir)
            .await
            .map_err(|err| SchedulerError::ArtifactUpload {
                extraction: extraction.to_string(),
                message: err.to_string(),
            })?;

        self.storage
            .upload_object(&namespace, &extraction.completion_signal_name(), Vec::new())
            .await
            .map_err(|err| SchedulerError::ArtifactUpload {
                extraction: extraction.to_string(),
                message: format!("completion signal write failed: {err}"),
            })?;

        tracing::info!(
            extraction = %extraction,
            objects = uploaded,
            "artifact published"
        );
        Ok(())
    }

    /// True when the completion signal is present for `extraction`.
    ///
    /// A transport error counts as "not present yet" and is logged; the
    /// poll loop treats it like any other missed attempt.
    pub async fn completion_signal_present(
        &self,
        extraction: &ExtractionIdentifier,
    ) -> bool {
        match self
            .storage
            .object_exists(
                &extraction.namespace(),
                &extraction.completion_signal_name(),
            )
            .await
        {
            Ok(present) => present,
            Err(err) => {
                tracing::warn!(
                    extraction = %extraction,
                    error = %err,
                    "completion signal check failed"
                );
                false
            }
        }
    }

    /// Wait for the completion signal, then download the artifact.
    ///
    /// Polls up to `max_attempts` times with exponential backoff between
    /// polls. Returns [`SchedulerError::CompletionTimeout`] with the attempt
    /// count when the signal never appears, and
    /// [`SchedulerError::ArtifactDownload`] when the download fails after
    /// the signal was seen; the download is never retried.
    pub async fn await_artifact(
        &self,
        extraction: &ExtractionIdentifier,
        local_dir: &Path,
    ) -> Result<usize> {
        let started = tokio::time::Instant::now();
        let mut signalled = false;
        for attempt in 0..self.config.max_attempts {
            if self.completion_signal_present(extraction).await {
                signalled = true;
                break;
            }
            // Delays only separate checks; after the last miss the timeout
            // surfaces immediately instead of sleeping one more backoff.
            if attempt + 1 < self.config.max_attempts {
                let delay = completion_poll_delay(attempt, &self.config);
                tracing::debug!(
                    extraction = %extraction,
                    attempt = attempt + 1,
                    delay_secs = delay.as_secs(),
                    "completion signal not present yet"
                );
                tokio::time::sleep(delay).await;
            }
        }

        if !signalled {
            crate::telemetry::observe_completion_wait("timeout", started.elapsed().as_secs_f64());
            return Err(SchedulerError::CompletionTimeout {
                extraction: extraction.to_string(),
                attempts: self.config.max_attempts,
            });
        }
        crate::telemetry::observe_completion_wait("found", started.elapsed().as_secs_f64());

        let fetched = self
            .storage
            .download_dir(&extraction.namespace(), local_dir)
            .await
            .map_err(|err| {
                crate::telemetry::record_artifact_transfer("download", "error");
                SchedulerError::ArtifactDownload {
                    extraction: extraction.to_string(),
                    message: err.to_string(),
                }
            })?;
        crate::telemetry::record_artifact_transfer("download", "ok");

        tracing::info!(
            extraction = %extraction,
            objects = fetched,
            "artifact replicated locally"
        );
        Ok(fetched)
    }
}

impl std::fmt::Debug for ArtifactReplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactReplicator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

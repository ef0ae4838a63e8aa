use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::job::ExtractionIdentifier;

/// Configuration shared by the prediction and training orchestrators.
///
/// Controls tick pacing, per-task deadlines, and where artifacts and
/// suggestion links point.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Milliseconds between scheduler ticks.
    pub poll_interval_ms: u64,
    /// Optional deadline in seconds for a single dispatched sub-job.
    /// A sub-job still running past this is cancelled and treated as failed.
    pub sub_job_deadline_secs: Option<u64>,
    /// Deadline in seconds for the winner's full training run.
    pub final_training_deadline_secs: u64,
    /// Base URL of the coordinating service, used to build suggestion links.
    pub service_url: String,
    /// Local directory holding per-extraction artifact directories.
    pub artifact_root: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            sub_job_deadline_secs: None,
            final_training_deadline_secs: 21_600, // 6 hours
            service_url: "http://localhost:5056".to_string(),
            artifact_root: PathBuf::from("./models"),
        }
    }
}

impl OrchestratorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sub_job_deadline(&self) -> Option<Duration> {
        self.sub_job_deadline_secs.map(Duration::from_secs)
    }

    pub fn final_training_deadline(&self) -> Duration {
        Duration::from_secs(self.final_training_deadline_secs)
    }

    /// Where downstream consumers fetch the suggestions produced for
    /// `extraction`.
    pub fn suggestions_url(&self, extraction: &ExtractionIdentifier) -> String {
        format!(
            "{}/get_suggestions/{}/{}",
            self.service_url.trim_end_matches('/'),
            extraction.run_name,
            extraction.extraction_name
        )
    }

    /// Local directory where the artifact for `extraction` is written.
    pub fn artifact_dir(&self, extraction: &ExtractionIdentifier) -> PathBuf {
        self.artifact_root
            .join(&extraction.run_name)
            .join(&extraction.extraction_name)
    }
}

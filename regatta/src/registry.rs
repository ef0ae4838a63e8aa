use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::ExtractionIdentifier;

/// Winning method descriptor persisted after a training race.
///
/// Future predictions for the extraction load this record to pick the
/// method without re-racing candidates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WinnerRecord {
    pub extraction: ExtractionIdentifier,
    pub method_name: String,
    pub score: f64,
    pub decided_at: DateTime<Utc>,
}

impl WinnerRecord {
    pub fn new(extraction: ExtractionIdentifier, method_name: impl Into<String>, score: f64) -> Self {
        Self {
            extraction,
            method_name: method_name.into(),
            score,
            decided_at: Utc::now(),
        }
    }
}

/// Store for winning method descriptors, keyed by extraction.
#[async_trait]
pub trait WinnerRegistry: Send + Sync {
    /// Persist `record`, replacing any previous winner for its extraction.
    async fn record_winner(&self, record: WinnerRecord) -> anyhow::Result<()>;

    /// Load the recorded winner for `extraction`, if any.
    async fn winner_for(
        &self,
        extraction: &ExtractionIdentifier,
    ) -> anyhow::Result<Option<WinnerRecord>>;
}

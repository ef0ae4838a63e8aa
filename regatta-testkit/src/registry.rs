use async_trait::async_trait;
use parking_lot::Mutex;
use regatta::*;
use std::sync::Arc;

/// In-memory [`WinnerRegistry`] keeping at most one record per extraction.
#[derive(Clone)]
pub struct InMemoryWinnerRegistry {
    records: Arc<Mutex<Vec<WinnerRecord>>>,
}

impl InMemoryWinnerRegistry {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn records(&self) -> Vec<WinnerRecord> {
        self.records.lock().clone()
    }

    /// Recorded winner for `extraction`, without going through the trait.
    pub fn winner(&self, extraction: &ExtractionIdentifier) -> Option<WinnerRecord> {
        self.records
            .lock()
            .iter()
            .find(|record| &record.extraction == extraction)
            .cloned()
    }

    pub fn assert_record_count_eq(&self, expected: usize) {
        assert_eq!(
            self.records.lock().len(),
            expected,
            "Expected {} winner records, got {}",
            expected,
            self.records.lock().len()
        );
    }
}

impl Default for InMemoryWinnerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WinnerRegistry for InMemoryWinnerRegistry {
    async fn record_winner(&self, record: WinnerRecord) -> anyhow::Result<()> {
        let mut records = self.records.lock();
        records.retain(|existing| existing.extraction != record.extraction);
        records.push(record);
        Ok(())
    }

    async fn winner_for(
        &self,
        extraction: &ExtractionIdentifier,
    ) -> anyhow::Result<Option<WinnerRecord>> {
        Ok(self.winner(extraction))
    }
}

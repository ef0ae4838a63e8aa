use async_trait::async_trait;
use parking_lot::Mutex;
use regatta::*;
use std::sync::Arc;

/// [`ResultsPublisher`] that keeps every published message for assertions.
#[derive(Clone)]
pub struct RecordingResultsBus {
    messages: Arc<Mutex<Vec<OutboundResult>>>,
}

impl RecordingResultsBus {
    pub fn new() -> Self {
        Self {
            messages: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn messages(&self) -> Vec<OutboundResult> {
        self.messages.lock().clone()
    }

    pub fn last(&self) -> Option<OutboundResult> {
        self.messages.lock().last().cloned()
    }

    pub fn assert_message_count_eq(&self, expected: usize) {
        assert_eq!(
            self.messages.lock().len(),
            expected,
            "Expected {} messages, got {}",
            expected,
            self.messages.lock().len()
        );
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl Default for RecordingResultsBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultsPublisher for RecordingResultsBus {
    async fn publish(
        &self,
        queue: &str,
        message: ResultsMessage,
    ) -> anyhow::Result<()> {
        self.messages.lock().push(OutboundResult {
            queue: queue.to_string(),
            message,
        });
        Ok(())
    }
}

//! Deterministic field producer for tests and offline runs.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::ExtractionError;
use crate::stages::extraction::FieldProducer;

/// Returns a fixed response (or error) without any network call and
/// records how it was called.
#[derive(Debug)]
pub struct MockProducer {
    reply: Result<String, ExtractionError>,
    calls: AtomicUsize,
    last_model: Mutex<Option<String>>,
}

impl MockProducer {
    pub fn with_response(response: impl Into<String>) -> Self {
        Self::new(Ok(response.into()))
    }

    pub fn failing(error: ExtractionError) -> Self {
        Self::new(Err(error))
    }

    fn new(reply: Result<String, ExtractionError>) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            last_model: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_model(&self) -> Option<String> {
        self.last_model.lock().ok().and_then(|m| m.clone())
    }
}

#[async_trait]
impl FieldProducer for MockProducer {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn produce_fields(&self, _raw_text: &str, model: &str) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_model.lock() {
            *last = Some(model.to_string());
        }
        self.reply.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_records_calls() {
        let producer = MockProducer::with_response("{}");
        assert_eq!(producer.produce_fields("text", "m1").await.unwrap(), "{}");
        assert_eq!(producer.call_count(), 1);
        assert_eq!(producer.last_model().as_deref(), Some("m1"));
    }
}

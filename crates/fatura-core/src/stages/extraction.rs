//! Extraction: raw text to the structured field set.

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{ExtractionError, panic_message};
use crate::models::invoice::{FieldName, InvoiceFields};
use crate::models::stage::{AgentName, StageResult, Staged};

/// A semantic collaborator that reads invoice text and answers with a JSON
/// object holding the four invoice fields.
#[async_trait]
pub trait FieldProducer: Send + Sync {
    /// Short identifier recorded in the stage input.
    fn name(&self) -> &'static str;

    /// Return the collaborator's raw response content for `raw_text`.
    async fn produce_fields(&self, raw_text: &str, model: &str) -> Result<String, ExtractionError>;
}

/// Parse a collaborator response into a field set.
///
/// Accepts bare JSON, JSON in a markdown code block, or JSON embedded in
/// surrounding prose. Unknown keys are dropped.
pub fn parse_response(response: &str) -> Result<InvoiceFields, ExtractionError> {
    let body = strip_code_fence(response);

    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(first) => {
            let slice = object_slice(body)
                .ok_or_else(|| ExtractionError::InvalidResponse(format!("not JSON: {}", first)))?;
            serde_json::from_str(slice)
                .map_err(|e| ExtractionError::InvalidResponse(format!("JSON parse error: {}", e)))?
        }
    };

    let object = value
        .as_object()
        .ok_or_else(|| ExtractionError::InvalidResponse("expected a JSON object".to_string()))?;

    for key in object.keys().filter(|k| FieldName::from_key(k).is_none()) {
        debug!("Dropping unknown field {:?}", key);
    }

    Ok(InvoiceFields::from_json_object(object))
}

fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn object_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Runs a [`FieldProducer`] and packages the outcome as a stage result.
pub struct ExtractionStage<'a> {
    producer: &'a dyn FieldProducer,
}

impl<'a> ExtractionStage<'a> {
    pub fn new(producer: &'a dyn FieldProducer) -> Self {
        Self { producer }
    }

    /// Collaborator failures, panics and unparsable responses become an
    /// `error` result; nothing propagates.
    pub async fn extract(&self, raw_text: &str, model: &str) -> Staged<InvoiceFields> {
        let start = Instant::now();
        let input = json!({
            "raw_text_length": raw_text.chars().count(),
            "producer": self.producer.name(),
            "model": model,
        });

        let call = AssertUnwindSafe(self.producer.produce_fields(raw_text, model))
            .catch_unwind()
            .await;
        let outcome = match call {
            Ok(Ok(response)) => parse_response(&response),
            Ok(Err(e)) => Err(e),
            Err(panic) => Err(ExtractionError::Panicked(panic_message(panic.as_ref()))),
        };
        let elapsed = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(fields) => {
                let missing = fields.missing_fields();
                if !missing.is_empty() {
                    debug!("Extraction left {} field(s) missing", missing.len());
                }
                match serde_json::to_value(&fields) {
                    Ok(output) => Staged::new(
                        StageResult::success(AgentName::Extraction, input, output).with_duration_ms(elapsed),
                        Some(fields),
                    ),
                    Err(e) => Staged::new(
                        StageResult::error(AgentName::Extraction, input, e.to_string()).with_duration_ms(elapsed),
                        None,
                    ),
                }
            }
            Err(e) => {
                warn!("Extraction via {} failed: {}", self.producer.name(), e);
                Staged::new(
                    StageResult::error(AgentName::Extraction, input, e.to_string()).with_duration_ms(elapsed),
                    None,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockProducer;
    use crate::models::invoice::Field;
    use crate::models::stage::StageStatus;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_parse_plain_json() {
        let fields = parse_response(
            r#"{"biller_name": "Acme Co", "biller_address": "123 Main St", "total_amount": 120.50, "due_date": "2024-05-01"}"#,
        )
        .unwrap();

        assert_eq!(fields.biller_name, Field::Present("Acme Co".to_string()));
        assert_eq!(fields.total_amount, Field::Present(Decimal::from_str("120.50").unwrap()));
        assert_eq!(fields.due_date, Field::Present(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()));
    }

    #[test]
    fn test_parse_fenced_json() {
        let response = "```json\n{\"biller_name\": \"شركة النور\", \"due_date\": null}\n```";
        let fields = parse_response(response).unwrap();

        assert_eq!(fields.biller_name, Field::Present("شركة النور".to_string()));
        assert!(fields.due_date.is_missing());
        assert!(fields.total_amount.is_missing());
    }

    #[test]
    fn test_parse_json_inside_prose() {
        let response = "Here is the data: {\"total_amount\": \"SAR 1,250.00\", \"vendor_tax_id\": \"3001\"} hope it helps";
        let fields = parse_response(response).unwrap();

        assert_eq!(fields.total_amount, Field::Present(Decimal::from_str("1250.00").unwrap()));
        assert_eq!(fields.missing_fields().len(), 3);
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(matches!(parse_response("[1, 2]"), Err(ExtractionError::InvalidResponse(_))));
        assert!(matches!(parse_response("no json here"), Err(ExtractionError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_extract_success() {
        let producer = MockProducer::with_response(r#"{"biller_name": "Acme Co", "due_date": "01/05/2024"}"#);
        let staged = ExtractionStage::new(&producer).extract("Acme Co ...", "mock-model").await;

        assert_eq!(staged.result.status(), StageStatus::Success);
        assert_eq!(staged.result.input()["model"], "mock-model");
        let output = staged.result.output().unwrap();
        assert_eq!(output["due_date"], "2024-05-01");
        assert_eq!(output["total_amount"], Value::Null);
        assert!(staged.value.is_some());
    }

    #[tokio::test]
    async fn test_extract_service_failure_is_error() {
        let producer = MockProducer::failing(ExtractionError::Service("connection refused".to_string()));
        let staged = ExtractionStage::new(&producer).extract("text", "mock-model").await;

        assert_eq!(staged.result.status(), StageStatus::Error);
        assert!(staged.result.output().is_none());
        assert!(staged.result.errors()[0].contains("connection refused"));
    }

    #[tokio::test]
    async fn test_extract_garbage_response_is_error() {
        let producer = MockProducer::with_response("I could not read this invoice.");
        let staged = ExtractionStage::new(&producer).extract("text", "mock-model").await;

        assert_eq!(staged.result.status(), StageStatus::Error);
        assert!(staged.value.is_none());
    }

    struct PanickingProducer;

    #[async_trait]
    impl FieldProducer for PanickingProducer {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn produce_fields(&self, _raw_text: &str, _model: &str) -> Result<String, ExtractionError> {
            panic!("llm client blew up")
        }
    }

    #[tokio::test]
    async fn test_extract_producer_panic_is_error() {
        let staged = ExtractionStage::new(&PanickingProducer).extract("text", "mock-model").await;

        assert_eq!(staged.result.status(), StageStatus::Error);
        assert!(staged.value.is_none());
        assert_eq!(staged.result.errors(), ["field producer panicked: llm client blew up"]);
    }

    #[tokio::test]
    async fn test_extract_keeps_amount_precision() {
        let producer = MockProducer::with_response(r#"{"total_amount": "12345678901234567.89"}"#);
        let staged = ExtractionStage::new(&producer).extract("text", "mock-model").await;

        let output = staged.result.output().unwrap();
        assert_eq!(output["total_amount"], "12345678901234567.89");

        let reread: InvoiceFields = serde_json::from_value(output.clone()).unwrap();
        assert_eq!(
            reread.total_amount,
            Field::Present(Decimal::from_str("12345678901234567.89").unwrap())
        );
    }
}

//! Offline, rule-based field producer.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::ExtractionError;
use crate::models::invoice::FieldName;
use crate::script::normalize_digits;
use crate::stages::extraction::FieldProducer;

use super::rules::{
    AmountExtractor, FieldExtractor, find_due_date, format_amount, format_date,
    patterns::{ADDRESS, BILLER, DATE_DMY, DATE_YMD, NON_NAME_LINE, STREET_HINT},
};

/// Model selector that picks [`RuleBasedProducer`] instead of a language model.
pub const RULES_MODEL: &str = "rules";

/// Produces the four invoice fields from labeled patterns in English and
/// Arabic text. Fields it cannot find are `null`.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedProducer {
    amounts: AmountExtractor,
}

impl RuleBasedProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract the field set as a JSON object keyed by field name.
    pub fn parse(&self, text: &str) -> Map<String, Value> {
        let text = normalize_digits(text);
        info!("Parsing invoice from {} characters of text", text.len());

        let biller_name = self.extract_biller_name(&text);
        let biller_address = self.extract_address(&text);
        let total_amount = self.amounts.extract(&text).map(|m| format_amount(m.value));
        let due_date = find_due_date(&text).map(|m| format_date(m.value));

        let mut fields = Map::new();
        for (name, value) in [
            (FieldName::BillerName, biller_name),
            (FieldName::BillerAddress, biller_address),
            (FieldName::TotalAmount, total_amount),
            (FieldName::DueDate, due_date),
        ] {
            if value.is_none() {
                debug!("Rules found no {}", name);
            }
            fields.insert(name.to_string(), value.map_or(Value::Null, Value::String));
        }
        fields
    }

    fn extract_biller_name(&self, text: &str) -> Option<String> {
        if let Some(caps) = BILLER.captures(text) {
            return Some(caps[1].trim().to_string());
        }

        // First line that reads like a name rather than a label, amount,
        // date or street.
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .find(|l| {
                l.chars().any(char::is_alphabetic)
                    && !NON_NAME_LINE.is_match(l)
                    && !STREET_HINT.is_match(l)
                    && !DATE_DMY.is_match(l)
                    && !DATE_YMD.is_match(l)
                    && !l.contains(':')
            })
            .map(str::to_string)
    }

    fn extract_address(&self, text: &str) -> Option<String> {
        if let Some(caps) = ADDRESS.captures(text) {
            return Some(caps[1].trim().to_string());
        }

        text.lines()
            .map(str::trim)
            .find(|l| STREET_HINT.is_match(l) && !NON_NAME_LINE.is_match(l))
            .map(str::to_string)
    }
}

#[async_trait]
impl FieldProducer for RuleBasedProducer {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn produce_fields(&self, raw_text: &str, _model: &str) -> Result<String, ExtractionError> {
        let fields = self.parse(raw_text);
        serde_json::to_string(&fields).map_err(|e| ExtractionError::InvalidResponse(e.to_string()))
    }
}

//! Validation: required-field, type and format rules over the field set.

use std::time::Instant;

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

use crate::models::invoice::{Field, FieldName, InvoiceFields};
use crate::models::stage::{AgentName, StageResult, Staged};

/// What is wrong with a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    Missing,
    Empty,
    NotANumber,
    Negative,
    InvalidDate,
    Unreadable,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Empty => "empty",
            Self::NotANumber => "not a number",
            Self::Negative => "negative",
            Self::InvalidDate => "not a valid date",
            Self::Unreadable => "unreadable",
        }
    }
}

/// One violated rule. Displays as `"<field> <problem>"`, e.g. `due_date missing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: FieldName,
    pub kind: ViolationKind,
}

impl FieldViolation {
    pub fn new(field: FieldName, kind: ViolationKind) -> Self {
        Self { field, kind }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.field, self.kind.as_str())
    }
}

/// Outcome of validation. Valid exactly when there are no violations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationVerdict {
    violations: Vec<FieldViolation>,
}

impl ValidationVerdict {
    pub fn from_violations(violations: Vec<FieldViolation>) -> Self {
        Self { violations }
    }

    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    /// Human-readable errors in rule order.
    pub fn errors(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }
}

impl Serialize for ValidationVerdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ValidationVerdict", 2)?;
        state.serialize_field("is_valid", &self.is_valid())?;
        state.serialize_field("errors", &self.errors())?;
        state.end()
    }
}

/// Check every rule and collect all violations, in field order.
pub fn check(fields: &InvoiceFields) -> ValidationVerdict {
    let mut violations = Vec::new();

    match &fields.biller_name {
        Field::Missing => violations.push(FieldViolation::new(FieldName::BillerName, ViolationKind::Missing)),
        Field::Present(name) if name.trim().is_empty() => {
            violations.push(FieldViolation::new(FieldName::BillerName, ViolationKind::Empty))
        }
        Field::Present(_) => {}
        Field::Invalid(_) => violations.push(FieldViolation::new(FieldName::BillerName, ViolationKind::Unreadable)),
    }

    match &fields.biller_address {
        Field::Missing => violations.push(FieldViolation::new(FieldName::BillerAddress, ViolationKind::Missing)),
        Field::Present(_) => {}
        Field::Invalid(_) => {
            violations.push(FieldViolation::new(FieldName::BillerAddress, ViolationKind::Unreadable))
        }
    }

    match &fields.total_amount {
        Field::Missing => violations.push(FieldViolation::new(FieldName::TotalAmount, ViolationKind::Missing)),
        Field::Present(amount) if amount.is_sign_negative() && !amount.is_zero() => {
            violations.push(FieldViolation::new(FieldName::TotalAmount, ViolationKind::Negative))
        }
        Field::Present(_) => {}
        Field::Invalid(_) => violations.push(FieldViolation::new(FieldName::TotalAmount, ViolationKind::NotANumber)),
    }

    match &fields.due_date {
        Field::Missing => violations.push(FieldViolation::new(FieldName::DueDate, ViolationKind::Missing)),
        Field::Present(_) => {}
        Field::Invalid(_) => violations.push(FieldViolation::new(FieldName::DueDate, ViolationKind::InvalidDate)),
    }

    ValidationVerdict::from_violations(violations)
}

/// Validate a field set. `success` when valid, `failed` with one error per
/// violated rule otherwise. The verdict is the output either way.
pub fn validate(fields: &InvoiceFields) -> Staged<ValidationVerdict> {
    let start = Instant::now();
    let input = serde_json::to_value(fields).unwrap_or_default();
    let verdict = check(fields);
    let output = serde_json::to_value(&verdict).unwrap_or_default();
    let elapsed = start.elapsed().as_millis() as u64;

    let result = if verdict.is_valid() {
        StageResult::success(AgentName::Validation, input, output)
    } else {
        StageResult::failed(AgentName::Validation, input, Some(output), verdict.errors())
    };

    Staged::new(result.with_duration_ms(elapsed), Some(verdict))
}

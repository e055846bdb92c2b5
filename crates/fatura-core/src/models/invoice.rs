//! Invoice field set produced by extraction and checked by validation.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::PersistenceError;
use crate::invoice::rules::{format_date, parse_amount, parse_date};

/// One extracted field.
///
/// `Missing` means the collaborator could not find the field at all;
/// `Invalid` keeps the raw text of a value that was present but could not be
/// read as the field's type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Field<T> {
    #[default]
    Missing,
    Present(T),
    Invalid(String),
}

impl<T> Field<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Present(v) => Some(v),
            _ => None,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Missing, Self::Present)
    }
}

/// Conversion between a typed field value and its JSON form.
pub trait FieldValue: Sized {
    /// Read a JSON value that is known not to be a "missing" marker.
    fn from_json(value: &Value) -> Field<Self>;

    /// Render the value as JSON.
    fn to_json(&self) -> Value;
}

/// Strings that collaborators use to say "not found".
fn is_missing_marker(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "" | "null" | "none" | "n/a" | "na" | "missing" | "unknown"
        ),
        _ => false,
    }
}

impl FieldValue for String {
    fn from_json(value: &Value) -> Field<Self> {
        match value {
            Value::String(s) => Field::Present(s.trim().to_string()),
            Value::Number(n) => Field::Present(n.to_string()),
            Value::Bool(b) => Field::Present(b.to_string()),
            other => Field::Invalid(other.to_string()),
        }
    }

    fn to_json(&self) -> Value {
        Value::String(self.clone())
    }
}

impl FieldValue for Decimal {
    fn from_json(value: &Value) -> Field<Self> {
        match value {
            Value::Number(n) => {
                let raw = n.to_string();
                Decimal::from_str(&raw)
                    .or_else(|_| Decimal::from_scientific(&raw))
                    .map_or(Field::Invalid(raw), Field::Present)
            }
            Value::String(s) => parse_amount(s).map_or_else(|| Field::Invalid(s.clone()), Field::Present),
            other => Field::Invalid(other.to_string()),
        }
    }

    // As a string, like rust_decimal's serde form; a JSON number would
    // round through f64.
    fn to_json(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl FieldValue for NaiveDate {
    fn from_json(value: &Value) -> Field<Self> {
        match value {
            Value::String(s) => parse_date(s).map_or_else(|| Field::Invalid(s.clone()), Field::Present),
            other => Field::Invalid(other.to_string()),
        }
    }

    fn to_json(&self) -> Value {
        Value::String(format_date(*self))
    }
}

impl<T: FieldValue> Field<T> {
    /// Read a field from a collaborator's JSON value.
    pub fn from_json(value: &Value) -> Self {
        if is_missing_marker(value) {
            Self::Missing
        } else {
            T::from_json(value)
        }
    }

    /// JSON form: `null`, the typed value, or the raw invalid text.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Missing => Value::Null,
            Self::Present(v) => v.to_json(),
            Self::Invalid(raw) => Value::String(raw.clone()),
        }
    }
}

impl<T: FieldValue> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de, T: FieldValue> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_json(&value))
    }
}

/// Names of the four recognized invoice fields, in validation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    BillerName,
    BillerAddress,
    TotalAmount,
    DueDate,
}

impl FieldName {
    /// All fields in their stable order.
    pub const ALL: [FieldName; 4] = [
        FieldName::BillerName,
        FieldName::BillerAddress,
        FieldName::TotalAmount,
        FieldName::DueDate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BillerName => "biller_name",
            Self::BillerAddress => "biller_address",
            Self::TotalAmount => "total_amount",
            Self::DueDate => "due_date",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == key)
    }
}

impl std::fmt::Display for FieldName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured extraction target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceFields {
    /// Company or person that issued the invoice.
    pub biller_name: Field<String>,
    /// Postal address of the biller.
    pub biller_address: Field<String>,
    /// Final payable amount, tax included.
    pub total_amount: Field<Decimal>,
    /// Payment due date (not the issue date).
    pub due_date: Field<NaiveDate>,
}

impl InvoiceFields {
    /// Build a field set from a JSON object, keeping only recognized keys.
    /// Keys the object lacks become [`Field::Missing`].
    pub fn from_json_object(object: &serde_json::Map<String, Value>) -> Self {
        let get = |name: FieldName| object.get(name.as_str()).unwrap_or(&Value::Null);
        Self {
            biller_name: Field::from_json(get(FieldName::BillerName)),
            biller_address: Field::from_json(get(FieldName::BillerAddress)),
            total_amount: Field::from_json(get(FieldName::TotalAmount)),
            due_date: Field::from_json(get(FieldName::DueDate)),
        }
    }

    /// Fields that are [`Field::Missing`], in stable order.
    pub fn missing_fields(&self) -> Vec<FieldName> {
        let missing = [
            self.biller_name.is_missing(),
            self.biller_address.is_missing(),
            self.total_amount.is_missing(),
            self.due_date.is_missing(),
        ];
        FieldName::ALL
            .into_iter()
            .zip(missing)
            .filter_map(|(name, is_missing)| is_missing.then_some(name))
            .collect()
    }
}

/// A complete invoice that passed validation, as handed to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub biller_name: String,
    pub biller_address: String,
    pub total_amount: Decimal,
    pub due_date: NaiveDate,
}

impl TryFrom<&InvoiceFields> for InvoiceRecord {
    type Error = PersistenceError;

    fn try_from(fields: &InvoiceFields) -> Result<Self, Self::Error> {
        let incomplete = |name: FieldName| PersistenceError::InvalidRecord(format!("{} is not usable", name));

        let biller_name = fields
            .biller_name
            .value()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| incomplete(FieldName::BillerName))?;
        let biller_address = fields
            .biller_address
            .value()
            .ok_or_else(|| incomplete(FieldName::BillerAddress))?;
        let total_amount = fields
            .total_amount
            .value()
            .filter(|a| !a.is_sign_negative())
            .ok_or_else(|| incomplete(FieldName::TotalAmount))?;
        let due_date = fields
            .due_date
            .value()
            .ok_or_else(|| incomplete(FieldName::DueDate))?;

        Ok(Self {
            biller_name: biller_name.trim().to_string(),
            biller_address: biller_address.clone(),
            total_amount: *total_amount,
            due_date: *due_date,
        })
    }
}

//! Persistence of validated invoices.
//!
//! Stores own their format and idempotency: writing the same idempotency
//! key twice returns the existing record instead of storing a copy.

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::models::invoice::InvoiceRecord;

/// A record as kept in the record set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredInvoice {
    /// 1-based position in the record set.
    pub id: u64,
    pub idempotency_key: String,
    #[serde(flatten)]
    pub record: InvoiceRecord,
    pub created_at: DateTime<Utc>,
    pub status: String,
}

impl StoredInvoice {
    pub const STATUS_STORED: &'static str = "stored";

    fn new(id: u64, idempotency_key: &str, record: &InvoiceRecord) -> Self {
        Self {
            id,
            idempotency_key: idempotency_key.to_string(),
            record: record.clone(),
            created_at: Utc::now(),
            status: Self::STATUS_STORED.to_string(),
        }
    }
}

/// Confirmation of a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReceipt {
    pub record_id: u64,
    /// The key was already stored; nothing new was written.
    pub duplicate: bool,
    pub message: String,
}

impl WriteReceipt {
    fn stored(record_id: u64) -> Self {
        Self {
            record_id,
            duplicate: false,
            message: "invoice stored".to_string(),
        }
    }

    fn duplicate(record_id: u64) -> Self {
        Self {
            record_id,
            duplicate: true,
            message: "invoice already stored".to_string(),
        }
    }
}

/// Append-only invoice record set.
pub trait InvoiceStore: Send + Sync {
    /// Short identifier recorded in the stage input.
    fn name(&self) -> &'static str;

    /// Store `record` under `idempotency_key`.
    fn write(&self, record: &InvoiceRecord, idempotency_key: &str) -> Result<WriteReceipt, PersistenceError>;

    /// All stored records in insertion order.
    fn records(&self) -> Result<Vec<StoredInvoice>, PersistenceError>;
}

/// Shared append logic over an in-memory record list.
fn append(records: &mut Vec<StoredInvoice>, record: &InvoiceRecord, idempotency_key: &str) -> WriteReceipt {
    if let Some(existing) = records.iter().find(|r| r.idempotency_key == idempotency_key) {
        return WriteReceipt::duplicate(existing.id);
    }
    let id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
    records.push(StoredInvoice::new(id, idempotency_key, record));
    WriteReceipt::stored(id)
}

//! In-process store.

use std::sync::Mutex;

use super::{InvoiceStore, StoredInvoice, WriteReceipt, append};
use crate::error::PersistenceError;
use crate::models::invoice::InvoiceRecord;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<StoredInvoice>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InvoiceStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn write(&self, record: &InvoiceRecord, idempotency_key: &str) -> Result<WriteReceipt, PersistenceError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| PersistenceError::Corrupt("store lock poisoned".to_string()))?;
        Ok(append(&mut records, record, idempotency_key))
    }

    fn records(&self) -> Result<Vec<StoredInvoice>, PersistenceError> {
        self.records
            .lock()
            .map(|r| r.clone())
            .map_err(|_| PersistenceError::Corrupt("store lock poisoned".to_string()))
    }
}

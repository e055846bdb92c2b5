//! JSON array file store.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use super::{InvoiceStore, StoredInvoice, WriteReceipt, append};
use crate::error::PersistenceError;
use crate::models::invoice::InvoiceRecord;

/// Keeps every record in one pretty-printed JSON array. Writes replace the
/// file atomically.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<StoredInvoice>, PersistenceError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content)
            .map_err(|e| PersistenceError::Corrupt(format!("{}: {}", self.path.display(), e)))
    }

    fn save(&self, records: &[StoredInvoice]) -> Result<(), PersistenceError> {
        let content = serde_json::to_string_pretty(records)
            .map_err(|e| PersistenceError::Corrupt(e.to_string()))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(content.as_bytes())?;
        file.persist(&self.path).map_err(|e| PersistenceError::Io(e.error))?;
        Ok(())
    }
}

impl InvoiceStore for JsonFileStore {
    fn name(&self) -> &'static str {
        "json_file"
    }

    fn write(&self, record: &InvoiceRecord, idempotency_key: &str) -> Result<WriteReceipt, PersistenceError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| PersistenceError::Corrupt("store lock poisoned".to_string()))?;

        let mut records = self.load()?;
        let receipt = append(&mut records, record, idempotency_key);

        if receipt.duplicate {
            debug!("Record {} already stored under {}", receipt.record_id, idempotency_key);
        } else {
            self.save(&records)?;
            info!("Stored invoice {} in {}", receipt.record_id, self.path.display());
        }
        Ok(receipt)
    }

    fn records(&self) -> Result<Vec<StoredInvoice>, PersistenceError> {
        self.load()
    }
}

//! Data models shared by the pipeline stages.

pub mod config;
pub mod invoice;
pub mod stage;

pub use config::FaturaConfig;
pub use invoice::{Field, FieldName, FieldValue, InvoiceFields, InvoiceRecord};
pub use stage::{AgentName, StageResult, StageStatus, Staged};

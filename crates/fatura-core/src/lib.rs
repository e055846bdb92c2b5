//! Core library for Arabic-aware invoice extraction.
//!
//! This crate provides:
//! - Document ingestion (PDF text layer, OCR with Tesseract or PaddleOCR models)
//! - Right-to-left script handling and digit normalization
//! - Invoice field extraction through a language model or offline rules
//! - Validation, a write/skip decision and idempotent persistence
//! - The stage pipeline tying them together into a [`PipelineReport`]

pub mod error;
pub mod invoice;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod script;
pub mod stages;
pub mod store;

pub use error::{FaturaError, Result};
pub use invoice::{RULES_MODEL, RuleBasedProducer};
pub use llm::{MockProducer, OpenRouterClient};
pub use models::config::FaturaConfig;
pub use models::invoice::{Field, FieldName, InvoiceFields, InvoiceRecord};
pub use models::stage::{AgentName, StageResult, StageStatus};
pub use ocr::{FallbackOcr, OcrBackend, OcrBackendKind, OcrPreference};
pub use pipeline::{Orchestrator, PipelineOptions, PipelineReport, TerminalState, run_pipeline, run_pipeline_with_config};
pub use script::{Direction, Script};
pub use stages::{Action, Decision, Document, FieldProducer, TextSource};
pub use store::{InvoiceStore, JsonFileStore, MemoryStore, StoredInvoice, WriteReceipt};

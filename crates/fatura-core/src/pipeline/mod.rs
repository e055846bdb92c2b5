//! The stage pipeline: ingestion, extraction, validation, tool decision and
//! optional persistence, run strictly in that order.

mod orchestrator;
mod report;

pub use orchestrator::{Orchestrator, OrchestratorBuilder, REVIEW_STAGES};
pub use report::{PipelineReport, TerminalState};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::config::FaturaConfig;
use crate::models::invoice::InvoiceFields;
use crate::ocr::OcrPreference;
use crate::stages::ingestion::{Document, RawText};
use crate::stages::validation::ValidationVerdict;

/// Per-run knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Language or script of the document, e.g. "ar", "fa", "en".
    pub language_hint: String,
    pub ocr_backend_preference: OcrPreference,
    /// Model id for the language model, or [`crate::invoice::RULES_MODEL`]
    /// for the offline rule-based producer. `None` uses the configured model.
    pub model_selector: Option<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            language_hint: "ar".to_string(),
            ocr_backend_preference: OcrPreference::default(),
            model_selector: None,
        }
    }
}

/// Where a run currently is. Each state carries what the next stage needs.
#[derive(Debug, Clone)]
pub enum PipelineState {
    Idle,
    Ingesting,
    Extracting(RawText),
    Validating(InvoiceFields),
    Deciding(InvoiceFields, ValidationVerdict),
    Persisting(InvoiceFields),
    Skipped,
    Done(TerminalState),
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ingesting => "ingesting",
            Self::Extracting(_) => "extracting",
            Self::Validating(_) => "validating",
            Self::Deciding(..) => "deciding",
            Self::Persisting(_) => "persisting",
            Self::Skipped => "skipped",
            Self::Done(_) => "done",
        }
    }
}

/// Run one document with collaborators built from the default
/// configuration.
pub async fn run_pipeline(document: &Document, options: &PipelineOptions) -> PipelineReport {
    run_pipeline_with_config(document, options, &FaturaConfig::default()).await
}

/// Run one document with collaborators built from `config`. Collaborators
/// that cannot be built halt the run at ingestion; the caller still gets a
/// report.
pub async fn run_pipeline_with_config(
    document: &Document,
    options: &PipelineOptions,
    config: &FaturaConfig,
) -> PipelineReport {
    match Orchestrator::from_config(config) {
        Ok(orchestrator) => orchestrator.run_pipeline(document, options).await,
        Err(e) => {
            warn!("Pipeline setup failed: {}", e);
            PipelineReport::setup_failure(document.fingerprint(), e.to_string())
        }
    }
}

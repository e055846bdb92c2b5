//! The report returned by every pipeline run.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::SYSTEM_INSTRUCTION;

use crate::models::invoice::InvoiceFields;
use crate::models::stage::{AgentName, StageResult};
use crate::stages::decision::Decision;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    /// A decision was reached. Persistence may still have failed.
    Completed,
    HaltedAtIngestionError,
    HaltedAtExtractionError,
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::HaltedAtIngestionError => write!(f, "halted_at_ingestion_error"),
            Self::HaltedAtExtractionError => write!(f, "halted_at_extraction_error"),
        }
    }
}

/// Everything a run produced: one stage result per stage in execution
/// order, plus the terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    document_id: String,
    terminal_state: TerminalState,
    stages: Vec<StageResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    extracted_fields: Option<InvoiceFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    decision: Option<Decision>,
    system_instruction: &'static str,
    duration_ms: u64,
}

impl PipelineReport {
    pub(crate) fn new(
        document_id: String,
        terminal_state: TerminalState,
        stages: Vec<StageResult>,
        extracted_fields: Option<InvoiceFields>,
        decision: Option<Decision>,
        system_instruction: &'static str,
        duration_ms: u64,
    ) -> Self {
        Self {
            document_id,
            terminal_state,
            stages,
            extracted_fields,
            decision,
            system_instruction,
            duration_ms,
        }
    }

    /// A run that never started because its collaborators could not be
    /// built: ingestion carries the error and every later stage is skipped.
    pub(crate) fn setup_failure(document_id: String, message: String) -> Self {
        let mut stages = vec![StageResult::error(AgentName::DocumentIngestion, Value::Null, message)];
        stages.extend(AgentName::PIPELINE[1..].iter().map(|agent| StageResult::skipped(*agent)));
        Self::new(
            document_id,
            TerminalState::HaltedAtIngestionError,
            stages,
            None,
            None,
            SYSTEM_INSTRUCTION,
            0,
        )
    }

    /// SHA-256 of the document bytes; also the persistence idempotency key.
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn terminal_state(&self) -> TerminalState {
        self.terminal_state
    }

    pub fn stages(&self) -> &[StageResult] {
        &self.stages
    }

    pub fn stage(&self, agent: AgentName) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.agent_name() == agent)
    }

    pub fn extracted_fields(&self) -> Option<&InvoiceFields> {
        self.extracted_fields.as_ref()
    }

    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    pub fn system_instruction(&self) -> &'static str {
        self.system_instruction
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn is_halted(&self) -> bool {
        self.terminal_state != TerminalState::Completed
    }
}

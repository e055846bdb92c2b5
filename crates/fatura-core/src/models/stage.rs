//! The result envelope every pipeline stage returns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// The stage did its job; no errors.
    Success,
    /// Expected domain failure, e.g. validation found problems.
    Failed,
    /// Unexpected failure, e.g. a collaborator call failed.
    Error,
    /// The stage was never reached.
    Skipped,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Error => write!(f, "error"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Identifier of the agent that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentName {
    DocumentIngestion,
    Extraction,
    Validation,
    ToolDecision,
    DatabaseWrite,
}

impl AgentName {
    /// Every agent in execution order.
    pub const PIPELINE: [AgentName; 5] = [
        AgentName::DocumentIngestion,
        AgentName::Extraction,
        AgentName::Validation,
        AgentName::ToolDecision,
        AgentName::DatabaseWrite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentIngestion => "document_ingestion",
            Self::Extraction => "extraction",
            Self::Validation => "validation",
            Self::ToolDecision => "tool_decision",
            Self::DatabaseWrite => "database_write",
        }
    }

    /// Human-readable label for reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::DocumentIngestion => "Document Ingestion Agent",
            Self::Extraction => "Information Extraction Agent",
            Self::Validation => "Validation Agent",
            Self::ToolDecision => "Tool Decision Agent",
            Self::DatabaseWrite => "Database Tool",
        }
    }
}

impl std::fmt::Display for AgentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform, immutable result of one stage invocation.
///
/// `status` is `Success` exactly when `errors` is empty. Results can only be
/// built through the status constructors, which keep that invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    agent_name: AgentName,
    status: StageStatus,
    input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<Value>,
    errors: Vec<String>,
    duration_ms: u64,
}

impl StageResult {
    /// A successful stage.
    pub fn success(agent_name: AgentName, input: Value, output: Value) -> Self {
        Self {
            agent_name,
            status: StageStatus::Success,
            input,
            output: Some(output),
            errors: Vec::new(),
            duration_ms: 0,
        }
    }

    /// An expected domain failure. The output (e.g. a verdict) is still kept.
    pub fn failed(agent_name: AgentName, input: Value, output: Option<Value>, errors: Vec<String>) -> Self {
        let errors = if errors.is_empty() {
            vec![format!("{} failed", agent_name)]
        } else {
            errors
        };
        Self {
            agent_name,
            status: StageStatus::Failed,
            input,
            output,
            errors,
            duration_ms: 0,
        }
    }

    /// An unexpected failure; no output.
    pub fn error(agent_name: AgentName, input: Value, message: impl Into<String>) -> Self {
        Self {
            agent_name,
            status: StageStatus::Error,
            input,
            output: None,
            errors: vec![message.into()],
            duration_ms: 0,
        }
    }

    /// Placeholder for a stage that was never reached.
    pub fn skipped(agent_name: AgentName) -> Self {
        Self {
            agent_name,
            status: StageStatus::Skipped,
            input: Value::Null,
            output: None,
            errors: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Record how long the stage took.
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn agent_name(&self) -> AgentName {
        self.agent_name
    }

    pub fn status(&self) -> StageStatus {
        self.status
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }
}

/// A stage result together with the typed value the next stage consumes.
#[derive(Debug, Clone)]
pub struct Staged<T> {
    pub result: StageResult,
    pub value: Option<T>,
}

impl<T> Staged<T> {
    pub fn new(result: StageResult, value: Option<T>) -> Self {
        Self { result, value }
    }
}

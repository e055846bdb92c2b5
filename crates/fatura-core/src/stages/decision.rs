//! Tool decision: whether a validated invoice gets written.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::validation::ValidationVerdict;
use crate::models::stage::{AgentName, StageResult, Staged};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Write,
    Skip,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Write => write!(f, "write"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub reason: String,
}

/// Pure function of the verdict. Always succeeds.
pub fn decide(verdict: &ValidationVerdict) -> Staged<Decision> {
    let decision = if verdict.is_valid() {
        Decision {
            action: Action::Write,
            reason: "invoice validation passed".to_string(),
        }
    } else {
        Decision {
            action: Action::Skip,
            reason: format!("validation failed: {}", verdict.errors().join(", ")),
        }
    };

    let input = json!({ "is_valid": verdict.is_valid(), "errors": verdict.errors() });
    let output = json!({ "action": decision.action, "reason": decision.reason });

    Staged::new(StageResult::success(AgentName::ToolDecision, input, output), Some(decision))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::invoice::FieldName;
    use crate::models::stage::StageStatus;
    use crate::stages::validation::{FieldViolation, ViolationKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_valid_verdict_writes() {
        let staged = decide(&ValidationVerdict::default());

        assert_eq!(staged.result.status(), StageStatus::Success);
        assert_eq!(staged.value.unwrap().action, Action::Write);
        assert_eq!(staged.result.output().unwrap()["action"], "write");
    }

    #[test]
    fn test_invalid_verdict_skips_and_still_succeeds() {
        let verdict = ValidationVerdict::from_violations(vec![FieldViolation::new(
            FieldName::DueDate,
            ViolationKind::Missing,
        )]);
        let staged = decide(&verdict);

        assert_eq!(staged.result.status(), StageStatus::Success);
        let decision = staged.value.unwrap();
        assert_eq!(decision.action, Action::Skip);
        assert_eq!(decision.reason, "validation failed: due_date missing");
    }
}

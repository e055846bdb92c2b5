//! Sequential stage runner with early exits.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use super::report::{PipelineReport, TerminalState};
use super::{PipelineOptions, PipelineState};
use crate::error::{ExtractionError, FaturaError, PersistenceError, Result, panic_message};
use crate::invoice::{RULES_MODEL, RuleBasedProducer};
use crate::llm::{OpenRouterClient, SYSTEM_INSTRUCTION};
use crate::models::config::FaturaConfig;
use crate::models::invoice::{InvoiceFields, InvoiceRecord};
use crate::models::stage::{AgentName, StageResult};
use crate::stages::decision::{Action, Decision, decide};
use crate::stages::extraction::{ExtractionStage, FieldProducer};
use crate::stages::ingestion::{Document, DocumentReader, IngestionStage, TextSource};
use crate::stages::validation::{ValidationVerdict, validate};
use crate::store::{InvoiceStore, JsonFileStore};

/// Stages re-run after an operator corrects the extracted fields.
pub const REVIEW_STAGES: [AgentName; 3] = [AgentName::Validation, AgentName::ToolDecision, AgentName::DatabaseWrite];

/// Stands in for the language model when no API key is configured, so the
/// run still ends in a report.
struct UnconfiguredProducer {
    reason: String,
}

#[async_trait]
impl FieldProducer for UnconfiguredProducer {
    fn name(&self) -> &'static str {
        "unconfigured"
    }

    async fn produce_fields(&self, _raw_text: &str, _model: &str) -> std::result::Result<String, ExtractionError> {
        Err(ExtractionError::NotConfigured(self.reason.clone()))
    }
}

/// Per-run bookkeeping owned by one `run_pipeline` or `resume_with_fields` call.
struct Run<'a> {
    /// Absent when resuming from reviewed fields.
    document: Option<&'a Document>,
    options: &'a PipelineOptions,
    document_id: String,
    stages: Vec<StageResult>,
    fields: Option<InvoiceFields>,
    decision: Option<Decision>,
    persisted: bool,
}

/// Owns the collaborators and runs documents through the stages.
pub struct Orchestrator {
    source: Arc<dyn TextSource>,
    producer: Arc<dyn FieldProducer>,
    rules: RuleBasedProducer,
    store: Arc<dyn InvoiceStore>,
    default_model: String,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Wire the default collaborators: PDF/OCR reader, OpenRouter client
    /// (when an API key is present) and the JSON file store.
    pub fn from_config(config: &FaturaConfig) -> Result<Self> {
        let reader = DocumentReader::from_config(config).map_err(|e| FaturaError::Config(e.to_string()))?;

        let producer: Arc<dyn FieldProducer> = match OpenRouterClient::from_config(&config.extraction) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                warn!("Language model unavailable: {}", e);
                Arc::new(UnconfiguredProducer { reason: e.to_string() })
            }
        };

        Self::builder()
            .text_source(Arc::new(reader))
            .field_producer(producer)
            .store(Arc::new(JsonFileStore::new(config.storage.path.clone())))
            .default_model(config.extraction.model.clone())
            .build()
    }

    /// Run one document through every stage. Never fails: collaborator
    /// faults end up in the report.
    pub async fn run_pipeline(&self, document: &Document, options: &PipelineOptions) -> PipelineReport {
        let run = Run {
            document: Some(document),
            options,
            document_id: document.fingerprint(),
            stages: Vec::with_capacity(AgentName::PIPELINE.len()),
            fields: None,
            decision: None,
            persisted: false,
        };

        info!("Processing document {}", run.document_id);
        self.drive(PipelineState::Idle, run, &AgentName::PIPELINE).await
    }

    /// Validate, decide and possibly persist fields an operator has
    /// corrected. The write is keyed by `document_id`, so a document already
    /// stored reports a duplicate instead of a second record.
    pub async fn resume_with_fields(&self, document_id: &str, fields: InvoiceFields) -> PipelineReport {
        let options = PipelineOptions::default();
        let run = Run {
            document: None,
            options: &options,
            document_id: document_id.to_string(),
            stages: Vec::with_capacity(REVIEW_STAGES.len()),
            fields: Some(fields.clone()),
            decision: None,
            persisted: false,
        };

        info!("Reviewing document {}", run.document_id);
        self.drive(PipelineState::Validating(fields), run, &REVIEW_STAGES).await
    }

    async fn drive(&self, mut state: PipelineState, mut run: Run<'_>, agents: &[AgentName]) -> PipelineReport {
        let start = Instant::now();
        let terminal = loop {
            state = match state {
                PipelineState::Done(terminal) => break terminal,
                other => {
                    let next = self.step(other, &mut run).await;
                    debug!("Pipeline -> {}", next.name());
                    next
                }
            };
        };

        info!("Document {} finished: {}", run.document_id, terminal);
        PipelineReport::new(
            run.document_id,
            terminal,
            in_stage_order(run.stages, agents),
            run.fields,
            run.decision,
            SYSTEM_INSTRUCTION,
            start.elapsed().as_millis() as u64,
        )
    }

    async fn step(&self, state: PipelineState, run: &mut Run<'_>) -> PipelineState {
        match state {
            PipelineState::Idle => PipelineState::Ingesting,

            PipelineState::Ingesting => {
                let Some(document) = run.document else {
                    return PipelineState::Done(TerminalState::HaltedAtIngestionError);
                };
                let staged = IngestionStage::new(self.source.as_ref()).ingest(
                    document,
                    &run.options.language_hint,
                    run.options.ocr_backend_preference,
                );
                run.stages.push(staged.result);
                match staged.value {
                    Some(raw) => PipelineState::Extracting(raw),
                    None => PipelineState::Done(TerminalState::HaltedAtIngestionError),
                }
            }

            PipelineState::Extracting(raw) => {
                let options = run.options;
                let model = options.model_selector.as_deref().unwrap_or(&self.default_model);
                let producer: &dyn FieldProducer = if model == RULES_MODEL {
                    &self.rules
                } else {
                    self.producer.as_ref()
                };

                let staged = ExtractionStage::new(producer).extract(&raw.raw_text, model).await;
                run.stages.push(staged.result);
                match staged.value {
                    Some(fields) => {
                        run.fields = Some(fields.clone());
                        PipelineState::Validating(fields)
                    }
                    None => PipelineState::Done(TerminalState::HaltedAtExtractionError),
                }
            }

            PipelineState::Validating(fields) => {
                let staged = validate(&fields);
                run.stages.push(staged.result);
                after_validation(fields, staged.value)
            }

            PipelineState::Deciding(fields, verdict) => {
                let staged = decide(&verdict);
                run.stages.push(staged.result);
                let action = staged.value.as_ref().map(|d| d.action);
                run.decision = staged.value;
                match action {
                    Some(Action::Write) => PipelineState::Persisting(fields),
                    _ => PipelineState::Skipped,
                }
            }

            PipelineState::Persisting(fields) => {
                if !run.persisted {
                    run.persisted = true;
                    let result = self.persist(&fields, &run.document_id);
                    run.stages.push(result);
                }
                PipelineState::Done(TerminalState::Completed)
            }

            PipelineState::Skipped => {
                run.stages.push(StageResult::skipped(AgentName::DatabaseWrite));
                PipelineState::Done(TerminalState::Completed)
            }

            PipelineState::Done(terminal) => PipelineState::Done(terminal),
        }
    }

    fn persist(&self, fields: &InvoiceFields, idempotency_key: &str) -> StageResult {
        let start = Instant::now();
        let input = json!({
            "store": self.store.name(),
            "idempotency_key": idempotency_key,
            "invoice": fields,
        });

        let outcome = InvoiceRecord::try_from(fields).and_then(|record| {
            catch_unwind(AssertUnwindSafe(|| self.store.write(&record, idempotency_key)))
                .unwrap_or_else(|panic| Err(PersistenceError::Panicked(panic_message(panic.as_ref()))))
        });
        let result = match outcome {
            Ok(receipt) => StageResult::success(AgentName::DatabaseWrite, input, json!(receipt)),
            Err(e) => {
                warn!("Persistence failed: {}", e);
                StageResult::error(AgentName::DatabaseWrite, input, e.to_string())
            }
        };
        result.with_duration_ms(start.elapsed().as_millis() as u64)
    }
}

/// A missing verdict gives no basis for a decision, so nothing is written.
fn after_validation(fields: InvoiceFields, verdict: Option<ValidationVerdict>) -> PipelineState {
    match verdict {
        Some(verdict) => PipelineState::Deciding(fields, verdict),
        None => {
            warn!("Validation produced no verdict; skipping decision and write");
            PipelineState::Skipped
        }
    }
}

/// One result per agent in `agents` order; agents never reached are skipped.
fn in_stage_order(mut stages: Vec<StageResult>, agents: &[AgentName]) -> Vec<StageResult> {
    agents
        .iter()
        .map(|agent| match stages.iter().position(|s| s.agent_name() == *agent) {
            Some(index) => stages.swap_remove(index),
            None => StageResult::skipped(*agent),
        })
        .collect()
}

/// Builder for [`Orchestrator`]. The rule-based producer is always present.
#[derive(Default)]
pub struct OrchestratorBuilder {
    source: Option<Arc<dyn TextSource>>,
    producer: Option<Arc<dyn FieldProducer>>,
    store: Option<Arc<dyn InvoiceStore>>,
    default_model: Option<String>,
}

impl OrchestratorBuilder {
    pub fn text_source(mut self, source: Arc<dyn TextSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn field_producer(mut self, producer: Arc<dyn FieldProducer>) -> Self {
        self.producer = Some(producer);
        self
    }

    pub fn store(mut self, store: Arc<dyn InvoiceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let missing = |what: &str| FaturaError::Config(format!("orchestrator needs a {}", what));
        Ok(Orchestrator {
            source: self.source.ok_or_else(|| missing("text source"))?,
            producer: self.producer.ok_or_else(|| missing("field producer"))?,
            rules: RuleBasedProducer::new(),
            store: self.store.ok_or_else(|| missing("store"))?,
            default_model: self
                .default_model
                .unwrap_or_else(|| FaturaConfig::default().extraction.model),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockProducer;
    use crate::models::invoice::Field;
    use crate::models::stage::StageStatus;
    use crate::stages::ingestion::tests::{FakeSource, png_document};
    use crate::store::{MemoryStore, StoredInvoice, WriteReceipt};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    const INVOICE_TEXT: &str = "Invoice #1\nAcme Co\n123 Main St\nTotal: 120.50\nDue: 2024-05-01\n";
    const COMPLETE: &str =
        r#"{"biller_name": "Acme Co", "biller_address": "123 Main St", "total_amount": "120.50", "due_date": "2024-05-01"}"#;
    const NO_DUE_DATE: &str =
        r#"{"biller_name": "Acme Co", "biller_address": "123 Main St", "total_amount": "120.50", "due_date": null}"#;

    struct FailingStore;

    impl InvoiceStore for FailingStore {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn write(&self, _record: &InvoiceRecord, _key: &str) -> std::result::Result<WriteReceipt, PersistenceError> {
            Err(PersistenceError::Io(std::io::Error::other("disk full")))
        }

        fn records(&self) -> std::result::Result<Vec<StoredInvoice>, PersistenceError> {
            Ok(Vec::new())
        }
    }

    struct PanickingStore;

    impl InvoiceStore for PanickingStore {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn write(&self, _record: &InvoiceRecord, _key: &str) -> std::result::Result<WriteReceipt, PersistenceError> {
            panic!("record file vanished")
        }

        fn records(&self) -> std::result::Result<Vec<StoredInvoice>, PersistenceError> {
            Ok(Vec::new())
        }
    }

    struct PanickingProducer;

    #[async_trait]
    impl FieldProducer for PanickingProducer {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn produce_fields(&self, _raw_text: &str, _model: &str) -> std::result::Result<String, ExtractionError> {
            panic!("model client crashed")
        }
    }

    fn orchestrator(
        source: FakeSource,
        producer: Arc<MockProducer>,
        store: Arc<dyn InvoiceStore>,
    ) -> Orchestrator {
        Orchestrator::builder()
            .text_source(Arc::new(source))
            .field_producer(producer)
            .store(store)
            .default_model("test-model")
            .build()
            .unwrap()
    }

    fn statuses(report: &PipelineReport) -> Vec<(AgentName, StageStatus)> {
        report.stages().iter().map(|s| (s.agent_name(), s.status())).collect()
    }

    #[tokio::test]
    async fn test_complete_invoice_is_written() {
        let store = Arc::new(MemoryStore::new());
        let producer = Arc::new(MockProducer::with_response(COMPLETE));
        let pipeline = orchestrator(FakeSource::Text(INVOICE_TEXT), producer.clone(), store.clone());

        let report = pipeline.run_pipeline(&png_document(), &PipelineOptions::default()).await;

        assert_eq!(report.terminal_state(), TerminalState::Completed);
        assert_eq!(
            statuses(&report),
            vec![
                (AgentName::DocumentIngestion, StageStatus::Success),
                (AgentName::Extraction, StageStatus::Success),
                (AgentName::Validation, StageStatus::Success),
                (AgentName::ToolDecision, StageStatus::Success),
                (AgentName::DatabaseWrite, StageStatus::Success),
            ]
        );
        assert_eq!(report.decision().map(|d| d.action), Some(Action::Write));
        assert_eq!(producer.last_model().as_deref(), Some("test-model"));
        assert_eq!(store.len(), 1);

        let stored = &store.records().unwrap()[0];
        assert_eq!(stored.idempotency_key, report.document_id());
        assert_eq!(stored.record.biller_name, "Acme Co");
    }

    #[tokio::test]
    async fn test_missing_due_date_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let producer = Arc::new(MockProducer::with_response(NO_DUE_DATE));
        let pipeline = orchestrator(FakeSource::Text(INVOICE_TEXT), producer, store.clone());

        let report = pipeline.run_pipeline(&png_document(), &PipelineOptions::default()).await;

        assert_eq!(report.terminal_state(), TerminalState::Completed);
        let validation = report.stage(AgentName::Validation).unwrap();
        assert_eq!(validation.status(), StageStatus::Failed);
        assert_eq!(validation.errors(), ["due_date missing"]);

        let decision = report.decision().unwrap();
        assert_eq!(decision.action, Action::Skip);
        assert_eq!(decision.reason, "validation failed: due_date missing");
        assert_eq!(
            report.stage(AgentName::DatabaseWrite).map(StageResult::status),
            Some(StageStatus::Skipped)
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_ingestion_error_halts() {
        let store = Arc::new(MemoryStore::new());
        let producer = Arc::new(MockProducer::with_response(COMPLETE));
        let pipeline = orchestrator(FakeSource::Fail, producer.clone(), store.clone());

        let report = pipeline.run_pipeline(&png_document(), &PipelineOptions::default()).await;

        assert_eq!(report.terminal_state(), TerminalState::HaltedAtIngestionError);
        assert!(report.is_halted());
        assert_eq!(
            statuses(&report),
            vec![
                (AgentName::DocumentIngestion, StageStatus::Error),
                (AgentName::Extraction, StageStatus::Skipped),
                (AgentName::Validation, StageStatus::Skipped),
                (AgentName::ToolDecision, StageStatus::Skipped),
                (AgentName::DatabaseWrite, StageStatus::Skipped),
            ]
        );
        assert_eq!(producer.call_count(), 0);
        assert!(report.extracted_fields().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_source_halts() {
        let store = Arc::new(MemoryStore::new());
        let producer = Arc::new(MockProducer::with_response(COMPLETE));
        let pipeline = orchestrator(FakeSource::Panic, producer, store.clone());

        let report = pipeline.run_pipeline(&png_document(), &PipelineOptions::default()).await;

        assert_eq!(report.terminal_state(), TerminalState::HaltedAtIngestionError);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_extraction_error_halts() {
        let store = Arc::new(MemoryStore::new());
        let producer = Arc::new(MockProducer::failing(ExtractionError::Timeout(30)));
        let pipeline = orchestrator(FakeSource::Text(INVOICE_TEXT), producer, store.clone());

        let report = pipeline.run_pipeline(&png_document(), &PipelineOptions::default()).await;

        assert_eq!(report.terminal_state(), TerminalState::HaltedAtExtractionError);
        let extraction = report.stage(AgentName::Extraction).unwrap();
        assert_eq!(extraction.status(), StageStatus::Error);
        assert_eq!(
            statuses(&report),
            vec![
                (AgentName::DocumentIngestion, StageStatus::Success),
                (AgentName::Extraction, StageStatus::Error),
                (AgentName::Validation, StageStatus::Skipped),
                (AgentName::ToolDecision, StageStatus::Skipped),
                (AgentName::DatabaseWrite, StageStatus::Skipped),
            ]
        );
        assert!(report.decision().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_producer_halts_with_report() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Orchestrator::builder()
            .text_source(Arc::new(FakeSource::Text(INVOICE_TEXT)))
            .field_producer(Arc::new(PanickingProducer))
            .store(store.clone())
            .build()
            .unwrap();

        let report = pipeline.run_pipeline(&png_document(), &PipelineOptions::default()).await;

        assert_eq!(report.terminal_state(), TerminalState::HaltedAtExtractionError);
        let extraction = report.stage(AgentName::Extraction).unwrap();
        assert_eq!(extraction.errors(), ["field producer panicked: model client crashed"]);
        assert_eq!(
            report.stage(AgentName::DatabaseWrite).map(StageResult::status),
            Some(StageStatus::Skipped)
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_store_still_completes() {
        let producer = Arc::new(MockProducer::with_response(COMPLETE));
        let pipeline = orchestrator(FakeSource::Text(INVOICE_TEXT), producer, Arc::new(PanickingStore));

        let report = pipeline.run_pipeline(&png_document(), &PipelineOptions::default()).await;

        assert_eq!(report.terminal_state(), TerminalState::Completed);
        assert_eq!(report.decision().map(|d| d.action), Some(Action::Write));
        let write = report.stage(AgentName::DatabaseWrite).unwrap();
        assert_eq!(write.status(), StageStatus::Error);
        assert_eq!(write.errors(), ["store panicked: record file vanished"]);
    }

    #[test]
    fn test_missing_verdict_skips_decision() {
        let next = after_validation(InvoiceFields::default(), None);
        assert!(matches!(next, PipelineState::Skipped));

        let next = after_validation(InvoiceFields::default(), Some(ValidationVerdict::default()));
        assert!(matches!(next, PipelineState::Deciding(_, _)));
    }

    #[test]
    fn test_stages_follow_pipeline_order() {
        let reached = vec![
            StageResult::skipped(AgentName::DatabaseWrite),
            StageResult::success(AgentName::DocumentIngestion, json!({}), json!({})),
        ];

        let ordered = in_stage_order(reached, &AgentName::PIPELINE);

        let agents: Vec<AgentName> = ordered.iter().map(StageResult::agent_name).collect();
        assert_eq!(agents, AgentName::PIPELINE.to_vec());
        assert_eq!(ordered[0].status(), StageStatus::Success);
        assert_eq!(ordered[2].status(), StageStatus::Skipped);
    }

    #[tokio::test]
    async fn test_review_writes_corrected_fields() {
        let store = Arc::new(MemoryStore::new());
        let producer = Arc::new(MockProducer::with_response(NO_DUE_DATE));
        let pipeline = orchestrator(FakeSource::Text(INVOICE_TEXT), producer.clone(), store.clone());

        let first = pipeline.run_pipeline(&png_document(), &PipelineOptions::default()).await;
        assert_eq!(first.decision().map(|d| d.action), Some(Action::Skip));

        let mut fields = first.extracted_fields().cloned().unwrap();
        fields.due_date = Field::Present(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        let review = pipeline.resume_with_fields(first.document_id(), fields.clone()).await;

        assert_eq!(review.terminal_state(), TerminalState::Completed);
        assert_eq!(
            statuses(&review),
            vec![
                (AgentName::Validation, StageStatus::Success),
                (AgentName::ToolDecision, StageStatus::Success),
                (AgentName::DatabaseWrite, StageStatus::Success),
            ]
        );
        assert_eq!(review.document_id(), first.document_id());
        assert_eq!(review.extracted_fields(), Some(&fields));
        assert_eq!(producer.call_count(), 1);

        let stored = store.records().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].idempotency_key, first.document_id());
        assert_eq!(stored[0].record.due_date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    }

    #[tokio::test]
    async fn test_review_of_incomplete_fields_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let producer = Arc::new(MockProducer::with_response(COMPLETE));
        let pipeline = orchestrator(FakeSource::Text(INVOICE_TEXT), producer, store.clone());
        let fields = InvoiceFields {
            biller_name: Field::Present("Acme Co".to_string()),
            ..InvoiceFields::default()
        };

        let review = pipeline.resume_with_fields("doc-1", fields).await;

        assert_eq!(review.terminal_state(), TerminalState::Completed);
        assert_eq!(review.decision().map(|d| d.action), Some(Action::Skip));
        assert_eq!(
            review.stage(AgentName::DatabaseWrite).map(StageResult::status),
            Some(StageStatus::Skipped)
        );
        assert!(review.stage(AgentName::DocumentIngestion).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_review_after_write_reports_duplicate() {
        let store = Arc::new(MemoryStore::new());
        let producer = Arc::new(MockProducer::with_response(COMPLETE));
        let pipeline = orchestrator(FakeSource::Text(INVOICE_TEXT), producer, store.clone());

        let first = pipeline.run_pipeline(&png_document(), &PipelineOptions::default()).await;
        let fields = first.extracted_fields().cloned().unwrap();
        let review = pipeline.resume_with_fields(first.document_id(), fields).await;

        let output = review.stage(AgentName::DatabaseWrite).and_then(StageResult::output).unwrap();
        assert_eq!(output["duplicate"], true);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_still_completes() {
        let producer = Arc::new(MockProducer::with_response(COMPLETE));
        let pipeline = orchestrator(FakeSource::Text(INVOICE_TEXT), producer, Arc::new(FailingStore));

        let report = pipeline.run_pipeline(&png_document(), &PipelineOptions::default()).await;

        assert_eq!(report.terminal_state(), TerminalState::Completed);
        let write = report.stage(AgentName::DatabaseWrite).unwrap();
        assert_eq!(write.status(), StageStatus::Error);
        assert!(write.errors()[0].contains("disk full"));
        assert_eq!(write.input()["store"], "failing");
    }

    #[tokio::test]
    async fn test_rules_selector_bypasses_model() {
        let store = Arc::new(MemoryStore::new());
        let producer = Arc::new(MockProducer::failing(ExtractionError::NotConfigured("no key".to_string())));
        let pipeline = orchestrator(FakeSource::Text(INVOICE_TEXT), producer.clone(), store.clone());
        let options = PipelineOptions {
            language_hint: "en".to_string(),
            model_selector: Some(RULES_MODEL.to_string()),
            ..PipelineOptions::default()
        };

        let report = pipeline.run_pipeline(&png_document(), &options).await;

        assert_eq!(report.terminal_state(), TerminalState::Completed);
        assert_eq!(producer.call_count(), 0);
        let extraction = report.stage(AgentName::Extraction).unwrap();
        assert_eq!(extraction.input()["producer"], "rules");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_rerun_reports_duplicate() {
        let store = Arc::new(MemoryStore::new());
        let producer = Arc::new(MockProducer::with_response(COMPLETE));
        let pipeline = orchestrator(FakeSource::Text(INVOICE_TEXT), producer, store.clone());
        let document = png_document();

        let first = pipeline.run_pipeline(&document, &PipelineOptions::default()).await;
        let second = pipeline.run_pipeline(&document, &PipelineOptions::default()).await;

        assert_eq!(first.document_id(), second.document_id());
        let output = second.stage(AgentName::DatabaseWrite).and_then(StageResult::output).unwrap();
        assert_eq!(output["duplicate"], true);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let result = Orchestrator::builder()
            .field_producer(Arc::new(MockProducer::with_response(COMPLETE)))
            .build();
        assert!(matches!(result, Err(FaturaError::Config(_))));
    }
}

//! The four pipeline stages. Each returns a [`Staged`](crate::models::Staged)
//! value: the uniform stage result plus the typed value the next stage needs.

pub mod decision;
pub mod extraction;
pub mod ingestion;
pub mod validation;

pub use decision::{Action, Decision, decide};
pub use extraction::{ExtractionStage, FieldProducer, parse_response};
pub use ingestion::{Document, DocumentReader, ExtractedText, IngestionStage, MediaType, RawText, SourceType, TextSource};
pub use validation::{FieldViolation, ValidationVerdict, ViolationKind, check, validate};

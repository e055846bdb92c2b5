//! Error types for the fatura-core library.

use thiserror::Error;

/// Main error type for the fatura library.
#[derive(Error, Debug)]
pub enum FaturaError {
    /// Configuration error, including collaborators that cannot be built.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// The backend binary or model files are not available.
    #[error("OCR backend unavailable: {0}")]
    Unavailable(String),

    /// Failed to load OCR models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// The language pack for the requested script is not installed.
    #[error("language pack not installed: {0}")]
    MissingLanguage(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Invalid image format or dimensions.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// The backend did not finish in time and was stopped.
    #[error("OCR timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Errors raised while turning a document into raw text.
#[derive(Error, Debug)]
pub enum IngestionError {
    /// The media type could not be determined or is not supported.
    #[error("unsupported media type: {0}")]
    UnsupportedMedia(String),

    /// PDF processing failed.
    #[error(transparent)]
    Pdf(#[from] PdfError),

    /// Every OCR backend failed.
    #[error(transparent)]
    Ocr(#[from] OcrError),

    /// Image decoding failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Processing finished without producing any text.
    #[error("no text extracted from document")]
    NoText,

    /// A collaborator panicked.
    #[error("text source panicked: {0}")]
    Panicked(String),
}

/// Errors raised by the field extraction collaborator.
#[derive(Error, Debug, Clone)]
pub enum ExtractionError {
    /// Network or HTTP-level failure.
    #[error("service call failed: {0}")]
    Service(String),

    /// The service rejected the call for lack of credits (HTTP 402).
    #[error("insufficient credits: {0}")]
    InsufficientCredits(String),

    /// The call did not finish in time.
    #[error("service call timed out after {0}s")]
    Timeout(u64),

    /// The response could not be parsed into the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Missing credentials or other setup problem.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// The producer panicked.
    #[error("field producer panicked: {0}")]
    Panicked(String),
}

/// Errors raised by the persistence collaborator.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The record set could not be read or written.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The record set is not in the expected format.
    #[error("corrupt record set: {0}")]
    Corrupt(String),

    /// The fields handed to the store are not a complete, valid invoice.
    #[error("invoice is not valid for storage: {0}")]
    InvalidRecord(String),

    /// The store panicked while writing.
    #[error("store panicked: {0}")]
    Panicked(String),
}

/// Result type for the fatura library.
pub type Result<T> = std::result::Result<T, FaturaError>;

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

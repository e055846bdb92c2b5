//! Ingestion: document bytes to raw text.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::ImageFormat;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{IngestionError, OcrError, panic_message};
use crate::models::config::{FaturaConfig, IngestionConfig};
use crate::models::stage::{AgentName, StageResult, Staged};
use crate::ocr::{FallbackOcr, OcrPreference};
use crate::pdf::{PdfExtractor, PdfProcessor, PdfType};
use crate::script::{Direction, Script, normalize_digits};

/// An input document: raw bytes plus an optional file name used for media
/// type detection.
#[derive(Debug, Clone)]
pub struct Document {
    bytes: Vec<u8>,
    name: Option<String>,
}

impl Document {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Read a document from disk, keeping the file name.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        Ok(Self { bytes, name })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// SHA-256 of the bytes, hex encoded. Stable across runs.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

/// Media type of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Pdf,
    Image(ImageFormat),
}

impl MediaType {
    /// Detect from magic bytes, then from the file extension.
    pub fn detect(bytes: &[u8], name: Option<&str>) -> Result<Self, IngestionError> {
        if bytes.starts_with(b"%PDF") {
            return Ok(Self::Pdf);
        }
        if let Ok(format) = image::guess_format(bytes) {
            return Ok(Self::Image(format));
        }

        let extension = name
            .map(PathBuf::from)
            .and_then(|p| p.extension().map(|e| e.to_string_lossy().to_lowercase()));

        match extension.as_deref() {
            Some("pdf") => Ok(Self::Pdf),
            Some(ext) => ImageFormat::from_extension(ext)
                .map(Self::Image)
                .ok_or_else(|| IngestionError::UnsupportedMedia(format!(".{}", ext))),
            None if bytes.is_empty() => Err(IngestionError::UnsupportedMedia("empty document".to_string())),
            None => Err(IngestionError::UnsupportedMedia("unrecognized content".to_string())),
        }
    }

    pub fn mime_type(&self) -> String {
        match self {
            Self::Pdf => "application/pdf".to_string(),
            Self::Image(format) => format.to_mime_type().to_string(),
        }
    }
}

/// How the raw text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    PdfText,
    PdfOcr,
    Image,
}

/// Text produced by a [`TextSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub source_type: SourceType,
    /// OCR backend that produced the text, if OCR ran.
    pub backend: Option<&'static str>,
    pub notes: Vec<String>,
}

/// Turns a document into text. Implementations do not interpret content.
pub trait TextSource: Send + Sync {
    fn produce_text(
        &self,
        document: &Document,
        media_type: MediaType,
        script: Script,
        preference: OcrPreference,
    ) -> Result<ExtractedText, IngestionError>;
}

/// Ingestion output handed to extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawText {
    pub document_id: String,
    pub raw_text: String,
    pub source_type: SourceType,
    pub backend: Option<&'static str>,
    pub script: Script,
    pub direction: Direction,
    pub char_count: usize,
    pub notes: Vec<String>,
}

/// PDF text layer plus OCR for scans and images.
pub struct DocumentReader {
    settings: IngestionConfig,
    ocr: FallbackOcr,
}

impl DocumentReader {
    pub fn new(settings: IngestionConfig, ocr: FallbackOcr) -> Self {
        Self { settings, ocr }
    }

    pub fn from_config(config: &FaturaConfig) -> Result<Self, OcrError> {
        Ok(Self::new(config.ingestion.clone(), FallbackOcr::from_config(&config.ocr)?))
    }

    fn read_pdf(
        &self,
        bytes: &[u8],
        script: Script,
        preference: OcrPreference,
    ) -> Result<ExtractedText, IngestionError> {
        let mut pdf = PdfExtractor::new();
        pdf.load(bytes)?;

        let pdf_type = pdf.analyze(self.settings.min_text_length);
        info!("PDF with {} pages classified as {:?}", pdf.page_count(), pdf_type);

        if matches!(pdf_type, PdfType::Text | PdfType::Hybrid) {
            return Ok(ExtractedText {
                text: pdf.extract_text()?,
                source_type: SourceType::PdfText,
                backend: None,
                notes: Vec::new(),
            });
        }

        let ocr_result = if pdf_type == PdfType::Image {
            self.ocr_pages(&pdf, script, preference)
        } else {
            Err(IngestionError::NoText)
        };

        match ocr_result {
            Ok(text) => Ok(text),
            Err(e) => {
                // Short text layer is better than nothing
                let layer = pdf.extract_text().unwrap_or_default();
                if layer.trim().is_empty() {
                    return Err(e);
                }
                warn!("OCR of scanned PDF failed ({}), using short text layer", e);
                Ok(ExtractedText {
                    text: layer,
                    source_type: SourceType::PdfText,
                    backend: None,
                    notes: vec![format!("OCR failed, used text layer: {}", e)],
                })
            }
        }
    }

    fn ocr_pages(
        &self,
        pdf: &PdfExtractor,
        script: Script,
        preference: OcrPreference,
    ) -> Result<ExtractedText, IngestionError> {
        let mut page_count = pdf.page_count();
        if self.settings.max_pages > 0 {
            page_count = page_count.min(self.settings.max_pages as u32);
        }

        let mut pages = Vec::new();
        let mut backend = None;
        let mut notes = Vec::new();
        let mut last_error = None;

        for page in 1..=page_count {
            for image in pdf.extract_images(page)? {
                match self.ocr.recognize(&image, script, preference) {
                    Ok(output) => {
                        backend.get_or_insert(output.backend);
                        notes.extend(output.notes);
                        pages.push(output.text);
                    }
                    Err(e) => {
                        warn!("OCR failed on page {}: {}", page, e);
                        last_error = Some(e);
                    }
                }
            }
        }

        let text = pages.join("\n");
        if text.trim().is_empty() {
            return Err(last_error.map_or(IngestionError::NoText, IngestionError::from));
        }

        notes.dedup();
        Ok(ExtractedText {
            text,
            source_type: SourceType::PdfOcr,
            backend,
            notes,
        })
    }

    fn read_image(
        &self,
        bytes: &[u8],
        format: ImageFormat,
        script: Script,
        preference: OcrPreference,
    ) -> Result<ExtractedText, IngestionError> {
        let image = image::load_from_memory_with_format(bytes, format)?;
        let output = self.ocr.recognize(&image, script, preference)?;
        Ok(ExtractedText {
            text: output.text,
            source_type: SourceType::Image,
            backend: Some(output.backend),
            notes: output.notes,
        })
    }
}

impl TextSource for DocumentReader {
    fn produce_text(
        &self,
        document: &Document,
        media_type: MediaType,
        script: Script,
        preference: OcrPreference,
    ) -> Result<ExtractedText, IngestionError> {
        match media_type {
            MediaType::Pdf => self.read_pdf(document.bytes(), script, preference),
            MediaType::Image(format) => self.read_image(document.bytes(), format, script, preference),
        }
    }
}

/// Runs a [`TextSource`] and packages the outcome as a stage result.
pub struct IngestionStage<'a> {
    source: &'a dyn TextSource,
}

impl<'a> IngestionStage<'a> {
    pub fn new(source: &'a dyn TextSource) -> Self {
        Self { source }
    }

    /// Never fails and never panics: every fault becomes an `error` result.
    pub fn ingest(&self, document: &Document, language_hint: &str, preference: OcrPreference) -> Staged<RawText> {
        let start = Instant::now();
        let script = Script::from_hint(language_hint);
        let media_type = MediaType::detect(document.bytes(), document.name());

        let input = json!({
            "media_type": media_type.as_ref().map(MediaType::mime_type).unwrap_or_else(|_| "unknown".to_string()),
            "byte_len": document.bytes().len(),
            "language_hint": language_hint,
            "ocr_backend_preference": preference,
        });

        let outcome = media_type.and_then(|media_type| {
            catch_unwind(AssertUnwindSafe(|| {
                self.source.produce_text(document, media_type, script, preference)
            }))
            .unwrap_or_else(|panic| Err(IngestionError::Panicked(panic_message(panic.as_ref()))))
        });

        let elapsed = start.elapsed().as_millis() as u64;
        let extracted = match outcome {
            Ok(extracted) if !extracted.text.trim().is_empty() => extracted,
            Ok(_) => {
                return Staged::new(
                    StageResult::error(AgentName::DocumentIngestion, input, IngestionError::NoText.to_string())
                        .with_duration_ms(elapsed),
                    None,
                );
            }
            Err(e) => {
                warn!("Ingestion failed: {}", e);
                return Staged::new(
                    StageResult::error(AgentName::DocumentIngestion, input, e.to_string()).with_duration_ms(elapsed),
                    None,
                );
            }
        };

        let raw_text = if script.normalizes_digits() {
            normalize_digits(&extracted.text)
        } else {
            extracted.text
        };

        let output = RawText {
            document_id: document.fingerprint(),
            char_count: raw_text.chars().count(),
            raw_text,
            source_type: extracted.source_type,
            backend: extracted.backend,
            script,
            direction: script.direction(),
            notes: extracted.notes,
        };
        debug!("Ingested {} chars via {:?}", output.char_count, output.source_type);

        match serde_json::to_value(&output) {
            Ok(value) => Staged::new(
                StageResult::success(AgentName::DocumentIngestion, input, value).with_duration_ms(elapsed),
                Some(output),
            ),
            Err(e) => Staged::new(
                StageResult::error(AgentName::DocumentIngestion, input, e.to_string()).with_duration_ms(elapsed),
                None,
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::stage::StageStatus;
    use pretty_assertions::assert_eq;

    /// Text source returning fixed text, an error, or panicking.
    pub(crate) enum FakeSource {
        Text(&'static str),
        Fail,
        Panic,
    }

    impl TextSource for FakeSource {
        fn produce_text(
            &self,
            _document: &Document,
            _media_type: MediaType,
            _script: Script,
            _preference: OcrPreference,
        ) -> Result<ExtractedText, IngestionError> {
            match self {
                Self::Text(text) => Ok(ExtractedText {
                    text: text.to_string(),
                    source_type: SourceType::Image,
                    backend: Some("fake"),
                    notes: Vec::new(),
                }),
                Self::Fail => Err(IngestionError::Ocr(OcrError::Unavailable("no backend".to_string()))),
                Self::Panic => panic!("decoder exploded"),
            }
        }
    }

    pub(crate) fn png_document() -> Document {
        let mut bytes = std::io::Cursor::new(Vec::new());
        image::DynamicImage::new_luma8(4, 4)
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();
        Document::from_bytes(bytes.into_inner()).with_name("scan.png")
    }

    #[test]
    fn test_detect_media_type() {
        assert_eq!(MediaType::detect(b"%PDF-1.7\n", None).unwrap(), MediaType::Pdf);
        assert_eq!(
            MediaType::detect(png_document().bytes(), None).unwrap(),
            MediaType::Image(ImageFormat::Png)
        );
        assert_eq!(MediaType::detect(b"????", Some("invoice.PDF")).unwrap(), MediaType::Pdf);
        assert!(MediaType::detect(b"plain text", Some("notes.txt")).is_err());
        assert!(MediaType::detect(b"", None).is_err());
    }

    #[test]
    fn test_ingest_success_normalizes_arabic_digits() {
        let source = FakeSource::Text("الإجمالي: ١٢٠٫٥٠");
        let staged = IngestionStage::new(&source).ingest(&png_document(), "ar", OcrPreference::FallbackEnabled);

        assert_eq!(staged.result.status(), StageStatus::Success);
        let raw = staged.value.unwrap();
        assert_eq!(raw.raw_text, "الإجمالي: 120.50");
        assert_eq!(raw.direction, Direction::Rtl);
        assert_eq!(raw.backend, Some("fake"));
        assert_eq!(raw.document_id, png_document().fingerprint());
        assert_eq!(staged.result.output().unwrap()["source_type"], "image");
    }

    #[test]
    fn test_ingest_unknown_hint_uses_latin() {
        let source = FakeSource::Text("Total: ١٢");
        let staged = IngestionStage::new(&source).ingest(&png_document(), "klingon", OcrPreference::Primary);

        let raw = staged.value.unwrap();
        assert_eq!(raw.script, Script::Latin);
        assert_eq!(raw.direction, Direction::Ltr);
        assert_eq!(raw.raw_text, "Total: ١٢");
    }

    #[test]
    fn test_ingest_error_has_no_output() {
        let staged = IngestionStage::new(&FakeSource::Fail).ingest(&png_document(), "en", OcrPreference::Primary);

        assert_eq!(staged.result.status(), StageStatus::Error);
        assert!(staged.result.output().is_none());
        assert_eq!(staged.result.errors().len(), 1);
        assert!(staged.value.is_none());
    }

    #[test]
    fn test_ingest_contains_panics() {
        let staged = IngestionStage::new(&FakeSource::Panic).ingest(&png_document(), "en", OcrPreference::Primary);

        assert_eq!(staged.result.status(), StageStatus::Error);
        assert!(staged.result.errors()[0].contains("decoder exploded"));
    }

    #[test]
    fn test_ingest_blank_text_is_error() {
        let staged = IngestionStage::new(&FakeSource::Text("  \n ")).ingest(&png_document(), "en", OcrPreference::Primary);
        assert_eq!(staged.result.status(), StageStatus::Error);
    }

    #[test]
    fn test_reader_records_fallback_backend() {
        use crate::ocr::tests::StaticBackend;

        let ocr = FallbackOcr::new(Box::new(StaticBackend { name: "a", result: Err("missing".into()) }))
            .with_fallback(Box::new(StaticBackend { name: "b", result: Ok("Total: 5".into()) }));
        let reader = DocumentReader::new(IngestionConfig::default(), ocr);

        let staged = IngestionStage::new(&reader).ingest(&png_document(), "en", OcrPreference::FallbackEnabled);
        let raw = staged.value.unwrap();
        assert_eq!(raw.backend, Some("b"));
        assert_eq!(raw.source_type, SourceType::Image);
        assert_eq!(raw.notes.len(), 1);
    }

    #[test]
    fn test_reader_rejects_broken_pdf() {
        use crate::ocr::tests::StaticBackend;

        let ocr = FallbackOcr::new(Box::new(StaticBackend { name: "a", result: Ok("x".into()) }));
        let reader = DocumentReader::new(IngestionConfig::default(), ocr);
        let document = Document::from_bytes(b"%PDF-1.4\ngarbage".to_vec());

        let staged = IngestionStage::new(&reader).ingest(&document, "en", OcrPreference::Primary);
        assert_eq!(staged.result.status(), StageStatus::Error);
        assert_eq!(staged.result.input()["media_type"], "application/pdf");
    }

    #[test]
    fn test_ingest_unsupported_media() {
        let document = Document::from_bytes(b"hello".to_vec()).with_name("hello.txt");
        let staged = IngestionStage::new(&FakeSource::Text("x")).ingest(&document, "en", OcrPreference::Primary);

        assert_eq!(staged.result.status(), StageStatus::Error);
        assert_eq!(staged.result.input()["media_type"], "unknown");
    }
}

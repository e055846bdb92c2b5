//! OCR backends behind a narrow interface, with primary/fallback selection.

#[cfg(feature = "paddle")]
mod paddle;
mod tesseract;

#[cfg(feature = "paddle")]
pub use paddle::PaddleBackend;
pub use tesseract::TesseractBackend;

use std::time::Duration;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::OcrError;
use crate::models::config::OcrConfig;
use crate::script::Script;

/// Text recognized from one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recognized {
    /// Recognized text in reading order.
    pub text: String,
    /// Caveats worth surfacing, e.g. a missing language pack.
    pub notes: Vec<String>,
}

/// An OCR engine that turns an image into text.
pub trait OcrBackend: Send + Sync {
    /// Short identifier recorded in stage metadata.
    fn name(&self) -> &'static str;

    /// Recognize text in `image`, tuned for `script`.
    fn recognize(&self, image: &DynamicImage, script: Script) -> Result<Recognized, OcrError>;
}

/// Available OCR backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackendKind {
    /// External `tesseract` binary.
    Tesseract,
    /// PaddleOCR models through `pure-onnx-ocr`.
    Paddle,
}

/// Whether the fallback backend may run when the primary fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OcrPreference {
    /// Only the primary backend runs.
    Primary,
    /// The fallback backend runs after a primary failure or empty result.
    #[default]
    FallbackEnabled,
}

impl std::str::FromStr for OcrPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "primary" => Ok(Self::Primary),
            "fallback-enabled" | "fallback" => Ok(Self::FallbackEnabled),
            other => Err(format!("unknown OCR backend preference: {}", other)),
        }
    }
}

impl std::fmt::Display for OcrBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tesseract => write!(f, "tesseract"),
            Self::Paddle => write!(f, "paddle"),
        }
    }
}

/// Instantiate one backend from configuration.
pub fn create_backend(kind: OcrBackendKind, config: &OcrConfig) -> Result<Box<dyn OcrBackend>, OcrError> {
    match kind {
        OcrBackendKind::Tesseract => Ok(Box::new(
            TesseractBackend::new(config.tesseract_binary.clone())
                .with_timeout(Duration::from_secs(config.timeout_secs)),
        )),
        #[cfg(feature = "paddle")]
        OcrBackendKind::Paddle => Ok(Box::new(PaddleBackend::from_dir(&config.paddle_model_dir, config.keep_unk))),
        #[cfg(not(feature = "paddle"))]
        OcrBackendKind::Paddle => Err(OcrError::Unavailable(
            "paddle backend not compiled in (enable the `paddle` feature)".to_string(),
        )),
    }
}

/// Text from the fallback chain plus which backend produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrOutput {
    pub text: String,
    pub backend: &'static str,
    pub notes: Vec<String>,
}

/// Primary OCR backend with an optional fallback.
pub struct FallbackOcr {
    primary: Box<dyn OcrBackend>,
    fallback: Option<Box<dyn OcrBackend>>,
}

impl FallbackOcr {
    pub fn new(primary: Box<dyn OcrBackend>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Box<dyn OcrBackend>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Build the chain described by the OCR configuration.
    ///
    /// A fallback that is not compiled in is dropped with a warning; an
    /// unavailable primary is an error.
    pub fn from_config(config: &OcrConfig) -> Result<Self, OcrError> {
        let primary = create_backend(config.primary, config)?;
        let mut chain = Self::new(primary);

        if let Some(kind) = config.fallback.filter(|kind| *kind != config.primary) {
            match create_backend(kind, config) {
                Ok(fallback) => chain = chain.with_fallback(fallback),
                Err(e) => warn!("OCR fallback disabled: {}", e),
            }
        }

        Ok(chain)
    }

    /// Names of the configured backends, primary first.
    pub fn backend_names(&self) -> Vec<&'static str> {
        std::iter::once(self.primary.name())
            .chain(self.fallback.as_ref().map(|f| f.name()))
            .collect()
    }

    /// Run the primary backend, then the fallback if allowed and needed.
    ///
    /// An empty result counts as a failure so the fallback gets a chance.
    pub fn recognize(
        &self,
        image: &DynamicImage,
        script: Script,
        preference: OcrPreference,
    ) -> Result<OcrOutput, OcrError> {
        let mut notes = Vec::new();

        let primary_error = match self.primary.recognize(image, script) {
            Ok(recognized) if !recognized.text.trim().is_empty() => {
                notes.extend(recognized.notes);
                return Ok(OcrOutput {
                    text: recognized.text,
                    backend: self.primary.name(),
                    notes,
                });
            }
            Ok(_) => OcrError::Recognition(format!("{} detected no text", self.primary.name())),
            Err(e) => e,
        };

        let fallback = match (&self.fallback, preference) {
            (Some(fallback), OcrPreference::FallbackEnabled) => fallback,
            _ => return Err(primary_error),
        };

        warn!("{} failed ({}), trying {}", self.primary.name(), primary_error, fallback.name());
        notes.push(format!("{} failed: {}", self.primary.name(), primary_error));

        let recognized = fallback.recognize(image, script)?;
        if recognized.text.trim().is_empty() {
            return Err(OcrError::Recognition(format!(
                "{} and {} detected no text",
                self.primary.name(),
                fallback.name()
            )));
        }

        debug!("{} recognized {} chars", fallback.name(), recognized.text.len());
        notes.extend(recognized.notes);
        Ok(OcrOutput {
            text: recognized.text,
            backend: fallback.name(),
            notes,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Backend returning a fixed result.
    pub(crate) struct StaticBackend {
        pub name: &'static str,
        pub result: Result<String, String>,
    }

    impl OcrBackend for StaticBackend {
        fn name(&self) -> &'static str {
            self.name
        }

        fn recognize(&self, _image: &DynamicImage, _script: Script) -> Result<Recognized, OcrError> {
            match &self.result {
                Ok(text) => Ok(Recognized {
                    text: text.clone(),
                    notes: Vec::new(),
                }),
                Err(e) => Err(OcrError::Unavailable(e.clone())),
            }
        }
    }

    fn blank() -> DynamicImage {
        DynamicImage::new_luma8(4, 4)
    }

    #[test]
    fn test_primary_success() {
        let ocr = FallbackOcr::new(Box::new(StaticBackend { name: "a", result: Ok("hello".into()) }))
            .with_fallback(Box::new(StaticBackend { name: "b", result: Ok("other".into()) }));

        let out = ocr.recognize(&blank(), Script::Latin, OcrPreference::FallbackEnabled).unwrap();
        assert_eq!(out.backend, "a");
        assert_eq!(out.text, "hello");
        assert!(out.notes.is_empty());
    }

    #[test]
    fn test_fallback_records_backend() {
        let ocr = FallbackOcr::new(Box::new(StaticBackend { name: "a", result: Err("missing".into()) }))
            .with_fallback(Box::new(StaticBackend { name: "b", result: Ok("نص".into()) }));

        let out = ocr.recognize(&blank(), Script::Arabic, OcrPreference::FallbackEnabled).unwrap();
        assert_eq!(out.backend, "b");
        assert_eq!(out.notes.len(), 1);
        assert!(out.notes[0].starts_with("a failed"));
    }

    #[test]
    fn test_primary_only_does_not_fall_back() {
        let ocr = FallbackOcr::new(Box::new(StaticBackend { name: "a", result: Ok("   ".into()) }))
            .with_fallback(Box::new(StaticBackend { name: "b", result: Ok("text".into()) }));

        let result = ocr.recognize(&blank(), Script::Latin, OcrPreference::Primary);
        assert!(matches!(result, Err(OcrError::Recognition(_))));
    }

    #[test]
    fn test_from_config_skips_duplicate_fallback() {
        let config = OcrConfig {
            fallback: Some(OcrBackendKind::Tesseract),
            ..OcrConfig::default()
        };
        let chain = FallbackOcr::from_config(&config).unwrap();
        assert_eq!(chain.backend_names(), vec!["tesseract"]);
    }

    #[test]
    fn test_parse_preference() {
        assert_eq!("primary".parse::<OcrPreference>().unwrap(), OcrPreference::Primary);
        assert_eq!("fallback-enabled".parse::<OcrPreference>().unwrap(), OcrPreference::FallbackEnabled);
        assert!("sideways".parse::<OcrPreference>().is_err());
    }
}

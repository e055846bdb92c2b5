//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ocr::OcrBackendKind;

/// Main configuration for the fatura pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FaturaConfig {
    /// Document ingestion configuration.
    pub ingestion: IngestionConfig,

    /// OCR backend configuration.
    pub ocr: OcrConfig,

    /// LLM extraction configuration.
    pub extraction: ExtractionConfig,

    /// Invoice storage configuration.
    pub storage: StorageConfig,
}

/// Document ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Minimum text-layer length for a PDF to count as native text.
    pub min_text_length: usize,

    /// Maximum pages to OCR in a scanned PDF (0 = unlimited).
    pub max_pages: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            min_text_length: 50,
            max_pages: 10,
        }
    }
}

/// OCR backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Backend tried first.
    pub primary: OcrBackendKind,

    /// Backend tried when the primary fails and fallback is enabled.
    pub fallback: Option<OcrBackendKind>,

    /// Tesseract executable name or path.
    pub tesseract_binary: String,

    /// Directory holding PaddleOCR ONNX models
    /// (`det.onnx`, `<script>_rec.onnx`, `<script>_dict.txt`).
    pub paddle_model_dir: PathBuf,

    /// Keep `[UNK]` tokens from the recognizer instead of blanking them.
    pub keep_unk: bool,

    /// Seconds before a Tesseract process is killed.
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            primary: OcrBackendKind::Tesseract,
            fallback: Some(OcrBackendKind::Paddle),
            tesseract_binary: "tesseract".to_string(),
            paddle_model_dir: PathBuf::from("models"),
            keep_unk: false,
            timeout_secs: 120,
        }
    }
}

/// LLM extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,

    /// Default model identifier.
    pub model: String,

    /// Cheaper model used once when the account runs out of credits.
    pub fallback_model: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Maximum completion tokens.
    pub max_tokens: u32,

    /// Timeout for one service call, in seconds.
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "openai/gpt-4o".to_string(),
            fallback_model: Some("openai/gpt-4o-mini".to_string()),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            temperature: 0.1,
            max_tokens: 1000,
            timeout_secs: 60,
        }
    }
}

impl ExtractionConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Invoice storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the append-only JSON record file.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("invoices_db.json"),
        }
    }
}

impl FaturaConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}

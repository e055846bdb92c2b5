//! Subcommands and the helpers they share.

pub mod batch;
pub mod config;
pub mod process;
pub mod review;

use std::path::{Path, PathBuf};

use clap::Args;

use fatura_core::models::invoice::Field;
use fatura_core::{FaturaConfig, OcrPreference, PipelineOptions, RULES_MODEL};

/// Pipeline knobs common to `process` and `batch`.
#[derive(Args, Clone)]
pub struct PipelineArgs {
    /// Language or script of the documents (ar, fa, ur, en)
    #[arg(short, long, default_value = "ar")]
    language: String,

    /// Whether the fallback OCR backend may run (primary, fallback-enabled)
    #[arg(long, default_value = "fallback-enabled")]
    ocr: OcrPreference,

    /// Language model id (default: the configured model)
    #[arg(short, long, conflicts_with = "rules")]
    model: Option<String>,

    /// Extract fields with offline rules instead of a language model
    #[arg(long)]
    rules: bool,

    /// Record file to persist valid invoices into (overrides config)
    #[arg(long)]
    store: Option<PathBuf>,
}

impl PipelineArgs {
    pub fn options(&self) -> PipelineOptions {
        let model_selector = if self.rules {
            Some(RULES_MODEL.to_string())
        } else {
            self.model.clone()
        };
        PipelineOptions {
            language_hint: self.language.clone(),
            ocr_backend_preference: self.ocr,
            model_selector,
        }
    }

    pub fn apply(&self, config: &mut FaturaConfig) {
        if let Some(store) = &self.store {
            config.storage.path = store.clone();
        }
    }
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// Full pipeline report as JSON
    Json,
    /// One CSV row per document
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Text => "txt",
        }
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fatura")
        .join("config.json")
}

/// The explicit config file, else the default one if present, else defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<FaturaConfig> {
    match config_path {
        Some(path) => Ok(FaturaConfig::from_file(Path::new(path))?),
        None => {
            let path = default_config_path();
            if path.exists() {
                Ok(FaturaConfig::from_file(&path)?)
            } else {
                Ok(FaturaConfig::default())
            }
        }
    }
}

/// Display form of a field value; empty when the field is not present.
pub fn field_text<T: std::fmt::Display>(field: &Field<T>) -> String {
    field.value().map(ToString::to_string).unwrap_or_default()
}

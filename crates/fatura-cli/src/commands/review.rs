//! Review command - validate, decide and store operator-corrected fields.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use console::style;
use tracing::info;

use fatura_core::{Document, InvoiceFields, Orchestrator};

use super::process::format_report;
use super::{OutputFormat, load_config};

/// Arguments for the review command.
#[derive(Args)]
pub struct ReviewArgs {
    /// The invoice file the fields belong to (keys the stored record)
    #[arg(required = true)]
    input: PathBuf,

    /// JSON file with the corrected fields, or a report holding `extracted_fields`
    #[arg(long, required = true)]
    fields: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Record file to persist valid invoices into (overrides config)
    #[arg(long)]
    store: Option<PathBuf>,
}

pub async fn run(args: ReviewArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(store) = &args.store {
        config.storage.path = store.clone();
    }

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }
    let document_id = Document::from_path(&args.input)?.fingerprint();
    let fields = read_fields(&args.fields)?;

    info!("Reviewing {} as {}", args.input.display(), document_id);
    let orchestrator = Orchestrator::from_config(&config)?;
    let report = orchestrator.resume_with_fields(&document_id, fields).await;

    let output = format_report(&report, args.format)?;
    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }
    Ok(())
}

fn read_fields(path: &PathBuf) -> anyhow::Result<InvoiceFields> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read fields file {}", path.display()))?;
    let mut json: serde_json::Value = serde_json::from_str(&content)?;

    // A saved report carries the fields under `extracted_fields`
    if let Some(fields) = json.get_mut("extracted_fields") {
        json = fields.take();
    }
    if !json.is_object() {
        anyhow::bail!("Fields file must hold a JSON object: {}", path.display());
    }
    Ok(serde_json::from_value(json)?)
}

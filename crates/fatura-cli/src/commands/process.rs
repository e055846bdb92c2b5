//! Process command - run the pipeline on a single invoice file.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use fatura_core::models::stage::StageStatus;
use fatura_core::{Document, Orchestrator, PipelineReport};

use super::{OutputFormat, PipelineArgs, field_text, load_config};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (PDF or image)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    args.pipeline.apply(&mut config);

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Processing file: {}", args.input.display());
    let document = Document::from_path(&args.input)?;
    let orchestrator = Orchestrator::from_config(&config)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Running pipeline...");

    let report = orchestrator.run_pipeline(&document, &args.pipeline.options()).await;
    pb.finish_and_clear();

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

    if report.is_halted() {
        anyhow::bail!("Pipeline {}", report.terminal_state());
    }
    Ok(())
}

pub fn format_report(report: &PipelineReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Csv => format_csv(report),
        OutputFormat::Text => Ok(format_text(report)),
    }
}

pub const CSV_HEADER: [&str; 9] = [
    "document_id",
    "terminal_state",
    "action",
    "biller_name",
    "biller_address",
    "total_amount",
    "due_date",
    "duration_ms",
    "errors",
];

/// The report flattened into one row matching [`CSV_HEADER`].
pub fn csv_row(report: &PipelineReport) -> Vec<String> {
    let fields = report.extracted_fields().cloned().unwrap_or_default();
    let errors: Vec<String> = report
        .stages()
        .iter()
        .flat_map(|stage| stage.errors().iter().map(move |e| format!("{}: {}", stage.agent_name(), e)))
        .collect();

    vec![
        report.document_id().to_string(),
        report.terminal_state().to_string(),
        report.decision().map(|d| d.action.to_string()).unwrap_or_default(),
        field_text(&fields.biller_name),
        field_text(&fields.biller_address),
        field_text(&fields.total_amount),
        field_text(&fields.due_date),
        report.duration_ms().to_string(),
        errors.join("; "),
    ]
}

fn format_csv(report: &PipelineReport) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(CSV_HEADER)?;
    wtr.write_record(csv_row(report))?;
    Ok(String::from_utf8(wtr.into_inner()?)?)
}

fn format_text(report: &PipelineReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("Document: {}\n", report.document_id()));
    output.push_str(&format!("Result:   {}\n", report.terminal_state()));
    output.push('\n');

    output.push_str("Stages:\n");
    for stage in report.stages() {
        let status = match stage.status() {
            StageStatus::Success => style(stage.status()).green(),
            StageStatus::Failed => style(stage.status()).yellow(),
            StageStatus::Error => style(stage.status()).red(),
            StageStatus::Skipped => style(stage.status()).dim(),
        };
        output.push_str(&format!("  {:<32} {}\n", stage.agent_name().label(), status));
        for error in stage.errors() {
            output.push_str(&format!("    - {}\n", error));
        }
    }

    if let Some(fields) = report.extracted_fields() {
        output.push('\n');
        output.push_str("Invoice:\n");
        output.push_str(&format!("  Biller:  {}\n", field_text(&fields.biller_name)));
        output.push_str(&format!("  Address: {}\n", field_text(&fields.biller_address)));
        output.push_str(&format!("  Total:   {}\n", field_text(&fields.total_amount)));
        output.push_str(&format!("  Due:     {}\n", field_text(&fields.due_date)));
    }

    if let Some(decision) = report.decision() {
        output.push_str(&format!("\nDecision: {} ({})\n", decision.action, decision.reason));
    }

    output
}

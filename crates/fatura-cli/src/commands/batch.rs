//! Batch processing command for multiple invoice files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, warn};

use fatura_core::{Document, Orchestrator, PipelineOptions, PipelineReport};

use super::process::{CSV_HEADER, csv_row, format_report};
use super::{OutputFormat, PipelineArgs, load_config};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Continue when a document halts the pipeline
    #[arg(long)]
    continue_on_error: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

/// Outcome for one file.
struct BatchItem {
    path: PathBuf,
    report: Option<PipelineReport>,
    error: Option<String>,
}

const SUPPORTED_EXTENSIONS: [&str; 9] = ["pdf", "png", "jpg", "jpeg", "tif", "tiff", "bmp", "webp", "gif"];

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut config = load_config(config_path)?;
    args.pipeline.apply(&mut config);

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
            SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str())
        })
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let orchestrator = Orchestrator::from_config(&config)?;
    let options = args.pipeline.options();

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    // One document at a time; the record file is shared
    let mut items = Vec::with_capacity(files.len());
    for path in files {
        let item = process_single_file(&orchestrator, &path, &options).await;

        if let Some(error_msg) = &item.error {
            if args.continue_on_error {
                warn!("Failed to process {}: {}", path.display(), error_msg);
            } else {
                error!("Failed to process {}: {}", path.display(), error_msg);
                pb.abandon();
                anyhow::bail!("Processing failed for {}: {}", path.display(), error_msg);
            }
        }

        if let (Some(report), Some(output_dir)) = (&item.report, &args.output_dir) {
            write_output(output_dir, &item.path, report, args.format)?;
        }

        items.push(item);
        pb.inc(1);
    }

    pb.finish_with_message("Complete");

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &items)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let failed: Vec<_> = items.iter().filter(|i| i.error.is_some()).collect();

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        items.len(),
        start.elapsed()
    );
    println!(
        "   {} completed, {} failed",
        style(items.len() - failed.len()).green(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for item in &failed {
            println!(
                "  - {}: {}",
                item.path.display(),
                item.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

async fn process_single_file(orchestrator: &Orchestrator, path: &Path, options: &PipelineOptions) -> BatchItem {
    let document = match Document::from_path(path) {
        Ok(document) => document,
        Err(e) => {
            return BatchItem {
                path: path.to_path_buf(),
                report: None,
                error: Some(e.to_string()),
            };
        }
    };

    let report = orchestrator.run_pipeline(&document, options).await;
    let error = report.is_halted().then(|| {
        report
            .stages()
            .iter()
            .flat_map(|s| s.errors())
            .next()
            .cloned()
            .unwrap_or_else(|| report.terminal_state().to_string())
    });

    BatchItem {
        path: path.to_path_buf(),
        report: Some(report),
        error,
    }
}

fn write_output(output_dir: &Path, input: &Path, report: &PipelineReport, format: OutputFormat) -> anyhow::Result<()> {
    let output_name = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("invoice");
    let output_path = output_dir.join(format!("{}.{}", output_name, format.extension()));

    fs::write(&output_path, format_report(report, format)?)?;
    debug!("Wrote output to {}", output_path.display());
    Ok(())
}

fn write_summary(path: &Path, items: &[BatchItem]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header = vec!["filename"];
    header.extend(CSV_HEADER);
    wtr.write_record(&header)?;

    for item in items {
        let filename = item
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();

        let mut row = vec![filename];
        match &item.report {
            Some(report) => row.extend(csv_row(report)),
            None => {
                row.extend(std::iter::repeat_n(String::new(), CSV_HEADER.len() - 1));
                row.push(item.error.clone().unwrap_or_default());
            }
        }
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

//! Process command - fill the candidate spreadsheet for one or more résumés.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use resfill_core::models::config::ModelSettings;
use resfill_core::pipeline::{BatchRunner, BatchSummary, CancelFlag, DocumentOutcome, Pipeline};
use resfill_core::{ChatClient, discover_documents, template};

use super::config::load_config;

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Résumé file (PDF or DOCX) or a directory of résumés
    #[arg(required = true)]
    input: PathBuf,

    /// Output directory (default: next to each input file)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Spreadsheet template (default: from configuration)
    #[arg(short, long)]
    template: Option<PathBuf>,

    /// Number of documents processed concurrently
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Include subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Also write the extracted record as <name>_parsed.json
    #[arg(long)]
    json: bool,

    /// Write a summary CSV into the output directory
    #[arg(long)]
    summary: bool,
}

pub async fn run(args: ProcessArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    if let Some(jobs) = args.jobs {
        config.batch.jobs = jobs;
    }
    if args.recursive {
        config.batch.recursive = true;
    }
    if args.json {
        config.output.write_json = true;
    }
    if let Some(path) = &args.template {
        config.template.path = path.clone();
    }

    // Setup failures end the run before any document is touched.
    let settings = ModelSettings::from_env()?;
    let files = discover_documents(&args.input, config.batch.recursive)?;
    template::preflight(&config.template.path)?;

    if files.is_empty() {
        println!(
            "{} No PDF or DOCX files found in {}",
            style("ℹ").blue(),
            args.input.display()
        );
        return Ok(());
    }

    println!(
        "{} Found {} file(s) to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(dir) = &args.output_dir {
        fs::create_dir_all(dir)?;
    }

    let client = ChatClient::new(&settings)?.with_temperature(config.prompt.temperature);
    info!("Using model {} at {}", client.model(), settings.base_url);

    let pipeline = Arc::new(Pipeline::new(config, Arc::new(client), settings.timeout));
    let cancel = CancelFlag::new();
    let runner = BatchRunner::new(pipeline).with_cancel_flag(cancel.clone());

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing documents in progress");
                cancel.cancel();
            }
        });
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let summary = runner
        .run(files, args.output_dir.as_deref(), |outcome| {
            let name = outcome
                .path()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            pb.set_message(name);
            pb.inc(1);
        })
        .await;

    pb.finish_and_clear();

    if args.summary {
        let summary_path = args
            .output_dir
            .clone()
            .or_else(|| summary_dir(&args.input))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("summary.csv");
        write_summary(&summary_path, &summary)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    print_summary(&summary, start);
    Ok(())
}

fn summary_dir(input: &Path) -> Option<PathBuf> {
    if input.is_dir() {
        Some(input.to_path_buf())
    } else {
        input.parent().map(Path::to_path_buf)
    }
}

fn print_summary(summary: &BatchSummary, start: Instant) {
    println!();
    println!(
        "{} Processed {} file(s) in {:?}",
        style("✓").green(),
        summary.total(),
        start.elapsed()
    );
    println!(
        "   {} complete, {} with fields to review, {} failed",
        style(summary.succeeded()).green(),
        style(summary.partial()).yellow(),
        style(summary.failed_count()).red()
    );
    if !summary.skipped.is_empty() {
        println!("   {} skipped", style(summary.skipped.len()).dim());
    }

    let partial: Vec<_> = summary.completed.iter().filter(|r| !r.is_complete()).collect();
    if !partial.is_empty() {
        println!();
        println!("{}", style("Fields to review:").yellow());
        for report in partial {
            let fields: Vec<String> = report.unresolved.iter().map(|p| p.to_string()).collect();
            println!("  - {}: {}", report.output.display(), fields.join(", "));
        }
    }

    if !summary.failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for failed in &summary.failed {
            println!(
                "  - {} [{}]: {}",
                failed.path.display(),
                failed.stage,
                failed.message
            );
        }
    }
}

fn write_summary(path: &Path, summary: &BatchSummary) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(summary_header())?;
    for row in summary_rows(summary) {
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

fn summary_header() -> [&'static str; 8] {
    [
        "filename",
        "status",
        "candidate",
        "output",
        "unresolved_fields",
        "model_attempts",
        "processing_time_ms",
        "error",
    ]
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn summary_rows(summary: &BatchSummary) -> Vec<[String; 8]> {
    let mut rows = Vec::with_capacity(summary.total());

    for report in &summary.completed {
        let status = if report.is_complete() { "success" } else { "partial" };
        let fields: Vec<String> = report.unresolved.iter().map(|p| p.to_string()).collect();
        rows.push([
            file_name(&report.source),
            status.to_string(),
            report.candidate.clone(),
            report.output.display().to_string(),
            fields.join(";"),
            report.model_attempts.to_string(),
            report.processing_time_ms.to_string(),
            String::new(),
        ]);
    }
    for failed in &summary.failed {
        rows.push([
            file_name(&failed.path),
            failed.stage.as_str().to_string(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            failed.message.clone(),
        ]);
    }
    for path in &summary.skipped {
        rows.push([
            file_name(path),
            "skipped".to_string(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        ]);
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use resfill_core::FailureStage;
    use resfill_core::pipeline::FailedDocument;

    #[test]
    fn test_summary_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        let summary = BatchSummary {
            completed: Vec::new(),
            failed: vec![FailedDocument {
                path: PathBuf::from("/in/locked.pdf"),
                stage: FailureStage::Unreadable,
                message: "unreadable document: document is encrypted".into(),
            }],
            skipped: vec![PathBuf::from("/in/later.docx")],
        };

        write_summary(&path, &summary).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("filename,status,candidate"));
        assert!(lines[1].starts_with("locked.pdf,UnreadableDocument,"));
        assert!(lines[1].ends_with("unreadable document: document is encrypted"));
        assert!(lines[2].starts_with("later.docx,skipped"));
    }
}

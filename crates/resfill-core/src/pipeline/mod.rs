//! Single-document pipeline and batch orchestration.

pub mod batch;

pub use batch::{
    BatchRunner, BatchSummary, CancelFlag, DocumentOutcome, FailedDocument, discover_documents,
    output_stems,
};

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::canonical::canonicalize;
use crate::document::{self, DocumentFormat};
use crate::error::{DocumentError, ExtractionError, ResfillError, Result, TemplateError};
use crate::extraction::{CompletionModel, Extractor, PromptBuilder, RetryPolicy};
use crate::models::config::PipelineConfig;
use crate::models::record::{CandidateRecord, FieldPath};
use crate::template::{self, PopulateOptions};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Result of one successfully processed document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub source: PathBuf,
    /// The populated spreadsheet.
    pub output: PathBuf,
    /// The `_parsed.json` sidecar, when enabled.
    pub record_output: Option<PathBuf>,
    pub candidate: String,
    /// Leaves written with the missing marker.
    pub unresolved: Vec<FieldPath>,
    pub model_attempts: u32,
    /// Characters dropped from the prompt input.
    pub truncated_chars: usize,
    pub processing_time_ms: u64,
}

impl DocumentReport {
    /// True when no field had to be flagged.
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Runs documents through text extraction, the model call, canonicalization
/// and template population.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    extractor: Extractor,
    template_path: PathBuf,
}

impl Pipeline {
    /// `timeout` bounds each model call.
    pub fn new(config: PipelineConfig, model: Arc<dyn CompletionModel>, timeout: Duration) -> Self {
        let extractor = Extractor::new(
            model,
            PromptBuilder::new(&config.prompt),
            RetryPolicy::new(&config.retry, timeout),
        );
        let template_path = config.template.path.clone();

        Self {
            config: Arc::new(config),
            extractor,
            template_path,
        }
    }

    /// Use a template other than the configured one.
    pub fn with_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_path = path.into();
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    /// Spreadsheet and sidecar paths for outputs named `stem` inside
    /// `output_dir`.
    pub fn output_paths(&self, stem: &str, output_dir: &Path) -> (PathBuf, PathBuf) {
        (
            output_dir.join(format!("{}{}.xlsx", stem, self.config.output.suffix)),
            output_dir.join(format!("{stem}_parsed.json")),
        )
    }

    /// Process one document, naming the outputs after its file stem.
    pub async fn run_document(&self, path: &Path, output_dir: &Path) -> Result<DocumentReport> {
        self.run_document_as(path, output_dir, &output_stem(path))
            .await
    }

    /// Process one document with outputs named `stem`. The output files only
    /// appear once every stage has succeeded.
    pub async fn run_document_as(
        &self,
        path: &Path,
        output_dir: &Path,
        stem: &str,
    ) -> Result<DocumentReport> {
        let start = Instant::now();
        let format = DocumentFormat::from_path(path)?;

        let text = {
            let path = path.to_path_buf();
            let config = self.config.document.clone();
            tokio::task::spawn_blocking(move || document::extract_text(&path, format, &config))
                .await
                .map_err(|e| DocumentError::Malformed(format!("text extraction aborted: {e}")))??
        };
        debug!(
            "{}: {} chars of {} text",
            path.display(),
            text.char_count(),
            format.as_str()
        );

        let extraction = self.extractor.extract(&text.text).await?;
        let canonical = canonicalize(&extraction.response.record);
        let Some(candidate) = canonical.record.name().map(str::to_string) else {
            return Err(ExtractionError::MissingName.into());
        };

        let options = PopulateOptions {
            generated_at: self
                .config
                .template
                .stamp_generated_at
                .then(|| chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()),
        };

        let (output, sidecar) = self.output_paths(stem, output_dir);
        let record_output = self.config.output.write_json.then_some(sidecar);

        {
            let record = canonical.record.clone();
            let template_path = self.template_path.clone();
            let output_dir = output_dir.to_path_buf();
            let output = output.clone();
            let record_output = record_output.clone();

            tokio::task::spawn_blocking(move || -> Result<()> {
                let template = template::load_template(&template_path)?;
                let bytes = template::populate(&record, &template, &options)?;

                std::fs::create_dir_all(&output_dir).map_err(|source| ResfillError::Output {
                    path: output_dir.clone(),
                    source,
                })?;
                write_atomic(&output, &bytes)?;
                if let Some(json_path) = &record_output {
                    if let Err(e) = write_record(&record, json_path) {
                        if let Err(remove) = std::fs::remove_file(&output) {
                            warn!("Could not remove {}: {}", output.display(), remove);
                        }
                        return Err(e);
                    }
                }
                Ok(())
            })
            .await
            .map_err(|e| TemplateError::Write(std::io::Error::other(e.to_string())))??;
        }

        let report = DocumentReport {
            source: path.to_path_buf(),
            output,
            record_output,
            candidate,
            unresolved: canonical.unresolved,
            model_attempts: extraction.attempts,
            truncated_chars: extraction
                .truncation
                .map(|t| t.original_chars - t.kept_chars)
                .unwrap_or(0),
            processing_time_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "{} -> {} ({} flagged field(s), {}ms)",
            path.display(),
            report.output.display(),
            report.unresolved.len(),
            report.processing_time_ms
        );

        Ok(report)
    }
}

/// File stem naming the outputs of `source`.
pub fn output_stem(source: &Path) -> String {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "resume".to_string())
}

fn write_record(record: &CandidateRecord, path: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(record).map_err(|e| ResfillError::Output {
        path: path.to_path_buf(),
        source: std::io::Error::other(e),
    })?;
    write_atomic(path, &json)
}

/// Write through a temporary file in the target directory, then rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let output_error = |source: std::io::Error| ResfillError::Output {
        path: path.to_path_buf(),
        source,
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut file = NamedTempFile::new_in(dir).map_err(output_error)?;
    file.write_all(bytes).map_err(output_error)?;
    file.as_file().sync_all().map_err(output_error)?;
    file.persist(path).map_err(|e| output_error(e.error))?;
    Ok(())
}

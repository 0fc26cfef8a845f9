//! Batch processing of many documents.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use futures_util::stream;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{DocumentReport, Pipeline, output_stem};
use crate::document::DocumentFormat;
use crate::error::{DocumentError, FailureStage, ResfillError};

/// Collect the documents to process under `path`.
///
/// A file is returned as is, whatever its extension, so an unsupported
/// single input still shows up in the summary. Directories yield their
/// supported documents in path order.
pub fn discover_documents(path: &Path, recursive: bool) -> Result<Vec<PathBuf>, DocumentError> {
    let metadata = std::fs::metadata(path).map_err(|source| DocumentError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    if metadata.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let walker = WalkDir::new(path)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| DocumentError::Open {
            path: e.path().unwrap_or(path).to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        // Office lock files
        if name.starts_with("~$") || name.starts_with('.') {
            continue;
        }
        if DocumentFormat::is_supported(entry.path()) {
            files.push(entry.into_path());
        } else {
            debug!("Skipping {}", entry.path().display());
        }
    }

    files.sort();
    Ok(files)
}

/// Output stems for `files`, unique per target directory.
///
/// A stem shared by several inputs going to the same directory (`张三.pdf`
/// and `张三.docx`, or `a.pdf` and `nested/a.pdf` written to one output
/// directory) gains the source extension, then a counter in input order
/// if that still clashes. Comparison ignores case.
pub fn output_stems(files: &[PathBuf], output_dir: Option<&Path>) -> Vec<String> {
    let targets: Vec<(PathBuf, String)> = files
        .iter()
        .map(|path| {
            let dir = match output_dir {
                Some(dir) => dir.to_path_buf(),
                None => source_dir(path),
            };
            (dir, output_stem(path))
        })
        .collect();

    let key = |dir: &Path, stem: &str| (dir.to_path_buf(), stem.to_lowercase());

    let mut counts: HashMap<(PathBuf, String), usize> = HashMap::new();
    for (dir, stem) in &targets {
        *counts.entry(key(dir, stem)).or_default() += 1;
    }
    let clashes = |dir: &Path, stem: &str| counts.get(&key(dir, stem)).copied().unwrap_or(0) > 1;

    let mut taken: HashSet<(PathBuf, String)> = targets
        .iter()
        .filter(|(dir, stem)| !clashes(dir, stem))
        .map(|(dir, stem)| key(dir, stem))
        .collect();

    files
        .iter()
        .zip(&targets)
        .map(|(path, (dir, stem))| {
            if !clashes(dir, stem) {
                return stem.clone();
            }
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_else(|| "file".to_string());
            let base = format!("{stem}_{ext}");
            let mut candidate = base.clone();
            let mut n = 2;
            while !taken.insert(key(dir, &candidate)) {
                candidate = format!("{base}_{n}");
                n += 1;
            }
            warn!(
                "{} shares its name with another input, writing it as {}",
                path.display(),
                candidate
            );
            candidate
        })
        .collect()
}

fn source_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Shared flag that stops a batch from starting further documents.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A document that failed, with the stage it failed in.
#[derive(Debug, Clone, Serialize)]
pub struct FailedDocument {
    pub path: PathBuf,
    pub stage: FailureStage,
    pub message: String,
}

impl FailedDocument {
    fn new(path: PathBuf, error: &ResfillError) -> Self {
        Self {
            path,
            stage: error.stage(),
            message: error.to_string(),
        }
    }
}

/// Outcome of one document in a batch.
#[derive(Debug, Clone)]
pub enum DocumentOutcome {
    Completed(DocumentReport),
    Failed(FailedDocument),
    /// Not started because the batch was cancelled.
    Skipped(PathBuf),
}

impl DocumentOutcome {
    pub fn path(&self) -> &Path {
        match self {
            DocumentOutcome::Completed(report) => &report.source,
            DocumentOutcome::Failed(failed) => &failed.path,
            DocumentOutcome::Skipped(path) => path,
        }
    }
}

/// Summary of a batch run, in input order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub completed: Vec<DocumentReport>,
    pub failed: Vec<FailedDocument>,
    pub skipped: Vec<PathBuf>,
}

impl BatchSummary {
    fn push(&mut self, outcome: DocumentOutcome) {
        match outcome {
            DocumentOutcome::Completed(report) => self.completed.push(report),
            DocumentOutcome::Failed(failed) => self.failed.push(failed),
            DocumentOutcome::Skipped(path) => self.skipped.push(path),
        }
    }

    /// Documents written without any flagged field.
    pub fn succeeded(&self) -> usize {
        self.completed.iter().filter(|r| r.is_complete()).count()
    }

    /// Documents written with at least one flagged field.
    pub fn partial(&self) -> usize {
        self.completed.len() - self.succeeded()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len() + self.skipped.len()
    }

    /// Failures grouped by stage.
    pub fn failures_by_stage(&self, stage: FailureStage) -> impl Iterator<Item = &FailedDocument> {
        self.failed.iter().filter(move |f| f.stage == stage)
    }
}

/// Runs a [`Pipeline`] over many documents with bounded concurrency.
pub struct BatchRunner {
    pipeline: Arc<Pipeline>,
    jobs: usize,
    cancel: CancelFlag,
}

impl BatchRunner {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let jobs = pipeline.config().batch.jobs;
        Self {
            pipeline,
            jobs: jobs.max(1),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Process `files`, writing into `output_dir` or, when `None`, next to
    /// each source. Per-document failures are recorded, never returned.
    /// `on_done` sees each outcome as it finishes.
    pub async fn run(
        &self,
        files: Vec<PathBuf>,
        output_dir: Option<&Path>,
        mut on_done: impl FnMut(&DocumentOutcome),
    ) -> BatchSummary {
        info!(
            "Processing {} document(s) with {} worker(s)",
            files.len(),
            self.jobs
        );

        let stems = output_stems(&files, output_dir);
        let mut outcomes: Vec<(usize, DocumentOutcome)> = Vec::with_capacity(files.len());
        let mut pending = pin!(stream::iter(files.into_iter().zip(stems).enumerate())
            .map(|(index, (path, stem))| async move {
                if self.cancel.is_cancelled() {
                    return (index, DocumentOutcome::Skipped(path));
                }
                let target = match output_dir {
                    Some(dir) => dir.to_path_buf(),
                    None => source_dir(&path),
                };
                let outcome = match self
                    .pipeline
                    .run_document_as(&path, &target, &stem)
                    .await {
                    Ok(report) => DocumentOutcome::Completed(report),
                    Err(e) => {
                        warn!("{} failed ({}): {}", path.display(), e.stage(), e);
                        DocumentOutcome::Failed(FailedDocument::new(path, &e))
                    }
                };
                (index, outcome)
            })
            .buffer_unordered(self.jobs));

        while let Some((index, outcome)) = pending.next().await {
            on_done(&outcome);
            outcomes.push((index, outcome));
        }

        outcomes.sort_by_key(|(index, _)| *index);
        let mut summary = BatchSummary::default();
        for (_, outcome) in outcomes {
            summary.push(outcome);
        }

        info!(
            "Batch finished: {} succeeded, {} partial, {} failed, {} skipped",
            summary.succeeded(),
            summary.partial(),
            summary.failed_count(),
            summary.skipped.len()
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn test_discover_non_recursive() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.pdf"), b"").unwrap();
        fs::write(dir.path().join("a.DOCX"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        fs::write(dir.path().join("~$a.docx"), b"").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.pdf"), b"").unwrap();

        let files = discover_documents(dir.path(), false).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.DOCX", "b.pdf"]);

        let files = discover_documents(dir.path(), true).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.contains(&dir.path().join("nested").join("c.pdf")));
    }

    #[test]
    fn test_discover_single_file_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("resume.txt");
        fs::write(&file, b"").unwrap();

        assert_eq!(discover_documents(&file, false).unwrap(), vec![file]);
        assert!(matches!(
            discover_documents(&dir.path().join("missing"), false),
            Err(DocumentError::Open { .. })
        ));
    }

    #[test]
    fn test_cancel_flag_shared() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_output_stems_keep_unique_names() {
        let files = vec![PathBuf::from("/in/a.pdf"), PathBuf::from("/in/b.docx")];
        assert_eq!(output_stems(&files, None), vec!["a", "b"]);
    }

    #[test]
    fn test_output_stems_disambiguate_shared_stems() {
        let files = vec![
            PathBuf::from("/in/张三.pdf"),
            PathBuf::from("/in/张三.DOCX"),
            PathBuf::from("/in/李四.pdf"),
        ];
        assert_eq!(output_stems(&files, None), vec!["张三_pdf", "张三_docx", "李四"]);
    }

    #[test]
    fn test_output_stems_per_target_directory() {
        let files = vec![PathBuf::from("/in/a.pdf"), PathBuf::from("/in/nested/a.pdf")];
        assert_eq!(output_stems(&files, None), vec!["a", "a"]);

        let out = Path::new("/out");
        assert_eq!(output_stems(&files, Some(out)), vec!["a_pdf", "a_pdf_2"]);
    }

    #[test]
    fn test_output_stems_avoid_existing_names() {
        let files = vec![
            PathBuf::from("/in/a.pdf"),
            PathBuf::from("/in/A.docx"),
            PathBuf::from("/in/a_pdf.pdf"),
        ];
        assert_eq!(output_stems(&files, None), vec!["a_pdf_2", "A_docx", "a_pdf"]);
    }

    #[test]
    fn test_summary_counts() {
        let report = |unresolved: usize| DocumentReport {
            source: PathBuf::from("a.pdf"),
            output: PathBuf::from("a_filled.xlsx"),
            record_output: None,
            candidate: "张三".into(),
            unresolved: vec![
                crate::models::record::FieldPath::set(crate::models::schema::SKILLS_KEY);
                unresolved
            ],
            model_attempts: 1,
            truncated_chars: 0,
            processing_time_ms: 5,
        };

        let mut summary = BatchSummary::default();
        summary.push(DocumentOutcome::Completed(report(0)));
        summary.push(DocumentOutcome::Completed(report(2)));
        summary.push(DocumentOutcome::Failed(FailedDocument {
            path: PathBuf::from("b.pdf"),
            stage: FailureStage::Unreadable,
            message: "document is encrypted".into(),
        }));
        summary.push(DocumentOutcome::Skipped(PathBuf::from("c.pdf")));

        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.partial(), 1);
        assert_eq!(summary.failed_count(), 1);
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.failures_by_stage(FailureStage::Unreadable).count(), 1);
        assert_eq!(summary.failures_by_stage(FailureStage::Template).count(), 0);
    }
}

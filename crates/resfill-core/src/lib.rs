//! Core library for turning résumés into the standard candidate spreadsheet.
//!
//! This crate provides:
//! - Document text extraction (PDF and DOCX)
//! - Model-driven field extraction with bounded retries and tolerant reply parsing
//! - Canonicalization of candidate records (validation, degree normalization, deduplication)
//! - Template population with row-block expansion and highlighted gaps
//! - Batch orchestration with per-document failure isolation

pub mod canonical;
pub mod document;
pub mod error;
pub mod extraction;
pub mod models;
pub mod pipeline;
pub mod template;

pub use canonical::{CanonicalRecord, canonicalize};
pub use document::{DocumentFormat, ExtractedText, extract_text};
pub use error::{
    ConfigError, DocumentError, ExtractionError, FailureStage, ModelError, ResfillError, Result,
    TemplateError,
};
pub use extraction::{ChatClient, CompletionModel, ExtractionRequest, Extractor, parse_response};
pub use models::config::{ModelSettings, PipelineConfig};
pub use models::record::{CandidateRecord, Degree, Field, FieldPath};
pub use models::schema::ExtractionSchema;
pub use pipeline::{
    BatchRunner, BatchSummary, CancelFlag, DocumentOutcome, DocumentReport, FailedDocument,
    Pipeline, discover_documents,
};
pub use template::{LAYOUT_V1, PopulateOptions, populate, write_default_template};

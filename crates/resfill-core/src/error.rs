//! Error types for the resfill-core library.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the resfill library.
#[derive(Error, Debug)]
pub enum ResfillError {
    /// The input document could not be turned into text.
    #[error("unreadable document: {0}")]
    Document(#[from] DocumentError),

    /// The model reply could not be turned into a candidate record.
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// The spreadsheet template could not be populated.
    #[error("template write failed: {0}")]
    Template(#[from] TemplateError),

    /// The populated output could not be materialized on disk.
    #[error("failed to write output {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error. Fatal before any document is touched.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ResfillError {
    /// Pipeline stage this error originated from.
    pub fn stage(&self) -> FailureStage {
        match self {
            ResfillError::Document(_) => FailureStage::Unreadable,
            ResfillError::Extraction(_) => FailureStage::Extraction,
            ResfillError::Template(_) => FailureStage::Template,
            ResfillError::Output { .. } => FailureStage::Output,
            ResfillError::Config(_) => FailureStage::Configuration,
        }
    }
}

/// Stage a per-document failure is attributed to in the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// `UnreadableDocument`
    Unreadable,
    /// `ExtractionParseFailure`, including exhausted model retries.
    Extraction,
    /// `TemplateWriteFailure`
    Template,
    /// Writing the finished file failed.
    Output,
    /// Only reachable when a caller feeds configuration errors into a summary.
    Configuration,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Unreadable => "UnreadableDocument",
            FailureStage::Extraction => "ExtractionParseFailure",
            FailureStage::Template => "TemplateWriteFailure",
            FailureStage::Output => "OutputWriteFailure",
            FailureStage::Configuration => "ConfigurationError",
        }
    }
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors related to reading PDF and DOCX documents.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// Failed to open or read the file.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file extension is not a supported document format.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// Legacy Word binary format.
    #[error("legacy .doc files are not supported, re-save the file as .docx")]
    LegacyDoc,

    /// The document is password protected.
    #[error("document is encrypted")]
    Encrypted,

    /// The container could not be parsed.
    #[error("malformed document: {0}")]
    Malformed(String),

    /// The PDF has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// The PDF only carries scanned images.
    #[error("PDF contains only images, no extractable text")]
    ImageOnly,

    /// Nothing extractable was found.
    #[error("document contains no extractable text")]
    NoText,
}

/// Errors of the model-call boundary (`ModelTransportFailure`).
#[derive(Error, Debug)]
pub enum ModelError {
    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The call did not complete within the configured timeout.
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    /// The service answered with a non-success status.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The service answered without any message content.
    #[error("model returned empty content")]
    EmptyContent,
}

impl ModelError {
    /// Whether the failure is transport-level and worth another attempt.
    ///
    /// Rate limiting and server errors count as transport failures; other API
    /// errors (bad key, bad request) would fail identically on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Http(_) | ModelError::Timeout(_) => true,
            ModelError::Api { status, .. } => *status == 429 || *status >= 500,
            ModelError::EmptyContent => false,
        }
    }
}

/// Errors turning a model reply into a candidate record
/// (`ExtractionParseFailure`).
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// No parseable JSON object anywhere in the reply.
    #[error("no JSON object found in model reply")]
    NoJsonObject { raw: String },

    /// A JSON object was found but carries none of the schema sections.
    #[error("model reply has none of the expected sections")]
    MissingSections { raw: String },

    /// The candidate name, required for success, could not be resolved.
    #[error("candidate name could not be extracted")]
    MissingName,

    /// The model call failed and retries were exhausted.
    #[error("model call failed after {attempts} attempts: {last}")]
    TransportExhausted {
        attempts: u32,
        #[source]
        last: ModelError,
    },

    /// The model call failed with an error that is not retried.
    #[error("model call rejected: {0}")]
    Rejected(#[source] ModelError),
}

impl ExtractionError {
    /// Raw model reply, when the failure happened after a reply arrived.
    pub fn raw_reply(&self) -> Option<&str> {
        match self {
            ExtractionError::NoJsonObject { raw } | ExtractionError::MissingSections { raw } => {
                Some(raw)
            }
            _ => None,
        }
    }
}

/// Errors related to the spreadsheet template (`TemplateWriteFailure`).
#[derive(Error, Debug)]
pub enum TemplateError {
    /// The template file could not be read.
    #[error("failed to read template {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The template is not a readable ZIP package.
    #[error("template archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A required package part is missing.
    #[error("template is missing part {0}")]
    MissingPart(String),

    /// A package part is not well-formed.
    #[error("malformed template part {part}: {reason}")]
    Xml { part: String, reason: String },

    /// An anchor label does not match the expected layout version.
    #[error(
        "template does not match layout v{version}: expected {expected:?} at {cell}, found {found:?}"
    )]
    LayoutMismatch {
        version: u32,
        cell: String,
        expected: String,
        found: String,
    },

    /// Serializing the populated workbook failed.
    #[error("failed to serialize workbook: {0}")]
    Write(#[from] std::io::Error),
}

/// Configuration errors (`ConfigurationError`).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("required environment variable '{0}' is not set")]
    MissingVar(&'static str),

    /// A variable is set but its value is not usable.
    #[error("invalid value for '{key}': {reason}")]
    InvalidVar { key: &'static str, reason: String },

    /// The configuration file could not be read or parsed.
    #[error("failed to load config file {path}: {reason}")]
    File { path: PathBuf, reason: String },
}

/// Result type for the resfill library.
pub type Result<T> = std::result::Result<T, ResfillError>;

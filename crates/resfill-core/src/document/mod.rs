//! Document text extraction (PDF and DOCX).

mod docx;
mod normalize;
mod pdf;

pub use docx::DocxReader;
pub use normalize::normalize_text;
pub use pdf::PdfReader;

use std::path::Path;

use tracing::debug;

use crate::error::DocumentError;
use crate::models::config::DocumentConfig;

/// Result type for document operations.
pub type Result<T> = std::result::Result<T, DocumentError>;

/// File extensions the pipeline accepts.
pub const SUPPORTED_EXTENSIONS: [&str; 2] = ["pdf", "docx"];

/// Declared format of an input document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
}

impl DocumentFormat {
    /// Determine the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "doc" => Err(DocumentError::LegacyDoc),
            other => Err(DocumentError::UnsupportedFormat(format!(".{other}"))),
        }
    }

    /// Whether a path has one of the supported extensions.
    pub fn is_supported(path: &Path) -> bool {
        Self::from_path(path).is_ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

/// Trait for document readers.
pub trait DocumentReader {
    /// Load a document from bytes.
    fn load(&mut self, data: &[u8]) -> Result<()>;

    /// Extract the raw text of the loaded document, in reading order.
    fn extract_text(&self) -> Result<String>;

    /// Whether the loaded document carries embedded images.
    fn has_images(&self) -> bool {
        false
    }
}

/// Normalized text of one document.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub format: DocumentFormat,
    pub text: String,
}

impl ExtractedText {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Read a document from disk and return its normalized text.
pub fn extract_text(
    path: &Path,
    format: DocumentFormat,
    config: &DocumentConfig,
) -> Result<ExtractedText> {
    let data = std::fs::read(path).map_err(|source| DocumentError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    extract_text_from_bytes(&data, format, config)
}

/// Extract and normalize text from in-memory document bytes.
pub fn extract_text_from_bytes(
    data: &[u8],
    format: DocumentFormat,
    config: &DocumentConfig,
) -> Result<ExtractedText> {
    let mut reader: Box<dyn DocumentReader> = match format {
        DocumentFormat::Pdf => Box::new(PdfReader::new()),
        DocumentFormat::Docx => Box::new(DocxReader::new()),
    };
    reader.load(data)?;

    let raw = reader.extract_text()?;
    let text = normalize_text(&raw);
    let visible = text.chars().filter(|c| !c.is_whitespace()).count();

    debug!(
        "Extracted {} chars ({} visible) from {} document",
        text.len(),
        visible,
        format.as_str()
    );

    if visible < config.min_text_chars.max(1) {
        return Err(if reader.has_images() {
            DocumentError::ImageOnly
        } else {
            DocumentError::NoText
        });
    }

    Ok(ExtractedText { format, text })
}

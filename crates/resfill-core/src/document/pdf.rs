//! PDF text extraction using lopdf and pdf-extract.

use lopdf::{Document, Object};
use tracing::{debug, trace, warn};

use super::{DocumentReader, Result};
use crate::error::DocumentError;

/// PDF text extractor.
pub struct PdfReader {
    document: Option<Document>,
    raw_data: Vec<u8>,
}

impl PdfReader {
    /// Create a new PDF reader.
    pub fn new() -> Self {
        Self {
            document: None,
            raw_data: Vec::new(),
        }
    }

    /// Count image XObjects anywhere in the document.
    fn count_images(&self) -> usize {
        let Some(doc) = self.document.as_ref() else {
            return 0;
        };

        let count = doc
            .objects
            .values()
            .filter(|object| is_image_object(object))
            .count();

        trace!("Found {} image objects", count);
        count
    }
}

impl Default for PdfReader {
    fn default() -> Self {
        Self::new()
    }
}

fn is_image_object(object: &Object) -> bool {
    let Object::Stream(stream) = object else {
        return false;
    };
    stream
        .dict
        .get(b"Subtype")
        .ok()
        .and_then(|subtype| subtype.as_name().ok())
        .is_some_and(|name| name == b"Image")
}

/// Whether the trailer of a PDF declares an encryption dictionary.
fn declares_encryption(data: &[u8]) -> bool {
    data.windows(b"/Encrypt".len()).any(|w| w == b"/Encrypt")
}

impl DocumentReader for PdfReader {
    fn load(&mut self, data: &[u8]) -> Result<()> {
        let mut doc = Document::load_mem(data).map_err(|e| {
            let message = e.to_string();
            if declares_encryption(data) || message.to_lowercase().contains("crypt") {
                DocumentError::Encrypted
            } else {
                DocumentError::Malformed(message)
            }
        })?;

        // Handle PDFs with empty password encryption
        if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(DocumentError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            // pdf-extract reads the decrypted copy
            let mut decrypted_data = Vec::new();
            doc.save_to(&mut decrypted_data).map_err(|e| {
                DocumentError::Malformed(format!("failed to save decrypted PDF: {e}"))
            })?;
            self.raw_data = decrypted_data;
        } else {
            self.raw_data = data.to_vec();
        }

        let page_count = doc.get_pages().len();
        if page_count == 0 {
            return Err(DocumentError::NoPages);
        }

        debug!("Loaded PDF with {} pages", page_count);
        self.document = Some(doc);
        Ok(())
    }

    fn extract_text(&self) -> Result<String> {
        if self.document.is_none() {
            return Err(DocumentError::Malformed("no document loaded".to_string()));
        }

        // pdf-extract panics on some malformed font programs
        let pages = std::panic::catch_unwind(|| {
            pdf_extract::extract_text_from_mem_by_pages(&self.raw_data)
        })
        .map_err(|_| {
            warn!("pdf-extract panicked while reading PDF text");
            DocumentError::Malformed("PDF text extraction panicked".to_string())
        })?
        .map_err(|e| DocumentError::Malformed(e.to_string()))?;

        debug!("Extracted text from {} pages", pages.len());

        let pages: Vec<&str> = pages
            .iter()
            .map(|page| page.trim())
            .filter(|page| !page.is_empty())
            .collect();

        Ok(pages.join("\n\n"))
    }

    fn has_images(&self) -> bool {
        self.count_images() > 0
    }
}

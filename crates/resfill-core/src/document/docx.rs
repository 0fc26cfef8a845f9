//! DOCX text extraction.
//!
//! Reads `word/document.xml` out of the package and walks the body in
//! document order. Paragraphs become lines; table rows become one line with
//! cells joined by ` | `.

use std::io::{Cursor, Read};

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;
use zip::ZipArchive;

use super::{DocumentReader, Result};
use crate::error::DocumentError;

const DOCUMENT_PART: &str = "word/document.xml";

/// Compound File Binary signature. Password-protected Office files are
/// stored as CFB containers instead of ZIP packages.
const CFB_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// DOCX text extractor.
pub struct DocxReader {
    document_xml: Option<String>,
}

impl DocxReader {
    pub fn new() -> Self {
        Self { document_xml: None }
    }
}

impl Default for DocxReader {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentReader for DocxReader {
    fn load(&mut self, data: &[u8]) -> Result<()> {
        if data.starts_with(&CFB_MAGIC) {
            return Err(DocumentError::Encrypted);
        }

        let mut archive = ZipArchive::new(Cursor::new(data))
            .map_err(|e| DocumentError::Malformed(format!("not a DOCX package: {e}")))?;

        let mut part = archive
            .by_name(DOCUMENT_PART)
            .map_err(|_| DocumentError::Malformed(format!("missing {DOCUMENT_PART}")))?;

        let mut xml = String::new();
        part.read_to_string(&mut xml)
            .map_err(|e| DocumentError::Malformed(format!("unreadable {DOCUMENT_PART}: {e}")))?;

        debug!("Loaded DOCX body ({} bytes)", xml.len());
        self.document_xml = Some(xml);
        Ok(())
    }

    fn extract_text(&self) -> Result<String> {
        let xml = self
            .document_xml
            .as_deref()
            .ok_or_else(|| DocumentError::Malformed("no document loaded".to_string()))?;
        body_text(xml)
    }
}

/// Accumulates text while walking the body.
#[derive(Default)]
struct BodyWriter {
    lines: Vec<String>,
    paragraph: String,
    cell: Vec<String>,
    row: Vec<String>,
    table_depth: usize,
}

impl BodyWriter {
    fn end_paragraph(&mut self) {
        let paragraph = std::mem::take(&mut self.paragraph);
        if self.table_depth > 0 {
            if !paragraph.trim().is_empty() {
                self.cell.push(paragraph.trim().to_string());
            }
        } else {
            self.lines.push(paragraph);
        }
    }

    fn end_cell(&mut self) {
        let cell = std::mem::take(&mut self.cell);
        self.row.push(cell.join(" "));
    }

    fn end_row(&mut self) {
        let row = std::mem::take(&mut self.row);
        if row.iter().any(|c| !c.is_empty()) {
            let cells: Vec<&str> = row
                .iter()
                .map(String::as_str)
                .filter(|c| !c.is_empty())
                .collect();
            self.lines.push(cells.join(" | "));
        }
    }
}

fn body_text(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut out = BodyWriter::default();
    let mut in_run = false;
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"r" => in_run = true,
                b"t" if in_run => in_text = true,
                b"tbl" => out.table_depth += 1,
                b"tr" => out.row.clear(),
                b"tc" => out.cell.clear(),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                // tab stops in paragraph properties are also named w:tab
                b"tab" if in_run => out.paragraph.push(' '),
                b"br" | b"cr" if in_run => out.paragraph.push('\n'),
                b"p" => out.end_paragraph(),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| DocumentError::Malformed(format!("bad text node: {e}")))?;
                out.paragraph.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"r" => in_run = false,
                b"p" => out.end_paragraph(),
                b"tc" => out.end_cell(),
                b"tr" => out.end_row(),
                b"tbl" => out.table_depth = out.table_depth.saturating_sub(1),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DocumentError::Malformed(format!(
                    "invalid XML at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }

    Ok(out.lines.join("\n"))
}

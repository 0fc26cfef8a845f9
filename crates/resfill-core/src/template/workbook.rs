//! Minimal SpreadsheetML editing.
//!
//! The template package is kept as bytes. The worksheet is split into rows
//! and cells that remember their source text; only edited or shifted rows
//! are re-serialized, and every other ZIP entry is copied raw, so untouched
//! content comes out byte-identical.

use std::io::{Cursor, Read, Seek, Write};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::trace;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use super::layout::CellRef;
use super::styles::StyleSheet;
use crate::error::TemplateError;

pub const STYLES_PART: &str = "xl/styles.xml";
pub const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

pub(crate) fn xml_error(part: &str, reason: impl std::fmt::Display) -> TemplateError {
    TemplateError::Xml {
        part: part.to_string(),
        reason: reason.to_string(),
    }
}

/// Attributes of a start tag as raw (still escaped) key/value pairs.
pub(crate) fn raw_attributes(
    tag: &BytesStart<'_>,
    part: &str,
) -> Result<Vec<(String, String)>, TemplateError> {
    tag.attributes()
        .map(|attr| {
            let attr = attr.map_err(|e| xml_error(part, e))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = String::from_utf8_lossy(&attr.value).into_owned();
            Ok((key, value))
        })
        .collect()
}

pub(crate) fn attribute<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

pub(crate) fn set_attribute(attrs: &mut Vec<(String, String)>, key: &str, value: String) {
    match attrs.iter_mut().find(|(k, _)| k == key) {
        Some((_, v)) => *v = value,
        None => attrs.push((key.to_string(), value)),
    }
}

pub(crate) fn write_attributes(out: &mut String, attrs: &[(String, String)]) {
    for (key, value) in attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(value);
        out.push('"');
    }
}

/// Characters XML 1.0 cannot carry are dropped before escaping.
fn xml_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect();
    quick_xml::escape::escape(cleaned.as_str()).into_owned()
}

#[derive(Debug, Clone)]
struct Cell {
    col: u32,
    /// Attributes other than `r`.
    attrs: Vec<(String, String)>,
    inner: Option<String>,
    /// Source text while the cell is untouched and unshifted.
    raw: Option<String>,
    /// Text of the `<v>` or `<t>` children.
    value: String,
}

impl Cell {
    fn empty(col: u32) -> Self {
        Self {
            col,
            attrs: Vec::new(),
            inner: None,
            raw: None,
            value: String::new(),
        }
    }

    fn style(&self) -> Option<u32> {
        attribute(&self.attrs, "s").and_then(|s| s.parse().ok())
    }

    /// A copy keeping only the formatting.
    fn blank_copy(&self) -> Self {
        Self {
            col: self.col,
            attrs: self
                .attrs
                .iter()
                .filter(|(k, _)| k == "s")
                .cloned()
                .collect(),
            inner: None,
            raw: None,
            value: String::new(),
        }
    }

    fn write(&self, row: u32, out: &mut String) {
        if let Some(raw) = &self.raw {
            out.push_str(raw);
            return;
        }
        out.push_str("<c r=\"");
        out.push_str(&CellRef::new(self.col, row).to_string());
        out.push('"');
        write_attributes(out, &self.attrs);
        match &self.inner {
            Some(inner) => {
                out.push('>');
                out.push_str(inner);
                out.push_str("</c>");
            }
            None => out.push_str("/>"),
        }
    }
}

#[derive(Debug, Clone)]
struct Row {
    index: u32,
    /// Attributes other than `r`.
    attrs: Vec<(String, String)>,
    cells: Vec<Cell>,
    raw: Option<String>,
}

impl Row {
    fn empty(index: u32) -> Self {
        Self {
            index,
            attrs: Vec::new(),
            cells: Vec::new(),
            raw: None,
        }
    }

    fn blank_copy(&self, index: u32) -> Self {
        Self {
            index,
            attrs: self.attrs.clone(),
            cells: self.cells.iter().map(Cell::blank_copy).collect(),
            raw: None,
        }
    }

    fn touch(&mut self) {
        self.raw = None;
    }

    /// Forget source text; used when the row number changes.
    fn detach(&mut self) {
        self.raw = None;
        for cell in &mut self.cells {
            cell.raw = None;
        }
    }

    fn cell(&self, col: u32) -> Option<&Cell> {
        self.cells
            .binary_search_by_key(&col, |c| c.col)
            .ok()
            .map(|i| &self.cells[i])
    }

    fn cell_mut(&mut self, col: u32) -> &mut Cell {
        let i = match self.cells.binary_search_by_key(&col, |c| c.col) {
            Ok(i) => i,
            Err(i) => {
                self.cells.insert(i, Cell::empty(col));
                i
            }
        };
        &mut self.cells[i]
    }

    fn write(&self, out: &mut String) {
        if let Some(raw) = &self.raw {
            out.push_str(raw);
            return;
        }
        out.push_str("<row r=\"");
        out.push_str(&self.index.to_string());
        out.push('"');
        write_attributes(out, &self.attrs);
        if self.cells.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for cell in &self.cells {
            cell.write(self.index, out);
        }
        out.push_str("</row>");
    }
}

/// A merged range, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRange {
    pub start: CellRef,
    pub end: CellRef,
}

impl MergeRange {
    pub fn parse(text: &str) -> Option<Self> {
        let (start, end) = text.split_once(':')?;
        Some(Self {
            start: CellRef::parse(start)?,
            end: CellRef::parse(end)?,
        })
    }

    fn shifted(self, rows: u32) -> Self {
        Self {
            start: CellRef::new(self.start.col, self.start.row + rows),
            end: CellRef::new(self.end.col, self.end.row + rows),
        }
    }
}

impl std::fmt::Display for MergeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Editable view of one worksheet part.
#[derive(Debug, Clone)]
pub struct Worksheet {
    part: String,
    /// Everything up to and including the `<sheetData>` start tag.
    head: String,
    rows: Vec<Row>,
    /// From `</sheetData>` up to the merge list (or the tail).
    between: String,
    merges: Vec<MergeRange>,
    /// Source text of `<mergeCells>` while unchanged.
    merges_raw: Option<String>,
    tail: String,
    inserted_rows: u32,
}

impl Worksheet {
    pub fn parse(part: &str, xml: &str) -> Result<Self, TemplateError> {
        let mut reader = Reader::from_str(xml);

        let mut head_end = None;
        let mut data_close: Option<(usize, usize)> = None;
        let mut self_closing_data = false;
        let mut merge_span: Option<(usize, usize)> = None;
        let mut merges = Vec::new();

        let mut rows: Vec<Row> = Vec::new();
        let mut row: Option<(Row, usize)> = None;
        let mut cell: Option<(Cell, usize, usize)> = None;
        let mut in_value = false;

        loop {
            let before = reader.buffer_position() as usize;
            let event = reader.read_event().map_err(|e| xml_error(part, e))?;
            let after = reader.buffer_position() as usize;

            match event {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"sheetData" => head_end = Some(after),
                    b"row" => {
                        let (index, attrs) = row_header(&e, part, rows.last())?;
                        row = Some((
                            Row {
                                index,
                                attrs,
                                cells: Vec::new(),
                                raw: None,
                            },
                            before,
                        ));
                    }
                    b"c" => {
                        let parent = row.as_ref().map(|(r, _)| r);
                        cell = Some((cell_header(&e, part, parent)?, before, after));
                    }
                    b"v" | b"t" if cell.is_some() => in_value = true,
                    b"mergeCells" => merge_span = Some((before, before)),
                    _ => {}
                },
                Event::Empty(e) => match e.local_name().as_ref() {
                    b"sheetData" => {
                        head_end = Some(before);
                        data_close = Some((before, after));
                        self_closing_data = true;
                    }
                    b"row" => {
                        let (index, attrs) = row_header(&e, part, rows.last())?;
                        rows.push(Row {
                            index,
                            attrs,
                            cells: Vec::new(),
                            raw: Some(xml[before..after].to_string()),
                        });
                    }
                    b"c" => {
                        let parent = row.as_ref().map(|(r, _)| r);
                        let mut c = cell_header(&e, part, parent)?;
                        c.raw = Some(xml[before..after].to_string());
                        if let Some((r, _)) = row.as_mut() {
                            r.cells.push(c);
                        }
                    }
                    b"mergeCell" => {
                        let attrs = raw_attributes(&e, part)?;
                        let range = attribute(&attrs, "ref")
                            .and_then(MergeRange::parse)
                            .ok_or_else(|| xml_error(part, "invalid mergeCell ref"))?;
                        merges.push(range);
                    }
                    b"mergeCells" => merge_span = Some((before, after)),
                    _ => {}
                },
                Event::Text(t) if in_value => {
                    let text = t.unescape().map_err(|e| xml_error(part, e))?;
                    if let Some((c, _, _)) = cell.as_mut() {
                        c.value.push_str(&text);
                    }
                }
                Event::End(e) => match e.local_name().as_ref() {
                    b"v" | b"t" => in_value = false,
                    b"c" => {
                        if let Some((mut c, start, open_end)) = cell.take() {
                            c.inner = Some(xml[open_end..before].to_string());
                            c.raw = Some(xml[start..after].to_string());
                            if let Some((r, _)) = row.as_mut() {
                                r.cells.push(c);
                            }
                        }
                    }
                    b"row" => {
                        if let Some((mut r, start)) = row.take() {
                            r.raw = Some(xml[start..after].to_string());
                            rows.push(r);
                        }
                    }
                    b"sheetData" => data_close = Some((before, after)),
                    b"mergeCells" => {
                        if let Some((start, _)) = merge_span {
                            merge_span = Some((start, after));
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        let head_end = head_end.ok_or_else(|| xml_error(part, "missing sheetData"))?;
        let (close_start, close_end) =
            data_close.ok_or_else(|| xml_error(part, "unterminated sheetData"))?;

        let mut head = xml[..head_end].to_string();
        let mut between_start = close_start;
        if self_closing_data {
            head.push_str("<sheetData>");
            between_start = close_end;
        }
        let mut between = String::new();
        if self_closing_data {
            between.push_str("</sheetData>");
        }

        let (merges_raw, tail) = match merge_span {
            Some((start, end)) if start >= close_end => {
                between.push_str(&xml[between_start..start]);
                (Some(xml[start..end].to_string()), xml[end..].to_string())
            }
            _ => {
                between.push_str(&xml[between_start..close_end]);
                (None, xml[close_end..].to_string())
            }
        };

        trace!(
            "Parsed {}: {} rows, {} merged ranges",
            part,
            rows.len(),
            merges.len()
        );

        Ok(Self {
            part: part.to_string(),
            head,
            rows,
            between,
            merges,
            merges_raw,
            tail,
            inserted_rows: 0,
        })
    }

    fn row(&self, index: u32) -> Option<&Row> {
        self.rows
            .binary_search_by_key(&index, |r| r.index)
            .ok()
            .map(|i| &self.rows[i])
    }

    fn row_mut(&mut self, index: u32) -> &mut Row {
        let i = match self.rows.binary_search_by_key(&index, |r| r.index) {
            Ok(i) => i,
            Err(i) => {
                self.rows.insert(i, Row::empty(index));
                i
            }
        };
        &mut self.rows[i]
    }

    /// Text of a cell, resolving shared strings.
    pub fn cell_text(&self, cell: CellRef, shared: &[String]) -> Option<String> {
        let c = self.row(cell.row)?.cell(cell.col)?;
        match attribute(&c.attrs, "t") {
            Some("s") => {
                let index: usize = c.value.trim().parse().ok()?;
                shared.get(index).cloned()
            }
            _ => Some(c.value.clone()),
        }
    }

    /// Style index of a cell, if it has one.
    pub fn style(&self, cell: CellRef) -> Option<u32> {
        self.row(cell.row)?.cell(cell.col)?.style()
    }

    /// Write `text` as an inline string. `style` replaces the cell's style
    /// when given.
    pub fn set_text(&mut self, cell: CellRef, text: &str, style: Option<u32>) {
        let row = self.row_mut(cell.row);
        row.touch();
        let c = row.cell_mut(cell.col);
        c.raw = None;
        c.attrs.retain(|(k, _)| k != "t");
        if let Some(style) = style {
            set_attribute(&mut c.attrs, "s", style.to_string());
        }
        c.attrs.push(("t".to_string(), "inlineStr".to_string()));
        c.inner = Some(format!(
            "<is><t xml:space=\"preserve\">{}</t></is>",
            xml_text(text)
        ));
        c.value = text.to_string();
    }

    /// Remove a cell's value, keeping its style.
    pub fn clear(&mut self, cell: CellRef) {
        let Some(i) = self
            .rows
            .binary_search_by_key(&cell.row, |r| r.index)
            .ok()
        else {
            return;
        };
        let row = &mut self.rows[i];
        let Ok(j) = row.cells.binary_search_by_key(&cell.col, |c| c.col) else {
            return;
        };
        if row.cells[j].inner.is_none() {
            return;
        }
        row.touch();
        let c = &mut row.cells[j];
        c.raw = None;
        c.attrs.retain(|(k, _)| k != "t");
        c.inner = None;
        c.value.clear();
    }

    /// Insert `count` rows after row `after`, formatted like the rows
    /// `pattern_start..=pattern_end` (repeated). Rows, cells and merged
    /// ranges below `after` move down; merges inside the pattern are copied.
    pub fn insert_rows(&mut self, after: u32, count: u32, pattern_start: u32, pattern_end: u32) {
        if count == 0 {
            return;
        }

        let pattern: Vec<Row> = (pattern_start..=pattern_end)
            .map(|r| {
                self.row(r)
                    .map(|row| row.blank_copy(r))
                    .unwrap_or_else(|| Row::empty(r))
            })
            .collect();
        let pattern_len = pattern.len() as u32;

        for row in self.rows.iter_mut().filter(|r| r.index > after) {
            row.index += count;
            row.detach();
        }

        let position = self
            .rows
            .iter()
            .position(|r| r.index > after)
            .unwrap_or(self.rows.len());
        let inserted: Vec<Row> = (0..count)
            .map(|i| {
                let mut row = pattern[(i % pattern_len) as usize].clone();
                row.index = after + 1 + i;
                row
            })
            .collect();
        self.rows.splice(position..position, inserted);

        let mut copies = Vec::new();
        for merge in &mut self.merges {
            if merge.start.row > after {
                *merge = merge.shifted(count);
            } else if merge.end.row > after {
                merge.end.row += count;
            } else if merge.start.row >= pattern_start && merge.end.row <= pattern_end {
                for k in 0..count / pattern_len {
                    copies.push(merge.shifted(after + 1 + k * pattern_len - pattern_start));
                }
            }
        }
        self.merges.extend(copies);
        self.merges_raw = None;
        self.inserted_rows += count;

        trace!(
            "Inserted {} rows after row {} in {}",
            count,
            after,
            self.part
        );
    }

    pub fn merges(&self) -> &[MergeRange] {
        &self.merges
    }

    fn dimension(&self) -> Option<String> {
        let last_row = self.rows.last()?.index;
        let last_col = self
            .rows
            .iter()
            .flat_map(|r| r.cells.iter().map(|c| c.col))
            .chain(self.merges.iter().map(|m| m.end.col))
            .max()
            .unwrap_or(1);
        Some(format!("A1:{}", CellRef::new(last_col, last_row)))
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(self.head.len() + self.tail.len() + 4096);

        match (self.inserted_rows > 0, self.dimension()) {
            (true, Some(dimension)) => out.push_str(&replace_dimension(&self.head, &dimension)),
            _ => out.push_str(&self.head),
        }

        for row in &self.rows {
            row.write(&mut out);
        }
        out.push_str(&self.between);

        match &self.merges_raw {
            Some(raw) => out.push_str(raw),
            None if !self.merges.is_empty() => {
                out.push_str(&format!("<mergeCells count=\"{}\">", self.merges.len()));
                for merge in &self.merges {
                    out.push_str(&format!("<mergeCell ref=\"{merge}\"/>"));
                }
                out.push_str("</mergeCells>");
            }
            None => {}
        }

        out.push_str(&self.tail);
        out
    }
}

fn replace_dimension(head: &str, dimension: &str) -> String {
    const OPEN: &str = "<dimension ref=\"";
    let Some(start) = head.find(OPEN).map(|i| i + OPEN.len()) else {
        return head.to_string();
    };
    let Some(len) = head[start..].find('"') else {
        return head.to_string();
    };
    format!("{}{}{}", &head[..start], dimension, &head[start + len..])
}

fn row_header(
    tag: &BytesStart<'_>,
    part: &str,
    previous: Option<&Row>,
) -> Result<(u32, Vec<(String, String)>), TemplateError> {
    let mut attrs = raw_attributes(tag, part)?;
    let index = match attribute(&attrs, "r") {
        Some(r) => r
            .parse()
            .map_err(|_| xml_error(part, format!("invalid row number {r:?}")))?,
        None => previous.map(|p| p.index + 1).unwrap_or(1),
    };
    attrs.retain(|(k, _)| k != "r");
    Ok((index, attrs))
}

fn cell_header(tag: &BytesStart<'_>, part: &str, row: Option<&Row>) -> Result<Cell, TemplateError> {
    let mut attrs = raw_attributes(tag, part)?;
    let col = match attribute(&attrs, "r") {
        Some(r) => {
            CellRef::parse(r)
                .ok_or_else(|| xml_error(part, format!("invalid cell reference {r:?}")))?
                .col
        }
        None => row
            .and_then(|r| r.cells.last())
            .map(|c| c.col + 1)
            .unwrap_or(1),
    };
    attrs.retain(|(k, _)| k != "r");
    Ok(Cell {
        col,
        attrs,
        inner: None,
        raw: None,
        value: String::new(),
    })
}

/// Parse `xl/sharedStrings.xml` into its string table.
pub fn parse_shared_strings(xml: &str) -> Result<Vec<String>, TemplateError> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader
            .read_event()
            .map_err(|e| xml_error(SHARED_STRINGS_PART, e))?
        {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => in_phonetic = true,
                b"t" if !in_phonetic => in_text = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(t) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| xml_error(SHARED_STRINGS_PART, e))?;
                if let Some(s) = current.as_mut() {
                    s.push_str(&text);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"rPh" => in_phonetic = false,
                b"t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(strings)
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, TemplateError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .map_err(|e| xml_error(name, e))?;
    Ok(Some(xml))
}

/// A template package opened for editing.
pub struct Workbook {
    template: Vec<u8>,
    sheet_part: String,
    pub sheet: Worksheet,
    pub styles: StyleSheet,
    shared_strings: Vec<String>,
}

impl Workbook {
    pub fn open(template: Vec<u8>, sheet_part: &str) -> Result<Self, TemplateError> {
        let (sheet, styles, shared_strings) = {
            let mut archive = ZipArchive::new(Cursor::new(template.as_slice()))?;

            let sheet_xml = read_part(&mut archive, sheet_part)?
                .ok_or_else(|| TemplateError::MissingPart(sheet_part.to_string()))?;
            let styles_xml = read_part(&mut archive, STYLES_PART)?
                .ok_or_else(|| TemplateError::MissingPart(STYLES_PART.to_string()))?;
            let shared = match read_part(&mut archive, SHARED_STRINGS_PART)? {
                Some(xml) => parse_shared_strings(&xml)?,
                None => Vec::new(),
            };

            (
                Worksheet::parse(sheet_part, &sheet_xml)?,
                StyleSheet::parse(styles_xml)?,
                shared,
            )
        };

        Ok(Self {
            template,
            sheet_part: sheet_part.to_string(),
            sheet,
            styles,
            shared_strings,
        })
    }

    pub fn cell_text(&self, cell: CellRef) -> Option<String> {
        self.sheet.cell_text(cell, &self.shared_strings)
    }

    /// Serialize the package. Entries other than the worksheet and the
    /// stylesheet are copied without recompression; the two rewritten parts
    /// keep their original compression method and timestamp.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TemplateError> {
        let mut archive = ZipArchive::new(Cursor::new(self.template.as_slice()))?;
        let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(self.template.len())));

        let replaced = [
            (self.sheet_part.as_str(), self.sheet.to_xml()),
            (STYLES_PART, self.styles.to_xml()),
        ];

        for i in 0..archive.len() {
            let file = archive.by_index_raw(i)?;
            let name = file.name().to_string();

            match replaced.iter().find(|(part, _)| *part == name) {
                Some((_, data)) => {
                    let mut options = FileOptions::default()
                        .compression_method(file.compression())
                        .last_modified_time(file.last_modified());
                    if let Some(mode) = file.unix_mode() {
                        options = options.unix_permissions(mode);
                    }
                    drop(file);
                    writer.start_file(name, options)?;
                    writer.write_all(data.as_bytes())?;
                }
                None => writer.raw_copy_file(file)?,
            }
        }

        Ok(writer.finish()?.into_inner())
    }
}

//! Derived highlight formats in `xl/styles.xml`.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::Event;

use super::workbook::{
    STYLES_PART, attribute, raw_attributes, set_attribute, write_attributes, xml_error,
};
use crate::error::TemplateError;

/// Solid yellow.
const HIGHLIGHT_FILL: &str = r#"<fill><patternFill patternType="solid"><fgColor rgb="FFFFFF00"/><bgColor indexed="64"/></patternFill></fill>"#;
/// Bold red, merged into a copy of the base font.
const HIGHLIGHT_FONT_OPEN: &str = r#"<font><b/><color rgb="FFFF0000"/>"#;

/// Byte spans of one collection element (`<fonts>`, `<fills>`, `<cellXfs>`).
#[derive(Debug, Clone)]
struct Collection {
    open_start: usize,
    open_end: usize,
    close_start: usize,
    /// Source text of each child element.
    children: Vec<String>,
    added: Vec<String>,
}

impl Collection {
    fn scan(xml: &str, name: &[u8]) -> Result<Self, TemplateError> {
        let mut reader = Reader::from_str(xml);
        let mut open: Option<(usize, usize)> = None;
        let mut depth = 0usize;
        let mut child_start = 0usize;
        let mut children = Vec::new();

        loop {
            let before = reader.buffer_position() as usize;
            let event = reader
                .read_event()
                .map_err(|e| xml_error(STYLES_PART, e))?;
            let after = reader.buffer_position() as usize;

            match event {
                Event::Start(e) => {
                    if open.is_none() {
                        if e.local_name().as_ref() == name {
                            open = Some((before, after));
                        }
                        continue;
                    }
                    depth += 1;
                    if depth == 1 {
                        child_start = before;
                    }
                }
                Event::Empty(e) => {
                    if open.is_some() && depth == 0 {
                        children.push(xml[before..after].to_string());
                    } else if open.is_none() && e.local_name().as_ref() == name {
                        return Err(xml_error(
                            STYLES_PART,
                            format!("empty <{}>", String::from_utf8_lossy(name)),
                        ));
                    }
                }
                Event::End(_) if open.is_some() => {
                    if depth == 0 {
                        let (open_start, open_end) = open.unwrap_or_default();
                        return Ok(Self {
                            open_start,
                            open_end,
                            close_start: before,
                            children,
                            added: Vec::new(),
                        });
                    }
                    if depth == 1 {
                        children.push(xml[child_start..after].to_string());
                    }
                    depth -= 1;
                }
                Event::Eof => {
                    return Err(xml_error(
                        STYLES_PART,
                        format!("missing <{}>", String::from_utf8_lossy(name)),
                    ));
                }
                _ => {}
            }
        }
    }

    fn len(&self) -> usize {
        self.children.len() + self.added.len()
    }

    fn push(&mut self, element: String) -> u32 {
        self.added.push(element);
        (self.len() - 1) as u32
    }
}

/// Open tag with its `count` attribute set to `count`.
fn with_count(open_tag: &str, count: usize) -> String {
    const KEY: &str = "count=\"";
    let Some(start) = open_tag.find(KEY).map(|i| i + KEY.len()) else {
        return open_tag.to_string();
    };
    let Some(len) = open_tag[start..].find('"') else {
        return open_tag.to_string();
    };
    format!("{}{}{}", &open_tag[..start], count, &open_tag[start + len..])
}

/// The stylesheet with any highlight formats added during population.
#[derive(Debug, Clone)]
pub struct StyleSheet {
    xml: String,
    fonts: Collection,
    fills: Collection,
    cell_xfs: Collection,
    highlight_fill: Option<u32>,
    highlight_fonts: HashMap<u32, u32>,
    highlights: HashMap<u32, u32>,
}

impl StyleSheet {
    pub fn parse(xml: String) -> Result<Self, TemplateError> {
        let fonts = Collection::scan(&xml, b"fonts")?;
        let fills = Collection::scan(&xml, b"fills")?;
        let cell_xfs = Collection::scan(&xml, b"cellXfs")?;
        if cell_xfs.children.is_empty() {
            return Err(xml_error(STYLES_PART, "no cell formats"));
        }

        Ok(Self {
            xml,
            fonts,
            fills,
            cell_xfs,
            highlight_fill: None,
            highlight_fonts: HashMap::new(),
            highlights: HashMap::new(),
        })
    }

    /// Number of cell formats, including derived ones.
    pub fn cell_format_count(&self) -> usize {
        self.cell_xfs.len()
    }

    /// Index of the highlighted variant of cell format `base`, creating it
    /// on first use.
    pub fn highlight(&mut self, base: u32) -> Result<u32, TemplateError> {
        let base = if (base as usize) < self.cell_xfs.children.len() {
            base
        } else {
            0
        };
        if let Some(id) = self.highlights.get(&base) {
            return Ok(*id);
        }

        let xf = self.cell_xfs.children[base as usize].clone();
        let mut reader = Reader::from_str(&xf);
        let (mut attrs, inner) = loop {
            match reader
                .read_event()
                .map_err(|e| xml_error(STYLES_PART, e))?
            {
                Event::Empty(e) => break (raw_attributes(&e, STYLES_PART)?, None),
                Event::Start(e) => {
                    let open_end = reader.buffer_position() as usize;
                    let close_start = xf.rfind("</").unwrap_or(xf.len());
                    break (
                        raw_attributes(&e, STYLES_PART)?,
                        Some(xf[open_end..close_start].to_string()),
                    );
                }
                Event::Eof => return Err(xml_error(STYLES_PART, "empty cell format")),
                _ => {}
            }
        };

        let base_font: u32 = attribute(&attrs, "fontId")
            .and_then(|f| f.parse().ok())
            .unwrap_or(0);
        let font_id = self.highlight_font(base_font)?;
        let fill_id = match self.highlight_fill {
            Some(id) => id,
            None => {
                let id = self.fills.push(HIGHLIGHT_FILL.to_string());
                self.highlight_fill = Some(id);
                id
            }
        };

        set_attribute(&mut attrs, "fontId", font_id.to_string());
        set_attribute(&mut attrs, "fillId", fill_id.to_string());
        set_attribute(&mut attrs, "applyFont", "1".to_string());
        set_attribute(&mut attrs, "applyFill", "1".to_string());

        let mut element = String::from("<xf");
        write_attributes(&mut element, &attrs);
        match inner {
            Some(inner) => {
                element.push('>');
                element.push_str(&inner);
                element.push_str("</xf>");
            }
            None => element.push_str("/>"),
        }

        let id = self.cell_xfs.push(element);
        self.highlights.insert(base, id);
        Ok(id)
    }

    fn highlight_font(&mut self, base: u32) -> Result<u32, TemplateError> {
        if let Some(id) = self.highlight_fonts.get(&base) {
            return Ok(*id);
        }

        let mut element = String::from(HIGHLIGHT_FONT_OPEN);
        if let Some(font) = self.fonts.children.get(base as usize) {
            let mut reader = Reader::from_str(font);
            loop {
                let before = reader.buffer_position() as usize;
                match reader
                    .read_event()
                    .map_err(|e| xml_error(STYLES_PART, e))?
                {
                    Event::Empty(e) => {
                        if !matches!(e.local_name().as_ref(), b"b" | b"color" | b"font") {
                            let after = reader.buffer_position() as usize;
                            element.push_str(&font[before..after]);
                        }
                    }
                    Event::Eof => break,
                    _ => {}
                }
            }
        }
        element.push_str("</font>");

        let id = self.fonts.push(element);
        self.highlight_fonts.insert(base, id);
        Ok(id)
    }

    pub fn to_xml(&self) -> String {
        let mut sections: Vec<&Collection> = [&self.fonts, &self.fills, &self.cell_xfs]
            .into_iter()
            .filter(|c| !c.added.is_empty())
            .collect();
        if sections.is_empty() {
            return self.xml.clone();
        }
        sections.sort_by_key(|c| c.open_start);

        let mut out = String::with_capacity(self.xml.len() + 1024);
        let mut cursor = 0;
        for section in sections {
            out.push_str(&self.xml[cursor..section.open_start]);
            out.push_str(&with_count(
                &self.xml[section.open_start..section.open_end],
                section.len(),
            ));
            out.push_str(&self.xml[section.open_end..section.close_start]);
            for element in &section.added {
                out.push_str(element);
            }
            cursor = section.close_start;
        }
        out.push_str(&self.xml[cursor..]);
        out
    }
}

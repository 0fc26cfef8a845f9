//! Generator for the layout-v1 template.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;

use quick_xml::escape::escape;
use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::layout::{CellRef, LAYOUT_V1};
use super::workbook::{SHARED_STRINGS_PART, STYLES_PART};
use crate::error::TemplateError;

const SHEET_NAME: &str = "简历信息";
const LAST_ROW: u32 = 24;

// cellXfs indices of the generated stylesheet
const STYLE_TITLE: u32 = 1;
const STYLE_SECTION: u32 = 2;
const STYLE_LABEL: u32 = 3;
const STYLE_VALUE: u32 = 4;
const STYLE_HEADER: u32 = 5;

const SECTION_ROWS: [u32; 6] = [2, 4, 9, 13, 17, 21];
const HEADER_ROWS: [u32; 3] = [10, 14, 18];
const PAIR_ROWS: [u32; 5] = [3, 5, 6, 7, 8];

const MERGES: [&str; 24] = [
    "A1:F1", "A2:F2", "D3:F3", "A4:F4", "D5:F5", "D6:F6", "D7:F7", "D8:F8", "A9:F9", "E10:F10",
    "E11:F11", "E12:F12", "A13:F13", "E14:F14", "E15:F15", "E16:F16", "A17:F17", "E18:F18",
    "E19:F19", "E20:F20", "A21:F21", "B22:F22", "B23:F23", "B24:F24",
];

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/></Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="3"><font><sz val="11"/><name val="宋体"/><family val="3"/><charset val="134"/></font><font><b/><sz val="11"/><name val="宋体"/><family val="3"/><charset val="134"/></font><font><b/><sz val="16"/><name val="宋体"/><family val="3"/><charset val="134"/></font></fonts><fills count="3"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill><fill><patternFill patternType="solid"><fgColor rgb="FFD9E1F2"/><bgColor indexed="64"/></patternFill></fill></fills><borders count="2"><border><left/><right/><top/><bottom/><diagonal/></border><border><left style="thin"><color auto="1"/></left><right style="thin"><color auto="1"/></right><top style="thin"><color auto="1"/></top><bottom style="thin"><color auto="1"/></bottom><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="6"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="2" fillId="0" borderId="0" xfId="0" applyFont="1" applyAlignment="1"><alignment horizontal="center" vertical="center"/></xf><xf numFmtId="0" fontId="1" fillId="2" borderId="1" xfId="0" applyFont="1" applyFill="1" applyBorder="1" applyAlignment="1"><alignment vertical="center"/></xf><xf numFmtId="0" fontId="1" fillId="0" borderId="1" xfId="0" applyFont="1" applyBorder="1" applyAlignment="1"><alignment horizontal="center" vertical="center"/></xf><xf numFmtId="0" fontId="0" fillId="0" borderId="1" xfId="0" applyBorder="1" applyAlignment="1"><alignment vertical="center" wrapText="1"/></xf><xf numFmtId="0" fontId="1" fillId="2" borderId="1" xfId="0" applyFont="1" applyFill="1" applyBorder="1" applyAlignment="1"><alignment horizontal="center" vertical="center"/></xf></cellXfs><cellStyles count="1"><cellStyle name="常规" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;

fn workbook_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{SHEET_NAME}" sheetId="1" r:id="rId1"/></sheets></workbook>"#
    )
}

fn style_for(cell: CellRef, is_label: bool) -> u32 {
    let row = cell.row;
    if row == 1 {
        STYLE_TITLE
    } else if SECTION_ROWS.contains(&row) {
        STYLE_SECTION
    } else if HEADER_ROWS.contains(&row) {
        STYLE_HEADER
    } else if is_label {
        STYLE_LABEL
    } else {
        STYLE_VALUE
    }
}

/// Interns label strings for `sharedStrings.xml`.
#[derive(Default)]
struct SharedStrings {
    index: HashMap<&'static str, usize>,
    strings: Vec<&'static str>,
    references: usize,
}

impl SharedStrings {
    fn intern(&mut self, text: &'static str) -> usize {
        self.references += 1;
        *self.index.entry(text).or_insert_with(|| {
            self.strings.push(text);
            self.strings.len() - 1
        })
    }

    fn to_xml(&self) -> String {
        let mut xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<sst xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" count=\"{}\" uniqueCount=\"{}\">",
            self.references,
            self.strings.len()
        );
        for text in &self.strings {
            xml.push_str(&format!("<si><t>{}</t></si>", escape(*text)));
        }
        xml.push_str("</sst>");
        xml
    }
}

fn sheet_xml(shared: &mut SharedStrings) -> String {
    let labels: HashMap<CellRef, &'static str> = LAYOUT_V1.labels.iter().copied().collect();
    let slot_rows: Vec<u32> = LAYOUT_V1
        .blocks
        .iter()
        .flat_map(|b| b.anchor_row..=b.last_slot_row())
        .collect();

    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><dimension ref="A1:{}"/><sheetViews><sheetView workbookViewId="0"/></sheetViews><sheetFormatPr defaultRowHeight="20" customHeight="1"/><cols><col min="1" max="2" width="14" customWidth="1"/><col min="3" max="4" width="22" customWidth="1"/><col min="5" max="6" width="30" customWidth="1"/></cols><sheetData>"#,
        CellRef::new(LAYOUT_V1.width, LAST_ROW)
    );

    for row in 1..=LAST_ROW {
        let height = if row == 1 {
            r#" ht="30" customHeight="1""#
        } else if slot_rows.contains(&row) {
            r#" ht="36" customHeight="1""#
        } else {
            ""
        };
        xml.push_str(&format!(r#"<row r="{row}"{height}>"#));

        for col in 1..=LAYOUT_V1.width {
            let cell = CellRef::new(col, row);
            let label = labels.get(&cell).copied();
            let style = style_for(cell, label.is_some() || (PAIR_ROWS.contains(&row) && col == 3));
            match label {
                Some(text) => xml.push_str(&format!(
                    r#"<c r="{cell}" s="{style}" t="s"><v>{}</v></c>"#,
                    shared.intern(text)
                )),
                None => xml.push_str(&format!(r#"<c r="{cell}" s="{style}"/>"#)),
            }
        }
        xml.push_str("</row>");
    }

    xml.push_str("</sheetData>");
    xml.push_str(&format!(r#"<mergeCells count="{}">"#, MERGES.len()));
    for merge in MERGES {
        xml.push_str(&format!(r#"<mergeCell ref="{merge}"/>"#));
    }
    xml.push_str("</mergeCells>");
    xml.push_str(r#"<pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#);
    xml
}

/// Bytes of a fresh layout-v1 template. Entry timestamps are fixed, so the
/// output is identical on every call.
pub fn default_template_bytes() -> Result<Vec<u8>, TemplateError> {
    let mut shared = SharedStrings::default();
    let sheet = sheet_xml(&mut shared);

    let parts: [(&str, String); 7] = [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", ROOT_RELS.to_string()),
        ("xl/workbook.xml", workbook_xml()),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.to_string()),
        (LAYOUT_V1.sheet_part, sheet),
        (STYLES_PART, STYLES.to_string()),
        (SHARED_STRINGS_PART, shared.to_xml()),
    ];

    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in parts {
        writer.start_file(name, options)?;
        writer.write_all(content.as_bytes())?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Write a fresh layout-v1 template to `path`.
pub fn write_default_template(path: &Path) -> Result<(), TemplateError> {
    let bytes = default_template_bytes()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    info!("Wrote layout v{} template to {}", LAYOUT_V1.version, path.display());
    Ok(())
}

//! Writes a [`CandidateRecord`] into a layout-v1 workbook.

use tracing::debug;

use super::layout::{BlockField, BlockSection, CellRef, FlatTarget, RowBlock, TemplateLayout};
use super::workbook::Workbook;
use crate::error::TemplateError;
use crate::extraction::PRESENT;
use crate::models::record::{CandidateRecord, Degree, Field};
use crate::models::schema::{FieldKind, SchemaField};

/// Written into every cell whose field is unresolved.
pub const MISSING_MARKER: &str = "【待补充】";

/// Spreadsheet text of an ongoing end date.
pub const PRESENT_LABEL: &str = "至今";

const SET_JOINER: &str = "、";

/// Population settings.
#[derive(Debug, Clone, Default)]
pub struct PopulateOptions {
    /// Text for the generation-time cell; left untouched when `None`.
    pub generated_at: Option<String>,
}

/// What goes into one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CellValue {
    Text(String),
    /// Unresolved; carries the raw model text when there was one.
    Flagged(Option<String>),
}

fn text_value(field: &Field, kind: FieldKind) -> CellValue {
    match field {
        Field::Resolved(v) if kind == FieldKind::Date && v == PRESENT => {
            CellValue::Text(PRESENT_LABEL.to_string())
        }
        Field::Resolved(v) => CellValue::Text(v.clone()),
        Field::Unresolved(u) => CellValue::Flagged(u.raw.clone()),
    }
}

fn degree_value(field: &Field<Degree>) -> CellValue {
    match field {
        Field::Resolved(degree) => CellValue::Text(degree.label().to_string()),
        Field::Unresolved(u) => CellValue::Flagged(u.raw.clone()),
    }
}

fn set_value(field: &Field<Vec<String>>) -> CellValue {
    match field {
        Field::Resolved(items) => CellValue::Text(items.join(SET_JOINER)),
        Field::Unresolved(u) => CellValue::Flagged(u.raw.clone()),
    }
}

fn entry_count(record: &CandidateRecord, section: BlockSection) -> usize {
    match section {
        BlockSection::Education => record.education.len(),
        BlockSection::Work => record.work_experience.len(),
        BlockSection::Projects => record.projects.len(),
    }
}

fn entry_value(record: &CandidateRecord, index: usize, field: BlockField) -> Option<CellValue> {
    Some(match field {
        BlockField::Education(f) => {
            let entry = record.education.get(index)?;
            match entry.text(f) {
                Some(text) => text_value(text, f.kind()),
                None => degree_value(&entry.degree),
            }
        }
        BlockField::Work(f) => text_value(record.work_experience.get(index)?.get(f), f.kind()),
        BlockField::Project(f) => text_value(record.projects.get(index)?.get(f), f.kind()),
    })
}

struct Writer {
    workbook: Workbook,
    flagged: usize,
}

impl Writer {
    fn write(&mut self, cell: CellRef, value: CellValue) -> Result<(), TemplateError> {
        match value {
            CellValue::Text(text) => self.workbook.sheet.set_text(cell, &text, None),
            CellValue::Flagged(raw) => {
                let base = self.workbook.sheet.style(cell).unwrap_or(0);
                let style = self.workbook.styles.highlight(base)?;
                let text = format!("{MISSING_MARKER}{}", raw.unwrap_or_default());
                self.workbook.sheet.set_text(cell, &text, Some(style));
                self.flagged += 1;
            }
        }
        Ok(())
    }

    fn fill_block(&mut self, record: &CandidateRecord, block: &RowBlock) -> Result<(), TemplateError> {
        let count = entry_count(record, block.section) as u32;

        if count > block.slots {
            let extra = (count - block.slots) * block.rows_per_entry;
            let last_slot = block.entry_row(block.slots.saturating_sub(1));
            self.workbook
                .sheet
                .insert_rows(block.last_slot_row(), extra, last_slot, block.last_slot_row());
            debug!(
                "Expanded {:?} block by {} row(s) for {} entries",
                block.section, extra, count
            );
        }

        for index in 0..count.max(block.slots) {
            let row = block.entry_row(index);
            for spec in block.cells {
                let cell = CellRef::new(spec.col, row + spec.row_offset);
                match entry_value(record, index as usize, spec.field) {
                    Some(value) => self.write(cell, value)?,
                    None => self.workbook.sheet.clear(cell),
                }
            }
        }

        Ok(())
    }
}

/// Populate the layout-v1 template with `record`.
pub fn populate(
    record: &CandidateRecord,
    template: &[u8],
    options: &PopulateOptions,
) -> Result<Vec<u8>, TemplateError> {
    populate_with_layout(record, template, &super::LAYOUT_V1, options)
}

/// Populate a template described by `layout`.
pub fn populate_with_layout(
    record: &CandidateRecord,
    template: &[u8],
    layout: &TemplateLayout,
    options: &PopulateOptions,
) -> Result<Vec<u8>, TemplateError> {
    let workbook = Workbook::open(template.to_vec(), layout.sheet_part)?;
    layout.verify(|cell| workbook.cell_text(cell))?;

    let mut writer = Writer {
        workbook,
        flagged: 0,
    };

    // Fixed cells first: cells below a block then move with the inserted rows.
    for flat in layout.flat {
        let value = match flat.target {
            FlatTarget::Basic(f) => text_value(record.basic.get(f), f.kind()),
            FlatTarget::Personal(f) => text_value(record.personal.get(f), f.kind()),
            FlatTarget::HighestDegree => degree_value(&record.personal.highest_degree),
            FlatTarget::Skills => set_value(&record.skills),
            FlatTarget::Certifications => set_value(&record.certifications),
            FlatTarget::GeneratedAt => match &options.generated_at {
                Some(stamp) => CellValue::Text(stamp.clone()),
                None => continue,
            },
        };
        writer.write(flat.cell, value)?;
    }

    // Bottom-up, so inserting rows never moves a block not yet filled.
    for block in layout.blocks.iter().rev() {
        writer.fill_block(record, block)?;
    }

    debug!("Populated workbook with {} flagged cell(s)", writer.flagged);
    writer.workbook.to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::{UnresolvedReason, WorkEntry};
    use crate::models::schema::WorkField;

    #[test]
    fn test_text_values() {
        assert_eq!(
            text_value(&Field::Resolved("present".into()), FieldKind::Date),
            CellValue::Text("至今".into())
        );
        assert_eq!(
            text_value(&Field::Resolved("present".into()), FieldKind::Text),
            CellValue::Text("present".into())
        );
        assert_eq!(
            text_value(
                &Field::unresolved(UnresolvedReason::InvalidFormat, "lilei.com"),
                FieldKind::Email
            ),
            CellValue::Flagged(Some("lilei.com".into()))
        );
        assert_eq!(degree_value(&Field::Resolved(Degree::Master)), CellValue::Text("硕士".into()));
        assert_eq!(
            set_value(&Field::Resolved(vec!["Rust".into(), "Go".into()])),
            CellValue::Text("Rust、Go".into())
        );
        assert_eq!(set_value(&Field::missing()), CellValue::Flagged(None));
    }

    #[test]
    fn test_entry_value_out_of_range() {
        let record = CandidateRecord {
            work_experience: vec![WorkEntry {
                company: Field::Resolved("ACME".into()),
                title: Field::missing(),
                start_date: Field::missing(),
                end_date: Field::Resolved("present".into()),
                description: Field::missing(),
            }],
            ..crate::template::tests::empty_record()
        };

        assert_eq!(
            entry_value(&record, 0, BlockField::Work(WorkField::EndDate)),
            Some(CellValue::Text("至今".into()))
        );
        assert_eq!(entry_value(&record, 1, BlockField::Work(WorkField::Company)), None);
    }
}

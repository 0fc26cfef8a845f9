//! Versioned description of the template's cell layout.

use std::fmt;

use crate::error::TemplateError;
use crate::models::schema::{BasicField, EducationField, PersonalField, ProjectField, WorkField};

/// A1-style cell reference, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub const fn new(col: u32, row: u32) -> Self {
        Self { row, col }
    }

    /// Parse `B12` style references.
    pub fn parse(text: &str) -> Option<Self> {
        let split = text.find(|c: char| c.is_ascii_digit())?;
        let (letters, digits) = text.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_uppercase()) {
            return None;
        }
        let col = letters
            .bytes()
            .try_fold(0u32, |acc, b| acc.checked_mul(26)?.checked_add((b - b'A' + 1) as u32))?;
        let row = digits.parse().ok().filter(|r| *r > 0)?;
        Some(Self { row, col })
    }

    pub fn column_name(col: u32) -> String {
        let mut name = Vec::new();
        let mut n = col;
        while n > 0 {
            let rem = (n - 1) % 26;
            name.push(b'A' + rem as u8);
            n = (n - 1) / 26;
        }
        name.reverse();
        String::from_utf8(name).unwrap_or_default()
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::column_name(self.col), self.row)
    }
}

const fn cell(col: u32, row: u32) -> CellRef {
    CellRef::new(col, row)
}

const A: u32 = 1;
const B: u32 = 2;
const C: u32 = 3;
const D: u32 = 4;
const E: u32 = 5;

/// What a fixed cell holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlatTarget {
    Basic(BasicField),
    Personal(PersonalField),
    HighestDegree,
    Skills,
    Certifications,
    GeneratedAt,
}

#[derive(Debug, Clone, Copy)]
pub struct FlatCell {
    pub target: FlatTarget,
    pub cell: CellRef,
}

/// A field of one repeated entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockField {
    Education(EducationField),
    Work(WorkField),
    Project(ProjectField),
}

#[derive(Debug, Clone, Copy)]
pub struct BlockCell {
    pub field: BlockField,
    pub row_offset: u32,
    pub col: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSection {
    Education,
    Work,
    Projects,
}

/// A repeated section: `slots` pre-formatted entries of `rows_per_entry`
/// rows each, starting at `anchor_row`.
#[derive(Debug, Clone, Copy)]
pub struct RowBlock {
    pub section: BlockSection,
    pub anchor_row: u32,
    pub rows_per_entry: u32,
    pub slots: u32,
    pub cells: &'static [BlockCell],
}

impl RowBlock {
    /// First row of entry `index`.
    pub fn entry_row(&self, index: u32) -> u32 {
        self.anchor_row + index * self.rows_per_entry
    }

    /// Last row of the pre-formatted slots.
    pub fn last_slot_row(&self) -> u32 {
        self.entry_row(self.slots) - 1
    }
}

/// Complete layout of one template version.
#[derive(Debug)]
pub struct TemplateLayout {
    pub version: u32,
    pub sheet_part: &'static str,
    /// Label cells checked before any edit.
    pub labels: &'static [(CellRef, &'static str)],
    pub flat: &'static [FlatCell],
    /// Ordered top to bottom.
    pub blocks: &'static [RowBlock],
    /// Last used column.
    pub width: u32,
}

impl TemplateLayout {
    /// Check the label cells against `read`, which returns a cell's text.
    pub fn verify(&self, read: impl Fn(CellRef) -> Option<String>) -> Result<(), TemplateError> {
        for (cell, expected) in self.labels {
            let found = read(*cell).unwrap_or_default();
            if found.trim() != *expected {
                return Err(TemplateError::LayoutMismatch {
                    version: self.version,
                    cell: cell.to_string(),
                    expected: expected.to_string(),
                    found,
                });
            }
        }
        Ok(())
    }
}

pub const TITLE: &str = "候选人简历信息表";

/// Layout version 1.
pub static LAYOUT_V1: TemplateLayout = TemplateLayout {
    version: 1,
    sheet_part: "xl/worksheets/sheet1.xml",
    labels: &[
        (cell(A, 1), TITLE),
        (cell(A, 2), "基本信息"),
        (cell(A, 3), "姓名"),
        (cell(C, 3), "所属供应商"),
        (cell(A, 4), "个人信息"),
        (cell(A, 5), "性别"),
        (cell(C, 5), "出生日期"),
        (cell(A, 6), "联系电话"),
        (cell(C, 6), "电子邮箱"),
        (cell(A, 7), "户籍所在地"),
        (cell(C, 7), "现居住地"),
        (cell(A, 8), "婚姻状况"),
        (cell(C, 8), "最高学历"),
        (cell(A, 9), "教育经历"),
        (cell(A, 10), "入学时间"),
        (cell(B, 10), "毕业时间"),
        (cell(C, 10), "毕业院校"),
        (cell(D, 10), "专业"),
        (cell(E, 10), "学历"),
        (cell(A, 13), "工作经历"),
        (cell(A, 14), "开始日期"),
        (cell(B, 14), "结束日期"),
        (cell(C, 14), "单位名称"),
        (cell(D, 14), "岗位/职务"),
        (cell(E, 14), "工作内容"),
        (cell(A, 17), "项目经历"),
        (cell(A, 18), "开始日期"),
        (cell(B, 18), "结束日期"),
        (cell(C, 18), "项目名称"),
        (cell(D, 18), "担任角色"),
        (cell(E, 18), "项目描述"),
        (cell(A, 21), "技术特长"),
        (cell(A, 22), "掌握技能"),
        (cell(A, 23), "专业证书"),
        (cell(A, 24), "生成时间"),
    ],
    flat: &[
        FlatCell { target: FlatTarget::Basic(BasicField::Name), cell: cell(B, 3) },
        FlatCell { target: FlatTarget::Basic(BasicField::Vendor), cell: cell(D, 3) },
        FlatCell { target: FlatTarget::Personal(PersonalField::Gender), cell: cell(B, 5) },
        FlatCell { target: FlatTarget::Personal(PersonalField::BirthDate), cell: cell(D, 5) },
        FlatCell { target: FlatTarget::Personal(PersonalField::Phone), cell: cell(B, 6) },
        FlatCell { target: FlatTarget::Personal(PersonalField::Email), cell: cell(D, 6) },
        FlatCell {
            target: FlatTarget::Personal(PersonalField::RegisteredResidence),
            cell: cell(B, 7),
        },
        FlatCell {
            target: FlatTarget::Personal(PersonalField::CurrentResidence),
            cell: cell(D, 7),
        },
        FlatCell {
            target: FlatTarget::Personal(PersonalField::MaritalStatus),
            cell: cell(B, 8),
        },
        FlatCell { target: FlatTarget::HighestDegree, cell: cell(D, 8) },
        FlatCell { target: FlatTarget::Skills, cell: cell(B, 22) },
        FlatCell { target: FlatTarget::Certifications, cell: cell(B, 23) },
        FlatCell { target: FlatTarget::GeneratedAt, cell: cell(B, 24) },
    ],
    blocks: &[
        RowBlock {
            section: BlockSection::Education,
            anchor_row: 11,
            rows_per_entry: 1,
            slots: 2,
            cells: &[
                BlockCell { field: BlockField::Education(EducationField::EnrollmentDate), row_offset: 0, col: A },
                BlockCell { field: BlockField::Education(EducationField::GraduationDate), row_offset: 0, col: B },
                BlockCell { field: BlockField::Education(EducationField::School), row_offset: 0, col: C },
                BlockCell { field: BlockField::Education(EducationField::Major), row_offset: 0, col: D },
                BlockCell { field: BlockField::Education(EducationField::Degree), row_offset: 0, col: E },
            ],
        },
        RowBlock {
            section: BlockSection::Work,
            anchor_row: 15,
            rows_per_entry: 1,
            slots: 2,
            cells: &[
                BlockCell { field: BlockField::Work(WorkField::StartDate), row_offset: 0, col: A },
                BlockCell { field: BlockField::Work(WorkField::EndDate), row_offset: 0, col: B },
                BlockCell { field: BlockField::Work(WorkField::Company), row_offset: 0, col: C },
                BlockCell { field: BlockField::Work(WorkField::Title), row_offset: 0, col: D },
                BlockCell { field: BlockField::Work(WorkField::Description), row_offset: 0, col: E },
            ],
        },
        RowBlock {
            section: BlockSection::Projects,
            anchor_row: 19,
            rows_per_entry: 1,
            slots: 2,
            cells: &[
                BlockCell { field: BlockField::Project(ProjectField::StartDate), row_offset: 0, col: A },
                BlockCell { field: BlockField::Project(ProjectField::EndDate), row_offset: 0, col: B },
                BlockCell { field: BlockField::Project(ProjectField::Name), row_offset: 0, col: C },
                BlockCell { field: BlockField::Project(ProjectField::Role), row_offset: 0, col: D },
                BlockCell { field: BlockField::Project(ProjectField::Description), row_offset: 0, col: E },
            ],
        },
    ],
    width: 6,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_ref_roundtrip() {
        assert_eq!(CellRef::parse("B12"), Some(CellRef::new(2, 12)));
        assert_eq!(CellRef::parse("AA3"), Some(CellRef::new(27, 3)));
        assert_eq!(CellRef::new(28, 1).to_string(), "AB1");
        assert_eq!(CellRef::parse("12"), None);
        assert_eq!(CellRef::parse("B0"), None);
        assert_eq!(CellRef::parse("b2"), None);
    }

    #[test]
    fn test_blocks_ordered_and_disjoint() {
        let blocks = LAYOUT_V1.blocks;
        for pair in blocks.windows(2) {
            assert!(pair[0].last_slot_row() < pair[1].anchor_row);
        }
        assert_eq!(blocks[0].last_slot_row(), 12);
    }

    #[test]
    fn test_verify_reports_first_mismatch() {
        let err = LAYOUT_V1
            .verify(|cell| {
                if cell == CellRef::new(1, 3) {
                    Some("Name".to_string())
                } else {
                    LAYOUT_V1
                        .labels
                        .iter()
                        .find(|(c, _)| *c == cell)
                        .map(|(_, l)| l.to_string())
                }
            })
            .unwrap_err();

        match err {
            TemplateError::LayoutMismatch { cell, expected, found, .. } => {
                assert_eq!(cell, "A3");
                assert_eq!(expected, "姓名");
                assert_eq!(found, "Name");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

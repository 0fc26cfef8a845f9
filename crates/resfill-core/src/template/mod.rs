//! Spreadsheet template handling.
//!
//! The template is an `.xlsx` package whose first worksheet follows a fixed,
//! versioned layout ([`LAYOUT_V1`]). Population edits the worksheet and
//! stylesheet parts in place and copies every other part of the package
//! unchanged, so column widths, fonts, borders and merged regions survive.

mod blank;
mod layout;
mod populate;
mod styles;
mod workbook;

pub use blank::{default_template_bytes, write_default_template};
pub use layout::{
    BlockCell, BlockField, BlockSection, CellRef, FlatCell, FlatTarget, LAYOUT_V1, RowBlock,
    TemplateLayout,
};
pub use populate::{
    MISSING_MARKER, PRESENT_LABEL, PopulateOptions, populate, populate_with_layout,
};
pub use styles::StyleSheet;
pub use workbook::{MergeRange, Workbook, Worksheet};

use std::path::Path;

use tracing::debug;

use crate::error::TemplateError;

/// Read the template package at `path`.
pub fn load_template(path: &Path) -> Result<Vec<u8>, TemplateError> {
    std::fs::read(path).map_err(|source| TemplateError::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the template at `path` and check it against [`LAYOUT_V1`].
/// Returns the package bytes for reuse across documents.
pub fn preflight(path: &Path) -> Result<Vec<u8>, TemplateError> {
    let bytes = load_template(path)?;
    let workbook = Workbook::open(bytes.clone(), LAYOUT_V1.sheet_part)?;
    LAYOUT_V1.verify(|cell| workbook.cell_text(cell))?;
    debug!("Template {} matches layout v{}", path.display(), LAYOUT_V1.version);
    Ok(bytes)
}

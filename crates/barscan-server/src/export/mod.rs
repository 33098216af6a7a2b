//! Spreadsheet export of scan records.

mod xlsx;

use chrono::{DateTime, Utc};

pub use xlsx::{render_scans_xlsx, EXPORT_HEADERS, SHEET_NAME};

/// MIME type of the generated workbook.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Errors raised while rendering an export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write workbook archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("failed to write workbook data: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write worksheet xml: {0}")]
    Xml(String),
}

/// Attachment file name for an export generated at `now`.
pub fn export_filename(now: DateTime<Utc>) -> String {
    format!("barcode_scans_{}.xlsx", now.format("%Y%m%d_%H%M%S"))
}

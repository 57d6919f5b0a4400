use crate::spreadsheet::SpreadsheetError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a table read. Every message starts with `Failed to read Excel file:`.
#[derive(Error, Debug)]
pub enum ReadTableError {
    /// The file does not exist or could not be read.
    #[error("Failed to read Excel file: {}: {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes are not a readable workbook.
    #[error("Failed to read Excel file: {}: {source}", path.display())]
    InvalidWorkbook {
        path: PathBuf,
        #[source]
        source: SpreadsheetError,
    },

    #[error("Failed to read Excel file: Sheet \"{0}\" not found.")]
    SheetNotFound(String),
}

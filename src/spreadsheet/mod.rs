//! # Spreadsheet Reading
//!
//! Opens workbook files held in memory and materialises worksheets as
//! positioned cells. Office Open XML workbooks (`.xlsx`, `.xlsm`) are parsed
//! from their zip container and Excel 97-2003 workbooks (`.xls`) from the
//! BIFF8 stream of their compound file. Encrypted workbooks are rejected.
pub(crate) mod cell;
pub(crate) mod reference;
pub(crate) mod sheet;
pub(crate) mod xls;
pub(crate) mod xlsx;

#[cfg(test)]
pub(crate) mod fixtures;

use crate::helpers::biff8::Biff8Error;
use crate::helpers::cfb::CfbError;
use crate::helpers::xml::XmlError;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::xls::XlsError;
use crate::spreadsheet::xls::XlsSpreadsheet;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use thiserror::Error;

/// Signature of OLE2 compound documents.
const CFB_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Errors raised while decoding a workbook.
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Workbook is password protected")]
    PasswordProtectedError,

    #[error("Missing workbook part '{0}'")]
    MissingPartError(String),

    #[error("Workbook contains no worksheets")]
    EmptyWorkbookError,

    #[error("Sheet \"{0}\" not found.")]
    SheetNotFound(String),

    #[error("Shared string index {0} out of range at {1}")]
    SharedStringIndexError(usize, String),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    // Helper module errors
    #[error("{0}")]
    XmlHelperError(#[from] XmlError),

    #[error("{0}")]
    CfbHelperError(#[from] CfbError),

    #[error("{0}")]
    Biff8HelperError(#[from] Biff8Error),

    // Format errors
    #[error("{0}")]
    XlsError(#[from] XlsError),
}

/// A workbook whose worksheets can be listed and read by name.
pub(crate) trait Spreadsheet {
    /// Worksheet names in workbook order.
    fn sheet_names(&self) -> Vec<String>;

    /// Reads every populated cell of the named worksheet.
    fn read_sheet(&mut self, sheet_name: &str) -> Result<Sheet, SpreadsheetError>;
}

/// Detects the container format of `bytes` and opens the matching reader.
pub(crate) fn open(bytes: Vec<u8>) -> Result<Box<dyn Spreadsheet>, SpreadsheetError> {
    if bytes.starts_with(&CFB_SIGNATURE) {
        Ok(Box::new(XlsSpreadsheet::from_bytes(bytes)?))
    } else {
        Ok(Box::new(XlsxSpreadsheet::from_bytes(bytes)?))
    }
}

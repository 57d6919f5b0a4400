//! # Typed Sheet
//!
//! Reads one worksheet of an Excel workbook and returns its rows with a
//! caller-chosen set of columns coerced into declared types.
//!
//! ## Features
//!
//! - **Workbook formats**: Office Open XML (`.xlsx`, `.xlsm`) and Excel
//!   97-2003 (`.xls`), detected from the file content
//! - **Header-keyed rows**: the first populated row names the columns; blank
//!   and repeated names are disambiguated (`__EMPTY`, `Name_1`)
//! - **Typed columns**: every requested column is coerced into a string,
//!   number, boolean or date, with `None` for empty or unconvertible cells
//! - **Native dates**: date-formatted cells are decoded from Excel serials,
//!   honouring the 1900 and 1904 date systems; read as numbers they keep
//!   their serial
//! - **Diagnostics**: [`read_table_report`] lists every cell that failed to convert
//!
//! ## Example
//!
//! ```no_run
//! use typed_sheet::{read_table, ColumnSchema, DataType};
//!
//! # async fn example() -> Result<(), typed_sheet::ReadTableError> {
//! let columns = [
//!     ColumnSchema::new("Studio", DataType::String),
//!     ColumnSchema::new("Website", DataType::String),
//! ];
//! for row in read_table("social_media.xlsx", "Sheet1", &columns).await? {
//!     println!("{:?}", row.get("Studio"));
//! }
//! # Ok(())
//! # }
//! ```
mod error;
mod helpers;
mod spreadsheet;

pub mod config;
pub mod table;

pub use error::ReadTableError;
pub use spreadsheet::SpreadsheetError;
pub use table::column::ColumnError;
pub use table::column::ColumnSchema;
pub use table::column::DataType;
pub use table::convert::convert;
pub use table::convert::try_convert;
pub use table::convert::ConversionError;
pub use table::extract_rows;
pub use table::read_records;
pub use table::read_table;
pub use table::read_table_report;
pub use table::value::Value;
pub use table::CellFailure;
pub use table::RawRow;
pub use table::TableReport;
pub use table::TypedRow;

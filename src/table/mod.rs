//! Typed extraction of worksheet records.

pub mod column;
pub mod convert;
mod read_table;
pub mod value;

pub use read_table::extract_rows;
pub use read_table::read_records;
pub use read_table::read_table;
pub use read_table::read_table_report;
pub use read_table::CellFailure;
pub use read_table::RawRow;
pub use read_table::TableReport;
pub use read_table::TypedRow;

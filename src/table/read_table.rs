use crate::error::ReadTableError;
use crate::spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use crate::table::column::ColumnSchema;
use crate::table::convert::try_convert;
use crate::table::convert::ConversionError;
use crate::table::value::Value;
use log::debug;
use log::info;
use serde::ser::SerializeMap;
use serde::Serialize;
use serde::Serializer;
use std::collections::HashMap;
use std::path::Path;

/// One worksheet row keyed by header text. Empty cells have no entry.
pub type RawRow = HashMap<String, Value>;

/// One extracted row: every requested column in schema order, `None` where
/// the cell was empty, missing or not convertible.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypedRow {
    fields: Vec<(String, Option<Value>)>,
}

impl TypedRow {
    /// Sets a column, replacing the value of an existing column of the same name.
    pub fn insert(&mut self, name: &str, value: Option<Value>) {
        match self.fields.iter_mut().find(|(field, _)| field == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name.to_owned(), value)),
        }
    }

    /// The converted value of a column; `None` for null or unknown columns.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .and_then(|(_, value)| value.as_ref())
    }

    pub fn contains_column(&self, name: &str) -> bool {
        self.fields.iter().any(|(field, _)| field == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for TypedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A cell that held a value the column type could not represent.
#[derive(Clone, Debug, PartialEq)]
pub struct CellFailure {
    /// Index of the row in the extraction result (0-based)
    pub row: usize,
    pub column: String,
    pub error: ConversionError,
}

/// Extracted rows together with the cells that were nulled by failed conversions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableReport {
    pub rows: Vec<TypedRow>,
    pub failures: Vec<CellFailure>,
}

/// Applies the column schema to in-memory records, preserving their order.
pub fn extract_rows(records: &[RawRow], columns: &[ColumnSchema]) -> TableReport {
    let mut report = TableReport::default();
    for (index, record) in records.iter().enumerate() {
        let mut row = TypedRow::default();
        for column in columns {
            let value = match try_convert(record.get(&column.name), column.data_type) {
                Ok(value) => value,
                Err(error) => {
                    debug!("Row {} column '{}': {}", index + 1, column.name, error);
                    report.failures.push(CellFailure {
                        row: index,
                        column: column.name.to_owned(),
                        error,
                    });
                    None
                }
            };
            row.insert(&column.name, value);
        }
        report.rows.push(row);
    }
    report
}

/// Reads the named worksheet as records keyed by its header row.
pub async fn read_records(path: impl AsRef<Path>, sheet_name: &str) -> Result<Vec<RawRow>, ReadTableError> {
    let path = path.as_ref();
    let file_access = |source| ReadTableError::FileAccess {
        path: path.to_path_buf(),
        source,
    };
    tokio::fs::metadata(path).await.map_err(file_access)?;
    let bytes = tokio::fs::read(path).await.map_err(file_access)?;
    debug!("Read {} bytes from '{}'", bytes.len(), path.display());

    let invalid_workbook = |source| ReadTableError::InvalidWorkbook {
        path: path.to_path_buf(),
        source,
    };
    let mut spreadsheet = spreadsheet::open(bytes).map_err(invalid_workbook)?;
    let sheet = match spreadsheet.read_sheet(sheet_name) {
        Ok(sheet) => sheet,
        Err(SpreadsheetError::SheetNotFound(name)) => {
            debug!("Available sheets: {:?}", spreadsheet.sheet_names());
            return Err(ReadTableError::SheetNotFound(name));
        }
        Err(error) => return Err(invalid_workbook(error)),
    };
    let records = sheet.records();
    info!(
        "Loaded {} rows from sheet '{}' of '{}'",
        records.len(),
        sheet_name,
        path.display()
    );
    Ok(records)
}

/// Reads the named worksheet and converts the requested columns, reporting
/// every cell whose value could not be converted.
pub async fn read_table_report(
    path: impl AsRef<Path>,
    sheet_name: &str,
    columns: &[ColumnSchema],
) -> Result<TableReport, ReadTableError> {
    let records = read_records(path, sheet_name).await?;
    Ok(extract_rows(&records, columns))
}

/// Reads the named worksheet and converts the requested columns. Cells that
/// are missing or cannot be converted come back as `None`.
pub async fn read_table(
    path: impl AsRef<Path>,
    sheet_name: &str,
    columns: &[ColumnSchema],
) -> Result<Vec<TypedRow>, ReadTableError> {
    Ok(read_table_report(path, sheet_name, columns).await?.rows)
}

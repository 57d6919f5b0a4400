use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// Errors related to column schema parsing.
#[derive(Error, Debug, PartialEq)]
pub enum ColumnError {
    #[error("Invalid column type '{0}'")]
    TypeError(String),

    #[error("Missing column name in '{0}'")]
    NameError(String),
}

/// Target type of an extracted column.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    String,
    Number,
    Boolean,
    Date,
}

impl DataType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
        }
    }

    /// Parses a type name, case-insensitively, accepting common aliases:
    ///
    /// - String: "string", "text", "varchar"
    /// - Number: "number", "float", "double", "decimal", "numeric", "int", "integer", "bigint"
    /// - Boolean: "boolean", "bool"
    /// - Date: "date", "datetime", "timestamp"
    pub fn parse(name: &str) -> Result<Self, ColumnError> {
        match name.trim().to_ascii_uppercase().as_str() {
            "STRING" | "TEXT" | "VARCHAR" => Ok(Self::String),
            "NUMBER" | "FLOAT" | "DOUBLE" | "DECIMAL" | "NUMERIC" | "INT" | "INTEGER" | "BIGINT" => Ok(Self::Number),
            "BOOL" | "BOOLEAN" => Ok(Self::Boolean),
            "DATE" | "DATETIME" | "TIMESTAMP" => Ok(Self::Date),
            _ => Err(ColumnError::TypeError(name.to_string())),
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = ColumnError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::parse(name)
    }
}

/// A worksheet column to extract and the type its cells are coerced into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSchema {
    /// Header text of the column
    pub name: String,
    pub data_type: DataType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Parses `"Name:type"`, splitting on the last colon; a bare `"Name"` is a string column.
impl FromStr for ColumnSchema {
    type Err = ColumnError;

    fn from_str(definition: &str) -> Result<Self, Self::Err> {
        let (name, data_type) = match definition.rsplit_once(':') {
            Some((name, kind)) => (name.trim(), DataType::parse(kind)?),
            None => (definition.trim(), DataType::String),
        };
        if name.is_empty() {
            Err(ColumnError::NameError(definition.to_string()))?
        }
        Ok(Self::new(name, data_type))
    }
}

use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::SpreadsheetError;
use crate::table::value::parse_date_text;
use crate::table::value::Value;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::TimeDelta;
use std::collections::HashMap;

/// How the raw text of a cell has to be interpreted.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Boolean values stored as `0`/`1`
    Boolean,
    /// Plain numeric values
    Number,
    /// Date/time values stored as numbers from 1900 epoch
    NumberDateTime1900,
    /// Date values stored as numbers from 1900 epoch
    NumberDate1900,
    /// Time values stored as fractions of a day
    NumberTime1900,
    /// Date/time values stored as numbers from 1904 epoch
    NumberDateTime1904,
    /// Date values stored as numbers from 1904 epoch
    NumberDate1904,
    /// Time values stored as fractions of a day
    NumberTime1904,
    /// ISO 8601 date/time strings
    IsoDateTime,
    /// Inline string values
    InlineString,
    /// Shared string table references
    SharedString,
    /// Error values such as `#N/A`
    Error,
}

impl CellType {
    /// Maps built-in number format IDs to date and time cell types.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match (id, is_1904) {
            ("22", false) => Some(Self::NumberDateTime1900),
            ("22", true) => Some(Self::NumberDateTime1904),
            ("14" | "15" | "16" | "17", false) => Some(Self::NumberDate1900),
            ("14" | "15" | "16" | "17", true) => Some(Self::NumberDate1904),
            ("18" | "19" | "20" | "21" | "45" | "46" | "47", false) => Some(Self::NumberTime1900),
            ("18" | "19" | "20" | "21" | "45" | "46" | "47", true) => Some(Self::NumberTime1904),
            _ => None,
        }
    }

    /// Scans a custom number format code for date (`y`, `d`) and time (`h`,
    /// `s`) tokens outside of quoted literals, escapes and bracketed sections.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_bracket = false;
        let mut is_date = false;
        let mut is_time = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_bracket => is_literal = true,

                ']' if is_bracket => is_bracket = false,
                '[' if !is_literal => is_bracket = true,
                _ if is_literal || is_bracket => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }
}

/// Resolves the number format of every cell style into a cell type.
///
/// # Arguments
/// * `format_indexes` - Number format ID of each cell style, in style order
/// * `custom_formats` - Cell types of the workbook's own format codes, by format ID
/// * `is_1904` - Whether the workbook counts dates from 1904
///
/// # Returns
/// * `Vec<CellType>` - Cell type per style index; unknown formats are plain numbers
pub(crate) fn resolve_number_formats(
    format_indexes: &[String],
    custom_formats: &HashMap<String, CellType>,
    is_1904: bool,
) -> Vec<CellType> {
    format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect()
}

/// Converts a BIFF error code to its display text.
pub(crate) fn to_error_value(code: u8) -> &'static str {
    match code {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// A cell as read from the worksheet XML, before its value is resolved.
#[derive(Clone, Debug, Default)]
pub(crate) struct Cell {
    /// Row index (0-based)
    pub(crate) row: usize,
    /// Column index (0-based)
    pub(crate) col: usize,
    pub(crate) kind: CellType,
    /// Raw text of the `<v>` or `<is>` element
    pub(crate) value: String,
}

impl Cell {
    /// Returns the Excel-style cell reference (e.g., "A1", "B2").
    pub(crate) fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }

    /// Resolves the raw text into a scalar. Empty and error cells yield `None`.
    pub(crate) fn to_value(&self, shared_strings: &[String]) -> Result<Option<Value>, SpreadsheetError> {
        let value = match self.kind {
            CellType::Empty | CellType::Error => None,
            CellType::Boolean => {
                let text = self.value.trim();
                Some(Value::Boolean(text == "1" || text.eq_ignore_ascii_case("true")))
            }
            CellType::Number | CellType::NumberTime1900 | CellType::NumberTime1904 => Some(self.to_number()),
            CellType::NumberDate1900
            | CellType::NumberDateTime1900
            | CellType::NumberDate1904
            | CellType::NumberDateTime1904 => Some(self.to_serial_date()),
            CellType::IsoDateTime => Some(
                parse_date_text(&self.value)
                    .map(Value::Date)
                    .unwrap_or_else(|| Value::String(self.value.to_owned())),
            ),
            CellType::InlineString => Some(Value::String(self.value.to_owned())),
            CellType::SharedString => {
                let index = self.value.trim().parse::<usize>()?;
                let text = shared_strings
                    .get(index)
                    .ok_or_else(|| SpreadsheetError::SharedStringIndexError(index, self.reference()))?;
                Some(Value::String(text.to_owned()))
            }
        };
        Ok(value)
    }

    /// Pairs a serial day count with the date it denotes; serials outside the
    /// calendar stay plain numbers.
    fn to_serial_date(&self) -> Value {
        let is_1904 = matches!(self.kind, CellType::NumberDate1904 | CellType::NumberDateTime1904);
        match self.to_number() {
            Value::Number(serial) => match serial_to_datetime(serial, is_1904) {
                Some(date) => Value::ExcelDate { serial, date },
                None => Value::Number(serial),
            },
            value => value,
        }
    }

    /// Numbers that fail to parse are kept as their text.
    fn to_number(&self) -> Value {
        match self.value.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => Value::Number(number),
            _ => Value::String(self.value.to_owned()),
        }
    }
}

/// Converts an Excel serial day number into a date and time.
/// Serials below 60 in the 1900 system are shifted by one day to undo the
/// Lotus 1-2-3 leap year bug (the phantom 1900-02-29).
pub(crate) fn serial_to_datetime(serial: f64, is_1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let days = serial.trunc() as i64;
    let offset = if is_1904 {
        1_462
    } else if days < 60 {
        1
    } else {
        0
    };
    let milliseconds = (serial.fract() * 86_400_000f64).round() as i64;
    NaiveDate::from_ymd_opt(1899, 12, 30)?
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(TimeDelta::try_days(days + offset)?)?
        .checked_add_signed(TimeDelta::try_milliseconds(milliseconds)?)
}

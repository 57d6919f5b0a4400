//! Coercion of loosely-typed scalars into a column's target type.

use crate::table::column::DataType;
use crate::table::value::parse_date_text;
use crate::table::value::Value;
use chrono::DateTime;
use chrono::NaiveDateTime;
use thiserror::Error;

/// A present value that has no representation in the target type.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Cannot convert '{value}' to {target}")]
pub struct ConversionError {
    pub value: Value,
    pub target: DataType,
}

/// Converts `value` into `target`, yielding `None` when the input is absent
/// or cannot be represented. Never fails.
pub fn convert(value: Option<&Value>, target: DataType) -> Option<Value> {
    try_convert(value, target).unwrap_or(None)
}

/// Like [`convert`], but reports why a present value could not be converted.
/// Absent input is `Ok(None)` for every target.
pub fn try_convert(value: Option<&Value>, target: DataType) -> Result<Option<Value>, ConversionError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let converted = match target {
        DataType::String => Some(Value::String(value.to_string())),
        DataType::Number => to_number(value).map(Value::Number),
        DataType::Boolean => to_boolean(value).map(Value::Boolean),
        DataType::Date => to_date(value).map(Value::Date),
    };
    converted.map(Some).ok_or_else(|| ConversionError {
        value: value.clone(),
        target,
    })
}

/// Dates become milliseconds since the Unix epoch; worksheet dates keep their serial.
fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => Some(*number).filter(|number| !number.is_nan()),
        Value::ExcelDate { serial, .. } => Some(*serial),
        Value::Boolean(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::String(text) => parse_number(text),
        Value::Date(datetime) => Some(datetime.and_utc().timestamp_millis() as f64),
    }
}

/// Parses trimmed text as a decimal, `0x`/`0o`/`0b` integer literal or
/// `Infinity`. Blank text is zero.
fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return Some(0.0);
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = text.strip_prefix(prefix) {
            if digits.starts_with(['+', '-']) {
                return None;
            }
            return u64::from_str_radix(digits, radix).ok().map(|number| number as f64);
        }
    }
    match text {
        "Infinity" | "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        _ => (),
    }
    let is_decimal = text
        .bytes()
        .all(|byte| byte.is_ascii_digit() || matches!(byte, b'.' | b'e' | b'E' | b'+' | b'-'));
    if is_decimal {
        text.parse::<f64>().ok()
    } else {
        None
    }
}

fn to_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Boolean(flag) => Some(*flag),
        Value::String(text) => match text.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        Value::Number(number) | Value::ExcelDate { serial: number, .. } => Some(*number != 0.0),
        Value::Date(_) => None,
    }
}

/// Numbers are read as milliseconds since the Unix epoch.
fn to_date(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Date(datetime) | Value::ExcelDate { date: datetime, .. } => Some(*datetime),
        Value::String(text) => parse_date_text(text),
        Value::Number(number) if number.is_finite() => {
            DateTime::from_timestamp_millis(number.trunc() as i64).map(|datetime| datetime.naive_utc())
        }
        Value::Number(_) | Value::Boolean(_) => None,
    }
}

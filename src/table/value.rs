use chrono::DateTime;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use serde::Serialize;
use serde::Serializer;
use std::fmt::Display;

/// Date/time layouts accepted for text, tried in order after RFC 3339.
const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// Date-only layouts accepted for text.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// A loosely-typed scalar read from a worksheet or produced by conversion.
/// Absence is expressed as `Option::None` by callers.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    String(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDateTime),
    /// A date-formatted worksheet number: the stored serial day count and the
    /// date it denotes. Reads as the date, converts to a number as the serial.
    ExcelDate { serial: f64, date: NaiveDateTime },
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Date(value)
    }
}

/// Canonical text: numbers in shortest decimal form (`42`, `0.5`),
/// booleans as `true`/`false`, dates as `2024-01-15 08:30:00`.
impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(value) => f.write_str(value),
            Value::Number(value) => f.write_str(&format_number(*value)),
            Value::Boolean(value) => write!(f, "{value}"),
            Value::Date(value) | Value::ExcelDate { date: value, .. } => write!(f, "{value}"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::String(value) => serializer.serialize_str(value),
            Value::Number(value) if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 => {
                serializer.serialize_i64(*value as i64)
            }
            Value::Number(value) => serializer.serialize_f64(*value),
            Value::Boolean(value) => serializer.serialize_bool(*value),
            Value::Date(_) | Value::ExcelDate { .. } => serializer.collect_str(self),
        }
    }
}

fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_owned()
    } else if value.is_infinite() {
        let text = if value > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_owned()
    } else if value == 0.0 {
        "0".to_owned()
    } else {
        value.to_string()
    }
}

/// Parses a calendar date or date/time written as text. Offsets are
/// normalized to UTC; date-only text means midnight.
pub(crate) fn parse_date_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(datetime.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datetime(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, s).unwrap()
    }

    #[test]
    fn display_numbers() {
        assert_eq!(Value::Number(42.0).to_string(), "42");
        assert_eq!(Value::Number(0.5).to_string(), "0.5");
        assert_eq!(Value::Number(-3.25).to_string(), "-3.25");
        assert_eq!(Value::Number(-0.0).to_string(), "0");
        assert_eq!(Value::Number(f64::INFINITY).to_string(), "Infinity");
    }

    #[test]
    fn display_other_values() {
        let date = datetime(2024, 1, 15, 8, 30, 0);
        assert_eq!(Value::ExcelDate { serial: 45306.3541666, date }.to_string(), "2024-01-15 08:30:00");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::from("a.com").to_string(), "a.com");
        assert_eq!(Value::Date(datetime(2024, 1, 15, 8, 30, 0)).to_string(), "2024-01-15 08:30:00");
    }

    #[test]
    fn serialize_as_plain_json() -> Result<(), serde_json::Error> {
        let values = vec![
            Value::from("A"),
            Value::Number(42.0),
            Value::Number(1.5),
            Value::Boolean(false),
            Value::Date(datetime(2024, 1, 15, 0, 0, 0)),
            Value::ExcelDate {
                serial: 45306.5,
                date: datetime(2024, 1, 15, 12, 0, 0),
            },
        ];
        assert_eq!(
            serde_json::to_string(&values)?,
            r#"["A",42,1.5,false,"2024-01-15 00:00:00","2024-01-15 12:00:00"]"#
        );
        Ok(())
    }

    #[test]
    fn parse_dates() {
        assert_eq!(parse_date_text("2024-01-15"), Some(datetime(2024, 1, 15, 0, 0, 0)));
        assert_eq!(parse_date_text(" 2024/01/15 "), Some(datetime(2024, 1, 15, 0, 0, 0)));
        assert_eq!(parse_date_text("01/15/2024"), Some(datetime(2024, 1, 15, 0, 0, 0)));
        assert_eq!(parse_date_text("2024-01-15 08:30:00"), Some(datetime(2024, 1, 15, 8, 30, 0)));
        assert_eq!(parse_date_text("2024-01-15T08:30"), Some(datetime(2024, 1, 15, 8, 30, 0)));
        assert_eq!(parse_date_text("2024-01-15T10:30:00+02:00"), Some(datetime(2024, 1, 15, 8, 30, 0)));
        assert_eq!(parse_date_text("not-a-date"), None);
        assert_eq!(parse_date_text("2024-02-30"), None);
        assert_eq!(parse_date_text(""), None);
    }
}

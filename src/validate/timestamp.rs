use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ExtractError;

/// A time offset as supplied by the caller
///
/// Numbers are taken as seconds directly. Text is one to three colon-separated
/// numeric fields read as `S`, `M:S` or `H:M:S`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl TimeValue {
    pub fn text(value: impl Into<String>) -> Self {
        TimeValue::Text(value.into())
    }
}

impl From<i64> for TimeValue {
    fn from(value: i64) -> Self {
        TimeValue::Integer(value)
    }
}

impl From<&str> for TimeValue {
    fn from(value: &str) -> Self {
        TimeValue::Text(value.to_string())
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeValue::Integer(v) => write!(f, "{}", v),
            TimeValue::Float(v) => write!(f, "{}", v),
            TimeValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Normalize a time value into a whole second offset
///
/// Floats are truncated toward zero. The result may be negative when a negative
/// number is supplied; range validation rejects that later.
pub fn normalize_timestamp(value: &TimeValue) -> Result<i64, ExtractError> {
    match value {
        TimeValue::Integer(seconds) => Ok(*seconds),
        TimeValue::Float(seconds) => {
            if !seconds.is_finite() || seconds.abs() >= i64::MAX as f64 {
                return Err(ExtractError::InvalidTimestamp(value.to_string()));
            }
            Ok(seconds.trunc() as i64)
        }
        TimeValue::Text(raw) => parse_clock(raw),
    }
}

fn parse_clock(raw: &str) -> Result<i64, ExtractError> {
    let invalid = || ExtractError::InvalidTimestamp(raw.to_string());

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let fields: Vec<&str> = trimmed.split(':').collect();
    if fields.len() > 3 {
        return Err(invalid());
    }

    // least significant field first: seconds, minutes, hours
    const UNITS: [i64; 3] = [1, 60, 3600];

    let mut total: i64 = 0;
    for (field, unit) in fields.iter().rev().zip(UNITS) {
        let value = parse_field(field).ok_or_else(invalid)?;
        total = value
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(invalid)?;
    }

    Ok(total)
}

/// One clock field: optional surrounding whitespace and sign, then digits
///
/// Negative fields are allowed here so that a negative offset is rejected by
/// range validation, the same as a negative number would be.
fn parse_field(field: &str) -> Option<i64> {
    let field = field.trim();
    let (negative, digits) = match field.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, field.strip_prefix('+').unwrap_or(field)),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let value: i64 = digits.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Render seconds as `H:MM:SS` or `M:SS`
pub fn format_clock(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Result<i64, ExtractError> {
        normalize_timestamp(&TimeValue::text(s))
    }

    #[test]
    fn test_clock_fields() {
        assert_eq!(text("90").unwrap(), 90);
        assert_eq!(text("1:30").unwrap(), 90);
        assert_eq!(text("1:01:30").unwrap(), 3690);
        assert_eq!(text("0:05").unwrap(), 5);
        assert_eq!(text(" 00:38 ").unwrap(), 38);
        assert_eq!(text("9:999").unwrap(), 9 * 60 + 999);
    }

    #[test]
    fn test_clock_matches_arithmetic() {
        for h in [0i64, 1, 2, 10] {
            for m in [0i64, 1, 59, 75] {
                for s in [0i64, 7, 59, 300] {
                    let expected = h * 3600 + m * 60 + s;
                    assert_eq!(text(&format!("{}:{}:{}", h, m, s)).unwrap(), expected);
                    assert_eq!(text(&format!("{}:{}", m, s)).unwrap(), m * 60 + s);
                    assert_eq!(text(&s.to_string()).unwrap(), s);
                }
            }
        }
    }

    #[test]
    fn test_malformed_text() {
        let malformed = [
            "", "   ", "abc", "1:xx", "1:2:3:4", "1:", ":30", "1.5", "-", "--5", "1:+", "1 0",
        ];
        for raw in malformed {
            match text(raw) {
                Err(ExtractError::InvalidTimestamp(value)) => assert_eq!(value, raw),
                other => panic!("expected InvalidTimestamp for {:?}, got {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_signed_and_padded_fields() {
        assert_eq!(text("-5").unwrap(), -5);
        assert_eq!(text("+3").unwrap(), 3);
        assert_eq!(text("1: 30").unwrap(), 90);
        assert_eq!(text("1 :30").unwrap(), 90);
        assert_eq!(text(" 1 : 02 : 03 ").unwrap(), 3723);
        assert_eq!(text("1:-30").unwrap(), 30);
    }

    #[test]
    fn test_overflow_is_rejected() {
        assert!(matches!(
            text("99999999999999999999"),
            Err(ExtractError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            text("9223372036854775807:0:0"),
            Err(ExtractError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_numeric_values() {
        assert_eq!(normalize_timestamp(&TimeValue::Integer(42)).unwrap(), 42);
        assert_eq!(normalize_timestamp(&TimeValue::Integer(-3)).unwrap(), -3);
        assert_eq!(normalize_timestamp(&TimeValue::Float(12.9)).unwrap(), 12);
        assert!(normalize_timestamp(&TimeValue::Float(f64::NAN)).is_err());
        assert!(normalize_timestamp(&TimeValue::Float(f64::INFINITY)).is_err());
    }

    #[test]
    fn test_deserialize_untagged() {
        let values: Vec<TimeValue> = serde_json::from_str(r#"[90, 1.5, "1:30"]"#).unwrap();
        assert_eq!(values[0], TimeValue::Integer(90));
        assert_eq!(values[1], TimeValue::Float(1.5));
        assert_eq!(values[2], TimeValue::text("1:30"));
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(5), "0:05");
        assert_eq!(format_clock(212), "3:32");
        assert_eq!(format_clock(3690), "1:01:30");
    }
}

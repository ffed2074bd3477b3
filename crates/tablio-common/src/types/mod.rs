//! Common types used across Tablio
//!
//! Field kinds describe how a column's raw CSV text is interpreted, and
//! [`FieldValue`] is the typed value produced from that text.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage kind of a table field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Integer,
    Date,
    DateTime,
    Boolean,
}

impl FieldKind {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Date => "date",
            FieldKind::DateTime => "datetime",
            FieldKind::Boolean => "boolean",
        }
    }
}

impl std::str::FromStr for FieldKind {
    type Err = ValueParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(FieldKind::Text),
            "integer" => Ok(FieldKind::Integer),
            "date" => Ok(FieldKind::Date),
            "datetime" => Ok(FieldKind::DateTime),
            "boolean" => Ok(FieldKind::Boolean),
            _ => Err(ValueParseError::UnknownKind(s.to_string())),
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors raised when raw text does not match a field kind
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueParseError {
    #[error("Enter a whole number: '{0}'")]
    Integer(String),

    #[error("Enter a valid date ({format}): '{value}'")]
    Date { value: String, format: String },

    #[error("Enter a valid date/time ({format}): '{value}'")]
    DateTime { value: String, format: String },

    #[error("'{0}' value must be either true or false")]
    Boolean(String),

    #[error("Unknown field kind: {0}")]
    UnknownKind(String),
}

/// A typed field value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    #[default]
    Null,
    Text(String),
    Integer(i64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl FieldValue {
    /// Parse raw cell text as `kind`.
    ///
    /// Empty text is `Null` for every kind; required-ness is checked later.
    pub fn parse(
        raw: &str,
        kind: FieldKind,
        date_format: &str,
        datetime_format: &str,
    ) -> std::result::Result<Self, ValueParseError> {
        if raw.is_empty() {
            return Ok(FieldValue::Null);
        }

        match kind {
            FieldKind::Text => Ok(FieldValue::Text(raw.to_string())),
            FieldKind::Integer => raw
                .trim()
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| ValueParseError::Integer(raw.to_string())),
            FieldKind::Date => NaiveDate::parse_from_str(raw.trim(), date_format)
                .map(FieldValue::Date)
                .map_err(|_| ValueParseError::Date {
                    value: raw.to_string(),
                    format: date_format.to_string(),
                }),
            FieldKind::DateTime => NaiveDateTime::parse_from_str(raw.trim(), datetime_format)
                .map(FieldValue::DateTime)
                .map_err(|_| ValueParseError::DateTime {
                    value: raw.to_string(),
                    format: datetime_format.to_string(),
                }),
            FieldKind::Boolean => match raw.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(FieldValue::Boolean(true)),
                "false" | "0" | "no" | "off" => Ok(FieldValue::Boolean(false)),
                _ => Err(ValueParseError::Boolean(raw.to_string())),
            },
        }
    }

    /// Render the value as CSV text, formatting dates with the given patterns
    pub fn render(&self, date_format: &str, datetime_format: &str) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Date(d) => d.format(date_format).to_string(),
            FieldValue::DateTime(dt) => dt.format(datetime_format).to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(value: NaiveDateTime) -> Self {
        FieldValue::DateTime(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const DATE: &str = "%Y/%m/%d";
    const DATETIME: &str = "%Y/%m/%d %H:%M:%S";

    #[test]
    fn test_field_kind_from_str() {
        assert_eq!("TEXT".parse::<FieldKind>().unwrap(), FieldKind::Text);
        assert_eq!("datetime".parse::<FieldKind>().unwrap(), FieldKind::DateTime);
        assert!("decimal".parse::<FieldKind>().is_err());
    }

    #[test]
    fn test_parse_empty_is_null() {
        for kind in [FieldKind::Text, FieldKind::Integer, FieldKind::Date, FieldKind::Boolean] {
            assert_eq!(FieldValue::parse("", kind, DATE, DATETIME).unwrap(), FieldValue::Null);
        }
    }

    #[test]
    fn test_parse_date_with_policy_format() {
        let value = FieldValue::parse("2024/01/18", FieldKind::Date, DATE, DATETIME).unwrap();
        assert_eq!(value, FieldValue::Date(NaiveDate::from_ymd_opt(2024, 1, 18).unwrap()));

        let err = FieldValue::parse("2024-01-18", FieldKind::Date, DATE, DATETIME).unwrap_err();
        assert!(matches!(err, ValueParseError::Date { .. }));
    }

    #[test]
    fn test_parse_datetime() {
        let value =
            FieldValue::parse("2024/01/18 09:30:00", FieldKind::DateTime, DATE, DATETIME).unwrap();
        assert_eq!(value.render(DATE, DATETIME), "2024/01/18 09:30:00");
    }

    #[test]
    fn test_parse_boolean_spellings() {
        assert_eq!(
            FieldValue::parse("Yes", FieldKind::Boolean, DATE, DATETIME).unwrap(),
            FieldValue::Boolean(true)
        );
        assert_eq!(
            FieldValue::parse("0", FieldKind::Boolean, DATE, DATETIME).unwrap(),
            FieldValue::Boolean(false)
        );
        assert!(FieldValue::parse("maybe", FieldKind::Boolean, DATE, DATETIME).is_err());
    }

    #[test]
    fn test_parse_integer_rejects_text() {
        let err = FieldValue::parse("12a", FieldKind::Integer, DATE, DATETIME).unwrap_err();
        assert_eq!(err, ValueParseError::Integer("12a".to_string()));
    }

    #[test]
    fn test_render_uses_formats() {
        let date = FieldValue::Date(NaiveDate::from_ymd_opt(2023, 12, 1).unwrap());
        assert_eq!(date.render("%d.%m.%Y", DATETIME), "01.12.2023");
        assert_eq!(FieldValue::Null.render(DATE, DATETIME), "");
        assert_eq!(FieldValue::Boolean(true).render(DATE, DATETIME), "true");
    }
}

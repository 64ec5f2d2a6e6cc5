use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;

use super::mapping_errors::{MappingError, Result};

/// Flex emits several placeholder spellings for "no value".
const NULL_SENTINELS: [&str; 3] = ["-", "--", "N/A"];

/// Supported local-date spellings across Flex sections.
const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y%m%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%d-%b-%y",
];

/// Location of the row being normalized, for deterministic diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub section: &'a str,
    pub source_row_ref: &'a str,
}

impl<'a> RowContext<'a> {
    pub fn violation(&self, field: &str, raw_value: &str) -> MappingError {
        MappingError::ContractViolation {
            section: self.section.to_string(),
            source_row_ref: self.source_row_ref.to_string(),
            field: field.to_string(),
            raw_value: raw_value.to_string(),
        }
    }
}

/// Normalizes a raw attribute value, mapping sentinel spellings to None.
pub fn normalize_value(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || NULL_SENTINELS.contains(&trimmed) {
        return None;
    }
    Some(trimmed)
}

pub fn optional_text(payload: &BTreeMap<String, String>, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(|raw| normalize_value(raw))
        .map(|value| value.to_string())
}

pub fn required_text(
    payload: &BTreeMap<String, String>,
    key: &str,
    ctx: RowContext,
) -> Result<String> {
    optional_text(payload, key)
        .ok_or_else(|| ctx.violation(key, payload.get(key).map(String::as_str).unwrap_or("")))
}

/// Parses a fixed-decimal literal, stripping thousands-separator commas.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned = raw.trim().replace(',', "");
    Decimal::from_str(&cleaned).ok()
}

pub fn optional_decimal(
    payload: &BTreeMap<String, String>,
    key: &str,
    ctx: RowContext,
) -> Result<Option<Decimal>> {
    match optional_text(payload, key) {
        None => Ok(None),
        Some(raw) => parse_decimal(&raw)
            .map(Some)
            .ok_or_else(|| ctx.violation(key, &raw)),
    }
}

pub fn required_decimal(
    payload: &BTreeMap<String, String>,
    key: &str,
    ctx: RowContext,
) -> Result<Decimal> {
    let raw = required_text(payload, key, ctx)?;
    parse_decimal(&raw).ok_or_else(|| ctx.violation(key, &raw))
}

/// Parses a local date across the supported Flex spellings.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    None
}

pub fn optional_date(
    payload: &BTreeMap<String, String>,
    key: &str,
    ctx: RowContext,
) -> Result<Option<NaiveDate>> {
    match optional_text(payload, key) {
        None => Ok(None),
        Some(raw) => parse_date(&raw)
            .map(Some)
            .ok_or_else(|| ctx.violation(key, &raw)),
    }
}

/// Parses a timestamp that must resolve to an explicit UTC instant.
///
/// Offset-naive strings are rejected; only spellings carrying their own zone
/// are accepted.
pub fn parse_timestamp_utc(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%d %H:%M:%S%z", "%Y%m%d;%H%M%S %z"] {
        if let Ok(parsed) = DateTime::parse_from_str(trimmed, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    None
}

pub fn required_timestamp_utc(
    payload: &BTreeMap<String, String>,
    key: &str,
    ctx: RowContext,
) -> Result<DateTime<Utc>> {
    let raw = required_text(payload, key, ctx)?;
    parse_timestamp_utc(&raw).ok_or_else(|| ctx.violation(key, &raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ctx() -> RowContext<'static> {
        RowContext {
            section: "Trades",
            source_row_ref: "Trades:Trade:idx=1",
        }
    }

    fn payload_of(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_sentinels_normalize_to_none() {
        for sentinel in ["", "-", "--", "N/A", "  "] {
            assert!(normalize_value(sentinel).is_none(), "{:?}", sentinel);
        }
        assert_eq!(normalize_value(" 42 "), Some("42"));
    }

    #[test]
    fn test_thousands_separated_decimal() {
        assert_eq!(parse_decimal("1,234.56").unwrap(), dec!(1234.56));
        assert_eq!(
            parse_decimal("1,234.56").unwrap(),
            Decimal::from_str("1234.56000000").unwrap()
        );
        assert_eq!(parse_decimal("-0.5").unwrap(), dec!(-0.5));
        assert!(parse_decimal("12x").is_none());
    }

    #[test]
    fn test_sentinel_in_optional_field_is_null() {
        let payload = payload_of(&[("fees", "N/A")]);
        assert_eq!(optional_decimal(&payload, "fees", ctx()).unwrap(), None);
    }

    #[test]
    fn test_sentinel_in_required_field_is_violation() {
        let payload = payload_of(&[("quantity", "N/A")]);
        let err = required_decimal(&payload, "quantity", ctx()).unwrap_err();
        match err {
            MappingError::ContractViolation { section, field, .. } => {
                assert_eq!(section, "Trades");
                assert_eq!(field, "quantity");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_optional_decimal_is_violation() {
        let payload = payload_of(&[("fees", "abc")]);
        assert!(optional_decimal(&payload, "fees", ctx()).is_err());
    }

    #[test]
    fn test_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        for raw in ["2026-02-10", "2026/02/10", "20260210", "02/10/2026", "02/10/26", "10-Feb-26"] {
            assert_eq!(parse_date(raw), Some(expected), "{}", raw);
        }
        assert!(parse_date("Feb 10 2026").is_none());
    }

    #[test]
    fn test_timestamp_requires_explicit_zone() {
        let parsed = parse_timestamp_utc("2026-02-10T14:30:00Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-02-10T14:30:00+00:00");

        let offset = parse_timestamp_utc("2026-02-10 17:30:00 +0300").unwrap();
        assert_eq!(offset, parsed);
        assert_eq!(offset.to_rfc3339(), "2026-02-10T14:30:00+00:00");

        assert!(parse_timestamp_utc("2026-02-10 14:30:00").is_none());
        assert!(parse_timestamp_utc("2026-02-10").is_none());
    }
}

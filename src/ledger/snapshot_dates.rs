use chrono::{DateTime, NaiveDate, Utc};

use super::ledger_errors::{LedgerError, Result};
use crate::settings::settings_model::LOCAL_REPORT_TZ;

/// Resolves the local business date for a UTC instant.
///
/// The conversion holds across DST transitions in the local report zone.
pub fn resolve_report_date_local(instant_utc: DateTime<Utc>) -> NaiveDate {
    instant_utc.with_timezone(&LOCAL_REPORT_TZ).date_naive()
}

/// Parses an offset-aware timestamp string for report-date resolution.
///
/// Offset-naive inputs are rejected.
pub fn parse_report_instant(timestamp: &str) -> Result<DateTime<Utc>> {
    let trimmed = timestamp.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::InvalidData(
            "timestamp must not be blank".to_string(),
        ));
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| {
            LedgerError::InvalidData(format!(
                "timestamp must be an offset-aware RFC3339 instant: {}",
                trimmed
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dst_boundary_rolls_to_next_local_date() {
        // Asia/Jerusalem is UTC+3 after the spring DST start.
        let instant = parse_report_instant("2026-03-27T22:30:00Z").unwrap();
        assert_eq!(
            resolve_report_date_local(instant).to_string(),
            "2026-03-28"
        );
    }

    #[test]
    fn test_standard_time_stays_on_same_date() {
        // UTC+2 in winter: 20:00Z is 22:00 local, still the same date.
        let instant = parse_report_instant("2026-01-15T20:00:00Z").unwrap();
        assert_eq!(
            resolve_report_date_local(instant).to_string(),
            "2026-01-15"
        );
    }

    #[test]
    fn test_late_utc_evening_in_winter_rolls_over() {
        let instant = parse_report_instant("2026-01-15T22:30:00Z").unwrap();
        assert_eq!(
            resolve_report_date_local(instant).to_string(),
            "2026-01-16"
        );
    }

    #[test]
    fn test_naive_timestamps_are_rejected() {
        assert!(parse_report_instant("2026-03-27T22:30:00").is_err());
        assert!(parse_report_instant("").is_err());
    }
}

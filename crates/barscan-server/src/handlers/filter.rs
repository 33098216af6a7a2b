//! Query-string parsing into storage filters and pages.
//!
//! Every input arrives as an optional string; an empty string is treated the
//! same as an absent parameter.

use barscan_storage::{Page, ScanFilter};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

/// Default page offset.
pub const DEFAULT_SKIP: u64 = 0;

/// Default page size.
pub const DEFAULT_LIMIT: u64 = 100;

const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Errors produced while turning query parameters into a filter or page.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// A date parameter is not a supported ISO-8601 form.
    #[error("invalid date format: {0}")]
    InvalidDate(String),

    /// `skip` or `limit` is not a non-negative integer.
    #[error("{field} must be a non-negative integer, got: {value}")]
    InvalidPagination { field: &'static str, value: String },
}

/// Raw query parameters shared by list and export.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanQuery {
    pub barcode: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub skip: Option<String>,
    pub limit: Option<String>,
}

impl ScanQuery {
    /// Builds the conjunctive filter described by the query.
    pub fn to_filter(&self) -> Result<ScanFilter, FilterError> {
        build_scan_filter(
            present(&self.barcode),
            present(&self.start_date),
            present(&self.end_date),
        )
    }

    /// Builds the requested page, applying defaults for absent values.
    pub fn to_page(&self) -> Result<Page, FilterError> {
        let offset = parse_count("skip", present(&self.skip), DEFAULT_SKIP)?;
        let limit = parse_count("limit", present(&self.limit), DEFAULT_LIMIT)?;
        Ok(Page::new(offset, limit))
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn parse_count(field: &'static str, raw: Option<&str>, default: u64) -> Result<u64, FilterError> {
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| FilterError::InvalidPagination {
                field,
                value: raw.to_string(),
            }),
    }
}

/// Builds a [`ScanFilter`] from already-extracted parameters.
///
/// `end_date` is widened to the last microsecond of its calendar day.
pub fn build_scan_filter(
    barcode: Option<&str>,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<ScanFilter, FilterError> {
    let scanned_from = start_date
        .map(parse_iso_datetime)
        .transpose()?
        .map(|dt| dt.with_timezone(&Utc));

    let scanned_until = end_date
        .map(parse_iso_datetime)
        .transpose()?
        .map(end_of_day)
        .transpose()?;

    Ok(ScanFilter {
        barcode_contains: barcode.map(str::to_string),
        scanned_from,
        scanned_until,
    })
}

/// Parses an ISO-8601 date or datetime.
///
/// Accepts `YYYY-MM-DD` and `YYYY-MM-DD[T ]HH:MM[:SS[.ffffff]]`, optionally
/// followed by `Z` or `±HH:MM`. Values without an offset are taken as UTC.
pub fn parse_iso_datetime(raw: &str) -> Result<DateTime<FixedOffset>, FilterError> {
    let input = raw.trim();
    let utc = FixedOffset::east_opt(0).ok_or_else(|| invalid_date(raw))?;

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(|| invalid_date(raw))?;
        return Ok(utc.from_utc_datetime(&midnight));
    }

    let (local, offset) = split_offset(input).ok_or_else(|| invalid_date(raw))?;
    let local = local.replacen(' ', "T", 1);

    let naive = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&local, format).ok())
        .ok_or_else(|| invalid_date(raw))?;

    offset
        .unwrap_or(utc)
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| invalid_date(raw))
}

/// Splits a trailing `Z` or `±HH:MM` from the local part.
///
/// Returns `None` when a suffix is present but malformed.
fn split_offset(input: &str) -> Option<(&str, Option<FixedOffset>)> {
    if let Some(local) = input.strip_suffix('Z').or_else(|| input.strip_suffix('z')) {
        return Some((local, FixedOffset::east_opt(0)));
    }

    // The time part always contains ':' so a bare date with '-' separators
    // never reaches here looking like an offset.
    if input.len() > 6 && input.is_char_boundary(input.len() - 6) {
        let (local, suffix) = input.split_at(input.len() - 6);
        let bytes = suffix.as_bytes();
        if matches!(bytes[0], b'+' | b'-') && bytes[3] == b':' {
            let hours: i32 = suffix[1..3].parse().ok()?;
            let minutes: i32 = suffix[4..6].parse().ok()?;
            if hours > 23 || minutes > 59 {
                return None;
            }
            let seconds = (hours * 3600 + minutes * 60) * if bytes[0] == b'-' { -1 } else { 1 };
            return Some((local, Some(FixedOffset::east_opt(seconds)?)));
        }
    }

    Some((input, None))
}

/// Last microsecond of the calendar day of `dt`, in `dt`'s offset, as UTC.
fn end_of_day(dt: DateTime<FixedOffset>) -> Result<DateTime<Utc>, FilterError> {
    let naive = dt
        .date_naive()
        .and_hms_micro_opt(23, 59, 59, 999_999)
        .ok_or_else(|| invalid_date(&dt.to_rfc3339()))?;
    dt.offset()
        .from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| invalid_date(&dt.to_rfc3339()))
}

fn invalid_date(raw: &str) -> FilterError {
    FilterError::InvalidDate(format!("'{raw}' is not an ISO-8601 date or datetime"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_parse_date_only_is_utc_midnight() {
        let dt = parse_iso_datetime("2024-03-15").unwrap();
        assert_eq!(dt.with_timezone(&Utc), utc(2024, 3, 15, 0, 0, 0));
    }

    #[test]
    fn test_parse_datetime_variants() {
        let expected = utc(2024, 3, 15, 10, 30, 0);
        for raw in [
            "2024-03-15T10:30",
            "2024-03-15T10:30:00",
            "2024-03-15 10:30:00",
            "2024-03-15T10:30:00Z",
            "2024-03-15T10:30:00.000000",
            "2024-03-15T12:30:00+02:00",
            "2024-03-15T05:30:00-05:00",
        ] {
            let dt = parse_iso_datetime(raw).unwrap_or_else(|e| panic!("{raw}: {e}"));
            assert_eq!(dt.with_timezone(&Utc), expected, "{raw}");
        }
    }

    #[test]
    fn test_parse_keeps_microseconds() {
        let dt = parse_iso_datetime("2024-03-15T10:30:00.123456Z").unwrap();
        assert_eq!(dt.timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for raw in [
            "",
            "yesterday",
            "2024-13-01",
            "2024-02-30",
            "15/03/2024",
            "2024-03-15T25:00",
            "2024-03-15T10:30:00+25:00",
            "2024-03-15T10:30:00+0200",
        ] {
            let err = parse_iso_datetime(raw).unwrap_err();
            assert!(
                err.to_string().starts_with("invalid date format: "),
                "{raw}: {err}"
            );
        }
    }

    #[test]
    fn test_end_date_extends_to_end_of_day() {
        let filter = build_scan_filter(None, None, Some("2024-03-15")).unwrap();
        let until = filter.scanned_until.unwrap();
        assert_eq!(
            until,
            utc(2024, 3, 15, 23, 59, 59) + chrono::Duration::microseconds(999_999)
        );
    }

    #[test]
    fn test_end_date_uses_supplied_offset_day() {
        // 01:00 UTC on the 16th is still the 15th in UTC-05:00.
        let filter = build_scan_filter(None, None, Some("2024-03-15T20:00:00-05:00")).unwrap();
        let until = filter.scanned_until.unwrap();
        assert_eq!(
            until,
            utc(2024, 3, 16, 4, 59, 59) + chrono::Duration::microseconds(999_999)
        );
    }

    #[test]
    fn test_start_date_is_exact_lower_bound() {
        let filter = build_scan_filter(None, Some("2024-03-15T08:00:00"), None).unwrap();
        assert_eq!(filter.scanned_from, Some(utc(2024, 3, 15, 8, 0, 0)));
        assert!(filter.scanned_until.is_none());
    }

    #[test]
    fn test_query_treats_empty_strings_as_absent() {
        let query = ScanQuery {
            barcode: Some(String::new()),
            start_date: Some(String::new()),
            end_date: Some(String::new()),
            skip: Some(String::new()),
            limit: Some(String::new()),
        };
        assert_eq!(query.to_filter().unwrap(), ScanFilter::default());
        assert_eq!(query.to_page().unwrap(), Page::new(DEFAULT_SKIP, DEFAULT_LIMIT));
    }

    #[test]
    fn test_query_barcode_is_passed_through() {
        let query = ScanQuery {
            barcode: Some("ABC".to_string()),
            ..Default::default()
        };
        assert_eq!(
            query.to_filter().unwrap().barcode_contains.as_deref(),
            Some("ABC")
        );
    }

    #[test]
    fn test_query_rejects_bad_dates() {
        let query = ScanQuery {
            start_date: Some("not-a-date".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            query.to_filter(),
            Err(FilterError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_page_parsing() {
        let query = ScanQuery {
            skip: Some("20".to_string()),
            limit: Some("5".to_string()),
            ..Default::default()
        };
        assert_eq!(query.to_page().unwrap(), Page::new(20, 5));

        for (skip, limit, field) in [
            ("-1", "5", "skip"),
            ("0", "ten", "limit"),
            ("1.5", "5", "skip"),
        ] {
            let query = ScanQuery {
                skip: Some(skip.to_string()),
                limit: Some(limit.to_string()),
                ..Default::default()
            };
            match query.to_page() {
                Err(FilterError::InvalidPagination { field: f, .. }) => assert_eq!(f, field),
                other => panic!("expected pagination error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_large_limit_is_not_capped() {
        let query = ScanQuery {
            limit: Some("1000000".to_string()),
            ..Default::default()
        };
        assert_eq!(query.to_page().unwrap().limit, 1_000_000);
    }
}

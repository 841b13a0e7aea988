//! Timestamp normalization.
//!
//! Every value that reaches the store must be timezone-aware. The backing
//! store drops bare offsets on round-trip, so a naive value is interpreted
//! in the supplied zone hint (a trip's configured zone), falling back to
//! UTC, and is never stored as-is.

use chrono::{DateTime, FixedOffset, LocalResult, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use crate::errors::{IngestError, Result};

/// A timestamp as it arrives from callers: already aware, naive, or raw text.
#[derive(Debug, Clone)]
pub enum TimeValue<'a> {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
    Text(&'a str),
}

impl From<DateTime<FixedOffset>> for TimeValue<'_> {
    fn from(value: DateTime<FixedOffset>) -> Self {
        TimeValue::Aware(value)
    }
}

impl From<NaiveDateTime> for TimeValue<'_> {
    fn from(value: NaiveDateTime) -> Self {
        TimeValue::Naive(value)
    }
}

impl<'a> From<&'a str> for TimeValue<'a> {
    fn from(value: &'a str) -> Self {
        TimeValue::Text(value)
    }
}

/// Normalize `value` to an aware instant.
///
/// Aware input is returned unchanged; an explicit offset in the input is
/// never overridden by `zone_hint`. Naive input gets `zone_hint` attached,
/// or UTC when no hint is given.
pub fn to_instant<'a, V>(value: V, zone_hint: Option<&str>) -> Result<DateTime<FixedOffset>>
where
    V: Into<TimeValue<'a>>,
{
    match value.into() {
        TimeValue::Aware(dt) => Ok(dt),
        TimeValue::Naive(naive) => attach_zone(naive, zone_hint),
        TimeValue::Text(text) => {
            let trimmed = text.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
                return Ok(dt);
            }
            for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
                    return attach_zone(naive, zone_hint);
                }
            }
            Err(IngestError::UnparsableTimestamp(text.to_string()))
        }
    }
}

/// Re-tag an aware instant with a named zone, keeping its wall-clock fields.
/// Used by the re-zone operation: the absolute instant changes, the local
/// reading does not.
pub fn with_zone(dt: DateTime<FixedOffset>, zone: &str) -> Result<DateTime<FixedOffset>> {
    attach_zone(dt.naive_local(), Some(zone))
}

/// Look up a named zone, failing with `UnknownZone` on anything the tz
/// database does not know.
pub fn lookup_zone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| IngestError::UnknownZone(name.to_string()))
}

/// All zone names the embedded tz database recognizes.
pub fn known_zones() -> impl Iterator<Item = &'static str> {
    chrono_tz::TZ_VARIANTS.iter().map(|tz| tz.name())
}

fn attach_zone(naive: NaiveDateTime, zone_hint: Option<&str>) -> Result<DateTime<FixedOffset>> {
    match zone_hint {
        None => Ok(naive.and_utc().fixed_offset()),
        Some(name) => {
            let tz = lookup_zone(name)?;
            match tz.from_local_datetime(&naive) {
                LocalResult::Single(dt) => Ok(dt.fixed_offset()),
                // DST-ambiguous local times resolve to the earlier reading.
                LocalResult::Ambiguous(earlier, _) => Ok(earlier.fixed_offset()),
                LocalResult::None => Err(IngestError::UnparsableTimestamp(naive.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn aware_value_is_returned_unchanged() {
        let dt = DateTime::parse_from_rfc3339("2022-05-07T10:38:57+02:00").unwrap();
        assert_eq!(to_instant(dt, None).unwrap(), dt);
        assert_eq!(to_instant(dt, Some("America/Denver")).unwrap(), dt);
    }

    #[test]
    fn naive_without_hint_is_tagged_utc() {
        let dt = to_instant(naive(2022, 5, 7, 10, 38, 57), None).unwrap();
        assert_eq!(dt.to_rfc3339(), "2022-05-07T10:38:57+00:00");
    }

    #[test]
    fn naive_with_hint_is_tagged_in_that_zone() {
        let dt = to_instant(naive(2022, 5, 7, 10, 38, 57), Some("America/Denver")).unwrap();
        // Denver observes DST in May: UTC-6.
        assert_eq!(dt.offset().local_minus_utc(), -6 * 3600);
        assert_eq!(dt.naive_local(), naive(2022, 5, 7, 10, 38, 57));
    }

    #[test]
    fn text_with_explicit_offset_ignores_hint() {
        let dt = to_instant("2022-05-07T10:38:57+02:00", Some("America/Denver")).unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 2 * 3600);
    }

    #[test]
    fn text_without_offset_uses_hint() {
        let dt = to_instant("2022-05-07T10:38:57", Some("Europe/Zurich")).unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 2 * 3600);
        assert_eq!(dt.naive_local(), naive(2022, 5, 7, 10, 38, 57));
    }

    #[test]
    fn space_separated_text_is_accepted() {
        let dt = to_instant("2022-05-07 10:38:57", None).unwrap();
        assert_eq!(dt.to_rfc3339(), "2022-05-07T10:38:57+00:00");
    }

    #[test]
    fn garbage_text_is_unparsable() {
        let err = to_instant("last tuesday", None).unwrap_err();
        assert!(matches!(err, IngestError::UnparsableTimestamp(_)));
    }

    #[test]
    fn unknown_zone_is_rejected() {
        let err = to_instant(naive(2022, 5, 7, 10, 38, 57), Some("Mars/Olympus")).unwrap_err();
        assert!(matches!(err, IngestError::UnknownZone(_)));
    }

    #[test]
    fn with_zone_keeps_wall_clock_fields() {
        let dt = DateTime::parse_from_rfc3339("2022-05-07T10:38:57+00:00").unwrap();
        let rezoned = with_zone(dt, "America/Denver").unwrap();
        assert_eq!(rezoned.naive_local(), dt.naive_local());
        assert_eq!(rezoned.offset().local_minus_utc(), -6 * 3600);
    }

    #[test]
    fn known_zones_contains_utc() {
        assert!(known_zones().any(|z| z == "UTC"));
    }
}

//! Schedule clock: time parsing and the pure predicates over `(target, now)`.
//!
//! Every instant handled here is a `DateTime<Utc>`. Zoned input is folded
//! into UTC at parse time, and "now" is always supplied by the caller, so
//! the process-local timezone never participates in a comparison.

use std::ops::Range;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, TimeDelta, TimeZone, Timelike, Utc, Weekday};

use crate::error::ScheduleError;

/// Layout of the date/time portion of a schedule time (zone parsed separately).
const SCHEDULE_TIME_LAYOUT: &str = "%d %b %y %H:%M";

/// How long before the upgrade the announcement may go out.
pub const ANNOUNCEMENT_WINDOW: TimeDelta = TimeDelta::minutes(15);

/// Working hours, UTC, Monday through Friday.
pub const WORKING_HOURS_UTC: Range<u32> = 7..16;

/// Parse a schedule time such as `30 Jan 21 15:04 UTC`.
///
/// Two-digit years below 70 land in the 2000s, the rest in the 1900s.
pub fn parse_schedule_time(raw: &str) -> Result<DateTime<Utc>, ScheduleError> {
    let invalid = |reason: String| ScheduleError::InvalidScheduleTime {
        value: raw.to_string(),
        reason,
    };

    let trimmed = raw.trim();
    let Some((local, zone)) = trimmed.rsplit_once(' ') else {
        return Err(invalid("expected 'DD Mon YY HH:MM TZ', e.g. 30 Jan 21 15:04 UTC".to_string()));
    };

    let naive = NaiveDateTime::parse_from_str(local.trim_end(), SCHEDULE_TIME_LAYOUT)
        .map_err(|e| invalid(format!("expected 'DD Mon YY HH:MM TZ': {e}")))?;

    let offset = zone_offset(zone).ok_or_else(|| invalid(format!("unsupported time zone '{zone}'")))?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| invalid("time does not exist in the given zone".to_string()))
}

/// Resolve an RFC 822 zone designator to a fixed offset.
fn zone_offset(zone: &str) -> Option<FixedOffset> {
    let hours = match zone.to_ascii_uppercase().as_str() {
        "UTC" | "GMT" | "UT" | "Z" => 0,
        "EDT" => -4,
        "EST" | "CDT" => -5,
        "CST" | "MDT" => -6,
        "MST" | "PDT" => -7,
        "PST" => -8,
        _ => return numeric_offset(zone),
    };
    FixedOffset::east_opt(hours * 3600)
}

/// Parse a `+HHMM` / `-HHMM` offset.
fn numeric_offset(zone: &str) -> Option<FixedOffset> {
    let (sign, digits) = match zone.as_bytes().first()? {
        b'+' => (1, &zone[1..]),
        b'-' => (-1, &zone[1..]),
        _ => return None,
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// `now >= target`.
pub fn upgrade_time_reached(target: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= target
}

/// `now >= target - 15 minutes`.
pub fn announcement_window_open(target: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= target - ANNOUNCEMENT_WINDOW
}

/// Weekend, or outside `[07:00, 16:00)` UTC.
///
/// Advisory only: it changes the announcement text, never the decision.
pub fn is_out_of_working_hours(t: DateTime<Utc>) -> bool {
    matches!(t.weekday(), Weekday::Sat | Weekday::Sun) || !WORKING_HOURS_UTC.contains(&t.hour())
}

/// Time left until `target`; negative once it has passed.
pub fn remaining(target: DateTime<Utc>, now: DateTime<Utc>) -> TimeDelta {
    target - now
}

/// Render a duration rounded to the minute, e.g. `1h5m`, `10m`, `0m`.
pub fn format_remaining(delta: TimeDelta) -> String {
    let secs = delta.num_seconds().max(0);
    let minutes = (secs + 30) / 60;
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m")
    } else {
        format!("{minutes}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_parse_utc() {
        let t = parse_schedule_time("30 Jan 21 15:04 UTC").unwrap();
        assert_eq!(t, utc(2021, 1, 30, 15, 4));
        assert_eq!(t.timestamp(), 1_612_019_040);
    }

    #[test]
    fn test_parse_far_future() {
        let t = parse_schedule_time("31 Dec 50 20:00 UTC").unwrap();
        assert_eq!(t, utc(2050, 12, 31, 20, 0));
    }

    #[test]
    fn test_parse_two_digit_year_pivot() {
        let t = parse_schedule_time("01 Jan 70 00:00 GMT").unwrap();
        assert_eq!(t, utc(1970, 1, 1, 0, 0));
    }

    #[rstest]
    #[case("10 Sep 21 12:00 EST", utc(2021, 9, 10, 17, 0))]
    #[case("10 Sep 21 12:00 PDT", utc(2021, 9, 10, 19, 0))]
    #[case("10 Sep 21 12:00 +0200", utc(2021, 9, 10, 10, 0))]
    #[case("10 Sep 21 12:00 -0130", utc(2021, 9, 10, 13, 30))]
    #[case("10 Sep 21 12:00 Z", utc(2021, 9, 10, 12, 0))]
    fn test_parse_zones_normalize_to_utc(#[case] raw: &str, #[case] expected: DateTime<Utc>) {
        assert_eq!(parse_schedule_time(raw).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("tomorrow")]
    #[case("2021-01-30T15:04:00Z")]
    #[case("30 Jan 21 15:04")]
    #[case("30 Jan 21 15:04 CEST")]
    #[case("30 Foo 21 15:04 UTC")]
    #[case("31 Feb 21 15:04 UTC")]
    #[case("30 Jan 21 15:04 +02")]
    fn test_parse_invalid(#[case] raw: &str) {
        let err = parse_schedule_time(raw).unwrap_err();
        assert!(err.is_time_error(), "{raw}: {err}");
    }

    #[test]
    fn test_upgrade_time_reached() {
        let now = utc(2026, 10, 16, 12, 0);
        assert!(!upgrade_time_reached(utc(2030, 1, 1, 0, 0), now));
        assert!(upgrade_time_reached(utc(2020, 1, 1, 0, 0), now));
        // The boundary itself counts as reached.
        assert!(upgrade_time_reached(now, now));
    }

    #[test]
    fn test_announcement_window() {
        let target = utc(2026, 10, 16, 12, 0);
        assert!(!announcement_window_open(target, utc(2026, 10, 16, 11, 44)));
        assert!(announcement_window_open(target, utc(2026, 10, 16, 11, 45)));
        assert!(announcement_window_open(target, utc(2026, 10, 16, 11, 50)));
        assert!(announcement_window_open(target, utc(2026, 10, 16, 13, 0)));
    }

    #[rstest]
    // Friday midday
    #[case(utc(2021, 9, 10, 12, 0), false)]
    // Saturday
    #[case(utc(2021, 9, 11, 12, 0), true)]
    // Monday evening
    #[case(utc(2021, 9, 13, 19, 0), true)]
    // Monday, first and last working hour
    #[case(utc(2021, 9, 13, 7, 0), false)]
    #[case(utc(2021, 9, 13, 15, 59), false)]
    #[case(utc(2021, 9, 13, 16, 0), true)]
    #[case(utc(2021, 9, 13, 6, 59), true)]
    fn test_out_of_working_hours(#[case] t: DateTime<Utc>, #[case] expected: bool) {
        assert_eq!(is_out_of_working_hours(t), expected);
    }

    #[rstest]
    #[case(TimeDelta::minutes(10), "10m")]
    #[case(TimeDelta::seconds(9 * 60 + 31), "10m")]
    #[case(TimeDelta::seconds(9 * 60 + 29), "9m")]
    #[case(TimeDelta::minutes(65), "1h5m")]
    #[case(TimeDelta::seconds(20), "0m")]
    #[case(TimeDelta::minutes(-3), "0m")]
    fn test_format_remaining(#[case] delta: TimeDelta, #[case] expected: &str) {
        assert_eq!(format_remaining(delta), expected);
    }
}

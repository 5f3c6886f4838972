//! Clock and timezone utilities.
//!
//! All persisted instants are UTC; guild-facing dates are calendar dates in
//! the guild's configured IANA timezone. Day-boundary math lives here so the
//! tracker and scheduler agree on what "midnight" means.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// Source of "now", injectable so tracker behavior is testable at fixed
/// instants.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used outside tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Returns the current time in the given timezone.
pub fn now_in_timezone(tz: &Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(tz)
}

/// Returns today's date in the given timezone.
pub fn today_local(tz: &Tz) -> NaiveDate {
    now_in_timezone(tz).date_naive()
}

/// Returns the calendar date of `instant` in the given timezone.
pub fn local_date_at(tz: &Tz, instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

/// Parses an IANA timezone name, falling back to `default` when the stored
/// value is missing or invalid. Tracking must keep running on bad config.
pub fn parse_timezone(name: &str, default: Tz) -> Tz {
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!(timezone = %name, fallback = %default, "invalid timezone, using fallback");
            default
        }
    }
}

/// Returns the absolute instant of local midnight on the day *after* `date`
/// in the given timezone.
///
/// This is the boundary a session attributed to `date` must be closed at.
/// When a DST transition makes that local midnight ambiguous the earlier
/// instant is used; when it does not exist the first valid instant after it
/// is used.
pub fn midnight_split_time(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let next_day = date.succ_opt().unwrap_or(date);
    let local_midnight = next_day
        .and_hms_opt(0, 0, 0)
        .unwrap_or_else(|| next_day.into());

    match tz.from_local_datetime(&local_midnight) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            // Midnight was skipped by a DST jump; probe forward.
            let mut probe = local_midnight;
            for _ in 0..8 {
                probe += Duration::minutes(15);
                if let LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) =
                    tz.from_local_datetime(&probe)
                {
                    return dt.with_timezone(&Utc);
                }
            }
            Utc.from_utc_datetime(&local_midnight)
        }
    }
}

/// Floor-truncated whole minutes between `join` and `leave`, clamped at
/// zero so clock skew can never produce a negative duration.
pub fn session_duration_minutes(join: DateTime<Utc>, leave: DateTime<Utc>) -> i64 {
    (leave - join).num_minutes().max(0)
}

/// Parses a "HH:MM" local clock-reset time.
pub fn parse_reset_time(reset_time: &str) -> Option<(u32, u32)> {
    let (h, m) = reset_time.split_once(':')?;
    let hours: u32 = h.parse().ok()?;
    let minutes: u32 = m.parse().ok()?;
    if hours < 24 && minutes < 60 {
        Some((hours, minutes))
    } else {
        None
    }
}

/// Returns the next instant the given "HH:MM" local reset time occurs in
/// `tz`, strictly after `now`.
pub fn next_reset_time(reset_time: &str, tz: &Tz, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (hours, minutes) = parse_reset_time(reset_time)?;
    let local_now = now.with_timezone(tz);
    let mut date = local_now.date_naive();

    for _ in 0..3 {
        if let Some(naive) = date.and_hms_opt(hours, minutes, 0) {
            if let LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) =
                tz.from_local_datetime(&naive)
            {
                let candidate = dt.with_timezone(&Utc);
                if candidate > now {
                    return Some(candidate);
                }
            }
        }
        date = date.succ_opt()?;
    }
    None
}

/// Compact duration like "3h 5m" or "45m".
pub fn format_duration(minutes: i64) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    if hours == 0 {
        format!("{}m", mins)
    } else {
        format!("{}h {}m", hours, mins)
    }
}

/// Spelled-out duration like "3 hours 5 minutes".
pub fn format_duration_long(minutes: i64) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    let plural = |n: i64| if n == 1 { "" } else { "s" };

    if hours == 0 {
        format!("{} minute{}", mins, plural(mins))
    } else if mins == 0 {
        format!("{} hour{}", hours, plural(hours))
    } else {
        format!(
            "{} hour{} {} minute{}",
            hours,
            plural(hours),
            mins,
            plural(mins)
        )
    }
}

/// Minutes as fractional hours, rounded to two decimals.
pub fn minutes_to_hours(minutes: i64) -> f64 {
    (minutes as f64 / 60.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn today_local_returns_current_utc_date_for_utc() {
        let tz = chrono_tz::UTC;
        assert_eq!(today_local(&tz), Utc::now().date_naive());
    }

    #[test]
    fn local_date_at_respects_timezone() {
        let tz: Tz = "Asia/Tokyo".parse().unwrap();
        // 23:00 UTC is already the next day in Tokyo (UTC+9).
        let instant = utc("2024-06-01T23:00:00Z");
        assert_eq!(
            local_date_at(&tz, instant),
            NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()
        );
        assert_eq!(
            local_date_at(&chrono_tz::UTC, instant),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
        );
    }

    #[test]
    fn parse_timezone_falls_back_on_garbage() {
        assert_eq!(parse_timezone("Not/AZone", chrono_tz::UTC), chrono_tz::UTC);
        let kolkata: Tz = "Asia/Kolkata".parse().unwrap();
        assert_eq!(parse_timezone("Asia/Kolkata", chrono_tz::UTC), kolkata);
    }

    #[test]
    fn midnight_split_time_utc() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let boundary = midnight_split_time(date, &chrono_tz::UTC);
        assert_eq!(boundary, utc("2024-03-11T00:00:00Z"));
    }

    #[test]
    fn midnight_split_time_offset_zone() {
        let tz: Tz = "Asia/Kolkata".parse().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        // Midnight IST on Mar 11 is 18:30 UTC on Mar 10.
        let boundary = midnight_split_time(date, &tz);
        assert_eq!(boundary, utc("2024-03-10T18:30:00Z"));
    }

    #[test]
    fn midnight_split_time_survives_dst_skip() {
        // America/Santiago historically jumps from 00:00 to 01:00, so local
        // midnight does not exist on the transition date.
        let tz: Tz = "America/Santiago".parse().unwrap();
        let date = NaiveDate::from_ymd_opt(2022, 9, 10).unwrap();
        let boundary = midnight_split_time(date, &tz);
        let back_local = boundary.with_timezone(&tz);
        assert_eq!(
            back_local.date_naive(),
            NaiveDate::from_ymd_opt(2022, 9, 11).unwrap()
        );
    }

    #[test]
    fn session_duration_floors_whole_minutes() {
        let join = utc("2024-06-01T10:00:00Z");
        let leave = utc("2024-06-01T10:59:59Z");
        assert_eq!(session_duration_minutes(join, leave), 59);
    }

    #[test]
    fn session_duration_clamps_negative_to_zero() {
        let join = utc("2024-06-01T10:00:00Z");
        let leave = utc("2024-06-01T09:00:00Z");
        assert_eq!(session_duration_minutes(join, leave), 0);
    }

    #[test]
    fn parse_reset_time_accepts_valid_rejects_invalid() {
        assert_eq!(parse_reset_time("00:00"), Some((0, 0)));
        assert_eq!(parse_reset_time("23:59"), Some((23, 59)));
        assert_eq!(parse_reset_time("24:00"), None);
        assert_eq!(parse_reset_time("12:60"), None);
        assert_eq!(parse_reset_time("noon"), None);
    }

    #[test]
    fn next_reset_time_is_strictly_in_the_future() {
        let now = utc("2024-06-01T10:00:00Z");
        let next = next_reset_time("10:00", &chrono_tz::UTC, now).unwrap();
        assert_eq!(next, utc("2024-06-02T10:00:00Z"));

        let next = next_reset_time("10:01", &chrono_tz::UTC, now).unwrap();
        assert_eq!(next, utc("2024-06-01T10:01:00Z"));
    }

    #[test]
    fn format_duration_variants() {
        assert_eq!(format_duration(45), "45m");
        assert_eq!(format_duration(185), "3h 5m");
        assert_eq!(format_duration_long(1), "1 minute");
        assert_eq!(format_duration_long(120), "2 hours");
        assert_eq!(format_duration_long(61), "1 hour 1 minute");
    }

    #[test]
    fn minutes_to_hours_rounds_two_decimals() {
        assert_eq!(minutes_to_hours(90), 1.5);
        assert_eq!(minutes_to_hours(100), 1.67);
    }
}

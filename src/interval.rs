//! Occupied-interval computation for a booking request.
//!
//! A booking occupies `[date + time, date + time + duration)`. Date and time
//! are combined into a UTC instant so every comparison is numeric and a
//! duration running past midnight needs no special handling.

use chrono::{NaiveDate, NaiveTime, Timelike};

use crate::engine::BookingError;
use crate::limits::MAX_DURATION_MINUTES;
use crate::model::{Ms, Span};

const MS_PER_MINUTE: Ms = 60_000;

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> Result<NaiveDate, BookingError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| BookingError::InvalidInterval(format!("invalid date: {s:?}")))
}

/// Parse a `H:MM` / `HH:MM` time-of-day (hours 0-23, minutes 00-59).
pub fn parse_time(s: &str) -> Result<NaiveTime, BookingError> {
    let invalid = || BookingError::InvalidInterval(format!("invalid time of day: {s:?}"));

    let (h, m) = s.split_once(':').ok_or_else(invalid)?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return Err(invalid());
    }
    if !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let hour: u32 = h.parse().map_err(|_| invalid())?;
    let minute: u32 = m.parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// Compute the span a booking at `date`/`time` occupies for a service of
/// `duration_minutes`.
pub fn occupied_span(
    date: NaiveDate,
    time: NaiveTime,
    duration_minutes: i64,
) -> Result<Span, BookingError> {
    if duration_minutes <= 0 {
        return Err(BookingError::InvalidInterval(format!(
            "duration must be positive, got {duration_minutes} minutes"
        )));
    }
    if duration_minutes > MAX_DURATION_MINUTES {
        return Err(BookingError::InvalidInterval(format!(
            "duration of {duration_minutes} minutes exceeds {MAX_DURATION_MINUTES}"
        )));
    }
    // Minute precision: seconds never take part in slot arithmetic.
    let time = time.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(time);
    let start = date.and_time(time).and_utc().timestamp_millis();
    let end = start + duration_minutes * MS_PER_MINUTE;
    Ok(Span::new(start, end))
}

/// Convenience: parse `time` and compute the occupied span in one step.
pub fn occupied_span_str(
    date: NaiveDate,
    time: &str,
    duration_minutes: i64,
) -> Result<(NaiveTime, Span), BookingError> {
    let time = parse_time(time)?;
    let span = occupied_span(date, time, duration_minutes)?;
    Ok((time, span))
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: Ms = MS_PER_MINUTE;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 16).unwrap()
    }

    #[test]
    fn span_from_date_time_duration() {
        let (_, span) = occupied_span_str(day(), "10:00", 30).unwrap();
        assert_eq!(span.duration_ms(), 30 * M);
        let midnight = day().and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp_millis();
        assert_eq!(span.start, midnight + 600 * M);
        assert_eq!(span.end, midnight + 630 * M);
    }

    #[test]
    fn single_digit_hour_accepted() {
        let t = parse_time("9:05").unwrap();
        assert_eq!(t, NaiveTime::from_hms_opt(9, 5, 0).unwrap());
    }

    #[test]
    fn malformed_times_rejected() {
        for bad in ["24:00", "10:60", "10:5", "1000", "ab:cd", "", ":30", "123:00", "10:00:00", " 10:00"] {
            let err = parse_time(bad).unwrap_err();
            assert!(matches!(err, BookingError::InvalidInterval(_)), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn non_positive_duration_rejected() {
        let t = parse_time("10:00").unwrap();
        assert!(matches!(occupied_span(day(), t, 0), Err(BookingError::InvalidInterval(_))));
        assert!(matches!(occupied_span(day(), t, -15), Err(BookingError::InvalidInterval(_))));
    }

    #[test]
    fn oversized_duration_rejected() {
        let t = parse_time("10:00").unwrap();
        let result = occupied_span(day(), t, MAX_DURATION_MINUTES + 1);
        assert!(matches!(result, Err(BookingError::InvalidInterval(_))));
    }

    #[test]
    fn midnight_crossing_is_continuous() {
        let (_, late) = occupied_span_str(day(), "23:30", 60).unwrap();
        let next_day = day().succ_opt().unwrap();
        let (_, early) = occupied_span_str(next_day, "00:15", 30).unwrap();
        assert_eq!(late.end - late.start, 60 * M);
        assert!(late.overlaps(&early));

        let (_, after) = occupied_span_str(next_day, "00:30", 30).unwrap();
        assert!(!late.overlaps(&after)); // touches at 00:30
    }

    #[test]
    fn seconds_are_truncated() {
        let t = NaiveTime::from_hms_opt(10, 0, 42).unwrap();
        let with_secs = occupied_span(day(), t, 30).unwrap();
        let (_, plain) = occupied_span_str(day(), "10:00", 30).unwrap();
        assert_eq!(with_secs, plain);
    }

    #[test]
    fn parse_date_formats() {
        assert_eq!(parse_date("2025-06-16").unwrap(), day());
        assert!(parse_date("16/06/2025").is_err());
        assert!(parse_date("2025-02-30").is_err());
    }
}

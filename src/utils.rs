use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{EdfError, Result};
use crate::EDF_TIME_DIMENSION;

/// Parses a decimal seconds string (as found in a time-track) into time
/// points of 100 nanoseconds. At most seven decimals are significant.
pub fn parse_edf_time(s: &str) -> Result<i64> {
    let s = s.trim();

    if s.is_empty() {
        return Err(EdfError::InvalidFormat("Empty time string".to_string()));
    }

    let (negative, s) = if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else {
        (false, s)
    };

    let (integer_part, decimal_part) = match s.find('.') {
        Some(dot) => (&s[..dot], &s[dot + 1..]),
        None => (s, ""),
    };

    if integer_part.is_empty() && decimal_part.is_empty() {
        return Err(EdfError::InvalidFormat(format!("Invalid time string [{}]", s)));
    }
    // 只接受 ASCII 数字, 之后按字节截取是安全的
    if !integer_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EdfError::InvalidFormat(format!("Invalid integer part [{}]", integer_part)));
    }
    if !decimal_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EdfError::InvalidFormat(format!("Invalid decimal part [{}]", decimal_part)));
    }

    let overflow = || EdfError::InvalidFormat(format!("Time out of range [{}]", s));
    let mut value = 0i64;

    if !integer_part.is_empty() {
        value = integer_part
            .parse::<i64>()
            .ok()
            .and_then(|seconds| seconds.checked_mul(EDF_TIME_DIMENSION as i64))
            .ok_or_else(overflow)?;
    }

    if !decimal_part.is_empty() {
        let decimal_str = decimal_part.get(..7).unwrap_or(decimal_part);
        let decimal_value = decimal_str
            .parse::<i64>()
            .map_err(|_| EdfError::InvalidFormat(format!("Invalid decimal part [{}]", decimal_part)))?;
        value = value
            .checked_add(decimal_value * 10i64.pow(7 - decimal_str.len() as u32))
            .ok_or_else(overflow)?;
    }

    Ok(if negative { -value } else { value })
}

/// Seconds to time points, rounded to the nearest 100 ns.
pub fn seconds_to_tp(seconds: f64) -> u64 {
    (seconds * EDF_TIME_DIMENSION as f64).round().max(0.0) as u64
}

pub fn tp_to_seconds(tp: u64) -> f64 {
    tp as f64 / EDF_TIME_DIMENSION as f64
}

/// Renders a record onset the way a time-track stores it: `+<seconds>`.
pub fn format_onset(seconds: f64) -> String {
    format!("+{}", seconds)
}

/// `hh:mm:ss` rendering of a duration, whole seconds only.
pub fn format_duration(tp: u64) -> String {
    let seconds = tp / EDF_TIME_DIMENSION;
    format!("{:02}:{:02}:{:02}", seconds / 3600, (seconds / 60) % 60, seconds % 60)
}

const START_DATE_FORMAT: &str = "%d.%m.%y";
const START_TIME_FORMAT: &str = "%H.%M.%S";

pub fn parse_start_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), START_TIME_FORMAT).ok()
}

pub fn parse_start_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), START_DATE_FORMAT).ok()
}

/// Advances a header start date/time pair by `tp` time points.
///
/// Sub-second parts are dropped since the header stores whole seconds. When
/// the date cannot be parsed only the clock time moves, wrapping at midnight.
/// Returns `None` if the start time itself is not a valid `hh.mm.ss` value.
pub fn advance_start(start_date: &str, start_time: &str, tp: u64) -> Option<(String, String)> {
    let time = parse_start_time(start_time)?;
    let delta = Duration::seconds((tp / EDF_TIME_DIMENSION) as i64);

    match parse_start_date(start_date) {
        Some(date) => {
            let advanced = NaiveDateTime::new(date, time) + delta;
            Some((
                advanced.format(START_DATE_FORMAT).to_string(),
                advanced.format(START_TIME_FORMAT).to_string(),
            ))
        }
        None => {
            let (advanced, _) = time.overflowing_add_signed(delta);
            Some((
                start_date.to_string(),
                advanced.format(START_TIME_FORMAT).to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_edf_time() {
        assert_eq!(parse_edf_time("1").unwrap(), 10_000_000);
        assert_eq!(parse_edf_time("1.5").unwrap(), 15_000_000);
        assert_eq!(parse_edf_time("-2.5").unwrap(), -25_000_000);
        assert_eq!(parse_edf_time("+0.0000001").unwrap(), 1);
        assert_eq!(parse_edf_time("+30.").unwrap(), 300_000_000);
        assert!(parse_edf_time("+").is_err());
        assert!(parse_edf_time("1.2x").is_err());
    }

    #[test]
    fn test_parse_edf_time_malformed() {
        // non-ASCII byte inside the first seven decimals
        assert!(matches!(parse_edf_time("+0.123456\u{fffd}"), Err(EdfError::InvalidFormat(_))));
        assert!(matches!(parse_edf_time("+1\u{e9}.5"), Err(EdfError::InvalidFormat(_))));
        // integer part that overflows once scaled to time points
        assert!(matches!(parse_edf_time("+99999999999999"), Err(EdfError::InvalidFormat(_))));
        assert!(matches!(parse_edf_time("99999999999999999999"), Err(EdfError::InvalidFormat(_))));
        // extra decimals are ignored
        assert_eq!(parse_edf_time("0.12345678901").unwrap(), 1_234_567);
    }

    #[test]
    fn test_onset_round_trip() {
        let onset = format_onset(2.5);
        assert_eq!(onset, "+2.5");
        assert_eq!(parse_edf_time(&onset).unwrap(), 25_000_000);
        assert_eq!(format_onset(0.0), "+0");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(seconds_to_tp(3725.9)), "01:02:05");
        assert_eq!(format_duration(seconds_to_tp(100.0 * 3600.0)), "100:00:00");
    }

    #[test]
    fn test_advance_start() {
        let (date, time) = advance_start("01.02.20", "23.59.30", seconds_to_tp(45.0)).unwrap();
        assert_eq!(date, "02.02.20");
        assert_eq!(time, "00.00.15");

        let (date, time) = advance_start("xx", "10.00.00", seconds_to_tp(90.0)).unwrap();
        assert_eq!(date, "xx");
        assert_eq!(time, "10.01.30");

        assert!(advance_start("01.02.20", "bad", 0).is_none());
    }
}

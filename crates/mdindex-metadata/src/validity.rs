//! Parsing of validity hints: `validUntil` instants and `cacheDuration`
//! ISO 8601 durations.
//!
//! Both parsers return `None` on malformed input; callers fall through to
//! their next rule.

use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use std::str::FromStr;

const MINUTE: f64 = 60.0;
const HOUR: f64 = 60.0 * MINUTE;
const DAY: f64 = 24.0 * HOUR;
const WEEK: f64 = 7.0 * DAY;

/// Parse an `xs:dateTime`-style instant. Values without an offset are UTC.
#[must_use]
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parse an ISO 8601 duration such as `PT6H` or `P1Y2M10DT2H30M`
#[must_use]
pub fn parse_duration(s: &str) -> Option<CalendarDuration> {
    s.parse().ok()
}

/// An ISO 8601 duration. Years and months are calendar units whose length
/// depends on the instant they are applied to; everything else is a fixed
/// number of seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CalendarDuration {
    pub negative: bool,
    /// Years and months, folded into months
    pub months: u32,
    /// Weeks, days, hours, minutes and seconds, folded into seconds
    pub seconds: f64,
}

impl CalendarDuration {
    /// The instant this duration after (or before, if negative) `start`
    #[must_use]
    pub fn after(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        #[allow(clippy::cast_possible_truncation)]
        let millis = TimeDelta::try_milliseconds((self.seconds * 1000.0).round() as i64)?;
        let months = Months::new(self.months);
        if self.negative {
            start.checked_sub_months(months)?.checked_sub_signed(millis)
        } else {
            start.checked_add_months(months)?.checked_add_signed(millis)
        }
    }

    fn add_months(&mut self, months: u32) -> Result<(), InvalidDuration> {
        self.months = self.months.checked_add(months).ok_or(InvalidDuration)?;
        Ok(())
    }
}

/// Error returned for a malformed duration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidDuration;

impl std::fmt::Display for InvalidDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("invalid ISO 8601 duration")
    }
}

impl std::error::Error for InvalidDuration {}

impl FromStr for CalendarDuration {
    type Err = InvalidDuration;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let rest = rest.strip_prefix('P').ok_or(InvalidDuration)?;
        let (date, time) = match rest.split_once('T') {
            Some((date, time)) if !time.is_empty() => (date, Some(time)),
            Some(_) => return Err(InvalidDuration),
            None => (rest, None),
        };

        let mut duration = Self {
            negative,
            ..Self::default()
        };
        let mut seen = false;

        for (value, designator) in ordered(components(date)?, "YMWD")? {
            match designator {
                'Y' => {
                    let months = whole(value)?.checked_mul(12).ok_or(InvalidDuration)?;
                    duration.add_months(months)?;
                }
                'M' => duration.add_months(whole(value)?)?,
                'W' => duration.seconds += number(value)? * WEEK,
                'D' => duration.seconds += number(value)? * DAY,
                _ => return Err(InvalidDuration),
            }
            seen = true;
        }
        for (value, designator) in ordered(components(time.unwrap_or(""))?, "HMS")? {
            match designator {
                'H' => duration.seconds += number(value)? * HOUR,
                'M' => duration.seconds += number(value)? * MINUTE,
                'S' => duration.seconds += number(value)?,
                _ => return Err(InvalidDuration),
            }
            seen = true;
        }

        if seen { Ok(duration) } else { Err(InvalidDuration) }
    }
}

/// Each designator at most once, in the order given by `order`
fn ordered<'a>(
    parts: Vec<(&'a str, char)>,
    order: &str,
) -> Result<Vec<(&'a str, char)>, InvalidDuration> {
    let mut last = None;
    for (_, designator) in &parts {
        let rank = order.find(*designator).ok_or(InvalidDuration)?;
        if last.is_some_and(|prev| rank <= prev) {
            return Err(InvalidDuration);
        }
        last = Some(rank);
    }
    Ok(parts)
}

/// Split `"1Y2M"` into `[("1", 'Y'), ("2", 'M')]`
fn components(s: &str) -> Result<Vec<(&str, char)>, InvalidDuration> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if c.is_ascii_alphabetic() {
            let value = &s[start..i];
            if value.is_empty() {
                return Err(InvalidDuration);
            }
            parts.push((value, c));
            start = i + c.len_utf8();
        }
    }
    if start == s.len() {
        Ok(parts)
    } else {
        Err(InvalidDuration)
    }
}

fn number(value: &str) -> Result<f64, InvalidDuration> {
    if !value.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return Err(InvalidDuration);
    }
    value.replace(',', ".").parse().map_err(|_| InvalidDuration)
}

fn whole(value: &str) -> Result<u32, InvalidDuration> {
    if !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(InvalidDuration);
    }
    value.parse().map_err(|_| InvalidDuration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_instant_formats() {
        let expected = Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(parse_instant("2030-01-02T03:04:05Z"), Some(expected));
        assert_eq!(parse_instant("2030-01-02T04:04:05+01:00"), Some(expected));
        assert_eq!(parse_instant("2030-01-02T04:04:05+0100"), Some(expected));
        assert_eq!(parse_instant("2030-01-02T03:04:05"), Some(expected));
        assert_eq!(parse_instant(" 2030-01-02T03:04:05.000Z "), Some(expected));
        assert_eq!(parse_instant("2030-01-02"), Some(utc(2030, 1, 2)));
        assert_eq!(parse_instant("next tuesday"), None);
        assert_eq!(parse_instant(""), None);
    }

    #[test]
    fn test_parse_fixed_durations() {
        let d = parse_duration("PT6H").unwrap();
        assert_eq!(d.months, 0);
        assert!((d.seconds - 21_600.0).abs() < f64::EPSILON);

        let d = parse_duration("P1DT30M15.5S").unwrap();
        assert!((d.seconds - (86_400.0 + 1_800.0 + 15.5)).abs() < 1e-9);

        let d = parse_duration("P2W").unwrap();
        assert!((d.seconds - 1_209_600.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_calendar_durations_follow_the_calendar() {
        let d = parse_duration("P1M").unwrap();
        assert_eq!(d.after(utc(2030, 1, 31)), Some(utc(2030, 2, 28)));
        assert_eq!(d.after(utc(2030, 3, 1)), Some(utc(2030, 4, 1)));

        let d = parse_duration("P1Y").unwrap();
        assert_eq!(d.after(utc(2028, 2, 29)), Some(utc(2029, 2, 28)));

        let d = parse_duration("P1Y2M3D").unwrap();
        assert_eq!(d.after(utc(2030, 1, 1)), Some(utc(2031, 3, 4)));
    }

    #[test]
    fn test_negative_duration() {
        let d = parse_duration("-P1D").unwrap();
        assert!(d.negative);
        assert_eq!(d.after(utc(2030, 1, 2)), Some(utc(2030, 1, 1)));
    }

    #[test]
    fn test_malformed_durations() {
        for bad in [
            "", "P", "PT", "1D", "P1", "PD", "P1X", "PT1D", "P1H", "Pinf", "P-1D", "P1.5Y",
            "P1M1M", "P1D1Y", "PT1S1H", "PT1H1H", "P4294967295M1M", "P357913941Y4294967295M",
            "P357913942Y",
        ] {
            assert_eq!(parse_duration(bad), None, "{bad} should not parse");
        }
    }
}

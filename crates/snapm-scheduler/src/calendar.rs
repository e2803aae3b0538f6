//! A native parser and evaluator for the subset of the systemd `OnCalendar`
//! grammar used by snapm schedules: an optional weekday list, a date
//! component (`Y-M-D`), and a time component (`H:M:S`), each field being
//! either `*`, a single value, a `start-end` range, or either with a `/step`.

use chrono::{DateTime, Datelike, Duration, Local, TimeZone, Timelike};

use snapm_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldRange {
    start: u32,
    end: u32,
    step: u32,
}

impl FieldRange {
    fn matches(&self, value: u32) -> bool {
        value >= self.start && value <= self.end && (value - self.start) % self.step == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Any,
    List(Vec<FieldRange>),
}

impl Field {
    fn matches(&self, value: u32) -> bool {
        match self {
            Field::Any => true,
            Field::List(ranges) => ranges.iter().any(|r| r.matches(value)),
        }
    }

    fn parse(raw: &str, min: u32, max: u32) -> Result<Self> {
        if raw == "*" {
            return Ok(Field::Any);
        }
        let mut ranges = Vec::new();
        for item in raw.split(',') {
            ranges.push(parse_field_range(item, min, max)?);
        }
        Ok(Field::List(ranges))
    }
}

fn parse_field_range(item: &str, min: u32, max: u32) -> Result<FieldRange> {
    let (range_part, step) = match item.split_once('/') {
        Some((r, s)) => (r, s.parse::<u32>().map_err(|_| Error::argument(format!("invalid step '{s}' in calendarspec field")))?),
        None => (item, 1),
    };
    if step == 0 {
        return Err(Error::argument("calendarspec step cannot be zero"));
    }
    let (start, end) = if range_part == "*" {
        (min, max)
    } else if let Some((a, b)) = range_part.split_once('-') {
        let start = a.parse::<u32>().map_err(|_| Error::argument(format!("invalid value '{a}' in calendarspec field")))?;
        let end = b.parse::<u32>().map_err(|_| Error::argument(format!("invalid value '{b}' in calendarspec field")))?;
        (start, end)
    } else {
        let value = range_part.parse::<u32>().map_err(|_| Error::argument(format!("invalid value '{range_part}' in calendarspec field")))?;
        (value, value)
    };
    if start < min || end > max || start > end {
        return Err(Error::argument(format!("calendarspec field '{item}' out of range {min}..{max}")));
    }
    Ok(FieldRange { start, end, step })
}

fn weekday_index(name: &str) -> Result<u32> {
    match name.to_ascii_lowercase().as_str() {
        "mon" => Ok(0),
        "tue" => Ok(1),
        "wed" => Ok(2),
        "thu" => Ok(3),
        "fri" => Ok(4),
        "sat" => Ok(5),
        "sun" => Ok(6),
        _ => Err(Error::argument(format!("unknown weekday '{name}'"))),
    }
}

fn parse_weekdays(raw: &str) -> Result<Vec<(u32, u32)>> {
    let mut out = Vec::new();
    for item in raw.split(',') {
        if let Some((a, b)) = item.split_once("..") {
            out.push((weekday_index(a)?, weekday_index(b)?));
        } else {
            let d = weekday_index(item)?;
            out.push((d, d));
        }
    }
    Ok(out)
}

fn looks_like_weekdays(token: &str) -> bool {
    token.chars().next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false)
}

/// A parsed systemd-style `OnCalendar` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarSpec {
    original: String,
    weekdays: Option<Vec<(u32, u32)>>,
    years: Field,
    months: Field,
    days: Field,
    hours: Field,
    minutes: Field,
    seconds: Field,
}

impl CalendarSpec {
    /// Parse a calendarspec expression, e.g. `"*-*-* *:10:00"` or
    /// `"Mon..Fri *-*-* 09:00:00"`.
    pub fn parse(spec: &str) -> Result<Self> {
        let tokens: Vec<&str> = spec.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(Error::argument("empty calendarspec expression"));
        }

        let (weekday_token, rest) = if looks_like_weekdays(tokens[0]) {
            (Some(tokens[0]), &tokens[1..])
        } else {
            (None, &tokens[..])
        };

        let (date_part, time_part) = match rest.len() {
            2 => (rest[0], rest[1]),
            1 if rest[0].contains('-') => (rest[0], "00:00:00"),
            1 => ("*-*-*", rest[0]),
            _ => return Err(Error::argument(format!("invalid calendarspec expression: '{spec}'"))),
        };

        let date_fields: Vec<&str> = date_part.split('-').collect();
        let (year_raw, month_raw, day_raw) = match date_fields.len() {
            3 => (date_fields[0], date_fields[1], date_fields[2]),
            2 => ("*", date_fields[0], date_fields[1]),
            _ => return Err(Error::argument(format!("invalid date component '{date_part}' in calendarspec"))),
        };

        let time_fields: Vec<&str> = time_part.split(':').collect();
        let (hour_raw, minute_raw, second_raw) = match time_fields.len() {
            3 => (time_fields[0], time_fields[1], time_fields[2]),
            2 => (time_fields[0], time_fields[1], "0"),
            _ => return Err(Error::argument(format!("invalid time component '{time_part}' in calendarspec"))),
        };

        Ok(CalendarSpec {
            original: spec.to_string(),
            weekdays: weekday_token.map(parse_weekdays).transpose()?,
            years: Field::parse(year_raw, 1970, 9999)?,
            months: Field::parse(month_raw, 1, 12)?,
            days: Field::parse(day_raw, 1, 31)?,
            hours: Field::parse(hour_raw, 0, 23)?,
            minutes: Field::parse(minute_raw, 0, 59)?,
            seconds: Field::parse(second_raw, 0, 59)?,
        })
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    fn weekday_matches(&self, dt: DateTime<Local>) -> bool {
        match &self.weekdays {
            None => true,
            Some(ranges) => {
                let idx = dt.weekday().num_days_from_monday();
                ranges.iter().any(|(start, end)| {
                    if start <= end {
                        idx >= *start && idx <= *end
                    } else {
                        idx >= *start || idx <= *end
                    }
                })
            }
        }
    }

    /// The first point in time strictly after `after` that matches this
    /// expression, or `None` if no match exists within a 4-year search
    /// horizon (treated as "never", mirroring systemd's `never` elapse).
    pub fn next_elapse(&self, after: DateTime<Local>) -> Option<DateTime<Local>> {
        let limit = after + Duration::days(366 * 4);
        let mut candidate = truncate_to_second(after) + Duration::seconds(1);

        loop {
            if candidate > limit {
                return None;
            }
            if !self.years.matches(candidate.year() as u32) {
                candidate = start_of_year(candidate.year() + 1);
                continue;
            }
            if !self.months.matches(candidate.month()) {
                candidate = start_of_next_month(candidate);
                continue;
            }
            if !self.days.matches(candidate.day()) || !self.weekday_matches(candidate) {
                candidate = start_of_next_day(candidate);
                continue;
            }
            if !self.hours.matches(candidate.hour()) {
                candidate = start_of_next_hour(candidate);
                continue;
            }
            if !self.minutes.matches(candidate.minute()) {
                candidate = start_of_next_minute(candidate);
                continue;
            }
            if !self.seconds.matches(candidate.second()) {
                candidate += Duration::seconds(1);
                continue;
            }
            return Some(candidate);
        }
    }

    /// `true` if this expression will elapse again in the future.
    pub fn occurs(&self, after: DateTime<Local>) -> bool {
        self.next_elapse(after).is_some()
    }
}

fn truncate_to_second(dt: DateTime<Local>) -> DateTime<Local> {
    dt - Duration::nanoseconds(dt.timestamp_subsec_nanos() as i64)
}

fn start_of_year(year: i32) -> DateTime<Local> {
    Local.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single().expect("valid year start")
}

fn start_of_next_month(dt: DateTime<Local>) -> DateTime<Local> {
    let (year, month) = if dt.month() == 12 { (dt.year() + 1, 1) } else { (dt.year(), dt.month() + 1) };
    Local.with_ymd_and_hms(year, month, 1, 0, 0, 0).single().expect("valid month start")
}

fn start_of_next_day(dt: DateTime<Local>) -> DateTime<Local> {
    let midnight = Local.with_ymd_and_hms(dt.year(), dt.month(), dt.day(), 0, 0, 0).single().expect("valid day start");
    midnight + Duration::days(1)
}

fn start_of_next_hour(dt: DateTime<Local>) -> DateTime<Local> {
    let hour_start = Local
        .with_ymd_and_hms(dt.year(), dt.month(), dt.day(), dt.hour(), 0, 0)
        .single()
        .expect("valid hour start");
    hour_start + Duration::hours(1)
}

fn start_of_next_minute(dt: DateTime<Local>) -> DateTime<Local> {
    let minute_start = Local
        .with_ymd_and_hms(dt.year(), dt.month(), dt.day(), dt.hour(), dt.minute(), 0)
        .single()
        .expect("valid minute start");
    minute_start + Duration::minutes(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_day_at_ten_past() {
        let spec = CalendarSpec::parse("*-*-* *:10:00").unwrap();
        let now = Local.with_ymd_and_hms(2026, 7, 28, 9, 0, 0).unwrap();
        let next = spec.next_elapse(now).unwrap();
        assert_eq!(next, Local.with_ymd_and_hms(2026, 7, 28, 9, 10, 0).unwrap());
    }

    #[test]
    fn rolls_over_to_next_day_when_time_passed() {
        let spec = CalendarSpec::parse("*-*-* *:10:00").unwrap();
        let now = Local.with_ymd_and_hms(2026, 7, 28, 9, 30, 0).unwrap();
        let next = spec.next_elapse(now).unwrap();
        assert_eq!(next, Local.with_ymd_and_hms(2026, 7, 28, 10, 10, 0).unwrap());
    }

    #[test]
    fn weekday_range_restricts_to_weekdays() {
        let spec = CalendarSpec::parse("Mon..Fri *-*-* 09:00:00").unwrap();
        // 2026-07-31 is a Friday; next occurrence after it should skip the weekend.
        let now = Local.with_ymd_and_hms(2026, 7, 31, 10, 0, 0).unwrap();
        let next = spec.next_elapse(now).unwrap();
        assert_eq!(next, Local.with_ymd_and_hms(2026, 8, 3, 9, 0, 0).unwrap());
    }

    #[test]
    fn step_expression_matches_quarter_hours() {
        let spec = CalendarSpec::parse("*-*-* *:0/15:00").unwrap();
        let now = Local.with_ymd_and_hms(2026, 7, 28, 9, 16, 0).unwrap();
        let next = spec.next_elapse(now).unwrap();
        assert_eq!(next, Local.with_ymd_and_hms(2026, 7, 28, 9, 30, 0).unwrap());
    }

    #[test]
    fn invalid_expression_is_rejected() {
        assert!(CalendarSpec::parse("not a calendarspec").is_err());
    }

    #[test]
    fn month_list_restricts_to_named_months() {
        let spec = CalendarSpec::parse("*-1,4,7,10-1 00:00:00").unwrap();
        let now = Local.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let next = spec.next_elapse(now).unwrap();
        assert_eq!(next, Local.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap());
    }
}

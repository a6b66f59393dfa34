//! Five-field cron expressions evaluated against the simulated calendar.

use super::errors::CronError;
use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Timelike};
use std::fmt;

/// How far ahead `next_at_or_after` searches before giving up
const SEARCH_DAYS: i64 = 366 * 5;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const DAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    /// value of the first entry in `names`
    names_base: u32,
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59, names: &[], names_base: 0 };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23, names: &[], names_base: 0 };
const DAY_OF_MONTH: FieldSpec = FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[], names_base: 0 };
const MONTH: FieldSpec = FieldSpec { name: "month", min: 1, max: 12, names: &MONTH_NAMES, names_base: 1 };
// 7 is accepted as an alias of Sunday and folded onto 0
const DAY_OF_WEEK: FieldSpec = FieldSpec { name: "day-of-week", min: 0, max: 7, names: &DAY_NAMES, names_base: 0 };

/// Parsed field: bit `n` set when value `n` matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Field {
    bits: u64,
    restricted: bool,
}

impl Field {
    fn contains(&self, value: u32) -> bool {
        self.bits & (1u64 << value) != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let expanded = match expr.trim() {
            "@hourly" => "0 * * * *",
            "@daily" | "@midnight" => "0 0 * * *",
            "@weekly" => "0 0 * * 0",
            "@monthly" => "0 0 1 * *",
            "@yearly" | "@annually" => "0 0 1 1 *",
            other => other,
        };

        let parts: Vec<&str> = expanded.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(CronError::FieldCount(parts.len()));
        }

        let mut day_of_week = parse_field(parts[4], DAY_OF_WEEK)?;
        if day_of_week.contains(7) {
            day_of_week.bits = (day_of_week.bits & !(1 << 7)) | 1;
        }

        Ok(Self {
            source: expr.trim().to_string(),
            minute: parse_field(parts[0], MINUTE)?,
            hour: parse_field(parts[1], HOUR)?,
            day_of_month: parse_field(parts[2], DAY_OF_MONTH)?,
            month: parse_field(parts[3], MONTH)?,
            day_of_week,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Number of restricted (non-`*`) fields; used to rank equally timed blocks
    pub fn specificity(&self) -> u8 {
        [
            self.minute,
            self.hour,
            self.day_of_month,
            self.month,
            self.day_of_week,
        ]
        .iter()
        .filter(|f| f.restricted)
        .count() as u8
    }

    pub fn matches(&self, datetime: &NaiveDateTime) -> bool {
        self.minute.contains(datetime.minute())
            && self.hour.contains(datetime.hour())
            && self.matches_day(datetime)
    }

    fn matches_day(&self, datetime: &NaiveDateTime) -> bool {
        if !self.month.contains(datetime.month()) {
            return false;
        }
        let dom = self.day_of_month.contains(datetime.day());
        let dow = self
            .day_of_week
            .contains(datetime.weekday().num_days_from_sunday());
        // Classic cron: when both day fields are restricted either may match
        match (self.day_of_month.restricted, self.day_of_week.restricted) {
            (true, true) => dom || dow,
            _ => dom && dow,
        }
    }

    /// First matching minute at or after `from` (seconds round up to the next minute)
    pub fn next_at_or_after(&self, from: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut start = from.with_nanosecond(0)?;
        if start.second() != 0 {
            start = start.with_second(0)? + Duration::minutes(1);
        }

        let mut day = start.date();
        for offset in 0..SEARCH_DAYS {
            let probe = day.and_time(NaiveTime::MIN);
            if self.matches_day(&probe) {
                let floor = if offset == 0 { start.time() } else { NaiveTime::MIN };
                if let Some(time) = self.first_time_in_day(floor) {
                    return Some(day.and_time(time));
                }
            }
            day = day.succ_opt()?;
        }
        None
    }

    /// First matching minute strictly after `after`
    pub fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let bumped = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        self.next_at_or_after(bumped)
    }

    fn first_time_in_day(&self, floor: NaiveTime) -> Option<NaiveTime> {
        for hour in floor.hour()..24 {
            if !self.hour.contains(hour) {
                continue;
            }
            let min_start = if hour == floor.hour() { floor.minute() } else { 0 };
            for minute in min_start..60 {
                if self.minute.contains(minute) {
                    return NaiveTime::from_hms_opt(hour, minute, 0);
                }
            }
        }
        None
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_field(text: &str, spec: FieldSpec) -> Result<Field, CronError> {
    let mut bits = 0u64;
    let mut restricted = false;

    for item in text.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, Some(parse_number(step, spec)?)),
            None => (item, None),
        };
        if step == Some(0) {
            return Err(invalid(spec, item));
        }

        let (low, high) = if range == "*" {
            (spec.min, spec.max.min(if spec.name == "day-of-week" { 6 } else { spec.max }))
        } else if let Some((a, b)) = range.split_once('-') {
            restricted = true;
            (parse_value(a, spec)?, parse_value(b, spec)?)
        } else {
            restricted = true;
            let v = parse_value(range, spec)?;
            // "5/15" means starting at 5 through the end of the range
            (v, if step.is_some() { spec.max } else { v })
        };
        if range == "*" && step.is_some() {
            restricted = true;
        }
        if low > high {
            return Err(invalid(spec, item));
        }

        let step = step.unwrap_or(1);
        let mut v = low;
        while v <= high {
            bits |= 1u64 << v;
            v += step;
        }
    }

    if bits == 0 {
        return Err(invalid(spec, text));
    }
    Ok(Field { bits, restricted })
}

fn parse_value(text: &str, spec: FieldSpec) -> Result<u32, CronError> {
    let lower = text.to_ascii_lowercase();
    if let Some(pos) = spec.names.iter().position(|n| *n == lower) {
        return Ok(pos as u32 + spec.names_base);
    }
    parse_number(text, spec)
}

fn parse_number(text: &str, spec: FieldSpec) -> Result<u32, CronError> {
    let value: u32 = text.parse().map_err(|_| invalid(spec, text))?;
    if value < spec.min || value > spec.max {
        return Err(CronError::OutOfRange {
            field: spec.name,
            value,
            min: spec.min,
            max: spec.max,
        });
    }
    Ok(value)
}

fn invalid(spec: FieldSpec, value: &str) -> CronError {
    CronError::InvalidField {
        field: spec.name,
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        // January 2024: the 1st is a Monday
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_daily_window_start() {
        let cron = CronExpr::parse("30 7 * * *").unwrap();
        assert_eq!(cron.next_at_or_after(at(1, 0, 0)), Some(at(1, 7, 30)));
        assert_eq!(cron.next_at_or_after(at(1, 7, 30)), Some(at(1, 7, 30)));
        assert_eq!(cron.next_after(at(1, 7, 30)), Some(at(2, 7, 30)));
    }

    #[test]
    fn test_weekdays_and_names() {
        let cron = CronExpr::parse("0 6 * * mon-fri").unwrap();
        // Saturday the 6th rolls over to Monday the 8th
        assert_eq!(cron.next_at_or_after(at(6, 0, 0)), Some(at(8, 6, 0)));
        let sunday = CronExpr::parse("0 0 * * 7").unwrap();
        assert_eq!(sunday.next_at_or_after(at(1, 0, 0)), Some(at(7, 0, 0)));
    }

    #[test]
    fn test_steps_and_lists() {
        let cron = CronExpr::parse("*/15 8,12 * * *").unwrap();
        assert_eq!(cron.next_at_or_after(at(1, 8, 1)), Some(at(1, 8, 15)));
        assert_eq!(cron.next_at_or_after(at(1, 8, 46)), Some(at(1, 12, 0)));
    }

    #[test]
    fn test_seconds_round_up() {
        let cron = CronExpr::parse("* * * * *").unwrap();
        let from = at(1, 9, 0) + Duration::seconds(45);
        assert_eq!(cron.next_at_or_after(from), Some(at(1, 9, 1)));
    }

    #[test]
    fn test_day_fields_or_semantics() {
        // 15th of the month or any Friday
        let cron = CronExpr::parse("0 0 15 * fri").unwrap();
        assert_eq!(cron.next_at_or_after(at(1, 0, 1)), Some(at(5, 0, 0)));
    }

    #[test]
    fn test_specificity() {
        assert_eq!(CronExpr::parse("* * * * *").unwrap().specificity(), 0);
        assert_eq!(CronExpr::parse("30 7 * * *").unwrap().specificity(), 2);
        assert_eq!(CronExpr::parse("30 7 * * 1-5").unwrap().specificity(), 3);
    }

    #[test]
    fn test_shortcuts() {
        let cron = CronExpr::parse("@daily").unwrap();
        assert_eq!(cron.next_after(at(1, 0, 0)), Some(at(2, 0, 0)));
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(CronExpr::parse("* * *"), Err(CronError::FieldCount(3)));
        assert!(matches!(
            CronExpr::parse("61 * * * *"),
            Err(CronError::OutOfRange { field: "minute", .. })
        ));
        assert!(matches!(
            CronExpr::parse("a * * * *"),
            Err(CronError::InvalidField { .. })
        ));
        assert!(CronExpr::parse("*/0 * * * *").is_err());
        assert!(CronExpr::parse("10-5 * * * *").is_err());
    }

    #[test]
    fn test_impossible_date_never_fires() {
        let cron = CronExpr::parse("0 0 31 2 *").unwrap();
        assert_eq!(cron.next_at_or_after(at(1, 0, 0)), None);
    }
}

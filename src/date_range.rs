//! Date-range extraction from Russian questions.
//!
//! Recognises `с 1 по 5 марта 2024` and `5 марта 2024`. Month names are the
//! genitive forms, matched case-insensitively as whole words. Only ASCII
//! digits count as day and year numbers.

use std::fmt;

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::error::DateError;

const MONTHS: [(&str, u32); 12] = [
    ("января", 1),
    ("февраля", 2),
    ("марта", 3),
    ("апреля", 4),
    ("мая", 5),
    ("июня", 6),
    ("июля", 7),
    ("августа", 8),
    ("сентября", 9),
    ("октября", 10),
    ("ноября", 11),
    ("декабря", 12),
];

const MONTH_ALTERNATION: &str =
    "января|февраля|марта|апреля|мая|июня|июля|августа|сентября|октября|ноября|декабря";

lazy_static! {
    static ref RANGE_PATTERN: Regex = Regex::new(&format!(
        r"(?i)\bс\s+(?P<start_day>[0-9]{{1,2}})\s+по\s+(?P<end_day>[0-9]{{1,2}})\s+(?P<month>{MONTH_ALTERNATION})\s+(?P<year>[0-9]{{4}})\b"
    ))
    .expect("range date pattern");
    static ref SINGLE_PATTERN: Regex = Regex::new(&format!(
        r"(?i)\b(?P<day>[0-9]{{1,2}})\s+(?P<month>{MONTH_ALTERNATION})\s+(?P<year>[0-9]{{4}})\b"
    ))
    .expect("single date pattern");
}

/// Inclusive calendar period mentioned in a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl DateRange {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self, DateError> {
        if start_date > end_date {
            return Err(DateError::ReversedRange { start: start_date, end: end_date });
        }
        Ok(Self { start_date, end_date })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self { start_date: date, end_date: date }
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// Side-channel clause handed to the model as extra context.
    pub fn to_context(&self) -> String {
        format!(
            "date range: {} to {} inclusive",
            self.start_date.format("%Y-%m-%d"),
            self.end_date.format("%Y-%m-%d")
        )
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start_date, self.end_date)
    }
}

/// Find the first date range (or single date) mentioned in `question`.
///
/// A range expression wins over a single date. Returns `Ok(None)` when the
/// text mentions no date; a matched but impossible date is an error.
pub fn extract_date_range(question: &str) -> Result<Option<DateRange>, DateError> {
    if let Some(caps) = RANGE_PATTERN.captures(question) {
        let month = month_number(&caps["month"])?;
        let year = parse_number(&caps["year"])?;
        let start = make_date(year, month, parse_number(&caps["start_day"])?)?;
        let end = make_date(year, month, parse_number(&caps["end_day"])?)?;
        return DateRange::new(start, end).map(Some);
    }

    if let Some(caps) = SINGLE_PATTERN.captures(question) {
        let month = month_number(&caps["month"])?;
        let year = parse_number(&caps["year"])?;
        let date = make_date(year, month, parse_number(&caps["day"])?)?;
        return Ok(Some(DateRange::single(date)));
    }

    Ok(None)
}

fn month_number(name: &str) -> Result<u32, DateError> {
    let lowered = name.to_lowercase();
    MONTHS
        .iter()
        .find(|(month, _)| *month == lowered)
        .map(|(_, number)| *number)
        .ok_or(DateError::UnknownMonth(lowered))
}

fn parse_number<T: std::str::FromStr>(raw: &str) -> Result<T, DateError> {
    raw.parse().map_err(|_| DateError::InvalidNumber(raw.to_string()))
}

fn make_date(year: i32, month: u32, day: u32) -> Result<NaiveDate, DateError> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or(DateError::InvalidDate { year, month, day })
}

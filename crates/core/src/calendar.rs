//! Calendar primitives: months, year-months and half-open time windows.
//!
//! All bucketing happens in UTC. A sale at `2024-01-31T23:30:00Z` belongs to
//! `2024-01` regardless of the store's local timezone.

use core::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// Calendar month, ordered January..December.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Month {
    January,
    February,
    March,
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::January,
        Month::February,
        Month::March,
        Month::April,
        Month::May,
        Month::June,
        Month::July,
        Month::August,
        Month::September,
        Month::October,
        Month::November,
        Month::December,
    ];

    /// 1-based month number.
    pub fn number(self) -> u32 {
        self as u32 + 1
    }

    pub fn from_number(n: u32) -> Option<Self> {
        if (1..=12).contains(&n) {
            Some(Self::ALL[(n - 1) as usize])
        } else {
            None
        }
    }

    /// English month name, as used in forecast payloads ("January").
    pub fn name(self) -> &'static str {
        match self {
            Month::January => "January",
            Month::February => "February",
            Month::March => "March",
            Month::April => "April",
            Month::May => "May",
            Month::June => "June",
            Month::July => "July",
            Month::August => "August",
            Month::September => "September",
            Month::October => "October",
            Month::November => "November",
            Month::December => "December",
        }
    }

    /// Case-insensitive lookup by full English name.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(name))
    }
}

impl core::fmt::Display for Month {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// A calendar month of a specific year, rendered as `YYYY-MM`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: Month,
}

impl ValueObject for YearMonth {}

impl YearMonth {
    pub fn new(year: i32, month: Month) -> Self {
        Self { year, month }
    }

    pub fn of(timestamp: DateTime<Utc>) -> Self {
        Self::from_date(timestamp.date_naive())
    }

    pub fn from_date(date: NaiveDate) -> Self {
        // `Datelike::month` is always 1..=12.
        let month = Month::from_number(date.month()).unwrap_or(Month::January);
        Self {
            year: date.year(),
            month,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> Month {
        self.month
    }

    pub fn next(self) -> Self {
        match self.month {
            Month::December => Self::new(self.year + 1, Month::January),
            m => Self::new(self.year, Month::ALL[m.number() as usize]),
        }
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month.number(), 1)
    }

    /// Midnight UTC on the first day of this month.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.first_day()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Utc.from_utc_datetime(&dt))
    }

    /// Half-open window covering exactly this month.
    pub fn window(&self) -> Result<DateWindow, DomainError> {
        let start = self
            .start()
            .ok_or_else(|| DomainError::invalid_period(format!("{self} is out of range")))?;
        let end = self
            .next()
            .start()
            .ok_or_else(|| DomainError::invalid_period(format!("{self} is out of range")))?;
        DateWindow::new(start, end)
    }
}

impl core::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month.number())
    }
}

impl FromStr for YearMonth {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || DomainError::invalid_period(format!("expected YYYY-MM, got {s:?}"));
        let (y, m) = s.trim().split_once('-').ok_or_else(bad)?;
        if y.len() != 4 || m.len() != 2 {
            return Err(bad());
        }
        let year: i32 = y.parse().map_err(|_| bad())?;
        let month = m
            .parse::<u32>()
            .ok()
            .and_then(Month::from_number)
            .ok_or_else(bad)?;
        Ok(Self::new(year, month))
    }
}

impl TryFrom<String> for YearMonth {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

/// Half-open time window `[start, end)`.
///
/// `start == None` means "since the beginning of recorded history".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    start: Option<DateTime<Utc>>,
    end: DateTime<Utc>,
}

impl ValueObject for DateWindow {}

impl DateWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DomainError> {
        if start >= end {
            return Err(DomainError::invalid_period(format!(
                "window start {start} must be before end {end}"
            )));
        }
        Ok(Self {
            start: Some(start),
            end,
        })
    }

    /// Everything strictly before `end`.
    pub fn until(end: DateTime<Utc>) -> Self {
        Self { start: None, end }
    }

    /// Everything before midnight UTC of `cutoff`.
    pub fn before_date(cutoff: NaiveDate) -> Self {
        Self::until(midnight(cutoff))
    }

    /// Window over whole dates: `[start 00:00 UTC, end 00:00 UTC)`.
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Result<Self, DomainError> {
        Self::new(midnight(start), midnight(end))
    }

    /// January 1st through December 31st of `year`.
    pub fn calendar_year(year: i32) -> Result<Self, DomainError> {
        let start = YearMonth::new(year, Month::January)
            .start()
            .ok_or_else(|| DomainError::invalid_period(format!("year {year} is out of range")))?;
        let end = YearMonth::new(year + 1, Month::January)
            .start()
            .ok_or_else(|| DomainError::invalid_period(format!("year {year} is out of range")))?;
        Self::new(start, end)
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| at >= s) && at < self.end
    }

    /// Every calendar month touched by the window, in order.
    ///
    /// `None` for windows without a start.
    pub fn months(&self) -> Option<Vec<YearMonth>> {
        let start = self.start?;
        let first = YearMonth::of(start);
        let last = YearMonth::of(self.end - chrono::Duration::nanoseconds(1));
        let mut out = Vec::new();
        let mut cur = first;
        while cur <= last {
            out.push(cur);
            cur = cur.next();
        }
        Some(out)
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

/// Named analysis windows anchored on the data's latest date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodPreset {
    Recent4Weeks,
    Recent8Weeks,
    Recent12Weeks,
    /// April 1 of the current fiscal year to the latest date.
    FiscalYearToDate,
    LastMonth,
    LastFiscalYear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

fn fiscal_year_start(date: NaiveDate) -> i32 {
    if date.month() >= 4 {
        date.year()
    } else {
        date.year() - 1
    }
}

fn ymd(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

impl PeriodPreset {
    pub const ALL: [PeriodPreset; 6] = [
        PeriodPreset::Recent4Weeks,
        PeriodPreset::Recent8Weeks,
        PeriodPreset::Recent12Weeks,
        PeriodPreset::FiscalYearToDate,
        PeriodPreset::LastMonth,
        PeriodPreset::LastFiscalYear,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PeriodPreset::Recent4Weeks => "recent-4w",
            PeriodPreset::Recent8Weeks => "recent-8w",
            PeriodPreset::Recent12Weeks => "recent-12w",
            PeriodPreset::FiscalYearToDate => "fiscal-ytd",
            PeriodPreset::LastMonth => "last-month",
            PeriodPreset::LastFiscalYear => "last-fiscal-year",
        }
    }

    /// Resolves the window against the data's date bounds. The result is
    /// clipped to `[earliest, latest]`; `None` when nothing overlaps.
    pub fn resolve(self, earliest: NaiveDate, latest: NaiveDate) -> Option<DateRange> {
        let (start, end) = match self {
            PeriodPreset::Recent4Weeks => (latest - Duration::days(27), latest),
            PeriodPreset::Recent8Weeks => (latest - Duration::days(55), latest),
            PeriodPreset::Recent12Weeks => (latest - Duration::days(83), latest),
            PeriodPreset::FiscalYearToDate => (ymd(fiscal_year_start(latest), 4, 1)?, latest),
            PeriodPreset::LastMonth => {
                let first_of_month = ymd(latest.year(), latest.month(), 1)?;
                let end = first_of_month.pred_opt()?;
                (ymd(end.year(), end.month(), 1)?, end)
            }
            PeriodPreset::LastFiscalYear => {
                let year = fiscal_year_start(latest) - 1;
                (ymd(year, 4, 1)?, ymd(year + 1, 3, 31)?)
            }
        };

        let range = DateRange {
            start: start.max(earliest),
            end: end.min(latest),
        };
        (range.start <= range.end).then_some(range)
    }
}

impl fmt::Display for PeriodPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PeriodPreset::ALL
            .into_iter()
            .find(|preset| preset.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = PeriodPreset::ALL.iter().map(|p| p.as_str()).collect();
                format!("unknown period '{s}' (expected one of {})", known.join(", "))
            })
    }
}

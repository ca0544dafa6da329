//! Public holiday calendar used for weekday/holiday classification.
//!
//! The default calendar follows the Japanese National Holidays Act as
//! amended in 2007 (substitute holidays roll forward past consecutive
//! holidays) and covers the one-off moves of 2019–2021. Equinox days use the
//! standard approximation, valid for 1980–2099.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::models::DayKind;

pub trait HolidayCalendar {
    fn is_public_holiday(&self, date: NaiveDate) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JapaneseCalendar;

/// A calendar with no public holidays; only weekends and the year-end
/// blackout count as holidays.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPublicHolidays;

impl HolidayCalendar for NoPublicHolidays {
    fn is_public_holiday(&self, _date: NaiveDate) -> bool {
        false
    }
}

impl HolidayCalendar for JapaneseCalendar {
    fn is_public_holiday(&self, date: NaiveDate) -> bool {
        is_statutory_holiday(date) || is_substitute_holiday(date) || is_sandwiched_holiday(date)
    }
}

/// Weekend, public holiday, or Dec 29 – Jan 3 ⇒ holiday.
pub fn classify_weekday(date: NaiveDate) -> DayKind {
    classify_weekday_with(&JapaneseCalendar, date)
}

pub fn classify_weekday_with<C: HolidayCalendar + ?Sized>(calendar: &C, date: NaiveDate) -> DayKind {
    let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
    if weekend || in_year_end_blackout(date) || calendar.is_public_holiday(date) {
        DayKind::Holiday
    } else {
        DayKind::Weekday
    }
}

pub fn in_year_end_blackout(date: NaiveDate) -> bool {
    (date.month() == 12 && date.day() >= 29) || (date.month() == 1 && date.day() <= 3)
}

fn is_statutory_holiday(date: NaiveDate) -> bool {
    let (year, month, day) = (date.year(), date.month(), date.day());

    if let Some(moved) = one_off_holiday(year, month, day) {
        return moved;
    }

    match month {
        1 => day == 1 || (year >= 2000 && is_nth_monday(date, 2)),
        2 => day == 11 || (year >= 2020 && day == 23),
        3 => day == vernal_equinox_day(year),
        4 => day == 29,
        5 => (3..=5).contains(&day),
        7 => year >= 2003 && is_nth_monday(date, 3),
        8 => year >= 2016 && day == 11,
        9 => (year >= 2003 && is_nth_monday(date, 3)) || day == autumnal_equinox_day(year),
        10 => year >= 2000 && is_nth_monday(date, 2),
        11 => day == 3 || day == 23,
        12 => (1989..=2018).contains(&year) && day == 23,
        _ => false,
    }
}

/// Dates moved or added by special legislation. `Some(true)` marks an extra
/// holiday, `Some(false)` a regular holiday that did not take place.
fn one_off_holiday(year: i32, month: u32, day: u32) -> Option<bool> {
    match (year, month, day) {
        (2019, 4, 30) | (2019, 5, 1) | (2019, 5, 2) | (2019, 10, 22) => Some(true),
        (2020, 7, 23) | (2020, 7, 24) | (2020, 8, 10) => Some(true),
        (2020, 7, 20) | (2020, 8, 11) | (2020, 10, 12) => Some(false),
        (2021, 7, 22) | (2021, 7, 23) | (2021, 8, 8) => Some(true),
        (2021, 7, 19) | (2021, 8, 11) | (2021, 10, 11) => Some(false),
        _ => None,
    }
}

fn is_nth_monday(date: NaiveDate, n: u32) -> bool {
    date.weekday() == Weekday::Mon && (date.day() - 1) / 7 + 1 == n
}

fn equinox_day(year: i32, base: f64) -> u32 {
    let offset = f64::from(year - 1980);
    let leap_correction = ((year - 1980) / 4) as f64;
    (base + 0.242194 * offset - leap_correction).floor() as u32
}

fn vernal_equinox_day(year: i32) -> u32 {
    equinox_day(year, 20.8431)
}

fn autumnal_equinox_day(year: i32) -> u32 {
    equinox_day(year, 23.2488)
}

/// A statutory holiday on Sunday moves to the next day that is not itself
/// a statutory holiday.
fn is_substitute_holiday(date: NaiveDate) -> bool {
    if is_statutory_holiday(date) || date.weekday() == Weekday::Sun {
        return false;
    }
    let mut cursor = date - Duration::days(1);
    while is_statutory_holiday(cursor) {
        if cursor.weekday() == Weekday::Sun {
            return true;
        }
        cursor -= Duration::days(1);
    }
    false
}

/// A weekday squeezed between two statutory holidays is a holiday too.
fn is_sandwiched_holiday(date: NaiveDate) -> bool {
    date.weekday() != Weekday::Sun
        && !is_statutory_holiday(date)
        && is_statutory_holiday(date - Duration::days(1))
        && is_statutory_holiday(date + Duration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weekends_and_blackout_are_holidays() {
        assert_eq!(classify_weekday(date(2026, 10, 17)), DayKind::Holiday);
        assert_eq!(classify_weekday(date(2026, 10, 18)), DayKind::Holiday);
        assert_eq!(classify_weekday(date(2025, 12, 29)), DayKind::Holiday);
        assert_eq!(classify_weekday(date(2026, 1, 2)), DayKind::Holiday);
        assert_eq!(classify_weekday(date(2026, 1, 5)), DayKind::Weekday);
    }

    #[test]
    fn ordinary_weekday_is_weekday() {
        assert_eq!(classify_weekday(date(2026, 10, 14)), DayKind::Weekday);
    }

    #[test]
    fn fixed_and_happy_monday_holidays() {
        let calendar = JapaneseCalendar;
        assert!(calendar.is_public_holiday(date(2026, 2, 11)));
        assert!(calendar.is_public_holiday(date(2026, 1, 12)));
        assert!(calendar.is_public_holiday(date(2026, 7, 20)));
        assert!(calendar.is_public_holiday(date(2026, 10, 12)));
        assert!(!calendar.is_public_holiday(date(2026, 10, 13)));
    }

    #[test]
    fn equinoxes() {
        assert_eq!(vernal_equinox_day(2026), 20);
        assert_eq!(autumnal_equinox_day(2026), 23);
        assert_eq!(autumnal_equinox_day(2024), 22);
    }

    #[test]
    fn substitute_holiday_rolls_past_golden_week() {
        // 2026-05-03 is a Sunday; May 4 and 5 are holidays, so May 6 substitutes.
        let calendar = JapaneseCalendar;
        assert!(calendar.is_public_holiday(date(2026, 5, 6)));
        assert!(!calendar.is_public_holiday(date(2026, 5, 7)));
    }

    #[test]
    fn day_between_two_holidays_is_holiday() {
        // Respect for the Aged Day (Sep 21) and the equinox (Sep 23) in 2026.
        let calendar = JapaneseCalendar;
        assert!(calendar.is_public_holiday(date(2026, 9, 22)));
    }

    #[test]
    fn one_off_moves_are_respected() {
        let calendar = JapaneseCalendar;
        assert!(calendar.is_public_holiday(date(2020, 7, 24)));
        assert!(!calendar.is_public_holiday(date(2020, 10, 12)));
    }

    #[test]
    fn custom_calendar_still_counts_weekends() {
        assert_eq!(
            classify_weekday_with(&NoPublicHolidays, date(2026, 2, 11)),
            DayKind::Weekday
        );
        assert_eq!(
            classify_weekday_with(&NoPublicHolidays, date(2026, 2, 14)),
            DayKind::Holiday
        );
    }
}

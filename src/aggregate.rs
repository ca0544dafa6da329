//! Period KPIs and time-bucketed series over derived daily records.
//!
//! Every ratio has an explicit fallback for a zero denominator; none of
//! these functions fail.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;

use crate::models::{
    Aggregation, DailyPoint, DerivedDailyRecord, DowAggregate, EmptyResult, KpiAchievement,
    MonthlyAggregate, PeriodAggregate, Scope, WeeklyAggregate,
};
use crate::targets::EntityTarget;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Sample standard deviation (n − 1 denominator); 0 below two points.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Trailing mean with a shrinking window: the first points average over
/// whatever has been observed so far instead of being left out.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let from = (i + 1).saturating_sub(window);
            mean(&values[from..=i])
        })
        .collect()
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Σpatient_days / ((Σadmissions + Σdischarges) / 2), 0 when the
/// denominator is not positive.
pub fn alos(patient_days: i64, total_admissions: i64, total_discharges: i64) -> f64 {
    let denominator = (total_admissions + total_discharges) as f64 / 2.0;
    ratio(patient_days as f64, denominator)
}

/// `None` unless a positive bed count applies.
pub fn occupancy_rate(avg_daily_census: f64, total_beds: Option<u32>) -> Option<f64> {
    match total_beds {
        Some(beds) if beds > 0 => Some(avg_daily_census * 100.0 / f64::from(beds)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DayTotals {
    pub census: i64,
    pub patient_days: i64,
    pub total_admissions: i64,
    pub total_discharges: i64,
    pub emergency_admissions: i64,
    pub deaths: i64,
    pub holiday: bool,
}

fn in_window<'a>(
    records: &'a [DerivedDailyRecord],
    scope: &'a Scope,
    start: NaiveDate,
    end: NaiveDate,
) -> impl Iterator<Item = &'a DerivedDailyRecord> + 'a {
    records
        .iter()
        .filter(move |r| r.date >= start && r.date <= end && scope.matches(r))
}

/// Per-date sums for the scope, in date order. Dates without rows are absent.
pub fn daily_totals(
    records: &[DerivedDailyRecord],
    scope: &Scope,
    start: NaiveDate,
    end: NaiveDate,
) -> BTreeMap<NaiveDate, DayTotals> {
    let mut days: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();
    for record in in_window(records, scope, start, end) {
        let day = days.entry(record.date).or_default();
        day.census += record.census_count;
        day.patient_days += record.patient_days;
        day.total_admissions += record.total_admissions;
        day.total_discharges += record.total_discharges;
        day.emergency_admissions += record.emergency_admissions;
        day.deaths += record.deaths;
        day.holiday = !record.is_weekday();
    }
    days
}

pub fn aggregate(
    records: &[DerivedDailyRecord],
    scope: &Scope,
    start: NaiveDate,
    end: NaiveDate,
    total_beds: Option<u32>,
) -> Aggregation {
    let rows: Vec<&DerivedDailyRecord> = in_window(records, scope, start, end).collect();
    let Some(latest_date) = rows.iter().map(|r| r.date).max() else {
        return Aggregation::Empty(EmptyResult {
            scope: scope.clone(),
            start,
            end,
        });
    };

    let days_in_period = (end - start).num_days() + 1;
    let total_patient_days: i64 = rows.iter().map(|r| r.patient_days).sum();
    let total_admissions: i64 = rows.iter().map(|r| r.total_admissions).sum();
    let total_discharges: i64 = rows.iter().map(|r| r.total_discharges).sum();
    let emergency_admissions: i64 = rows.iter().map(|r| r.emergency_admissions).sum();
    let deaths: i64 = rows.iter().map(|r| r.deaths).sum();

    let days = days_in_period as f64;
    let avg_daily_census = ratio(total_patient_days as f64, days);

    let daily = daily_totals(records, scope, start, end);
    let (holiday_census, weekday_census): (Vec<f64>, Vec<f64>) = {
        let mut holiday = Vec::new();
        let mut weekday = Vec::new();
        for totals in daily.values() {
            if totals.holiday {
                holiday.push(totals.census as f64);
            } else {
                weekday.push(totals.census as f64);
            }
        }
        (holiday, weekday)
    };

    let wards: BTreeSet<&str> = rows.iter().map(|r| r.ward.as_str()).collect();
    let departments: BTreeSet<&str> = rows.iter().filter_map(|r| r.department.as_deref()).collect();

    Aggregation::Period(PeriodAggregate {
        scope: scope.clone(),
        start,
        end,
        days_in_period,
        row_count: rows.len(),
        total_patient_days,
        total_admissions,
        total_discharges,
        emergency_admissions,
        deaths,
        avg_daily_census,
        avg_daily_admissions: ratio(total_admissions as f64, days),
        avg_daily_discharges: ratio(total_discharges as f64, days),
        alos: alos(total_patient_days, total_admissions, total_discharges),
        turnover_rate: ratio(total_discharges as f64, avg_daily_census),
        occupancy_rate: occupancy_rate(avg_daily_census, total_beds),
        emergency_rate: ratio(emergency_admissions as f64, total_admissions as f64) * 100.0,
        mortality_rate: ratio(deaths as f64, total_discharges as f64) * 100.0,
        weekday_avg_census: mean(&weekday_census),
        holiday_avg_census: mean(&holiday_census),
        ward_count: wards.len(),
        department_count: departments.len(),
        latest_date,
    })
}

pub fn daily_series(
    records: &[DerivedDailyRecord],
    scope: &Scope,
    start: NaiveDate,
    end: NaiveDate,
    window: usize,
) -> Vec<DailyPoint> {
    let daily = daily_totals(records, scope, start, end);
    let census: Vec<f64> = daily.values().map(|d| d.census as f64).collect();
    let rolling = rolling_mean(&census, window);

    daily
        .into_iter()
        .zip(rolling)
        .map(|((date, totals), census_rolling_mean)| DailyPoint {
            date,
            census: totals.census,
            patient_days: totals.patient_days,
            total_admissions: totals.total_admissions,
            total_discharges: totals.total_discharges,
            census_rolling_mean,
        })
        .collect()
}

pub fn iso_week_label(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// ISO-week buckets in chronological order. The census average is taken
/// over observed dates of the per-date census sum.
pub fn weekly_series(
    records: &[DerivedDailyRecord],
    scope: &Scope,
    start: NaiveDate,
    end: NaiveDate,
    target: Option<f64>,
) -> Vec<WeeklyAggregate> {
    struct Bucket {
        week_end: NaiveDate,
        census: Vec<f64>,
        admissions: i64,
        discharges: i64,
    }

    let mut buckets: BTreeMap<(i32, u32), Bucket> = BTreeMap::new();
    for (date, totals) in daily_totals(records, scope, start, end) {
        let week = date.iso_week();
        let bucket = buckets.entry((week.year(), week.week())).or_insert(Bucket {
            week_end: date,
            census: Vec::new(),
            admissions: 0,
            discharges: 0,
        });
        bucket.week_end = bucket.week_end.max(date);
        bucket.census.push(totals.census as f64);
        bucket.admissions += totals.total_admissions;
        bucket.discharges += totals.total_discharges;
    }

    let target = target.filter(|t| *t > 0.0);
    let mut prior: Option<f64> = None;
    buckets
        .into_values()
        .map(|bucket| {
            let avg_census = mean(&bucket.census);
            let weekly = WeeklyAggregate {
                scope: scope.clone(),
                week: iso_week_label(bucket.week_end),
                week_end: bucket.week_end,
                avg_census,
                admissions_sum: bucket.admissions,
                discharges_sum: bucket.discharges,
                net_flow: bucket.admissions - bucket.discharges,
                achievement_rate: target.map(|t| avg_census * 100.0 / t),
                prior_week_avg_census: prior,
                improved: prior.is_some_and(|p| avg_census > p),
            };
            prior = Some(avg_census);
            weekly
        })
        .collect()
}

pub fn monthly_series(
    records: &[DerivedDailyRecord],
    scope: &Scope,
    start: NaiveDate,
    end: NaiveDate,
    window: usize,
) -> Vec<MonthlyAggregate> {
    let mut months: BTreeMap<(i32, u32), (i64, i64, i64, usize)> = BTreeMap::new();
    for (date, totals) in daily_totals(records, scope, start, end) {
        let month = months.entry((date.year(), date.month())).or_default();
        month.0 += totals.patient_days;
        month.1 += totals.total_admissions;
        month.2 += totals.total_discharges;
        month.3 += 1;
    }

    let mut series: Vec<MonthlyAggregate> = months
        .into_iter()
        .map(
            |((year, month), (patient_days, admissions, discharges, observed_days))| {
                MonthlyAggregate {
                    scope: scope.clone(),
                    month: format!("{year}-{month:02}"),
                    patient_days,
                    total_admissions: admissions,
                    total_discharges: discharges,
                    observed_days,
                    alos: alos(patient_days, admissions, discharges),
                    avg_daily_census: ratio(patient_days as f64, observed_days as f64),
                    alos_moving_avg: 0.0,
                }
            },
        )
        .collect();

    let values: Vec<f64> = series.iter().map(|m| m.alos).collect();
    for (month, smoothed) in series.iter_mut().zip(rolling_mean(&values, window)) {
        month.alos_moving_avg = smoothed;
    }
    series
}

/// Percentage change of the last month's ALOS against the month before;
/// 0 with fewer than two months or a zero baseline.
pub fn alos_month_over_month(months: &[MonthlyAggregate]) -> f64 {
    match months {
        [.., previous, current] if previous.alos != 0.0 => {
            (current.alos - previous.alos) / previous.alos * 100.0
        }
        _ => 0.0,
    }
}

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Day-of-week profile over per-date sums. Weekdays without any observed
/// date come back with zero counts and zero averages.
pub fn dow_summary(
    records: &[DerivedDailyRecord],
    scope: &Scope,
    start: NaiveDate,
    end: NaiveDate,
) -> [DowAggregate; 7] {
    let mut buckets = [(0usize, DayTotals::default()); 7];
    for (date, totals) in daily_totals(records, scope, start, end) {
        let (days, sum) = &mut buckets[date.weekday().num_days_from_monday() as usize];
        *days += 1;
        sum.census += totals.census;
        sum.total_admissions += totals.total_admissions;
        sum.total_discharges += totals.total_discharges;
        sum.emergency_admissions += totals.emergency_admissions;
        sum.deaths += totals.deaths;
    }

    WEEK.map(|weekday| {
        let (days, sum) = buckets[weekday.num_days_from_monday() as usize];
        let observed = days as f64;
        DowAggregate {
            weekday,
            observed_days: days,
            census_sum: sum.census,
            admissions_sum: sum.total_admissions,
            discharges_sum: sum.total_discharges,
            emergency_admissions_sum: sum.emergency_admissions,
            deaths_sum: sum.deaths,
            avg_census: ratio(sum.census as f64, observed),
            avg_admissions: ratio(sum.total_admissions as f64, observed),
            avg_discharges: ratio(sum.total_discharges as f64, observed),
            emergency_rate: ratio(sum.emergency_admissions as f64, sum.total_admissions as f64)
                * 100.0,
            mortality_rate: ratio(sum.deaths as f64, sum.total_discharges as f64) * 100.0,
        }
    })
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0)
}

/// Compares a period's actuals with the entity's census, admissions and
/// length-of-stay targets.
pub fn kpi_achievement(period: &PeriodAggregate, target: &EntityTarget) -> KpiAchievement {
    let days = period.days_in_period as f64;
    let weekly_avg_admissions = ratio(period.total_admissions as f64, days) * 7.0;

    let daily_census_target = positive(target.daily_census_target);
    let weekly_admissions_target = positive(target.weekly_admissions_target);
    let avg_los_target = positive(target.avg_los_target);

    KpiAchievement {
        scope: period.scope.clone(),
        start: period.start,
        end: period.end,
        avg_daily_census: period.avg_daily_census,
        weekly_avg_admissions,
        alos: period.alos,
        daily_census_target,
        weekly_admissions_target,
        avg_los_target,
        daily_census_achievement: daily_census_target
            .map_or(0.0, |t| period.avg_daily_census * 100.0 / t),
        weekly_admissions_achievement: weekly_admissions_target
            .map_or(0.0, |t| weekly_avg_admissions * 100.0 / t),
        avg_los_achievement: avg_los_target.map_or(0.0, |t| ratio(t * 100.0, period.alos)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiStatus {
    Good,
    Warning,
    Alert,
}

impl KpiStatus {
    /// With `reverse`, lower values are better (e.g. length of stay).
    pub fn classify(value: f64, good: f64, warning: f64, reverse: bool) -> Self {
        if reverse {
            if value < good {
                KpiStatus::Good
            } else if value < warning {
                KpiStatus::Warning
            } else {
                KpiStatus::Alert
            }
        } else if value > good {
            KpiStatus::Good
        } else if value > warning {
            KpiStatus::Warning
        } else {
            KpiStatus::Alert
        }
    }
}

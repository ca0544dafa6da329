//! Normalizes raw daily rows into [`DerivedDailyRecord`]s.
//!
//! Column fallbacks are decided once per batch from the set of columns the
//! source actually carried. Nothing downstream looks at raw columns again.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use log::{info, warn};
use serde::Serialize;

use crate::error::{PreprocessError, Violation};
use crate::holidays::{classify_weekday_with, HolidayCalendar, JapaneseCalendar};
use crate::models::{DailyRecord, DerivedDailyRecord};

/// Patient-days above this on a single row are flagged.
pub const PATIENT_DAYS_LIMIT: i64 = 1000;
pub const ZERO_RATIO_LIMIT: f64 = 0.10;
pub const OUTLIER_SIGMA: f64 = 3.0;
pub const MIN_RECOMMENDED_SPAN_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Column {
    Date,
    Ward,
    Department,
    Census,
    Admissions,
    EmergencyAdmissions,
    Discharges,
    Deaths,
}

impl Column {
    pub const ALL: [Column; 8] = [
        Column::Date,
        Column::Ward,
        Column::Department,
        Column::Census,
        Column::Admissions,
        Column::EmergencyAdmissions,
        Column::Discharges,
        Column::Deaths,
    ];

    pub const REQUIRED: [Column; 3] = [Column::Date, Column::Ward, Column::Census];

    pub fn canonical_name(self) -> &'static str {
        match self {
            Column::Date => "date",
            Column::Ward => "ward_code",
            Column::Department => "department",
            Column::Census => "census_count",
            Column::Admissions => "admissions",
            Column::EmergencyAdmissions => "emergency_admissions",
            Column::Discharges => "discharges",
            Column::Deaths => "deaths",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// Columns present in the source batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSet(BTreeSet<Column>);

impl ColumnSet {
    pub fn all() -> Self {
        Column::ALL.into_iter().collect()
    }

    pub fn contains(&self, column: Column) -> bool {
        self.0.contains(&column)
    }

    pub fn without(mut self, column: Column) -> Self {
        self.0.remove(&column);
        self
    }
}

impl FromIterator<Column> for ColumnSet {
    fn from_iter<I: IntoIterator<Item = Column>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    pub columns: ColumnSet,
    pub rows: Vec<DailyRecord>,
}

/// How a combined total is built from a primary and a secondary column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    Combined,
    PrimaryOnly,
    Absent,
}

impl Fallback {
    pub fn resolve(columns: &ColumnSet, primary: Column, secondary: Column) -> Self {
        match (columns.contains(primary), columns.contains(secondary)) {
            (true, true) => Fallback::Combined,
            (true, false) => Fallback::PrimaryOnly,
            (false, _) => Fallback::Absent,
        }
    }

    pub fn apply(self, primary: i64, secondary: i64) -> i64 {
        match self {
            Fallback::Combined => primary.saturating_add(secondary),
            Fallback::PrimaryOnly => primary,
            Fallback::Absent => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Warning {
    ColumnAbsent { column: Column, effect: &'static str },
    RowsDropped { reason: &'static str, count: usize },
    MissingCensus { rows: usize },
    NegativeValues { column: &'static str, count: usize },
    Outliers { column: &'static str, count: usize },
    HighZeroRatio { ratio: f64 },
    PatientDaysAboveLimit { max: i64 },
    PatientDaysBelowCensus { rows: usize },
    ShortSpan { days: i64 },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::ColumnAbsent { column, effect } => {
                write!(f, "column '{column}' is absent; {effect}")
            }
            Warning::RowsDropped { reason, count } => write!(f, "dropped {count} rows: {reason}"),
            Warning::MissingCensus { rows } => {
                write!(f, "{rows} rows have no census count; patient-days set to 0")
            }
            Warning::NegativeValues { column, count } => {
                write!(f, "column '{column}' has {count} negative values")
            }
            Warning::Outliers { column, count } => {
                write!(f, "column '{column}' has {count} values beyond 3 standard deviations")
            }
            Warning::HighZeroRatio { ratio } => {
                write!(f, "{:.1}% of rows have zero patient-days", ratio * 100.0)
            }
            Warning::PatientDaysAboveLimit { max } => {
                write!(f, "patient-days reach {max}, above the plausible limit")
            }
            Warning::PatientDaysBelowCensus { rows } => {
                write!(f, "{rows} rows have fewer patient-days than census")
            }
            Warning::ShortSpan { days } => write!(
                f,
                "data spans only {days} days; at least {MIN_RECOMMENDED_SPAN_DAYS} are recommended"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Note {
    DuplicatesRemoved(usize),
    BlankCellsFilled { column: Column, count: usize },
    SecondaryColumnAbsent { total: &'static str, column: Column },
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Note::DuplicatesRemoved(count) => write!(f, "removed {count} duplicate rows"),
            Note::BlankCellsFilled { column, count } => {
                write!(f, "filled {count} blank '{column}' cells with 0")
            }
            Note::SecondaryColumnAbsent { total, column } => {
                write!(f, "'{column}' is absent; {total} uses the primary column only")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatientDaysSummary {
    pub total: i64,
    pub mean: f64,
    pub max: i64,
    pub min: i64,
    pub zero_rows: usize,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub warnings: Vec<Warning>,
    pub notes: Vec<Note>,
    pub patient_days: PatientDaysSummary,
}

#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub records: Vec<DerivedDailyRecord>,
    pub report: ValidationReport,
}

/// census + discharges, clipped at 0. `None` when the census cell is missing.
pub fn derive_patient_days(row: &DailyRecord) -> Option<i64> {
    let census = row.census_count?;
    Some(census.saturating_add(row.discharges.unwrap_or(0)).max(0))
}

pub fn preprocess(batch: RawBatch) -> Result<Preprocessed, PreprocessError> {
    preprocess_with(batch, &JapaneseCalendar)
}

pub fn preprocess_with<C: HolidayCalendar + ?Sized>(
    batch: RawBatch,
    calendar: &C,
) -> Result<Preprocessed, PreprocessError> {
    let RawBatch { columns, rows } = batch;

    let violations: Vec<Violation> = Column::REQUIRED
        .into_iter()
        .filter(|column| !columns.contains(*column))
        .map(Violation::MissingColumn)
        .collect();
    if !violations.is_empty() {
        return Err(PreprocessError::Validation(violations));
    }

    let mut report = ValidationReport::default();
    let admissions_rule = resolve_total(
        &columns,
        Column::Admissions,
        Column::EmergencyAdmissions,
        "total_admissions",
        &mut report,
    );
    let discharges_rule = resolve_total(
        &columns,
        Column::Discharges,
        Column::Deaths,
        "total_discharges",
        &mut report,
    );
    if !columns.contains(Column::Department) {
        report.warnings.push(Warning::ColumnAbsent {
            column: Column::Department,
            effect: "department scoring is unavailable",
        });
    }

    let cleaned = clean_rows(rows, &mut report);
    if cleaned.kept.is_empty() {
        return Err(PreprocessError::Validation(vec![Violation::EmptyAfterCleaning {
            dropped_rows: cleaned.dropped,
        }]));
    }

    let mut blanks = [0usize; 5];
    let mut missing_census = 0usize;
    let mut records = Vec::with_capacity(cleaned.kept.len());

    for row in cleaned.kept {
        let patient_days = derive_patient_days(&row).unwrap_or_else(|| {
            missing_census += 1;
            0
        });
        let cells = [
            (Column::Census, row.census_count),
            (Column::Admissions, row.admissions),
            (Column::EmergencyAdmissions, row.emergency_admissions),
            (Column::Discharges, row.discharges),
            (Column::Deaths, row.deaths),
        ];
        for (slot, (column, value)) in blanks.iter_mut().zip(cells) {
            if value.is_none() && columns.contains(column) {
                *slot += 1;
            }
        }

        let census_count = row.census_count.unwrap_or(0);
        let admissions = row.admissions.unwrap_or(0);
        let emergency_admissions = row.emergency_admissions.unwrap_or(0);
        let discharges = row.discharges.unwrap_or(0);
        let deaths = row.deaths.unwrap_or(0);
        // Both are guaranteed by clean_rows.
        let (Some(date), Some(ward)) = (row.date, row.ward) else {
            continue;
        };

        records.push(DerivedDailyRecord {
            date,
            ward,
            department: row.department,
            census_count,
            admissions,
            emergency_admissions,
            discharges,
            deaths,
            total_admissions: admissions_rule.apply(admissions, emergency_admissions),
            total_discharges: discharges_rule.apply(discharges, deaths),
            patient_days,
            day_kind: classify_weekday_with(calendar, date),
        });
    }

    let numeric_columns = [
        Column::Census,
        Column::Admissions,
        Column::EmergencyAdmissions,
        Column::Discharges,
        Column::Deaths,
    ];
    for (column, count) in numeric_columns.into_iter().zip(blanks) {
        if count > 0 {
            report.notes.push(Note::BlankCellsFilled { column, count });
        }
    }
    if missing_census > 0 {
        report.warnings.push(Warning::MissingCensus {
            rows: missing_census,
        });
    }

    report.warnings.extend(validate(&records));
    report.patient_days = summarize_patient_days(&records);

    for warning in &report.warnings {
        warn!("preprocess: {warning}");
    }
    info!(
        "preprocess: {} rows kept, {} dropped, {} warnings",
        records.len(),
        cleaned.dropped,
        report.warnings.len()
    );

    Ok(Preprocessed { records, report })
}

fn resolve_total(
    columns: &ColumnSet,
    primary: Column,
    secondary: Column,
    total: &'static str,
    report: &mut ValidationReport,
) -> Fallback {
    let rule = Fallback::resolve(columns, primary, secondary);
    match rule {
        Fallback::Combined => {}
        Fallback::PrimaryOnly => report.notes.push(Note::SecondaryColumnAbsent {
            total,
            column: secondary,
        }),
        Fallback::Absent => report.warnings.push(Warning::ColumnAbsent {
            column: primary,
            effect: match primary {
                Column::Admissions => "total_admissions defaults to 0",
                _ => "total_discharges defaults to 0",
            },
        }),
    }
    rule
}

struct Cleaned {
    kept: Vec<DailyRecord>,
    dropped: usize,
}

fn clean_rows(rows: Vec<DailyRecord>, report: &mut ValidationReport) -> Cleaned {
    let total = rows.len();
    let mut missing_ward = 0usize;
    let mut missing_date = 0usize;

    let usable: Vec<DailyRecord> = rows
        .into_iter()
        .filter_map(|mut row| {
            row.ward = row
                .ward
                .take()
                .map(|ward| ward.trim().to_string())
                .filter(|ward| !ward.is_empty());
            row.department = row
                .department
                .take()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty());
            if row.ward.is_none() {
                missing_ward += 1;
                return None;
            }
            if row.date.is_none() {
                missing_date += 1;
                return None;
            }
            Some(row)
        })
        .collect();

    if missing_ward > 0 {
        report.warnings.push(Warning::RowsDropped {
            reason: "missing ward code",
            count: missing_ward,
        });
    }
    if missing_date > 0 {
        report.warnings.push(Warning::RowsDropped {
            reason: "missing or invalid date",
            count: missing_date,
        });
    }

    let before_dedup = usable.len();
    let mut seen = HashSet::with_capacity(before_dedup);
    let kept: Vec<DailyRecord> = usable
        .into_iter()
        .filter(|row| seen.insert(row.clone()))
        .collect();
    let duplicates = before_dedup - kept.len();
    if duplicates > 0 {
        report.notes.push(Note::DuplicatesRemoved(duplicates));
    }

    Cleaned {
        dropped: total - kept.len(),
        kept,
    }
}

/// Statistical checks over a derived batch. Everything found here is a
/// warning; none of it blocks aggregation.
pub fn validate(records: &[DerivedDailyRecord]) -> Vec<Warning> {
    let mut warnings = Vec::new();
    if records.is_empty() {
        return warnings;
    }

    if let (Some(first), Some(last)) = (
        records.iter().map(|r| r.date).min(),
        records.iter().map(|r| r.date).max(),
    ) {
        let span = (last - first).num_days();
        if span < MIN_RECOMMENDED_SPAN_DAYS {
            warnings.push(Warning::ShortSpan { days: span });
        }
    }

    let checked: [(&'static str, Vec<f64>); 3] = [
        (
            "census_count",
            records.iter().map(|r| r.census_count as f64).collect(),
        ),
        (
            "total_admissions",
            records.iter().map(|r| r.total_admissions as f64).collect(),
        ),
        (
            "total_discharges",
            records.iter().map(|r| r.total_discharges as f64).collect(),
        ),
    ];

    for (column, values) in &checked {
        let negatives = values.iter().filter(|v| **v < 0.0).count();
        if negatives > 0 {
            warnings.push(Warning::NegativeValues {
                column: *column,
                count: negatives,
            });
        }
    }

    for (column, values) in &checked {
        let outliers = count_outliers(values);
        if outliers > 0 {
            warnings.push(Warning::Outliers {
                column: *column,
                count: outliers,
            });
        }
    }

    let max_patient_days = records.iter().map(|r| r.patient_days).max().unwrap_or(0);
    if max_patient_days > PATIENT_DAYS_LIMIT {
        warnings.push(Warning::PatientDaysAboveLimit {
            max: max_patient_days,
        });
    }

    let zero_rows = records.iter().filter(|r| r.patient_days == 0).count();
    let ratio = zero_rows as f64 / records.len() as f64;
    if ratio > ZERO_RATIO_LIMIT {
        warnings.push(Warning::HighZeroRatio { ratio });
    }

    let below_census = records
        .iter()
        .filter(|r| r.patient_days < r.census_count)
        .count();
    if below_census > 0 {
        warnings.push(Warning::PatientDaysBelowCensus { rows: below_census });
    }

    warnings
}

fn count_outliers(values: &[f64]) -> usize {
    if values.len() < 2 {
        return 0;
    }
    let mean = crate::aggregate::mean(values);
    let std = crate::aggregate::sample_std(values);
    if std <= 0.0 {
        return 0;
    }
    values
        .iter()
        .filter(|v| (**v - mean).abs() > OUTLIER_SIGMA * std)
        .count()
}

fn summarize_patient_days(records: &[DerivedDailyRecord]) -> PatientDaysSummary {
    let rows = records.len();
    if rows == 0 {
        return PatientDaysSummary::default();
    }
    let total = records
        .iter()
        .fold(0i64, |acc, r| acc.saturating_add(r.patient_days));
    PatientDaysSummary {
        total,
        mean: total as f64 / rows as f64,
        max: records.iter().map(|r| r.patient_days).max().unwrap_or(0),
        min: records.iter().map(|r| r.patient_days).min().unwrap_or(0),
        zero_rows: records.iter().filter(|r| r.patient_days == 0).count(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    use crate::models::DayKind;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    fn row(day: i64, ward: &str, census: Option<i64>) -> DailyRecord {
        DailyRecord {
            date: Some(start() + Duration::days(day)),
            ward: Some(ward.to_string()),
            department: Some("Internal Medicine".to_string()),
            census_count: census,
            admissions: Some(3),
            emergency_admissions: Some(1),
            discharges: Some(2),
            deaths: Some(1),
        }
    }

    fn month_of_rows() -> Vec<DailyRecord> {
        (0..40).map(|day| row(day, "4B", Some(40))).collect()
    }

    #[test]
    fn patient_days_add_discharges_and_clip_at_zero() {
        let mut r = row(0, "4B", Some(40));
        assert_eq!(derive_patient_days(&r), Some(42));
        r.census_count = Some(-5);
        assert_eq!(derive_patient_days(&r), Some(0));
        r.census_count = None;
        assert_eq!(derive_patient_days(&r), None);
    }

    #[test]
    fn totals_combine_primary_and_secondary() {
        let batch = RawBatch {
            columns: ColumnSet::all(),
            rows: month_of_rows(),
        };
        let out = preprocess(batch).unwrap();
        let first = &out.records[0];
        assert_eq!(first.total_admissions, 4);
        assert_eq!(first.total_discharges, 3);
        assert_eq!(first.patient_days, 42);
        assert_eq!(first.day_kind, DayKind::Weekday);
    }

    #[test]
    fn absent_secondary_column_falls_back_to_primary() {
        let rows = month_of_rows()
            .into_iter()
            .map(|mut r| {
                r.emergency_admissions = None;
                r.deaths = None;
                r
            })
            .collect();
        let batch = RawBatch {
            columns: ColumnSet::all()
                .without(Column::EmergencyAdmissions)
                .without(Column::Deaths),
            rows,
        };
        let out = preprocess(batch).unwrap();
        assert_eq!(out.records[0].total_admissions, 3);
        assert_eq!(out.records[0].total_discharges, 2);
        assert!(out
            .report
            .notes
            .iter()
            .any(|n| matches!(n, Note::SecondaryColumnAbsent { .. })));
    }

    #[test]
    fn absent_primary_column_defaults_to_zero_with_warning() {
        let batch = RawBatch {
            columns: ColumnSet::all().without(Column::Admissions),
            rows: month_of_rows(),
        };
        let out = preprocess(batch).unwrap();
        assert_eq!(out.records[0].total_admissions, 0);
        assert!(out.report.warnings.iter().any(|w| matches!(
            w,
            Warning::ColumnAbsent {
                column: Column::Admissions,
                ..
            }
        )));
    }

    #[test]
    fn missing_required_columns_are_reported_together() {
        let batch = RawBatch {
            columns: ColumnSet::all().without(Column::Date).without(Column::Census),
            rows: month_of_rows(),
        };
        let err = preprocess(batch).unwrap_err();
        assert_eq!(
            err.violations(),
            &[
                Violation::MissingColumn(Column::Date),
                Violation::MissingColumn(Column::Census)
            ]
        );
    }

    #[test]
    fn empty_after_cleaning_is_a_hard_error() {
        let rows = vec![
            DailyRecord {
                ward: None,
                ..row(0, "4B", Some(10))
            },
            DailyRecord {
                date: None,
                ..row(1, "4B", Some(10))
            },
        ];
        let batch = RawBatch {
            columns: ColumnSet::all(),
            rows,
        };
        let err = preprocess(batch).unwrap_err();
        assert_eq!(
            err.violations(),
            &[Violation::EmptyAfterCleaning { dropped_rows: 2 }]
        );
    }

    #[test]
    fn missing_census_is_a_soft_failure() {
        let mut rows = month_of_rows();
        rows[3].census_count = None;
        let out = preprocess(RawBatch {
            columns: ColumnSet::all(),
            rows,
        })
        .unwrap();
        assert_eq!(out.records[3].patient_days, 0);
        assert!(out
            .report
            .warnings
            .contains(&Warning::MissingCensus { rows: 1 }));
    }

    #[test]
    fn duplicates_and_blank_wards_are_cleaned() {
        let mut rows = month_of_rows();
        rows.push(rows[0].clone());
        rows.push(DailyRecord {
            ward: Some("   ".to_string()),
            ..row(2, "4B", Some(40))
        });
        let out = preprocess(RawBatch {
            columns: ColumnSet::all(),
            rows,
        })
        .unwrap();
        assert_eq!(out.records.len(), 40);
        assert!(out.report.notes.contains(&Note::DuplicatesRemoved(1)));
        assert!(out.report.warnings.contains(&Warning::RowsDropped {
            reason: "missing ward code",
            count: 1
        }));
    }

    #[test]
    fn oversized_census_cells_become_warnings() {
        let raw = "date,ward_code,census_count,discharges\n2026-04-01,3A,1e30,5\n2026-04-02,3A,40,2\n";
        let batch = crate::load::read_census(raw.as_bytes()).unwrap();
        let out = preprocess(batch).unwrap();
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].patient_days, 0);
        assert_eq!(out.records[1].patient_days, 42);
        assert!(out
            .report
            .warnings
            .contains(&Warning::MissingCensus { rows: 1 }));
    }

    #[test]
    fn extreme_values_saturate_instead_of_overflowing() {
        let mut r = row(0, "4B", Some(i64::MAX));
        r.discharges = Some(5);
        assert_eq!(derive_patient_days(&r), Some(i64::MAX));
        assert_eq!(Fallback::Combined.apply(i64::MAX, 1), i64::MAX);
        assert_eq!(Fallback::PrimaryOnly.apply(7, 1), 7);
    }

    #[test]
    fn statistical_checks_accumulate_warnings() {
        let mut rows: Vec<DailyRecord> = (0..20).map(|d| row(d, "4B", Some(0))).collect();
        rows.iter_mut().for_each(|r| r.discharges = Some(0));
        rows[5].census_count = Some(-3);
        let out = preprocess(RawBatch {
            columns: ColumnSet::all(),
            rows,
        })
        .unwrap();
        let warnings = &out.report.warnings;
        assert!(warnings.iter().any(|w| matches!(w, Warning::ShortSpan { days: 19 })));
        assert!(warnings.iter().any(|w| matches!(
            w,
            Warning::NegativeValues {
                column: "census_count",
                count: 1
            }
        )));
        assert!(warnings.iter().any(|w| matches!(w, Warning::HighZeroRatio { .. })));
    }

    #[test]
    fn outliers_beyond_three_sigma_are_flagged() {
        let mut rows = month_of_rows();
        rows[10].census_count = Some(4000);
        let out = preprocess(RawBatch {
            columns: ColumnSet::all(),
            rows,
        })
        .unwrap();
        assert!(out.report.warnings.iter().any(|w| matches!(
            w,
            Warning::Outliers {
                column: "census_count",
                count: 1
            }
        )));
        assert!(out
            .report
            .warnings
            .iter()
            .any(|w| matches!(w, Warning::PatientDaysAboveLimit { max: 4002 })));
    }
}

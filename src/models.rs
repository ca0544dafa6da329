use std::fmt;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Organizational unit kind. Wards are keyed by code, departments by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Ward,
    Department,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Ward => "ward",
            EntityKind::Department => "department",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn ward(code: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Ward,
            id: code.into(),
        }
    }

    pub fn department(name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Department,
            id: name.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Grouping key for aggregation: one entity or the whole organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Organization,
    Entity(EntityRef),
}

impl Scope {
    pub fn matches(&self, record: &DerivedDailyRecord) -> bool {
        match self {
            Scope::Organization => true,
            Scope::Entity(entity) => record.belongs_to(entity),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Organization => f.write_str("organization"),
            Scope::Entity(entity) => entity.fmt(f),
        }
    }
}

/// One raw daily row as produced by the ingestion collaborator.
///
/// Numeric cells are optional: a blank or unparseable cell is `None`.
/// Whether a column exists at all is tracked separately by the batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DailyRecord {
    pub date: Option<NaiveDate>,
    pub ward: Option<String>,
    pub department: Option<String>,
    pub census_count: Option<i64>,
    pub admissions: Option<i64>,
    pub emergency_admissions: Option<i64>,
    pub discharges: Option<i64>,
    pub deaths: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayKind {
    Weekday,
    Holiday,
}

/// A cleaned row in the canonical schema. Every numeric field is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivedDailyRecord {
    pub date: NaiveDate,
    pub ward: String,
    pub department: Option<String>,
    pub census_count: i64,
    pub admissions: i64,
    pub emergency_admissions: i64,
    pub discharges: i64,
    pub deaths: i64,
    pub total_admissions: i64,
    pub total_discharges: i64,
    pub patient_days: i64,
    pub day_kind: DayKind,
}

impl DerivedDailyRecord {
    pub fn belongs_to(&self, entity: &EntityRef) -> bool {
        match entity.kind {
            EntityKind::Ward => self.ward == entity.id,
            EntityKind::Department => self.department.as_deref() == Some(entity.id.as_str()),
        }
    }

    pub fn is_weekday(&self) -> bool {
        self.day_kind == DayKind::Weekday
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodAggregate {
    pub scope: Scope,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days_in_period: i64,
    pub row_count: usize,
    pub total_patient_days: i64,
    pub total_admissions: i64,
    pub total_discharges: i64,
    pub emergency_admissions: i64,
    pub deaths: i64,
    pub avg_daily_census: f64,
    pub avg_daily_admissions: f64,
    pub avg_daily_discharges: f64,
    pub alos: f64,
    pub turnover_rate: f64,
    /// `None` when no positive bed count applies.
    pub occupancy_rate: Option<f64>,
    pub emergency_rate: f64,
    pub mortality_rate: f64,
    pub weekday_avg_census: f64,
    pub holiday_avg_census: f64,
    pub ward_count: usize,
    pub department_count: usize,
    pub latest_date: NaiveDate,
}

/// Returned in place of a [`PeriodAggregate`] when no rows match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmptyResult {
    pub scope: Scope,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Aggregation {
    Period(PeriodAggregate),
    Empty(EmptyResult),
}

impl Aggregation {
    pub fn period(&self) -> Option<&PeriodAggregate> {
        match self {
            Aggregation::Period(period) => Some(period),
            Aggregation::Empty(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Aggregation::Empty(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub census: i64,
    pub patient_days: i64,
    pub total_admissions: i64,
    pub total_discharges: i64,
    pub census_rolling_mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyAggregate {
    pub scope: Scope,
    /// ISO week label, e.g. `2026-W07`.
    pub week: String,
    pub week_end: NaiveDate,
    pub avg_census: f64,
    pub admissions_sum: i64,
    pub discharges_sum: i64,
    pub net_flow: i64,
    pub achievement_rate: Option<f64>,
    pub prior_week_avg_census: Option<f64>,
    pub improved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyAggregate {
    pub scope: Scope,
    /// `YYYY-MM`
    pub month: String,
    pub patient_days: i64,
    pub total_admissions: i64,
    pub total_discharges: i64,
    pub observed_days: usize,
    pub alos: f64,
    pub avg_daily_census: f64,
    pub alos_moving_avg: f64,
}

/// Per-weekday averages of the per-date sums, Monday first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DowAggregate {
    pub weekday: Weekday,
    /// Dates of this weekday with at least one row.
    pub observed_days: usize,
    pub census_sum: i64,
    pub admissions_sum: i64,
    pub discharges_sum: i64,
    pub emergency_admissions_sum: i64,
    pub deaths_sum: i64,
    pub avg_census: f64,
    pub avg_admissions: f64,
    pub avg_discharges: f64,
    pub emergency_rate: f64,
    pub mortality_rate: f64,
}

/// Period actuals against an entity's configured targets. Each achievement
/// is 0 when its target is missing or the actual it divides by is zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiAchievement {
    pub scope: Scope,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub avg_daily_census: f64,
    pub weekly_avg_admissions: f64,
    pub alos: f64,
    pub daily_census_target: Option<f64>,
    pub weekly_admissions_target: Option<f64>,
    pub avg_los_target: Option<f64>,
    pub daily_census_achievement: f64,
    pub weekly_admissions_achievement: f64,
    /// target / ALOS × 100; a shorter stay than target scores above 100.
    pub avg_los_achievement: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Grade {
    S,
    A,
    B,
    C,
    D,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score >= 85.0 {
            Grade::S
        } else if score >= 75.0 {
            Grade::A
        } else if score >= 65.0 {
            Grade::B
        } else if score >= 50.0 {
            Grade::C
        } else {
            Grade::D
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Grade::S => "S",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    pub entity_id: String,
    pub entity_name: String,
    pub entity_type: EntityKind,
    pub achievement_score: f64,
    pub improvement_score: f64,
    pub stability_score: f64,
    pub sustainability_score: f64,
    pub bed_efficiency_score: f64,
    pub total_score: f64,
    pub latest_achievement_rate: f64,
    pub improvement_rate: f64,
    /// `None` for departments and for wards without a positive bed count.
    pub bed_utilization: Option<f64>,
    pub recent_week_avg_census: f64,
    pub target_census: f64,
    pub prior_period_avg: f64,
}

impl ScoreResult {
    pub fn grade(&self) -> Grade {
        Grade::from_score(self.total_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grades_follow_score_bands() {
        assert_eq!(Grade::from_score(92.0), Grade::S);
        assert_eq!(Grade::from_score(85.0), Grade::S);
        assert_eq!(Grade::from_score(80.0), Grade::A);
        assert_eq!(Grade::from_score(65.0), Grade::B);
        assert_eq!(Grade::from_score(50.0), Grade::C);
        assert_eq!(Grade::from_score(49.9), Grade::D);
    }

    #[test]
    fn department_membership_uses_name() {
        let record = DerivedDailyRecord {
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            ward: "5A".to_string(),
            department: Some("Cardiology".to_string()),
            census_count: 30,
            admissions: 2,
            emergency_admissions: 1,
            discharges: 3,
            deaths: 0,
            total_admissions: 3,
            total_discharges: 3,
            patient_days: 33,
            day_kind: DayKind::Weekday,
        };

        assert!(record.belongs_to(&EntityRef::ward("5A")));
        assert!(record.belongs_to(&EntityRef::department("Cardiology")));
        assert!(!record.belongs_to(&EntityRef::department("5A")));
        assert!(Scope::Organization.matches(&record));
    }
}

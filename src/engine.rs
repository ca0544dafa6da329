//! Entry point over one preprocessed batch.
//!
//! Holds the derived records with their targets and thresholds, and
//! resolves bed counts and census targets per scope before delegating to
//! the aggregation and scoring functions.

use chrono::NaiveDate;
use log::info;

use crate::aggregate;
use crate::cache;
use crate::error::NoScore;
use crate::models::{
    Aggregation, DailyPoint, DerivedDailyRecord, DowAggregate, EntityKind, EntityRef,
    KpiAchievement, MonthlyAggregate, ScoreResult, Scope, WeeklyAggregate,
};
use crate::scoring;
use crate::targets::TargetConfig;
use crate::thresholds::ScoringConfig;

pub const DAILY_ROLLING_WINDOW: usize = 7;
pub const MONTHLY_ROLLING_WINDOW: usize = 3;

#[derive(Debug, Clone)]
pub struct KpiEngine {
    records: Vec<DerivedDailyRecord>,
    targets: TargetConfig,
    config: ScoringConfig,
    total_beds: Option<u32>,
}

impl KpiEngine {
    /// Rows of excluded wards are dropped here and never reach any KPI.
    pub fn new(mut records: Vec<DerivedDailyRecord>, targets: TargetConfig) -> Self {
        let before = records.len();
        records.retain(|r| !targets.is_excluded_ward(&r.ward));
        if records.len() < before {
            info!("engine: dropped {} rows of excluded wards", before - records.len());
        }
        let total_beds = targets.total_beds();
        Self {
            records,
            targets,
            config: ScoringConfig::default(),
            total_beds,
        }
    }

    pub fn with_config(mut self, config: ScoringConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the organization bed count derived from ward targets.
    pub fn with_total_beds(mut self, beds: u32) -> Self {
        self.total_beds = Some(beds);
        self
    }

    pub fn records(&self) -> &[DerivedDailyRecord] {
        &self.records
    }

    pub fn fingerprint(&self) -> u64 {
        cache::fingerprint(&self.records)
    }

    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.records.iter().map(|r| r.date).min()?;
        let last = self.records.iter().map(|r| r.date).max()?;
        Some((first, last))
    }

    pub fn beds_for(&self, scope: &Scope) -> Option<u32> {
        match scope {
            Scope::Organization => self.total_beds.filter(|beds| *beds > 0),
            Scope::Entity(entity) => self.targets.bed_count(entity),
        }
    }

    fn census_target(&self, scope: &Scope) -> Option<f64> {
        match scope {
            Scope::Organization => None,
            Scope::Entity(entity) => self.targets.daily_census_target(entity),
        }
    }

    pub fn aggregate(&self, scope: &Scope, start: NaiveDate, end: NaiveDate) -> Aggregation {
        aggregate::aggregate(&self.records, scope, start, end, self.beds_for(scope))
    }

    pub fn daily_series(&self, scope: &Scope, start: NaiveDate, end: NaiveDate) -> Vec<DailyPoint> {
        aggregate::daily_series(&self.records, scope, start, end, DAILY_ROLLING_WINDOW)
    }

    pub fn weekly_series(
        &self,
        scope: &Scope,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<WeeklyAggregate> {
        aggregate::weekly_series(&self.records, scope, start, end, self.census_target(scope))
    }

    pub fn monthly_series(
        &self,
        scope: &Scope,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<MonthlyAggregate> {
        aggregate::monthly_series(&self.records, scope, start, end, MONTHLY_ROLLING_WINDOW)
    }

    pub fn dow_summary(&self, scope: &Scope, start: NaiveDate, end: NaiveDate) -> [DowAggregate; 7] {
        aggregate::dow_summary(&self.records, scope, start, end)
    }

    /// Period actuals against the entity's targets; `None` when the entity
    /// has no rows in the window. Unconfigured entities get zero achievements.
    pub fn achievement(
        &self,
        entity: &EntityRef,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<KpiAchievement> {
        let scope = Scope::Entity(entity.clone());
        let aggregation = self.aggregate(&scope, start, end);
        let period = aggregation.period()?;
        let target = self.targets.get(entity).cloned().unwrap_or_default();
        Some(aggregate::kpi_achievement(period, &target))
    }

    pub fn score_entity(&self, entity: &EntityRef, as_of: NaiveDate) -> Result<ScoreResult, NoScore> {
        scoring::score_entity(&self.records, entity, &self.targets, &self.config, as_of)
    }

    pub fn score_all(&self, entities: &[EntityRef], as_of: NaiveDate) -> Vec<ScoreResult> {
        scoring::score_all(&self.records, entities, &self.targets, &self.config, as_of)
    }

    /// Scores every configured entity of one kind.
    pub fn score_kind(&self, kind: EntityKind, as_of: NaiveDate) -> Vec<ScoreResult> {
        self.score_all(&self.targets.entities(kind), as_of)
    }
}

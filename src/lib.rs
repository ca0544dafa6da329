//! Ward and department census KPIs with composite performance scoring.
//!
//! Raw rows go through [`preprocess`] once per batch. Everything after that
//! works on [`DerivedDailyRecord`]s and is pure: [`aggregate`] for period
//! KPIs and series, [`scoring`] for the 0–105 performance score.

pub mod aggregate;
pub mod cache;
pub mod engine;
pub mod error;
pub mod holidays;
pub mod load;
pub mod models;
pub mod period;
pub mod preprocess;
pub mod scoring;
pub mod targets;
pub mod thresholds;

pub use aggregate::KpiStatus;
pub use engine::KpiEngine;
pub use error::{ConfigError, LoadError, NoScore, PreprocessError, Violation};
pub use models::{
    Aggregation, DailyPoint, DailyRecord, DayKind, DerivedDailyRecord, DowAggregate, EmptyResult,
    EntityKind, EntityRef, Grade, KpiAchievement, MonthlyAggregate, PeriodAggregate, ScoreResult,
    Scope, WeeklyAggregate,
};
pub use period::{DateRange, PeriodPreset};
pub use preprocess::{preprocess, Preprocessed, RawBatch, ValidationReport};
pub use targets::{EntityTarget, TargetConfig};
pub use thresholds::ScoringConfig;

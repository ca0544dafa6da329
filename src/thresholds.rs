//! Scoring thresholds as ordered, declarative tables.
//!
//! Every table is evaluated first-match in declaration order. Changing a
//! boundary or a point value never touches scoring control flow.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Upper bound for `evaluation_days` and `recent_week_days`, about ten years.
pub const MAX_WINDOW_DAYS: i64 = 3660;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub bound: f64,
    pub points: f64,
}

const fn band(bound: f64, points: f64) -> Band {
    Band { bound, points }
}

/// `value >= bound` against bounds in descending order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AtLeastTable(pub Vec<Band>);

impl AtLeastTable {
    pub fn lookup(&self, value: f64) -> f64 {
        self.0
            .iter()
            .find(|b| value >= b.bound)
            .map_or(0.0, |b| b.points)
    }

    pub fn max_points(&self) -> f64 {
        self.0.iter().map(|b| b.points).fold(0.0, f64::max)
    }

    fn is_ordered(&self) -> bool {
        self.0.windows(2).all(|w| w[0].bound > w[1].bound)
    }
}

/// `value < bound` against bounds in ascending order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BelowTable(pub Vec<Band>);

impl BelowTable {
    pub fn lookup(&self, value: f64) -> f64 {
        self.0
            .iter()
            .find(|b| value < b.bound)
            .map_or(0.0, |b| b.points)
    }

    fn is_ordered(&self) -> bool {
        self.0.windows(2).all(|w| w[0].bound < w[1].bound)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreakBand {
    pub weeks: usize,
    pub points: f64,
}

/// Streak length → points, longest streak first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreakTable(pub Vec<StreakBand>);

impl StreakTable {
    pub fn lookup(&self, streak: usize) -> Option<f64> {
        self.0.iter().find(|b| streak >= b.weeks).map(|b| b.points)
    }

    fn is_ordered(&self) -> bool {
        self.0.windows(2).all(|w| w[0].weeks > w[1].weeks)
    }
}

fn streak_defaults() -> StreakTable {
    StreakTable(vec![
        StreakBand {
            weeks: 4,
            points: 10.0,
        },
        StreakBand {
            weeks: 3,
            points: 7.0,
        },
        StreakBand {
            weeks: 2,
            points: 4.0,
        },
    ])
}

/// Aggregate high-performance rules over a full sustainability window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighPerformanceBonus {
    /// Window average at or above the achievement target.
    pub average_points: f64,
    /// At least `majority_weeks` weeks at or above the target.
    pub majority_weeks: usize,
    pub majority_points: f64,
    /// No week below `floor_rate`.
    pub floor_rate: f64,
    pub floor_points: f64,
}

impl Default for HighPerformanceBonus {
    fn default() -> Self {
        Self {
            average_points: 4.0,
            majority_weeks: 3,
            majority_points: 4.0,
            floor_rate: 90.0,
            floor_points: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BedEfficiencyRule {
    pub min_utilization: f64,
    pub min_achievement: f64,
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub achievement: AtLeastTable,
    pub improvement: AtLeastTable,
    pub stability: BelowTable,
    pub improvement_streak: StreakTable,
    pub achievement_streak: StreakTable,
    pub high_performance: HighPerformanceBonus,
    pub bed_efficiency: Vec<BedEfficiencyRule>,
    /// Achievement rate (%) that counts as meeting target.
    pub target_rate: f64,
    /// Percentage improvement is clamped to ±this value.
    pub improvement_clamp: f64,
    /// Prior-period averages at or below this switch improvement to the
    /// additive rule: the raw census difference, capped at
    /// `additive_improvement_cap`.
    pub near_zero_baseline: f64,
    pub additive_improvement_cap: f64,
    pub evaluation_days: i64,
    pub recent_week_days: i64,
    /// Minimum rows before the recent week for a usable prior period.
    pub prior_min_rows: usize,
    /// Minimum rows in the evaluation period for weekly analysis.
    pub min_period_rows: usize,
    pub stability_weeks: usize,
    pub sustainability_weeks: usize,
    pub max_total: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            achievement: AtLeastTable(vec![
                band(110.0, 50.0),
                band(105.0, 45.0),
                band(100.0, 40.0),
                band(98.0, 35.0),
                band(95.0, 25.0),
                band(90.0, 15.0),
                band(85.0, 5.0),
            ]),
            improvement: AtLeastTable(vec![
                band(15.0, 25.0),
                band(10.0, 20.0),
                band(5.0, 15.0),
                band(2.0, 10.0),
                band(-2.0, 5.0),
                band(-5.0, 3.0),
                band(-10.0, 1.0),
            ]),
            stability: BelowTable(vec![
                band(5.0, 15.0),
                band(10.0, 12.0),
                band(15.0, 8.0),
                band(20.0, 4.0),
            ]),
            improvement_streak: streak_defaults(),
            achievement_streak: streak_defaults(),
            high_performance: HighPerformanceBonus::default(),
            bed_efficiency: vec![
                BedEfficiencyRule {
                    min_utilization: 95.0,
                    min_achievement: 98.0,
                    points: 5.0,
                },
                BedEfficiencyRule {
                    min_utilization: 90.0,
                    min_achievement: 98.0,
                    points: 3.0,
                },
            ],
            target_rate: 98.0,
            improvement_clamp: 50.0,
            near_zero_baseline: 10.0,
            additive_improvement_cap: 20.0,
            evaluation_days: 84,
            recent_week_days: 7,
            prior_min_rows: 7,
            min_period_rows: 7,
            stability_weeks: 3,
            sustainability_weeks: 4,
            max_total: 105.0,
        }
    }
}

impl ScoringConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: ScoringConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let descending = "by strictly descending bound";
        if !self.achievement.is_ordered() {
            return Err(ConfigError::Unordered {
                table: "achievement",
                order: descending,
            });
        }
        if !self.improvement.is_ordered() {
            return Err(ConfigError::Unordered {
                table: "improvement",
                order: descending,
            });
        }
        if !self.stability.is_ordered() {
            return Err(ConfigError::Unordered {
                table: "stability",
                order: "by strictly ascending bound",
            });
        }
        for (table, streaks) in [
            ("improvement_streak", &self.improvement_streak),
            ("achievement_streak", &self.achievement_streak),
        ] {
            if !streaks.is_ordered() {
                return Err(ConfigError::Unordered {
                    table,
                    order: "by strictly descending week count",
                });
            }
        }
        if self.recent_week_days < 1 {
            return Err(ConfigError::InvalidSetting {
                name: "recent_week_days",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.evaluation_days < self.recent_week_days {
            return Err(ConfigError::InvalidSetting {
                name: "evaluation_days",
                reason: format!("must cover the recent week ({} days)", self.recent_week_days),
            });
        }
        for (name, days) in [
            ("recent_week_days", self.recent_week_days),
            ("evaluation_days", self.evaluation_days),
        ] {
            if days > MAX_WINDOW_DAYS {
                return Err(ConfigError::InvalidSetting {
                    name,
                    reason: format!("must not exceed {MAX_WINDOW_DAYS} days"),
                });
            }
        }
        if self.stability_weeks < 2 {
            return Err(ConfigError::InvalidSetting {
                name: "stability_weeks",
                reason: "a coefficient of variation needs at least 2 weeks".to_string(),
            });
        }
        if self.max_total <= 0.0 {
            return Err(ConfigError::InvalidSetting {
                name: "max_total",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

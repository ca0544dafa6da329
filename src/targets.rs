//! Per-entity targets and bed counts.
//!
//! The target table is long-format: one row per (entity, indicator), with
//! an optional day-category column. All-day values win over weekday values;
//! holiday-only values are not used for scoring.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::models::{EntityKind, EntityRef};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityTarget {
    pub display_name: Option<String>,
    pub daily_census_target: Option<f64>,
    pub weekly_admissions_target: Option<f64>,
    pub avg_los_target: Option<f64>,
    /// Wards only.
    pub bed_count: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct TargetConfig {
    entries: BTreeMap<EntityRef, EntityTarget>,
    excluded_wards: BTreeSet<String>,
}

impl TargetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: EntityRef, target: EntityTarget) {
        self.entries.insert(entity, target);
    }

    pub fn exclude_ward(&mut self, code: impl Into<String>) {
        self.excluded_wards.insert(code.into());
    }

    pub fn is_excluded_ward(&self, code: &str) -> bool {
        self.excluded_wards.contains(code)
    }

    pub fn is_excluded(&self, entity: &EntityRef) -> bool {
        entity.kind == EntityKind::Ward && self.is_excluded_ward(&entity.id)
    }

    pub fn get(&self, entity: &EntityRef) -> Option<&EntityTarget> {
        self.entries.get(entity)
    }

    /// The daily census target, only when it is positive.
    pub fn daily_census_target(&self, entity: &EntityRef) -> Option<f64> {
        self.get(entity)
            .and_then(|t| t.daily_census_target)
            .filter(|value| *value > 0.0)
    }

    pub fn bed_count(&self, entity: &EntityRef) -> Option<u32> {
        if entity.kind != EntityKind::Ward {
            return None;
        }
        self.get(entity).and_then(|t| t.bed_count).filter(|beds| *beds > 0)
    }

    /// Sum of configured ward beds, excluding excluded wards.
    pub fn total_beds(&self) -> Option<u32> {
        let total: u32 = self
            .entries
            .keys()
            .filter(|entity| entity.kind == EntityKind::Ward && !self.is_excluded(entity))
            .filter_map(|entity| self.bed_count(entity))
            .sum();
        (total > 0).then_some(total)
    }

    pub fn display_name(&self, entity: &EntityRef) -> String {
        self.get(entity)
            .and_then(|t| t.display_name.clone())
            .unwrap_or_else(|| entity.id.clone())
    }

    /// Configured entities of one kind, excluded wards left out.
    pub fn entities(&self, kind: EntityKind) -> Vec<EntityRef> {
        self.entries
            .keys()
            .filter(|entity| entity.kind == kind && !self.is_excluded(entity))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let file = std::fs::File::open(path)?;
        let config = Self::from_reader(file)?;
        info!(
            "targets: loaded {} entities from {}",
            config.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LoadError> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut rows = Vec::new();
        for result in reader.deserialize::<TargetRow>() {
            let row = result?;
            if let Some(parsed) = row.into_parsed()? {
                rows.push(parsed);
            }
        }
        rows.sort_by_key(|row| row.category);

        let mut config = TargetConfig::new();
        for row in rows {
            let entry = config.entries.entry(row.entity).or_default();
            if entry.display_name.is_none() {
                entry.display_name = row.display_name;
            }
            if entry.bed_count.is_none() {
                entry.bed_count = row.bed_count;
            }
            let slot = match row.indicator {
                Indicator::DailyCensus => &mut entry.daily_census_target,
                Indicator::WeeklyAdmissions => &mut entry.weekly_admissions_target,
                Indicator::AvgLos => &mut entry.avg_los_target,
            };
            if slot.is_none() {
                *slot = row.value;
            }
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Indicator {
    DailyCensus,
    WeeklyAdmissions,
    AvgLos,
}

impl Indicator {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "daily_census" | "日平均在院患者数" => Some(Indicator::DailyCensus),
            "weekly_admissions" | "週間新入院患者数" => Some(Indicator::WeeklyAdmissions),
            "avg_los" | "平均在院日数" => Some(Indicator::AvgLos),
            _ => None,
        }
    }
}

/// Ordered by precedence: all-day values are applied first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum DayCategory {
    AllDays,
    Weekdays,
}

fn parse_kind(raw: &str) -> Result<EntityKind, LoadError> {
    match raw {
        "ward" | "病棟" => Ok(EntityKind::Ward),
        "department" | "診療科" => Ok(EntityKind::Department),
        other => Err(LoadError::UnknownEntityKind(other.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct TargetRow {
    #[serde(alias = "部門コード", alias = "code", default)]
    entity_code: Option<String>,
    #[serde(alias = "部門名", alias = "name", default)]
    entity_name: Option<String>,
    #[serde(alias = "部門種別", alias = "kind")]
    entity_kind: String,
    #[serde(alias = "指標タイプ")]
    indicator: String,
    #[serde(alias = "目標値", alias = "value", default)]
    target_value: Option<f64>,
    #[serde(alias = "病床数", alias = "beds", default)]
    bed_count: Option<f64>,
    #[serde(alias = "期間区分", default)]
    period_category: Option<String>,
}

struct ParsedRow {
    entity: EntityRef,
    display_name: Option<String>,
    indicator: Indicator,
    category: DayCategory,
    value: Option<f64>,
    bed_count: Option<u32>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl TargetRow {
    fn into_parsed(self) -> Result<Option<ParsedRow>, LoadError> {
        let kind = parse_kind(&self.entity_kind)?;
        let Some(indicator) = Indicator::parse(&self.indicator) else {
            debug!("targets: skipping indicator '{}'", self.indicator);
            return Ok(None);
        };
        let category = match self.period_category.as_deref() {
            None | Some("") | Some("all") | Some("全日") => DayCategory::AllDays,
            Some("weekday") | Some("平日") => DayCategory::Weekdays,
            Some(other) => {
                debug!("targets: skipping day category '{other}'");
                return Ok(None);
            }
        };

        let code = non_blank(self.entity_code);
        let name = non_blank(self.entity_name);
        // Wards are keyed by code, departments by name.
        let key = match kind {
            EntityKind::Ward => code.clone().or_else(|| name.clone()),
            EntityKind::Department => name.clone().or_else(|| code.clone()),
        };
        let Some(id) = key else {
            debug!("targets: skipping row without code or name");
            return Ok(None);
        };

        Ok(Some(ParsedRow {
            entity: EntityRef { kind, id },
            display_name: name,
            indicator,
            category,
            value: self.target_value,
            bed_count: self
                .bed_count
                .filter(|beds| beds.is_finite() && *beds > 0.0)
                .map(|beds| beds as u32),
        }))
    }
}

use std::cmp::Ordering;

use chrono::{Duration, NaiveDate};
use log::{debug, warn};

use crate::aggregate::{daily_totals, mean, sample_std, weekly_series};
use crate::error::NoScore;
use crate::models::{DerivedDailyRecord, EntityRef, ScoreResult, Scope, WeeklyAggregate};
use crate::targets::TargetConfig;
use crate::thresholds::ScoringConfig;

pub fn achievement_score(config: &ScoringConfig, achievement_rate: f64) -> f64 {
    config.achievement.lookup(achievement_rate)
}

/// Percentage change of the recent week against the prior period, clamped.
/// A prior average at or below the near-zero baseline switches to an
/// additive difference capped from above only. No usable prior period
/// yields 0.
pub fn improvement_rate(config: &ScoringConfig, recent: f64, prior: Option<f64>) -> f64 {
    match prior {
        None => 0.0,
        Some(prior) if prior > config.near_zero_baseline => {
            let clamp = config.improvement_clamp;
            ((recent - prior) / prior * 100.0).clamp(-clamp, clamp)
        }
        Some(prior) => (recent - prior).min(config.additive_improvement_cap),
    }
}

pub fn improvement_score(config: &ScoringConfig, improvement_rate: f64) -> f64 {
    config.improvement.lookup(improvement_rate)
}

/// stdev / mean × 100 with the sample standard deviation.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    if m <= 0.0 {
        return None;
    }
    Some(sample_std(values) / m * 100.0)
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

pub fn stability_score(config: &ScoringConfig, weeks: &[WeeklyAggregate]) -> f64 {
    let recent: Vec<f64> = tail(weeks, config.stability_weeks)
        .iter()
        .map(|w| w.avg_census)
        .collect();
    coefficient_of_variation(&recent).map_or(0.0, |cv| config.stability.lookup(cv))
}

fn trailing_streak(weeks: &[WeeklyAggregate], qualifies: impl Fn(&WeeklyAggregate) -> bool) -> usize {
    weeks.iter().rev().take_while(|w| qualifies(*w)).count()
}

/// Best of the streak and high-performance rules over the last weeks.
/// Candidates are never summed.
pub fn sustainability_score(config: &ScoringConfig, weeks: &[WeeklyAggregate]) -> f64 {
    let recent = tail(weeks, config.sustainability_weeks);
    let rate = |w: &WeeklyAggregate| w.achievement_rate.unwrap_or(0.0);
    let mut candidates = Vec::new();

    let improving = trailing_streak(recent, |w| w.improved);
    candidates.extend(config.improvement_streak.lookup(improving));

    let achieving = trailing_streak(recent, |w| rate(w) >= config.target_rate);
    candidates.extend(config.achievement_streak.lookup(achieving));

    if !recent.is_empty() && recent.len() >= config.sustainability_weeks {
        let bonus = &config.high_performance;
        let rates: Vec<f64> = recent.iter().map(rate).collect();
        if mean(&rates) >= config.target_rate {
            candidates.push(bonus.average_points);
        }
        if rates.iter().filter(|r| **r >= config.target_rate).count() >= bonus.majority_weeks {
            candidates.push(bonus.majority_points);
        }
        if rates.iter().all(|r| *r >= bonus.floor_rate) {
            candidates.push(bonus.floor_points);
        }
    }

    candidates.into_iter().fold(0.0, f64::max)
}

pub fn bed_efficiency_score(
    config: &ScoringConfig,
    bed_utilization: Option<f64>,
    achievement_rate: f64,
) -> f64 {
    let Some(utilization) = bed_utilization else {
        return 0.0;
    };
    config
        .bed_efficiency
        .iter()
        .find(|rule| utilization >= rule.min_utilization && achievement_rate >= rule.min_achievement)
        .map_or(0.0, |rule| rule.points)
}

/// Mean of the per-date census sum over observed dates.
fn average_census(
    records: &[DerivedDailyRecord],
    scope: &Scope,
    start: NaiveDate,
    end: NaiveDate,
) -> Option<f64> {
    let census: Vec<f64> = daily_totals(records, scope, start, end)
        .values()
        .map(|d| d.census as f64)
        .collect();
    (!census.is_empty()).then(|| mean(&census))
}

fn rows_between(
    records: &[DerivedDailyRecord],
    entity: &EntityRef,
    start: NaiveDate,
    end: NaiveDate,
) -> usize {
    records
        .iter()
        .filter(|r| r.date >= start && r.date <= end && r.belongs_to(entity))
        .count()
}

/// First day of a window of `days` ending on `end`, saturating at the
/// earliest representable date.
fn window_start(end: NaiveDate, days: i64) -> NaiveDate {
    Duration::try_days(days.saturating_sub(1))
        .and_then(|span| end.checked_sub_signed(span))
        .unwrap_or(NaiveDate::MIN)
}

pub fn score_entity(
    records: &[DerivedDailyRecord],
    entity: &EntityRef,
    targets: &TargetConfig,
    config: &ScoringConfig,
    as_of: NaiveDate,
) -> Result<ScoreResult, NoScore> {
    let target = targets
        .daily_census_target(entity)
        .ok_or_else(|| NoScore::MissingTarget {
            entity: entity.clone(),
        })?;
    let scope = Scope::Entity(entity.clone());

    let recent_start = window_start(as_of, config.recent_week_days);
    let recent_avg = average_census(records, &scope, recent_start, as_of).ok_or_else(|| {
        NoScore::NoRecentData {
            entity: entity.clone(),
            start: recent_start,
            end: as_of,
        }
    })?;

    let achievement_rate = recent_avg * 100.0 / target;

    let prior_end = recent_start.pred_opt().unwrap_or(NaiveDate::MIN);
    let prior_avg = if rows_between(records, entity, NaiveDate::MIN, prior_end) >= config.prior_min_rows {
        average_census(records, &scope, NaiveDate::MIN, prior_end)
    } else {
        None
    };
    let improvement = improvement_rate(config, recent_avg, prior_avg);

    let evaluation_start = window_start(as_of, config.evaluation_days);
    let weeks = weekly_series(records, &scope, evaluation_start, as_of, Some(target));
    let enough_history = rows_between(records, entity, evaluation_start, as_of)
        >= config.min_period_rows
        && weeks.len() >= 2;
    let (stability, sustainability) = if enough_history {
        (
            stability_score(config, &weeks),
            sustainability_score(config, &weeks),
        )
    } else {
        debug!("scoring: {entity} has too little history for weekly analysis");
        (0.0, 0.0)
    };

    let bed_utilization = targets
        .bed_count(entity)
        .map(|beds| recent_avg * 100.0 / f64::from(beds));

    let achievement = achievement_score(config, achievement_rate);
    let improvement_points = improvement_score(config, improvement);
    let bed_efficiency = bed_efficiency_score(config, bed_utilization, achievement_rate);
    let total = (achievement + improvement_points + stability + sustainability + bed_efficiency)
        .clamp(0.0, config.max_total);

    Ok(ScoreResult {
        entity_id: entity.id.clone(),
        entity_name: targets.display_name(entity),
        entity_type: entity.kind,
        achievement_score: achievement,
        improvement_score: improvement_points,
        stability_score: stability,
        sustainability_score: sustainability,
        bed_efficiency_score: bed_efficiency,
        total_score: total,
        latest_achievement_rate: achievement_rate,
        improvement_rate: improvement,
        bed_utilization,
        recent_week_avg_census: recent_avg,
        target_census: target,
        prior_period_avg: prior_avg.unwrap_or(0.0),
    })
}

/// Total score descending, then name ascending, then id.
pub fn rank_order(a: &ScoreResult, b: &ScoreResult) -> Ordering {
    b.total_score
        .total_cmp(&a.total_score)
        .then_with(|| a.entity_name.cmp(&b.entity_name))
        .then_with(|| a.entity_id.cmp(&b.entity_id))
}

pub fn rank(mut results: Vec<ScoreResult>) -> Vec<ScoreResult> {
    results.sort_by(rank_order);
    results
}

/// Scores each entity independently. Entities without a score are logged
/// and left out; the rest are returned in rank order.
pub fn score_all(
    records: &[DerivedDailyRecord],
    entities: &[EntityRef],
    targets: &TargetConfig,
    config: &ScoringConfig,
    as_of: NaiveDate,
) -> Vec<ScoreResult> {
    let scored = entities
        .iter()
        .filter_map(|entity| match score_entity(records, entity, targets, config, as_of) {
            Ok(result) => Some(result),
            Err(reason) => {
                warn!("scoring: excluded {reason}");
                None
            }
        })
        .collect();
    rank(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holidays::classify_weekday;
    use crate::models::EntityKind;
    use crate::targets::EntityTarget;
    use crate::thresholds::{AtLeastTable, Band};

    // Sunday, so twelve full ISO weeks end here.
    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 28).unwrap()
    }

    fn record(date: NaiveDate, ward: &str, department: &str, census: i64) -> DerivedDailyRecord {
        DerivedDailyRecord {
            date,
            ward: ward.to_string(),
            department: Some(department.to_string()),
            census_count: census,
            admissions: 2,
            emergency_admissions: 0,
            discharges: 2,
            deaths: 0,
            total_admissions: 2,
            total_discharges: 2,
            patient_days: census + 2,
            day_kind: classify_weekday(date),
        }
    }

    /// One row per day, oldest week first, ending on `as_of()`.
    fn weekly_rows(ward: &str, weekly_census: &[i64]) -> Vec<DerivedDailyRecord> {
        let days = weekly_census.len() as i64 * 7;
        let start = as_of() - Duration::days(days - 1);
        (0..days)
            .map(|d| {
                let census = weekly_census[(d / 7) as usize];
                record(start + Duration::days(d), ward, "Surgery", census)
            })
            .collect()
    }

    fn targets_with(entries: &[(EntityRef, f64, Option<u32>)]) -> TargetConfig {
        let mut targets = TargetConfig::new();
        for (entity, census, beds) in entries {
            targets.insert(
                entity.clone(),
                EntityTarget {
                    display_name: Some(entity.id.clone()),
                    daily_census_target: Some(*census),
                    bed_count: *beds,
                    ..EntityTarget::default()
                },
            );
        }
        targets
    }

    fn week(avg_census: f64, achievement_rate: f64, improved: bool) -> WeeklyAggregate {
        WeeklyAggregate {
            scope: Scope::Organization,
            week: String::new(),
            week_end: as_of(),
            avg_census,
            admissions_sum: 0,
            discharges_sum: 0,
            net_flow: 0,
            achievement_rate: Some(achievement_rate),
            prior_week_avg_census: None,
            improved,
        }
    }

    fn summary(name: &str, total: f64) -> ScoreResult {
        ScoreResult {
            entity_id: name.to_string(),
            entity_name: name.to_string(),
            entity_type: EntityKind::Ward,
            achievement_score: 0.0,
            improvement_score: 0.0,
            stability_score: 0.0,
            sustainability_score: 0.0,
            bed_efficiency_score: 0.0,
            total_score: total,
            latest_achievement_rate: 0.0,
            improvement_rate: 0.0,
            bed_utilization: None,
            recent_week_avg_census: 0.0,
            target_census: 0.0,
            prior_period_avg: 0.0,
        }
    }

    #[test]
    fn achievement_at_105_percent_scores_45() {
        let ward = EntityRef::ward("3A");
        let records = weekly_rows("3A", &[105, 105]);
        let targets = targets_with(&[(ward.clone(), 100.0, None)]);
        let result = score_entity(&records, &ward, &targets, &ScoringConfig::default(), as_of()).unwrap();
        assert!((result.latest_achievement_rate - 105.0).abs() < 1e-9);
        assert_eq!(result.achievement_score, 45.0);
    }

    #[test]
    fn near_zero_baseline_uses_additive_rule() {
        let config = ScoringConfig::default();
        assert_eq!(improvement_rate(&config, 15.0, Some(8.0)), 7.0);
        assert_eq!(improvement_rate(&config, 40.0, Some(8.0)), 20.0);
        assert_eq!(improvement_rate(&config, 2.0, Some(8.0)), -6.0);
        assert_eq!(improvement_rate(&config, 30.0, Some(20.0)), 50.0);
        assert_eq!(improvement_rate(&config, 5.0, Some(20.0)), -50.0);
        assert_eq!(improvement_rate(&config, 5.0, None), 0.0);
    }

    #[test]
    fn additive_rule_end_to_end() {
        let ward = EntityRef::ward("ICU");
        let records = weekly_rows("ICU", &[8, 8, 15]);
        let targets = targets_with(&[(ward.clone(), 16.0, None)]);
        let result = score_entity(&records, &ward, &targets, &ScoringConfig::default(), as_of()).unwrap();
        assert_eq!(result.prior_period_avg, 8.0);
        assert_eq!(result.improvement_rate, 7.0);
        assert_eq!(result.improvement_score, 15.0);
    }

    #[test]
    fn short_prior_period_is_ignored() {
        let ward = EntityRef::ward("3A");
        let mut records = weekly_rows("3A", &[50]);
        records.push(record(as_of() - Duration::days(10), "3A", "Surgery", 10));
        let targets = targets_with(&[(ward.clone(), 50.0, None)]);
        let result = score_entity(&records, &ward, &targets, &ScoringConfig::default(), as_of()).unwrap();
        assert_eq!(result.prior_period_avg, 0.0);
        assert_eq!(result.improvement_rate, 0.0);
    }

    #[test]
    fn stability_uses_coefficient_of_variation() {
        let config = ScoringConfig::default();
        let steady = [week(100.0, 100.0, false), week(101.0, 101.0, true), week(99.0, 99.0, false)];
        assert_eq!(stability_score(&config, &steady), 15.0);
        let noisy = [week(60.0, 60.0, false), week(100.0, 100.0, true), week(140.0, 140.0, true)];
        assert_eq!(stability_score(&config, &noisy), 0.0);
        assert_eq!(stability_score(&config, &steady[..1]), 0.0);
    }

    #[test]
    fn sustainability_takes_maximum_not_sum() {
        let config = ScoringConfig::default();
        let weeks = [
            week(100.0, 100.0, true),
            week(99.0, 99.0, false),
            week(100.5, 100.5, true),
            week(101.0, 101.0, true),
        ];
        // Improvement streak 2 (4 points), achievement streak 4 (10 points),
        // every high-performance rule also holds.
        assert_eq!(sustainability_score(&config, &weeks), 10.0);
    }

    #[test]
    fn sustainability_high_performance_needs_four_weeks() {
        let config = ScoringConfig::default();
        let mixed = [
            week(99.0, 99.0, false),
            week(97.0, 97.0, false),
            week(99.0, 99.0, true),
            week(92.0, 92.0, false),
        ];
        assert_eq!(sustainability_score(&config, &mixed), 3.0);
        assert_eq!(sustainability_score(&config, &mixed[1..]), 0.0);
    }

    #[test]
    fn four_week_improvement_streak_reaches_ten() {
        let config = ScoringConfig::default();
        let weeks = [
            week(50.0, 50.0, true),
            week(55.0, 55.0, true),
            week(60.0, 60.0, true),
            week(65.0, 65.0, true),
        ];
        assert_eq!(sustainability_score(&config, &weeks), 10.0);
    }

    #[test]
    fn full_marks_reach_upper_bound() {
        let ward = EntityRef::ward("5B");
        let records = weekly_rows("5B", &[90, 90, 90, 90, 90, 90, 90, 90, 110, 110, 110, 110]);
        let targets = targets_with(&[(ward.clone(), 100.0, Some(110))]);
        let result = score_entity(&records, &ward, &targets, &ScoringConfig::default(), as_of()).unwrap();
        assert_eq!(result.achievement_score, 50.0);
        assert_eq!(result.improvement_score, 25.0);
        assert_eq!(result.stability_score, 15.0);
        assert_eq!(result.sustainability_score, 10.0);
        assert_eq!(result.bed_efficiency_score, 5.0);
        assert_eq!(result.total_score, 105.0);
        assert_eq!(result.grade(), crate::models::Grade::S);
    }

    #[test]
    fn total_is_clamped_to_maximum() {
        let ward = EntityRef::ward("5B");
        let records = weekly_rows("5B", &[90, 90, 90, 90, 90, 90, 90, 90, 110, 110, 110, 110]);
        let targets = targets_with(&[(ward.clone(), 100.0, Some(110))]);
        let config = ScoringConfig {
            achievement: AtLeastTable(vec![Band {
                bound: 100.0,
                points: 70.0,
            }]),
            ..ScoringConfig::default()
        };
        let result = score_entity(&records, &ward, &targets, &config, as_of()).unwrap();
        assert_eq!(result.total_score, 105.0);
    }

    #[test]
    fn ward_without_beds_has_no_utilization() {
        let ward = EntityRef::ward("3A");
        let records = weekly_rows("3A", &[100, 100]);
        for beds in [None, Some(0)] {
            let targets = targets_with(&[(ward.clone(), 100.0, beds)]);
            let result =
                score_entity(&records, &ward, &targets, &ScoringConfig::default(), as_of()).unwrap();
            assert_eq!(result.bed_efficiency_score, 0.0);
            assert_eq!(result.bed_utilization, None);
        }
    }

    #[test]
    fn departments_sum_wards_per_day() {
        let department = EntityRef::department("Surgery");
        let mut records = weekly_rows("3A", &[30, 30]);
        records.extend(weekly_rows("3B", &[20, 20]));
        let targets = targets_with(&[(department.clone(), 50.0, Some(80))]);
        let result =
            score_entity(&records, &department, &targets, &ScoringConfig::default(), as_of()).unwrap();
        assert_eq!(result.recent_week_avg_census, 50.0);
        assert_eq!(result.latest_achievement_rate, 100.0);
        assert_eq!(result.bed_utilization, None);
    }

    #[test]
    fn missing_target_and_missing_recent_data_yield_no_score() {
        let ward = EntityRef::ward("3A");
        let records = weekly_rows("3A", &[40, 40]);
        let config = ScoringConfig::default();

        let err = score_entity(&records, &ward, &TargetConfig::new(), &config, as_of()).unwrap_err();
        assert_eq!(err, NoScore::MissingTarget { entity: ward.clone() });

        let zero_target = targets_with(&[(ward.clone(), 0.0, None)]);
        assert!(score_entity(&records, &ward, &zero_target, &config, as_of()).is_err());

        let targets = targets_with(&[(ward.clone(), 40.0, None)]);
        let later = as_of() + Duration::days(30);
        let err = score_entity(&records, &ward, &targets, &config, later).unwrap_err();
        assert!(matches!(err, NoScore::NoRecentData { .. }));
    }

    #[test]
    fn oversized_window_clamps_instead_of_overflowing() {
        assert_eq!(window_start(as_of(), 7), as_of() - Duration::days(6));
        assert_eq!(window_start(as_of(), i64::MAX), NaiveDate::MIN);

        let ward = EntityRef::ward("3A");
        let records = weekly_rows("3A", &[40, 40]);
        let targets = targets_with(&[(ward.clone(), 40.0, None)]);
        let config = ScoringConfig {
            evaluation_days: 1_000_000_000,
            ..ScoringConfig::default()
        };
        let result = score_entity(&records, &ward, &targets, &config, as_of()).unwrap();
        assert_eq!(result.latest_achievement_rate, 100.0);
    }

    #[test]
    fn ties_are_broken_by_name() {
        let ranked = rank(vec![
            summary("Neurology", 72.0),
            summary("Cardiology", 72.0),
            summary("Urology", 80.0),
        ]);
        let names: Vec<&str> = ranked.iter().map(|r| r.entity_name.as_str()).collect();
        assert_eq!(names, vec!["Urology", "Cardiology", "Neurology"]);
    }

    #[test]
    fn score_all_skips_failures_and_is_deterministic() {
        let mut records = weekly_rows("3A", &[40, 40, 40]);
        records.extend(weekly_rows("4A", &[40, 40, 40]));
        records.extend(weekly_rows("5A", &[10, 10, 10]));
        let targets = targets_with(&[
            (EntityRef::ward("4A"), 40.0, None),
            (EntityRef::ward("3A"), 40.0, None),
            (EntityRef::ward("5A"), 40.0, None),
        ]);
        let entities = vec![
            EntityRef::ward("4A"),
            EntityRef::ward("9Z"),
            EntityRef::ward("3A"),
            EntityRef::ward("5A"),
        ];
        let config = ScoringConfig::default();

        let first = score_all(&records, &entities, &targets, &config, as_of());
        let ids: Vec<&str> = first.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["3A", "4A", "5A"]);
        assert_eq!(first[0].total_score, first[1].total_score);

        let mut reversed = entities.clone();
        reversed.reverse();
        let second = score_all(&records, &reversed, &targets, &config, as_of());
        assert_eq!(first, second);
    }
}

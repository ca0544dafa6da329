use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

use ward_performance_kpi::aggregate::alos_month_over_month;
use ward_performance_kpi::cache::{cached_counted, CacheKey, MemoryCache};
use ward_performance_kpi::load::load_census;
use ward_performance_kpi::{
    preprocess, Aggregation, DateRange, EntityKind, EntityRef, KpiAchievement, KpiEngine,
    KpiStatus, PeriodPreset, Preprocessed, Scope, ScoringConfig, TargetConfig,
};

#[derive(Parser)]
#[command(name = "ward-kpi")]
#[command(about = "Ward and department census KPIs and performance scores", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Inputs {
    /// Daily census CSV
    #[arg(long)]
    census: PathBuf,
    /// Long-format target CSV
    #[arg(long)]
    targets: Option<PathBuf>,
    /// Ward codes to leave out entirely
    #[arg(long = "exclude-ward")]
    exclude_wards: Vec<String>,
    /// Organization bed count, overriding the sum of ward beds
    #[arg(long)]
    total_beds: Option<u32>,
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("scope")
        .args(["ward", "department"])
        .multiple(false)
))]
struct ScopeArgs {
    #[arg(long)]
    ward: Option<String>,
    #[arg(long)]
    department: Option<String>,
}

impl ScopeArgs {
    fn scope(&self) -> Scope {
        match (&self.ward, &self.department) {
            (Some(code), _) => Scope::Entity(EntityRef::ward(code.as_str())),
            (None, Some(name)) => Scope::Entity(EntityRef::department(name.as_str())),
            (None, None) => Scope::Organization,
        }
    }
}

#[derive(Args)]
struct WindowArgs {
    #[arg(long, default_value = "recent-4w")]
    period: PeriodPreset,
    /// Explicit start date; requires --end
    #[arg(long, requires = "end")]
    start: Option<NaiveDate>,
    #[arg(long, requires = "start")]
    end: Option<NaiveDate>,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Ward,
    Department,
    All,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a census CSV and print the validation report
    Validate {
        #[arg(long)]
        census: PathBuf,
    },
    /// Period KPIs for the organization, a ward or a department
    Kpi {
        #[command(flatten)]
        inputs: Inputs,
        #[command(flatten)]
        scope: ScopeArgs,
        #[command(flatten)]
        window: WindowArgs,
        /// Report every period preset instead of one
        #[arg(long, conflicts_with_all = ["period", "start"])]
        all_periods: bool,
    },
    /// Weekly and monthly series
    Weekly {
        #[command(flatten)]
        inputs: Inputs,
        #[command(flatten)]
        scope: ScopeArgs,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Rank wards and departments by performance score
    Score {
        #[command(flatten)]
        inputs: Inputs,
        /// JSON file overriding scoring thresholds
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = KindArg::All)]
        kind: KindArg,
        /// Defaults to the latest date in the data
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { census } => {
            let processed = read_batch(&census)?;
            let report = &processed.report;
            println!(
                "{} rows usable from {}.",
                processed.records.len(),
                census.display()
            );
            let summary = &report.patient_days;
            println!(
                "Patient-days: total {}, mean {:.1}, min {}, max {}, zero rows {}.",
                summary.total, summary.mean, summary.min, summary.max, summary.zero_rows
            );
            if report.warnings.is_empty() {
                println!("No warnings.");
            } else {
                println!("Warnings:");
                for warning in &report.warnings {
                    println!("- {warning}");
                }
            }
            for note in &report.notes {
                println!("- note: {note}");
            }
        }
        Commands::Kpi {
            inputs,
            scope,
            window,
            all_periods,
        } => {
            let engine = build_engine(&inputs, None)?;
            let scope = scope.scope();
            if all_periods {
                print_all_periods(&engine, &scope)?;
            } else {
                let range = resolve_window(&engine, &window)?;
                print_aggregate(&engine.aggregate(&scope, range.start, range.end));
                if let Scope::Entity(entity) = &scope {
                    if let Some(kpi) = engine.achievement(entity, range.start, range.end) {
                        print_achievement(&kpi);
                    }
                }
            }
        }
        Commands::Weekly {
            inputs,
            scope,
            window,
        } => {
            let engine = build_engine(&inputs, None)?;
            let scope = scope.scope();
            let range = resolve_window(&engine, &window)?;

            let weeks = engine.weekly_series(&scope, range.start, range.end);
            if weeks.is_empty() {
                println!("No rows for {scope} between {range}.");
                return Ok(());
            }
            println!("Weekly census for {scope}:");
            for week in &weeks {
                let achievement = week
                    .achievement_rate
                    .map(|rate| format!(", achievement {rate:.1}%"))
                    .unwrap_or_default();
                let marker = if week.improved { " ↑" } else { "" };
                println!(
                    "- {} (to {}): avg census {:.1}{}, admissions {}, discharges {}, net {:+}{}",
                    week.week,
                    week.week_end,
                    week.avg_census,
                    achievement,
                    week.admissions_sum,
                    week.discharges_sum,
                    week.net_flow,
                    marker
                );
            }

            let months = engine.monthly_series(&scope, range.start, range.end);
            println!("Monthly length of stay:");
            for month in &months {
                println!(
                    "- {}: ALOS {:.2} (moving avg {:.2}), avg census {:.1} over {} days",
                    month.month,
                    month.alos,
                    month.alos_moving_avg,
                    month.avg_daily_census,
                    month.observed_days
                );
            }
            if months.len() >= 2 {
                println!(
                    "ALOS change vs prior month: {:+.1}%",
                    alos_month_over_month(&months)
                );
            }

            println!("By day of week:");
            for day in engine.dow_summary(&scope, range.start, range.end) {
                if day.observed_days == 0 {
                    continue;
                }
                println!(
                    "- {}: avg census {:.1}, admissions {:.1}/day, discharges {:.1}/day, emergency {:.1}% ({} days)",
                    day.weekday,
                    day.avg_census,
                    day.avg_admissions,
                    day.avg_discharges,
                    day.emergency_rate,
                    day.observed_days
                );
            }
        }
        Commands::Score {
            inputs,
            config,
            kind,
            as_of,
            limit,
        } => {
            if inputs.targets.is_none() {
                bail!("--targets is required for scoring");
            }
            let engine = build_engine(&inputs, config.as_deref())?;
            let as_of = match as_of {
                Some(date) => date,
                None => engine.date_bounds().context("no rows to score")?.1,
            };

            let kinds: &[EntityKind] = match kind {
                KindArg::Ward => &[EntityKind::Ward],
                KindArg::Department => &[EntityKind::Department],
                KindArg::All => &[EntityKind::Ward, EntityKind::Department],
            };
            for kind in kinds {
                let scores = engine.score_kind(*kind, as_of);
                if scores.is_empty() {
                    println!("No {kind} could be scored as of {as_of}.");
                    continue;
                }
                println!("Top {kind}s by performance score as of {as_of}:");
                for (rank, score) in scores.iter().take(limit).enumerate() {
                    let beds = score
                        .bed_utilization
                        .map(|util| format!(", beds {util:.1}%"))
                        .unwrap_or_default();
                    println!(
                        "{:>2}. {} [{}] {:.1} (achv {:.0} / impr {:.0} / stab {:.0} / sust {:.0} / beds {:.0}) achievement {:.1}%, change {:+.1}{}",
                        rank + 1,
                        score.entity_name,
                        score.grade(),
                        score.total_score,
                        score.achievement_score,
                        score.improvement_score,
                        score.stability_score,
                        score.sustainability_score,
                        score.bed_efficiency_score,
                        score.latest_achievement_rate,
                        score.improvement_rate,
                        beds
                    );
                }
            }
        }
    }

    Ok(())
}

fn read_batch(path: &Path) -> anyhow::Result<Preprocessed> {
    let batch = load_census(path)
        .with_context(|| format!("failed to read census csv {}", path.display()))?;
    preprocess(batch).with_context(|| format!("census data in {} is unusable", path.display()))
}

fn build_engine(inputs: &Inputs, config: Option<&Path>) -> anyhow::Result<KpiEngine> {
    let processed = read_batch(&inputs.census)?;

    let mut targets = match &inputs.targets {
        Some(path) => TargetConfig::load(path)
            .with_context(|| format!("failed to read target csv {}", path.display()))?,
        None => TargetConfig::new(),
    };
    for ward in &inputs.exclude_wards {
        targets.exclude_ward(ward.as_str());
    }

    let mut engine = KpiEngine::new(processed.records, targets);
    if let Some(beds) = inputs.total_beds {
        engine = engine.with_total_beds(beds);
    }
    if let Some(path) = config {
        let config = ScoringConfig::load(path)
            .with_context(|| format!("failed to load scoring config {}", path.display()))?;
        engine = engine.with_config(config);
    }
    Ok(engine)
}

fn resolve_window(engine: &KpiEngine, window: &WindowArgs) -> anyhow::Result<DateRange> {
    if let (Some(start), Some(end)) = (window.start, window.end) {
        if start > end {
            bail!("--start {start} is after --end {end}");
        }
        return Ok(DateRange { start, end });
    }
    let (earliest, latest) = engine.date_bounds().context("no rows after preprocessing")?;
    window
        .period
        .resolve(earliest, latest)
        .with_context(|| format!("period {} does not overlap the data", window.period))
}

/// Several presets often clip to the same range on short data; those share
/// one computation.
fn print_all_periods(engine: &KpiEngine, scope: &Scope) -> anyhow::Result<()> {
    let (earliest, latest) = engine.date_bounds().context("no rows after preprocessing")?;
    let fingerprint = engine.fingerprint();
    let mut cache: MemoryCache<Aggregation> = MemoryCache::new();

    for preset in PeriodPreset::ALL {
        let Some(range) = preset.resolve(earliest, latest) else {
            println!("== {preset}: no data");
            continue;
        };
        let key = CacheKey::new(
            fingerprint,
            range.start,
            range.end,
            format!("{scope}/period"),
        );
        let aggregation = cached_counted(&mut cache, key, || {
            engine.aggregate(scope, range.start, range.end)
        });
        println!("== {preset}");
        print_aggregate(&aggregation);
    }

    let (hits, misses) = cache.stats();
    log::debug!("kpi: {misses} periods computed, {hits} reused");
    Ok(())
}

fn print_aggregate(aggregation: &Aggregation) {
    let period = match aggregation {
        Aggregation::Period(period) => period,
        Aggregation::Empty(empty) => {
            println!(
                "No rows for {} between {} and {}.",
                empty.scope, empty.start, empty.end
            );
            return;
        }
    };

    println!(
        "KPIs for {} from {} to {} ({} days, latest data {}):",
        period.scope, period.start, period.end, period.days_in_period, period.latest_date
    );
    println!(
        "- avg daily census {:.1} (weekday {:.1}, holiday {:.1})",
        period.avg_daily_census, period.weekday_avg_census, period.holiday_avg_census
    );
    println!(
        "- admissions {} ({:.1}/day), discharges {} ({:.1}/day)",
        period.total_admissions,
        period.avg_daily_admissions,
        period.total_discharges,
        period.avg_daily_discharges
    );
    println!(
        "- ALOS {:.2} days, turnover {:.2}",
        period.alos, period.turnover_rate
    );
    match period.occupancy_rate {
        Some(rate) => {
            let status = KpiStatus::classify(rate, 90.0, 80.0, false);
            println!("- occupancy {rate:.1}% ({status:?})");
        }
        None => println!("- occupancy n/a (no bed count)"),
    }
    println!(
        "- emergency {:.1}%, mortality {:.1}%",
        period.emergency_rate, period.mortality_rate
    );
    println!(
        "- {} rows across {} wards and {} departments",
        period.row_count, period.ward_count, period.department_count
    );
}

fn print_achievement(kpi: &KpiAchievement) {
    let line = |label: &str, actual: f64, target: Option<f64>, achievement: f64, reverse: bool| {
        match target {
            Some(target) => {
                let status = if reverse {
                    KpiStatus::classify(actual, target, target * 1.1, true)
                } else {
                    KpiStatus::classify(achievement, 100.0, 90.0, false)
                };
                println!(
                    "- {label}: {actual:.1} vs target {target:.1}, achievement {achievement:.1}% ({status:?})"
                );
            }
            None => println!("- {label}: {actual:.1}, no target"),
        }
    };
    println!("Against targets:");
    line(
        "daily census",
        kpi.avg_daily_census,
        kpi.daily_census_target,
        kpi.daily_census_achievement,
        false,
    );
    line(
        "weekly admissions",
        kpi.weekly_avg_admissions,
        kpi.weekly_admissions_target,
        kpi.weekly_admissions_achievement,
        false,
    );
    line(
        "length of stay",
        kpi.alos,
        kpi.avg_los_target,
        kpi.avg_los_achievement,
        true,
    );
}

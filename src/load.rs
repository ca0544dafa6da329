//! Census CSV → [`RawBatch`].
//!
//! Header names are probed once against a list of candidates per column.
//! Unparseable cells become `None`; whether that is acceptable is decided
//! by preprocessing, not here.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use log::{debug, info};

use crate::error::LoadError;
use crate::models::DailyRecord;
use crate::preprocess::{Column, ColumnSet, RawBatch};

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

/// Accepted header names, most specific first.
fn candidates(column: Column) -> &'static [&'static str] {
    match column {
        Column::Date => &["date", "日付"],
        Column::Ward => &["ward_code", "ward", "病棟コード", "病棟名", "病棟"],
        Column::Department => &["department", "診療科名", "診療科", "実施診療科"],
        Column::Census => &["census_count", "census", "在院患者数", "入院患者数（在院）"],
        Column::Admissions => &["admissions", "入院患者数", "新入院患者数"],
        Column::EmergencyAdmissions => &["emergency_admissions", "緊急入院患者数"],
        Column::Discharges => &["discharges", "退院患者数"],
        Column::Deaths => &["deaths", "死亡患者数"],
    }
}

fn resolve_headers(headers: &csv::StringRecord) -> BTreeMap<Column, usize> {
    let names: Vec<&str> = headers
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim())
        .collect();
    let mut positions = BTreeMap::new();
    for column in Column::ALL {
        let found = candidates(column)
            .iter()
            .find_map(|candidate| names.iter().position(|name| name == candidate));
        if let Some(index) = found {
            debug!("load: '{}' read from header '{}'", column, names[index]);
            positions.insert(column, index);
        }
    }
    positions
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    // Timestamps such as "2026-04-01 00:00:00" keep only the date part.
    let date_part = raw.split_whitespace().next().unwrap_or(raw);
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(date_part, format).ok())
}

/// Counts with a larger magnitude are treated as unreadable.
pub const MAX_CELL_VALUE: i64 = 1_000_000_000;

/// Numeric cells may carry decimals ("12.0"); the fraction is truncated.
/// Values beyond [`MAX_CELL_VALUE`] read as blank.
pub fn parse_count(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let value = match raw.parse::<i64>() {
        Ok(value) => value,
        Err(_) => {
            let value = raw.parse::<f64>().ok()?.trunc();
            if !value.is_finite() || value.abs() > MAX_CELL_VALUE as f64 {
                return None;
            }
            value as i64
        }
    };
    (value.abs() <= MAX_CELL_VALUE).then_some(value)
}

fn text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn load_census(path: &Path) -> Result<RawBatch, LoadError> {
    let file = std::fs::File::open(path)?;
    let batch = read_census(file)?;
    info!("load: read {} rows from {}", batch.rows.len(), path.display());
    Ok(batch)
}

pub fn read_census<R: Read>(reader: R) -> Result<RawBatch, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(LoadError::MissingHeader);
    }
    let positions = resolve_headers(&headers);
    let columns: ColumnSet = positions.keys().copied().collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let cell = |column: Column| positions.get(&column).and_then(|i| record.get(*i));
        rows.push(DailyRecord {
            date: cell(Column::Date).and_then(parse_date),
            ward: cell(Column::Ward).and_then(text),
            department: cell(Column::Department).and_then(text),
            census_count: cell(Column::Census).and_then(parse_count),
            admissions: cell(Column::Admissions).and_then(parse_count),
            emergency_admissions: cell(Column::EmergencyAdmissions).and_then(parse_count),
            discharges: cell(Column::Discharges).and_then(parse_count),
            deaths: cell(Column::Deaths).and_then(parse_count),
        });
    }

    Ok(RawBatch { columns, rows })
}

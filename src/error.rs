use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::EntityRef;
use crate::preprocess::Column;

/// A hard validation problem found while preprocessing a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    MissingColumn(Column),
    EmptyAfterCleaning { dropped_rows: usize },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingColumn(column) => {
                write!(f, "required column '{}' is missing", column.canonical_name())
            }
            Violation::EmptyAfterCleaning { dropped_rows } => write!(
                f,
                "no rows left after cleaning ({dropped_rows} rows dropped)"
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("batch rejected: {}", join_violations(.0))]
    Validation(Vec<Violation>),
}

impl PreprocessError {
    pub fn violations(&self) -> &[Violation] {
        match self {
            PreprocessError::Validation(violations) => violations,
        }
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown entity kind '{0}'")]
    UnknownEntityKind(String),

    #[error("census csv has no header row")]
    MissingHeader,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid scoring config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("threshold table '{table}' must be ordered {order}")]
    Unordered { table: &'static str, order: &'static str },

    #[error("invalid setting '{name}': {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

/// Why an entity was left out of scoring. These are soft outcomes: the
/// entity is skipped and its siblings are still scored.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NoScore {
    #[error("{entity}: no positive daily census target configured")]
    MissingTarget { entity: EntityRef },

    #[error("{entity}: no rows between {start} and {end}")]
    NoRecentData {
        entity: EntityRef,
        start: NaiveDate,
        end: NaiveDate,
    },
}

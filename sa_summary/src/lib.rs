//! Loading and aggregation of simulated-annealing sudoku result tables.
//!
//! Result files are whitespace-delimited text with a header row. This crate
//! turns them into two derived views for charting: a frequency table of the
//! best cost reached per run id, and per-id convergence traces of cost over
//! iteration.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub mod jobs;
pub mod summary;
pub mod table;

pub use jobs::{load_manifest, parse_manifest, ChartStyle, Job, JobInput, JobKind, Manifest, Preset};
pub use summary::{
    extract_convergence_series, format_cost, summarize_best_cost_frequency, BarOrder,
    ConvergenceSeries, CostFrequency, IdSelection, MAX_RANGE_IDS,
};
pub use table::{load_table, parse_table, ResultRow, ResultTable, TableSchema};

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("failed to load {}: {reason}", .path.display())]
    DataLoad { path: PathBuf, reason: String },
    #[error("{}: required column '{column}' is missing", .path.display())]
    Schema { path: PathBuf, column: String },
    #[error("invalid id selection: {0}")]
    InvalidSelection(String),
    #[error("invalid job manifest {}: {reason}", .path.display())]
    Manifest { path: PathBuf, reason: String },
}

/// Identifier grouping the rows of one experiment instance.
///
/// Integer ids sort numerically and before textual ids.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum RunId {
    Int(i64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRunId {
    Int(i64),
    Text(String),
}

// Numeric strings deserialize to `Int` so manifest ids match ids read from files.
impl<'de> Deserialize<'de> for RunId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawRunId::deserialize(deserializer)? {
            RawRunId::Int(v) => RunId::Int(v),
            RawRunId::Text(s) => RunId::parse(&s),
        })
    }
}

impl RunId {
    pub fn parse(field: &str) -> Self {
        match field.parse::<i64>() {
            Ok(v) => RunId::Int(v),
            Err(_) => RunId::Text(field.to_string()),
        }
    }
}

impl From<i64> for RunId {
    fn from(value: i64) -> Self {
        RunId::Int(value)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        RunId::parse(value)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunId::Int(v) => write!(f, "{}", v),
            RunId::Text(s) => f.write_str(s),
        }
    }
}

/// A single cell coerced to its natural type.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn parse(field: &str) -> Self {
        if let Ok(v) = field.parse::<i64>() {
            Value::Int(v)
        } else if let Ok(v) = field.parse::<f64>() {
            Value::Float(v)
        } else {
            Value::Text(field.to_string())
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Text(_) => None,
        }
    }
}

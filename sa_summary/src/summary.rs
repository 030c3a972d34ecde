//! Derived views over a [`ResultTable`].

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::str::FromStr;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use super::{ResultTable, RunId, SummaryError};

/// Order in which frequency bars are handed to a renderer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BarOrder {
    /// Most frequent cost first; equal counts by ascending cost.
    Count,
    /// Ascending cost.
    Cost,
}

impl Default for BarOrder {
    fn default() -> Self {
        BarOrder::Count
    }
}

/// Number of run ids whose best (minimum) cost equals each cost value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CostFrequency {
    counts: BTreeMap<OrderedFloat<f64>, usize>,
}

impl CostFrequency {
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of distinct best-cost values.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Number of run ids counted, i.e. the sum of all buckets.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn get(&self, cost: f64) -> usize {
        self.counts.get(&OrderedFloat(cost)).copied().unwrap_or(0)
    }

    /// Buckets in ascending cost order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, usize)> + '_ {
        self.counts.iter().map(|(cost, count)| (cost.0, *count))
    }

    pub fn bars(&self, order: BarOrder) -> Vec<(f64, usize)> {
        let mut bars: Vec<(f64, usize)> = self.iter().collect();
        if order == BarOrder::Count {
            // Stable sort keeps ascending cost among equal counts.
            bars.sort_by(|a, b| b.1.cmp(&a.1));
        }
        bars
    }
}

/// Group rows by id, take each id's minimum cost, and count ids per minimum.
pub fn summarize_best_cost_frequency(table: &ResultTable) -> CostFrequency {
    let mut best: HashMap<&RunId, f64> = HashMap::new();
    for row in table.rows() {
        best.entry(&row.id)
            .and_modify(|current| {
                if row.cost < *current {
                    *current = row.cost;
                }
            })
            .or_insert(row.cost);
    }

    let mut counts = BTreeMap::new();
    for cost in best.into_values() {
        *counts.entry(OrderedFloat(cost)).or_insert(0) += 1;
    }
    CostFrequency { counts }
}

/// Render a cost for labels and exports; integral costs drop the fraction.
pub fn format_cost(cost: f64) -> String {
    if cost.fract() == 0.0 && cost.abs() < 1e15 {
        format!("{:.0}", cost)
    } else {
        format!("{}", cost)
    }
}

/// Cost trace of one run id, ordered by iteration.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConvergenceSeries {
    pub id: RunId,
    pub points: Vec<(i64, f64)>,
}

impl ConvergenceSeries {
    pub fn new(id: RunId) -> Self {
        Self {
            id,
            points: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Keep at most `max_points` evenly strided points. The first and last
    /// points always survive, so anything below 2 is treated as 2.
    pub fn thinned(&self, max_points: usize) -> ConvergenceSeries {
        let len = self.points.len();
        let keep = max_points.max(2);
        if len <= keep {
            return self.clone();
        }
        let points = (0..keep)
            .map(|k| self.points[k * (len - 1) / (keep - 1)])
            .collect();
        ConvergenceSeries {
            id: self.id.clone(),
            points,
        }
    }

    pub fn cost_range(&self) -> Option<(f64, f64)> {
        self.points.iter().fold(None, |acc, &(_, cost)| match acc {
            None => Some((cost, cost)),
            Some((lo, hi)) => Some((lo.min(cost), hi.max(cost))),
        })
    }
}

/// Widest id range a selection may span. Every id in a range gets its own
/// (possibly empty) series, so the width bounds the result size.
pub const MAX_RANGE_IDS: u64 = 100_000;

fn check_range(start: i64, end: i64) -> Result<(), SummaryError> {
    if end < start {
        return Err(SummaryError::InvalidSelection(format!(
            "range {}..={} is empty",
            start, end
        )));
    }
    let width = (end as i128 - start as i128 + 1) as u128;
    if width > MAX_RANGE_IDS as u128 {
        return Err(SummaryError::InvalidSelection(format!(
            "range {}..={} spans {} ids, limit is {}; use `all` to select every id",
            start, end, width, MAX_RANGE_IDS
        )));
    }
    Ok(())
}

/// Which run ids to extract convergence traces for.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "IdSelectionSpec")]
pub enum IdSelection {
    /// Inclusive integer range, at most [`MAX_RANGE_IDS`] wide.
    Range { start: i64, end: i64 },
    List(Vec<RunId>),
    All,
}

impl Default for IdSelection {
    fn default() -> Self {
        IdSelection::Range { start: 1, end: 50 }
    }
}

impl IdSelection {
    /// Requested ids in ascending order. `All` expands to the table's ids.
    pub fn resolve(&self, table: &ResultTable) -> Result<Vec<RunId>, SummaryError> {
        Ok(match self {
            IdSelection::Range { start, end } => {
                check_range(*start, *end)?;
                (*start..=*end).map(RunId::Int).collect()
            }
            IdSelection::List(ids) => ids
                .iter()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            IdSelection::All => table
                .rows()
                .iter()
                .map(|row| row.id.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        })
    }
}

impl FromStr for IdSelection {
    type Err = SummaryError;

    /// Accepts `all`, `a..b` (exclusive), `a..=b` (inclusive), or a comma list.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(IdSelection::All);
        }
        if let Some((lo, hi)) = trimmed.split_once("..") {
            let (hi, inclusive) = match hi.strip_prefix('=') {
                Some(rest) => (rest, true),
                None => (hi, false),
            };
            let parse_bound = |s: &str| {
                s.trim().parse::<i64>().map_err(|_| {
                    SummaryError::InvalidSelection(format!("'{}' is not an integer bound", s))
                })
            };
            let start = parse_bound(lo)?;
            let end = if inclusive {
                parse_bound(hi)?
            } else {
                parse_bound(hi)?.checked_sub(1).ok_or_else(|| {
                    SummaryError::InvalidSelection(format!("range '{}' is empty", trimmed))
                })?
            };
            check_range(start, end)?;
            return Ok(IdSelection::Range { start, end });
        }
        let ids: Vec<RunId> = trimmed
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(RunId::parse)
            .collect();
        if ids.is_empty() {
            return Err(SummaryError::InvalidSelection("no ids given".into()));
        }
        Ok(IdSelection::List(ids))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdSelectionSpec {
    Text(String),
    List(Vec<RunId>),
}

impl TryFrom<IdSelectionSpec> for IdSelection {
    type Error = SummaryError;

    fn try_from(spec: IdSelectionSpec) -> Result<Self, Self::Error> {
        match spec {
            IdSelectionSpec::Text(text) => text.parse(),
            IdSelectionSpec::List(ids) if ids.is_empty() => {
                Err(SummaryError::InvalidSelection("no ids given".into()))
            }
            IdSelectionSpec::List(ids) => Ok(IdSelection::List(ids)),
        }
    }
}

/// Per-id `(iteration, cost)` traces for the selected ids.
///
/// Every selected id gets an entry; ids without rows map to an empty series.
pub fn extract_convergence_series(
    table: &ResultTable,
    ids: &IdSelection,
) -> Result<BTreeMap<RunId, ConvergenceSeries>, SummaryError> {
    if !table.has_iterations() {
        return Err(SummaryError::Schema {
            path: table.source().to_path_buf(),
            column: "iteration".to_string(),
        });
    }

    let wanted = ids.resolve(table)?;
    let lookup: HashSet<&RunId> = wanted.iter().collect();
    let mut grouped: HashMap<&RunId, Vec<(i64, f64)>> = HashMap::new();
    for row in table.rows() {
        if !lookup.contains(&row.id) {
            continue;
        }
        if let Some(iteration) = row.iteration {
            grouped.entry(&row.id).or_default().push((iteration, row.cost));
        }
    }

    let mut out = BTreeMap::new();
    for id in &wanted {
        let mut series = ConvergenceSeries::new(id.clone());
        if let Some(mut points) = grouped.remove(id) {
            points.sort_by_key(|(iteration, _)| *iteration);
            series.points = points;
        }
        out.insert(id.clone(), series);
    }
    Ok(out)
}

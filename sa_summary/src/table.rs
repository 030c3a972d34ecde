use std::fs;
use std::path::{Path, PathBuf};

use super::{RunId, SummaryError, Value};

/// Column names a table must carry to be summarized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSchema {
    pub id_column: String,
    pub cost_column: String,
    pub iteration_column: Option<String>,
}

impl Default for TableSchema {
    fn default() -> Self {
        Self {
            id_column: "id".to_string(),
            cost_column: "cost".to_string(),
            iteration_column: None,
        }
    }
}

impl TableSchema {
    /// Schema for best-cost frequency files: `id` and `cost`.
    pub fn frequency() -> Self {
        Self::default()
    }

    /// Schema for convergence files: `id`, `iteration` and `cost`.
    pub fn convergence() -> Self {
        Self {
            iteration_column: Some("iteration".to_string()),
            ..Self::default()
        }
    }

    pub fn with_cost_column(mut self, name: impl Into<String>) -> Self {
        self.cost_column = name.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResultRow {
    pub id: RunId,
    pub cost: f64,
    pub iteration: Option<i64>,
}

/// Rows of one result file. Immutable once loaded.
#[derive(Clone, Debug)]
pub struct ResultTable {
    source: PathBuf,
    header: Vec<String>,
    schema: TableSchema,
    rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_iterations(&self) -> bool {
        self.schema.iteration_column.is_some()
    }
}

/// Read and parse a whitespace-delimited result file.
pub fn load_table(path: impl AsRef<Path>, schema: &TableSchema) -> Result<ResultTable, SummaryError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| SummaryError::DataLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_table(&text, path, schema)
}

/// Parse result rows from text. `source` is only used for error reporting.
///
/// Blank lines are ignored. The header is validated against `schema` before
/// any data row is looked at.
pub fn parse_table(
    input: &str,
    source: &Path,
    schema: &TableSchema,
) -> Result<ResultTable, SummaryError> {
    let load_error = |reason: String| SummaryError::DataLoad {
        path: source.to_path_buf(),
        reason,
    };

    let mut lines = input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let header: Vec<String> = match lines.next() {
        Some((_, line)) => line.split_whitespace().map(str::to_string).collect(),
        None => return Err(load_error("file has no header row".into())),
    };

    let id_idx = column_index(&header, &schema.id_column, source)?;
    let cost_idx = column_index(&header, &schema.cost_column, source)?;
    let iteration_idx = match schema.iteration_column.as_deref() {
        Some(name) => Some((column_index(&header, name, source)?, name)),
        None => None,
    };

    let mut rows = Vec::new();
    for (idx, line) in lines {
        let line_no = idx + 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != header.len() {
            return Err(load_error(format!(
                "line {}: expected {} fields, found {}",
                line_no,
                header.len(),
                fields.len()
            )));
        }

        let cost = Value::parse(fields[cost_idx])
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                load_error(format!(
                    "line {}: {} value '{}' is not a finite number",
                    line_no, schema.cost_column, fields[cost_idx]
                ))
            })?;

        let iteration = match iteration_idx {
            Some((i, name)) => Some(fields[i].parse::<i64>().map_err(|_| {
                load_error(format!(
                    "line {}: {} value '{}' is not an integer",
                    line_no, name, fields[i]
                ))
            })?),
            None => None,
        };

        rows.push(ResultRow {
            id: RunId::parse(fields[id_idx]),
            cost,
            iteration,
        });
    }

    Ok(ResultTable {
        source: source.to_path_buf(),
        header,
        schema: schema.clone(),
        rows,
    })
}

fn column_index(header: &[String], name: &str, source: &Path) -> Result<usize, SummaryError> {
    header
        .iter()
        .position(|column| column == name)
        .ok_or_else(|| SummaryError::Schema {
            path: source.to_path_buf(),
            column: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str, schema: &TableSchema) -> Result<ResultTable, SummaryError> {
        parse_table(input, Path::new("results.txt"), schema)
    }

    #[test]
    fn test_parse_frequency_table() {
        let input = "id  cost  time\n1 5 10\n1\t3 12\n\n2 3 9\n";
        let table = parse(input, &TableSchema::frequency()).unwrap();
        assert_eq!(table.header(), &["id", "cost", "time"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows()[1].id, RunId::Int(1));
        assert_eq!(table.rows()[1].cost, 3.0);
        assert_eq!(table.rows()[2].iteration, None);
        assert!(!table.has_iterations());
    }

    #[test]
    fn test_parse_convergence_table_with_reordered_columns() {
        let input = "cost iteration bestCost id\n20 0 20 7\n10 1 10 7\n";
        let table = parse(input, &TableSchema::convergence()).unwrap();
        assert_eq!(table.rows()[0].iteration, Some(0));
        assert_eq!(table.rows()[1].cost, 10.0);
        assert_eq!(table.rows()[1].id, RunId::Int(7));
    }

    #[test]
    fn test_custom_cost_column() {
        let input = "id iteration cost bestCost\n1 0 9 9\n1 1 12 9\n";
        let schema = TableSchema::convergence().with_cost_column("bestCost");
        let table = parse(input, &schema).unwrap();
        let costs: Vec<f64> = table.rows().iter().map(|r| r.cost).collect();
        assert_eq!(costs, vec![9.0, 9.0]);
    }

    #[test]
    fn test_header_only_is_empty_table() {
        let table = parse("id cost\n", &TableSchema::frequency()).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_empty_input_is_load_error() {
        let err = parse("\n  \n", &TableSchema::frequency()).unwrap_err();
        assert!(matches!(err, SummaryError::DataLoad { .. }));
    }

    #[test]
    fn test_missing_iteration_column_is_schema_error() {
        let err = parse("id cost\n1 2\n", &TableSchema::convergence()).unwrap_err();
        match err {
            SummaryError::Schema { column, .. } => assert_eq!(column, "iteration"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_schema_checked_before_rows() {
        // Malformed rows would be a load error, but the header check comes first.
        let err = parse("id time\n1\n", &TableSchema::frequency()).unwrap_err();
        assert!(matches!(err, SummaryError::Schema { .. }));
    }

    #[test]
    fn test_field_count_mismatch_names_line() {
        let err = parse("id cost\n1 2\n\n3 4 5\n", &TableSchema::frequency()).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, SummaryError::DataLoad { .. }));
        assert!(message.contains("line 4"), "{message}");
        assert!(message.contains("expected 2 fields, found 3"), "{message}");
    }

    #[test]
    fn test_non_numeric_cost_is_load_error() {
        let err = parse("id cost\n1 high\n", &TableSchema::frequency()).unwrap_err();
        assert!(matches!(err, SummaryError::DataLoad { .. }));
        let err = parse("id cost\n1 NaN\n", &TableSchema::frequency()).unwrap_err();
        assert!(matches!(err, SummaryError::DataLoad { .. }));
    }

    #[test]
    fn test_fractional_iteration_is_load_error() {
        let err = parse("id iteration cost\n1 0.5 3\n", &TableSchema::convergence()).unwrap_err();
        assert!(err.to_string().contains("iteration"));
    }

    #[test]
    fn test_iteration_error_names_schema_column() {
        let schema = TableSchema {
            iteration_column: Some("step".to_string()),
            ..TableSchema::convergence()
        };
        let err = parse("id step cost
1 x 3
", &schema).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, SummaryError::DataLoad { .. }));
        assert!(message.contains("line 2: step value 'x'"), "{message}");
    }
}

//! Chart jobs: which files to summarize and how to present them.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{BarOrder, IdSelection, SummaryError, TableSchema};

/// Presentation settings handed to the renderer with each derived view.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChartStyle {
    pub title: String,
    /// `#RRGGBB` or a named color.
    pub color: String,
    pub y_limit: Option<(f64, f64)>,
    pub x_label: String,
    pub y_label: String,
    /// Line opacity for overlaid traces.
    pub alpha: f64,
}

impl Default for ChartStyle {
    fn default() -> Self {
        Self {
            title: String::new(),
            color: "steelblue".to_string(),
            y_limit: None,
            x_label: "cost".to_string(),
            y_label: "quantity".to_string(),
            alpha: 1.0,
        }
    }
}

impl ChartStyle {
    pub fn frequency(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            color: "lightblue".to_string(),
            x_label: "repetitions".to_string(),
            y_label: "quantity".to_string(),
            ..Self::default()
        }
    }

    pub fn convergence(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            color: "orange".to_string(),
            x_label: "iteration".to_string(),
            y_label: "repetitions".to_string(),
            alpha: 0.25,
            ..Self::default()
        }
    }

    fn with_color(mut self, color: &str) -> Self {
        self.color = color.to_string();
        self
    }

    fn with_y_limit(mut self, lo: f64, hi: f64) -> Self {
        self.y_limit = Some((lo, hi));
        self
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    Frequency {
        #[serde(default)]
        order: BarOrder,
    },
    Convergence {
        #[serde(default)]
        ids: IdSelection,
        #[serde(default)]
        max_points: Option<usize>,
    },
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct JobInput {
    pub path: PathBuf,
    #[serde(default)]
    pub style: Option<ChartStyle>,
}

impl JobInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            style: None,
        }
    }

    fn styled(path: PathBuf, style: ChartStyle) -> Self {
        Self {
            path,
            style: Some(style),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Job {
    pub name: String,
    pub kind: JobKind,
    #[serde(default)]
    pub cost_column: Option<String>,
    pub inputs: Vec<JobInput>,
}

impl Job {
    pub fn schema(&self) -> TableSchema {
        let schema = match self.kind {
            JobKind::Frequency { .. } => TableSchema::frequency(),
            JobKind::Convergence { .. } => TableSchema::convergence(),
        };
        match self.cost_column.as_deref() {
            Some(column) => schema.with_cost_column(column),
            None => schema,
        }
    }

    /// The input's own style, or this job kind's defaults titled after the file stem.
    pub fn style_for(&self, input: &JobInput) -> ChartStyle {
        if let Some(style) = input.style.as_ref() {
            return style.clone();
        }
        let title = input
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.kind {
            JobKind::Frequency { .. } => ChartStyle::frequency(title),
            JobKind::Convergence { .. } => ChartStyle::convergence(title),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Manifest {
    pub jobs: Vec<Job>,
}

/// Read a JSON job manifest. Relative input paths resolve against the
/// manifest's directory.
pub fn load_manifest(path: &Path) -> Result<Manifest, SummaryError> {
    let text = fs::read_to_string(path).map_err(|e| SummaryError::Manifest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut manifest = parse_manifest(&text, path)?;
    if let Some(base) = path.parent() {
        for input in manifest.jobs.iter_mut().flat_map(|job| job.inputs.iter_mut()) {
            if input.path.is_relative() {
                input.path = base.join(&input.path);
            }
        }
    }
    Ok(manifest)
}

pub fn parse_manifest(text: &str, path: &Path) -> Result<Manifest, SummaryError> {
    let manifest: Manifest = serde_json::from_str(text).map_err(|e| SummaryError::Manifest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if manifest.jobs.is_empty() {
        return Err(SummaryError::Manifest {
            path: path.to_path_buf(),
            reason: "no jobs listed".to_string(),
        });
    }
    Ok(manifest)
}

/// Built-in jobs matching the experiment's published charts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preset {
    /// Best-cost frequency on the 3x3 Kaggle puzzle set.
    Kaggle,
    /// Best-cost frequency on hard 4x4 and 5x5 puzzles.
    Difficulty,
    /// Convergence traces for each neighbor strategy and minimum temperature.
    ParamsFixation,
}

impl Preset {
    pub fn all() -> [Preset; 3] {
        [Preset::Kaggle, Preset::Difficulty, Preset::ParamsFixation]
    }

    pub fn name(self) -> &'static str {
        match self {
            Preset::Kaggle => "kaggle",
            Preset::Difficulty => "difficulty",
            Preset::ParamsFixation => "params-fixation",
        }
    }

    pub fn job(self, results_dir: &Path) -> Job {
        match self {
            Preset::Kaggle => Job {
                name: self.name().to_string(),
                kind: JobKind::Frequency {
                    order: BarOrder::Count,
                },
                cost_column: None,
                inputs: vec![JobInput::styled(
                    results_dir.join("kaggle").join("r_3_ss_1000_0.01_0.90.txt"),
                    ChartStyle::frequency("Efectividad Sudokus 3x3").with_y_limit(0.0, 250.0),
                )],
            },
            Preset::Difficulty => {
                let dir = results_dir.join("difficulty");
                let inputs = [
                    (4, "Efectividad Sudokus 4x4, Dificultad Alta", "#5B5678"),
                    (5, "Efectividad Sudokus 5x5, Dificultad Alta", "#99CC33"),
                ]
                .into_iter()
                .map(|(size, title, color)| {
                    JobInput::styled(
                        dir.join(format!("r_{}_genius_ss_1000_0.01_0.90.txt", size)),
                        ChartStyle::frequency(title)
                            .with_color(color)
                            .with_y_limit(0.0, 10.0),
                    )
                })
                .collect();
                Job {
                    name: self.name().to_string(),
                    kind: JobKind::Frequency {
                        order: BarOrder::Count,
                    },
                    cost_column: None,
                    inputs,
                }
            }
            Preset::ParamsFixation => {
                let dir = results_dir.join("params_fixation");
                let mut inputs = Vec::new();
                for t_min in ["0.10", "0.01"] {
                    for (strategy, code) in ["ao", "sb", "ss"].into_iter().enumerate() {
                        let mut style = ChartStyle::convergence(format!(
                            "Estrategia {}, Tmin = {}",
                            strategy + 1,
                            t_min.trim_end_matches('0')
                        ))
                        .with_y_limit(0.0, 1000.0);
                        style.alpha = 0.1;
                        inputs.push(JobInput::styled(
                            dir.join(format!("r_4_{}_1000_{}_0.90.txt", code, t_min)),
                            style,
                        ));
                    }
                }
                Job {
                    name: self.name().to_string(),
                    kind: JobKind::Convergence {
                        ids: IdSelection::Range { start: 1, end: 50 },
                        max_points: Some(20_000),
                    },
                    cost_column: None,
                    inputs,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RunId;

    #[test]
    fn test_parse_manifest_defaults() {
        let text = r#"{
            "jobs": [
                {
                    "name": "freq",
                    "kind": {"type": "frequency"},
                    "inputs": [{"path": "a.txt"}]
                },
                {
                    "name": "conv",
                    "kind": {"type": "convergence", "ids": [1, "2", "run-x"]},
                    "cost_column": "bestCost",
                    "inputs": [
                        {"path": "b.txt", "style": {"title": "B", "y_limit": [0, 500]}}
                    ]
                }
            ]
        }"#;
        let manifest = parse_manifest(text, Path::new("jobs.json")).unwrap();
        assert_eq!(manifest.jobs.len(), 2);

        let freq = &manifest.jobs[0];
        assert_eq!(
            freq.kind,
            JobKind::Frequency {
                order: BarOrder::Count
            }
        );
        assert_eq!(freq.schema(), TableSchema::frequency());
        let style = freq.style_for(&freq.inputs[0]);
        assert_eq!(style.title, "a");
        assert_eq!(style.x_label, "repetitions");

        let conv = &manifest.jobs[1];
        assert_eq!(
            conv.kind,
            JobKind::Convergence {
                ids: IdSelection::List(vec![
                    RunId::Int(1),
                    RunId::Int(2),
                    RunId::Text("run-x".into())
                ]),
                max_points: None,
            }
        );
        let schema = conv.schema();
        assert_eq!(schema.cost_column, "bestCost");
        assert_eq!(schema.iteration_column.as_deref(), Some("iteration"));
        let style = conv.style_for(&conv.inputs[0]);
        assert_eq!(style.title, "B");
        assert_eq!(style.y_limit, Some((0.0, 500.0)));
        assert_eq!(style.alpha, 1.0);
    }

    #[test]
    fn test_manifest_range_ids() {
        let text = r#"{"jobs": [{"name": "c", "kind": {"type": "convergence", "ids": "1..=5"}, "inputs": []}]}"#;
        let manifest = parse_manifest(text, Path::new("jobs.json")).unwrap();
        assert_eq!(
            manifest.jobs[0].kind,
            JobKind::Convergence {
                ids: IdSelection::Range { start: 1, end: 5 },
                max_points: None
            }
        );
    }

    #[test]
    fn test_bad_manifest_is_rejected() {
        let err = parse_manifest(r#"{"jobs": []}"#, Path::new("jobs.json")).unwrap_err();
        assert!(matches!(err, SummaryError::Manifest { .. }));
        let err = parse_manifest(
            r#"{"jobs": [{"name": "c", "kind": {"type": "convergence", "ids": "9..1"}, "inputs": []}]}"#,
            Path::new("jobs.json"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("jobs.json"));
        let err = parse_manifest("not json", Path::new("jobs.json")).unwrap_err();
        assert!(matches!(err, SummaryError::Manifest { .. }));
    }

    #[test]
    fn test_presets_resolve_under_results_dir() {
        let base = Path::new("/data/results");
        let kaggle = Preset::Kaggle.job(base);
        assert_eq!(
            kaggle.inputs[0].path,
            base.join("kaggle/r_3_ss_1000_0.01_0.90.txt")
        );
        let style = kaggle.style_for(&kaggle.inputs[0]);
        assert_eq!(style.y_limit, Some((0.0, 250.0)));
        assert_eq!(style.color, "lightblue");

        let difficulty = Preset::Difficulty.job(base);
        let colors: Vec<String> = difficulty
            .inputs
            .iter()
            .map(|input| difficulty.style_for(input).color)
            .collect();
        assert_eq!(colors, vec!["#5B5678", "#99CC33"]);

        let fixation = Preset::ParamsFixation.job(base);
        assert_eq!(fixation.inputs.len(), 6);
        assert!(fixation.schema().iteration_column.is_some());
        let first = fixation.style_for(&fixation.inputs[0]);
        assert_eq!(first.title, "Estrategia 1, Tmin = 0.1");
        assert_eq!(first.alpha, 0.1);
        assert_eq!(
            fixation.inputs[5].path,
            base.join("params_fixation/r_4_ss_1000_0.01_0.90.txt")
        );
        let last = fixation.style_for(&fixation.inputs[5]);
        assert_eq!(last.title, "Estrategia 3, Tmin = 0.01");
    }

    #[test]
    fn test_preset_names_unique() {
        let names: Vec<&str> = Preset::all().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["kaggle", "difficulty", "params-fixation"]);
    }
}

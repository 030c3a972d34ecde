mod render;

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use sa_summary::{
    extract_convergence_series, format_cost, load_manifest, load_table,
    summarize_best_cost_frequency, BarOrder, ChartStyle, ConvergenceSeries, IdSelection, Job,
    JobInput, JobKind, Preset, RunId,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use render::{render_chart_guard, ChartKind, ChartView};

#[derive(Parser, Debug)]
#[command(author, version, about = "Annealing result summary charts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bar chart of how many runs reached each best cost
    Frequency(FrequencyArgs),
    /// Overlaid cost-over-iteration traces for selected run ids
    Convergence(ConvergenceArgs),
    /// Render one of the built-in chart sets
    Preset(PresetArgs),
    /// Render every job listed in a JSON manifest
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct FrequencyArgs {
    /// Whitespace-delimited result files with `id` and `cost` columns
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Bar ordering
    #[arg(long, value_enum, default_value_t = OrderOpt::Count)]
    order: OrderOpt,

    /// Column holding the cost to summarize
    #[arg(long)]
    cost_column: Option<String>,

    #[command(flatten)]
    style: StyleArgs,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Parser, Debug)]
struct ConvergenceArgs {
    /// Result files with `id`, `iteration` and `cost` columns
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Run ids to plot: `1..=50`, `1..51`, `3,7,9` or `all`
    #[arg(long, default_value = "1..=50")]
    ids: IdSelection,

    /// Cap on points drawn per trace (0 keeps every point)
    #[arg(long, default_value_t = 20_000)]
    max_points: usize,

    /// Column holding the cost to plot
    #[arg(long)]
    cost_column: Option<String>,

    /// Line opacity
    #[arg(long)]
    alpha: Option<f64>,

    #[command(flatten)]
    style: StyleArgs,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Parser, Debug)]
struct PresetArgs {
    /// Chart set to render
    #[arg(value_enum)]
    preset: PresetOpt,

    /// Directory holding the experiment's `results/` tree
    #[arg(long, default_value = "results", value_hint = ValueHint::DirPath)]
    results_dir: PathBuf,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// JSON manifest listing jobs
    #[arg(value_hint = ValueHint::FilePath)]
    manifest: PathBuf,

    #[command(flatten)]
    output: OutputArgs,
}

/// Overrides applied on top of each input's chart style.
#[derive(Args, Debug, Default)]
struct StyleArgs {
    /// Chart title (defaults to the input file stem)
    #[arg(long)]
    title: Option<String>,

    /// Bar/line color (`#RRGGBB` or a name such as `lightblue`)
    #[arg(long)]
    color: Option<String>,

    /// Lower y-axis bound
    #[arg(long)]
    y_min: Option<f64>,

    /// Upper y-axis bound
    #[arg(long)]
    y_max: Option<f64>,

    /// X-axis label
    #[arg(long)]
    x_label: Option<String>,

    /// Y-axis label
    #[arg(long)]
    y_label: Option<String>,
}

impl StyleArgs {
    fn apply(&self, mut style: ChartStyle) -> ChartStyle {
        if let Some(title) = self.title.as_ref() {
            style.title = title.clone();
        }
        if let Some(color) = self.color.as_ref() {
            style.color = color.clone();
        }
        if let Some(label) = self.x_label.as_ref() {
            style.x_label = label.clone();
        }
        if let Some(label) = self.y_label.as_ref() {
            style.y_label = label.clone();
        }
        style.y_limit = match (self.y_min, self.y_max) {
            (Some(lo), Some(hi)) => Some((lo, hi)),
            (None, Some(hi)) => Some((style.y_limit.map_or(0.0, |(lo, _)| lo), hi)),
            (Some(lo), None) => match style.y_limit {
                Some((_, hi)) => Some((lo, hi)),
                None => {
                    warn!("--y-min ignored without an upper bound");
                    None
                }
            },
            (None, None) => style.y_limit,
        };
        style
    }
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Directory for charts and CSV exports
    #[arg(long, default_value = "charts", value_hint = ValueHint::DirPath)]
    out_dir: PathBuf,

    /// Chart image format
    #[arg(long, value_enum, default_value_t = FormatOpt::Svg)]
    format: FormatOpt,

    /// Also write each derived view as CSV
    #[arg(long, action = ArgAction::SetTrue)]
    csv: bool,

    /// Skip chart rendering
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OrderOpt {
    Count,
    Cost,
}

impl From<OrderOpt> for BarOrder {
    fn from(value: OrderOpt) -> Self {
        match value {
            OrderOpt::Count => BarOrder::Count,
            OrderOpt::Cost => BarOrder::Cost,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FormatOpt {
    Svg,
    Png,
}

impl From<FormatOpt> for ChartKind {
    fn from(value: FormatOpt) -> Self {
        match value {
            FormatOpt::Svg => ChartKind::Svg,
            FormatOpt::Png => ChartKind::Png,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PresetOpt {
    Kaggle,
    Difficulty,
    ParamsFixation,
}

impl From<PresetOpt> for Preset {
    fn from(value: PresetOpt) -> Self {
        match value {
            PresetOpt::Kaggle => Preset::Kaggle,
            PresetOpt::Difficulty => Preset::Difficulty,
            PresetOpt::ParamsFixation => Preset::ParamsFixation,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Frequency(args) => args.output.verbose,
        Command::Convergence(args) => args.output.verbose,
        Command::Preset(args) => args.output.verbose,
        Command::Run(args) => args.output.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Frequency(args) => handle_frequency(args),
        Command::Convergence(args) => handle_convergence(args),
        Command::Preset(args) => handle_preset(args),
        Command::Run(args) => handle_run(args),
    }
}

fn handle_frequency(args: FrequencyArgs) -> Result<()> {
    let job = Job {
        name: "frequency".to_string(),
        kind: JobKind::Frequency {
            order: args.order.into(),
        },
        cost_column: args.cost_column,
        inputs: args.inputs.into_iter().map(JobInput::new).collect(),
    };
    run_jobs(&[job], &args.style, &args.output)
}

fn handle_convergence(args: ConvergenceArgs) -> Result<()> {
    let job = Job {
        name: "convergence".to_string(),
        kind: JobKind::Convergence {
            ids: args.ids,
            max_points: (args.max_points > 0).then_some(args.max_points),
        },
        cost_column: args.cost_column,
        inputs: args.inputs.into_iter().map(JobInput::new).collect(),
    };
    let job = match args.alpha {
        Some(alpha) => with_alpha(job, alpha),
        None => job,
    };
    run_jobs(&[job], &args.style, &args.output)
}

fn with_alpha(mut job: Job, alpha: f64) -> Job {
    let styles: Vec<ChartStyle> = job
        .inputs
        .iter()
        .map(|input| {
            let mut style = job.style_for(input);
            style.alpha = alpha;
            style
        })
        .collect();
    for (input, style) in job.inputs.iter_mut().zip(styles) {
        input.style = Some(style);
    }
    job
}

fn handle_preset(args: PresetArgs) -> Result<()> {
    let preset: Preset = args.preset.into();
    info!(
        "Preset {} from {}",
        preset.name(),
        args.results_dir.display()
    );
    let job = preset.job(&args.results_dir);
    run_jobs(&[job], &StyleArgs::default(), &args.output)
}

fn handle_run(args: RunArgs) -> Result<()> {
    let manifest = load_manifest(&args.manifest)?;
    info!(
        "Manifest {}: {} job(s)",
        args.manifest.display(),
        manifest.jobs.len()
    );
    run_jobs(&manifest.jobs, &StyleArgs::default(), &args.output)
}

/// Process every input of every job in order. A failing file is logged and
/// skipped; the run fails at the end if any file did.
fn run_jobs(jobs: &[Job], overrides: &StyleArgs, output: &OutputArgs) -> Result<()> {
    if !output.no_plot || output.csv {
        fs::create_dir_all(&output.out_dir)
            .with_context(|| format!("failed to create {}", output.out_dir.display()))?;
    }

    let mut failed = Vec::new();
    let mut used_stems = HashSet::new();
    for job in jobs {
        info!("Job {}: {} input(s)", job.name, job.inputs.len());
        for input in &job.inputs {
            let stem = claim_output_stem(&mut used_stems, &input.path);
            if let Err(err) = process_input(job, input, &stem, overrides, output) {
                error!("{}: {:#}", input.path.display(), err);
                failed.push(input.path.display().to_string());
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "{} file(s) failed: {}",
            failed.len(),
            failed.join(", ")
        ))
    }
}

fn process_input(
    job: &Job,
    input: &JobInput,
    stem: &str,
    overrides: &StyleArgs,
    output: &OutputArgs,
) -> Result<()> {
    let t_load = Instant::now();
    let table = load_table(&input.path, &job.schema())?;
    debug!(
        "Loaded {} rows from {} in {:.1} ms",
        table.len(),
        input.path.display(),
        t_load.elapsed().as_secs_f64() * 1000.0
    );

    let style = overrides.apply(job.style_for(input));
    let kind: ChartKind = output.format.into();
    let chart_path = derive_output_path(&output.out_dir, stem, "", kind.extension());

    match &job.kind {
        JobKind::Frequency { order } => {
            let frequency = summarize_best_cost_frequency(&table);
            if frequency.is_empty() {
                warn!("{}: no rows to summarize", input.path.display());
            }
            info!(
                "{}: {} run ids across {} best-cost values",
                input.path.display(),
                frequency.total(),
                frequency.len()
            );
            let bars = frequency.bars(*order);

            if output.csv {
                let csv_path = derive_output_path(&output.out_dir, stem, "_frequency", "csv");
                write_frequency_csv(&bars, &csv_path)?;
                info!("Wrote frequency CSV: {}", csv_path.display());
            }
            if !output.no_plot {
                render_chart_guard(&ChartView::Bars(&bars), &style, &chart_path, kind)
                    .with_context(|| format!("failed to render {}", chart_path.display()))?;
                info!("Wrote plot: {}", chart_path.display());
            }
        }
        JobKind::Convergence { ids, max_points } => {
            let series = extract_convergence_series(&table, ids)?;
            let missing: Vec<String> = series
                .values()
                .filter(|s| s.is_empty())
                .map(|s| s.id.to_string())
                .collect();
            if !missing.is_empty() {
                debug!(
                    "{}: no rows for id(s) {}",
                    input.path.display(),
                    missing.join(",")
                );
            }
            info!(
                "{}: {} of {} requested ids have traces",
                input.path.display(),
                series.len() - missing.len(),
                series.len()
            );

            if output.csv {
                let csv_path =
                    derive_output_path(&output.out_dir, stem, "_convergence", "csv");
                write_series_csv(&series, &csv_path)?;
                info!("Wrote convergence CSV: {}", csv_path.display());
            }
            if !output.no_plot {
                let traces: Vec<ConvergenceSeries> = match max_points {
                    Some(cap) => series.values().map(|s| s.thinned(*cap)).collect(),
                    None => series.into_values().collect(),
                };
                render_chart_guard(&ChartView::Lines(&traces), &style, &chart_path, kind)
                    .with_context(|| format!("failed to render {}", chart_path.display()))?;
                info!("Wrote plot: {}", chart_path.display());
            }
        }
    }
    Ok(())
}

/// Base name for an input's outputs, unique within one batch. Inputs sharing a
/// file stem get `_2`, `_3`, ... appended in processing order.
fn claim_output_stem(used: &mut HashSet<String>, input: &Path) -> String {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("results");
    if used.insert(stem.to_string()) {
        return stem.to_string();
    }
    let unique = (2..)
        .map(|n| format!("{}_{}", stem, n))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| stem.to_string());
    used.insert(unique.clone());
    warn!(
        "{}: output name '{}' already used in this run, writing '{}'",
        input.display(),
        stem,
        unique
    );
    unique
}

fn derive_output_path(out_dir: &Path, stem: &str, suffix: &str, ext: &str) -> PathBuf {
    out_dir.join(format!("{}{}.{}", stem, suffix, ext))
}

fn write_frequency_csv(bars: &[(f64, usize)], path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(["cost", "quantity"])?;
    for (cost, count) in bars {
        writer.write_record([format_cost(*cost), count.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_series_csv(series: &BTreeMap<RunId, ConvergenceSeries>, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(["id", "iteration", "cost"])?;
    for trace in series.values() {
        let id = trace.id.to_string();
        for (iteration, cost) in &trace.points {
            writer.write_record([id.clone(), iteration.to_string(), format_cost(*cost)])?;
        }
    }
    writer.flush()?;
    Ok(())
}

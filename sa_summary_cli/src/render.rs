use std::panic;
use std::path::Path;

use anyhow::{anyhow, Result};
use plotters::coord::Shift;
use plotters::prelude::*;
use sa_summary::{format_cost, ChartStyle, ConvergenceSeries};

const CHART_SIZE: (u32, u32) = (1280, 760);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChartKind {
    Png,
    Svg,
}

impl ChartKind {
    pub fn extension(self) -> &'static str {
        match self {
            ChartKind::Png => "png",
            ChartKind::Svg => "svg",
        }
    }
}

/// Data handed to the renderer: categorical bars or overlaid traces.
pub enum ChartView<'a> {
    Bars(&'a [(f64, usize)]),
    Lines(&'a [ConvergenceSeries]),
}

/// Render a chart, turning a backend panic into an error for this chart only.
pub fn render_chart_guard(
    view: &ChartView,
    style: &ChartStyle,
    path: &Path,
    kind: ChartKind,
) -> Result<()> {
    let color = parse_color(&style.color)?;
    if let Some((lo, hi)) = style.y_limit {
        if !(lo < hi) {
            return Err(anyhow!("invalid y limit {}..{}", lo, hi));
        }
    }
    let render = || render_chart(view, style, color, path, kind);
    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| anyhow!("plotting backend panicked"))?
}

fn render_chart(
    view: &ChartView,
    style: &ChartStyle,
    color: RGBColor,
    path: &Path,
    kind: ChartKind,
) -> Result<()> {
    match kind {
        ChartKind::Png => {
            let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
            draw_view(root, view, style, color)
        }
        ChartKind::Svg => {
            let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
            draw_view(root, view, style, color)
        }
    }
}

fn draw_view<DB>(
    root: DrawingArea<DB, Shift>,
    view: &ChartView,
    style: &ChartStyle,
    color: RGBColor,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    match view {
        ChartView::Bars(bars) => draw_bars(&root, bars, style, color)?,
        ChartView::Lines(series) => draw_lines(&root, series, style, color)?,
    }
    root.present()?;
    Ok(())
}

fn draw_bars<DB>(
    root: &DrawingArea<DB, Shift>,
    bars: &[(f64, usize)],
    style: &ChartStyle,
    color: RGBColor,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let labels: Vec<String> = bars.iter().map(|(cost, _)| format_cost(*cost)).collect();
    let peak = bars.iter().map(|(_, count)| *count as f64).fold(0.0, f64::max);
    let (y_min, y_max) = style.y_limit.unwrap_or((0.0, (peak * 1.1).max(1.0)));
    let slots = bars.len().max(1);

    let mut chart = ChartBuilder::on(root)
        .caption(&style.title, ("sans-serif", 24))
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d((0..slots).into_segmented(), y_min..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(slots + 1)
        .x_label_formatter(&|v| match v {
            SegmentValue::CenterOf(idx) => labels.get(*idx).cloned().unwrap_or_default(),
            _ => String::new(),
        })
        .y_label_formatter(&|v| format!("{:.0}", v))
        .x_desc(style.x_label.as_str())
        .y_desc(style.y_label.as_str())
        .draw()?;

    chart.draw_series(
        Histogram::vertical(&chart)
            .style(color.filled())
            .margin(12)
            .data(
                bars.iter()
                    .enumerate()
                    .map(|(idx, (_, count))| (idx, *count as f64)),
            ),
    )?;
    Ok(())
}

fn draw_lines<DB>(
    root: &DrawingArea<DB, Shift>,
    series: &[ConvergenceSeries],
    style: &ChartStyle,
    color: RGBColor,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let x_min = series
        .iter()
        .filter_map(|s| s.points.first())
        .map(|(iteration, _)| *iteration as f64)
        .fold(0.0, f64::min);
    let mut x_max = series
        .iter()
        .filter_map(|s| s.points.last())
        .map(|(iteration, _)| *iteration as f64)
        .fold(x_min, f64::max);
    if x_max <= x_min {
        x_max = x_min + 1.0;
    }

    let (y_min, y_max) = match style.y_limit {
        Some(limit) => limit,
        None => {
            let hi = series
                .iter()
                .filter_map(ConvergenceSeries::cost_range)
                .map(|(_, hi)| hi)
                .fold(0.0, f64::max);
            (0.0, (hi * 1.05).max(1.0))
        }
    };

    let mut chart = ChartBuilder::on(root)
        .caption(&style.title, ("sans-serif", 24))
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_label_formatter(&|v| format!("{:.0}", v))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .x_desc(style.x_label.as_str())
        .y_desc(style.y_label.as_str())
        .draw()?;

    let line_style = color.mix(style.alpha.clamp(0.0, 1.0)).stroke_width(1);
    for trace in series.iter().filter(|s| !s.is_empty()) {
        chart.draw_series(LineSeries::new(
            trace
                .points
                .iter()
                .map(|&(iteration, cost)| (iteration as f64, cost)),
            line_style,
        ))?;
    }
    Ok(())
}

/// Parse `#RRGGBB` or one of a handful of named colors.
pub fn parse_color(spec: &str) -> Result<RGBColor> {
    let trimmed = spec.trim();
    if let Some(hex) = trimmed.strip_prefix('#') {
        if hex.len() == 6 {
            if let Ok(v) = u32::from_str_radix(hex, 16) {
                return Ok(RGBColor((v >> 16) as u8, (v >> 8) as u8, v as u8));
            }
        }
        return Err(anyhow!("invalid hex color '{}'", spec));
    }
    let rgb = match trimmed.to_ascii_lowercase().as_str() {
        "lightblue" => (173, 216, 230),
        "steelblue" => (70, 130, 180),
        "orange" => (255, 165, 0),
        "black" => (0, 0, 0),
        "gray" | "grey" => (128, 128, 128),
        "red" => (255, 0, 0),
        "green" => (0, 128, 0),
        "blue" => (0, 0, 255),
        "purple" => (128, 0, 128),
        _ => return Err(anyhow!("unrecognized color '{}'", spec)),
    };
    Ok(RGBColor(rgb.0, rgb.1, rgb.2))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use sa_summary::RunId;

    use super::*;

    fn unique_path(name: &str, ext: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "sa_summary_render_{}_{}_{}.{}",
            name,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos(),
            ext
        ));
        path
    }

    #[test]
    fn test_parse_color() {
        let c = parse_color("#5B5678").unwrap();
        assert_eq!((c.0, c.1, c.2), (0x5b, 0x56, 0x78));
        let c = parse_color("LightBlue").unwrap();
        assert_eq!((c.0, c.1, c.2), (173, 216, 230));
        assert!(parse_color("#12345").is_err());
        assert!(parse_color("#zzzzzz").is_err());
        assert!(parse_color("chartreuse-ish").is_err());
    }

    #[test]
    fn test_render_bar_svg() {
        let path = unique_path("bars", "svg");
        let bars = vec![(3.0, 2), (0.0, 1), (5.0, 1)];
        let style = ChartStyle::frequency("Efectividad");
        render_chart_guard(&ChartView::Bars(&bars), &style, &path, ChartKind::Svg).unwrap();
        let svg = fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("<rect"));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_render_empty_bar_chart() {
        let path = unique_path("empty", "svg");
        let style = ChartStyle::frequency("Empty");
        render_chart_guard(&ChartView::Bars(&[]), &style, &path, ChartKind::Svg).unwrap();
        assert!(path.exists());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_render_overlay_svg() {
        let path = unique_path("lines", "svg");
        let series = vec![
            ConvergenceSeries {
                id: RunId::Int(1),
                points: vec![(0, 20.0), (1, 10.0), (2, 7.0)],
            },
            ConvergenceSeries::new(RunId::Int(2)),
            ConvergenceSeries {
                id: RunId::Int(3),
                points: vec![(0, 18.0), (3, 4.0)],
            },
        ];
        let style = ChartStyle::convergence("Estrategia 1");
        render_chart_guard(&ChartView::Lines(&series), &style, &path, ChartKind::Svg).unwrap();
        let svg = fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<polyline"));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_invalid_style_is_rejected_before_drawing() {
        let path = unique_path("bad", "svg");
        let mut style = ChartStyle::frequency("Bad");
        style.y_limit = Some((10.0, 0.0));
        assert!(render_chart_guard(&ChartView::Bars(&[]), &style, &path, ChartKind::Svg).is_err());
        style.y_limit = None;
        style.color = "nope".into();
        assert!(render_chart_guard(&ChartView::Bars(&[]), &style, &path, ChartKind::Svg).is_err());
        assert!(!path.exists());
    }
}

//! Chart rendering with plotters.
//!
//! Every chart is drawn into an in-memory 800x600 RGB frame and encoded
//! as PNG, so nothing touches the filesystem. The four kinds mirror the
//! dashboard's selector. Column roles are checked before any drawing
//! happens: a type mismatch comes back as [`ChartError::Warning`] and
//! leaves the loaded table untouched.

use crate::table::{Column, Table};
use lazy_static::lazy_static;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use plotters::style::FontTransform;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Cursor;
use std::ops::Range;
use thiserror::Error;

pub const CHART_WIDTH: u32 = 800;
pub const CHART_HEIGHT: u32 = 600;

/// Fill colour used when the request does not pick one.
pub const DEFAULT_COLOR: &str = "#1f77b4";

lazy_static! {
    static ref HEX_COLOR: Regex = Regex::new(r"^#?([0-9a-fA-F]{6})$").unwrap();
}

/// Chart kinds offered by the dashboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Histogram,
}

impl ChartKind {
    /// Human-readable name, as shown in the chart type selector.
    pub fn label(&self) -> &'static str {
        match self {
            ChartKind::Bar => "Bar Chart",
            ChartKind::Line => "Line Chart",
            ChartKind::Scatter => "Scatter Plot",
            ChartKind::Histogram => "Histogram",
        }
    }
}

/// One chart request, as sent by the dashboard's query string.
///
/// Missing text fields fall back to column names, and the colour falls
/// back to [`DEFAULT_COLOR`]. Histograms read their single column from
/// `x` and ignore `y`.
#[derive(Clone, Debug, Deserialize)]
pub struct ChartRequest {
    pub kind: ChartKind,
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub x_label: Option<String>,
    #[serde(default)]
    pub y_label: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// Why a chart was not produced.
#[derive(Debug, Error)]
pub enum ChartError {
    /// A selected column cannot fill the requested role. The chart is
    /// withheld but the loaded table stays usable.
    #[error("{0}")]
    Warning(String),
    /// The request or the drawing itself was broken.
    #[error("{0}")]
    Render(String),
}

impl ChartError {
    pub fn is_warning(&self) -> bool {
        matches!(self, ChartError::Warning(_))
    }
}

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for ChartError {
    fn from(err: DrawingAreaErrorKind<E>) -> Self {
        ChartError::Render(err.to_string())
    }
}

impl From<image::ImageError> for ChartError {
    fn from(err: image::ImageError) -> Self {
        ChartError::Render(err.to_string())
    }
}

/// Render one chart as a PNG image.
pub fn render_chart(table: &Table, req: &ChartRequest) -> Result<Vec<u8>, ChartError> {
    let color = parse_color(req.color.as_deref())?;
    match req.kind {
        ChartKind::Bar => render_bar(table, req, color),
        ChartKind::Line => render_line(table, req, color),
        ChartKind::Scatter => render_scatter(table, req, color),
        ChartKind::Histogram => render_histogram(table, req, color),
    }
}

/// Resolved text decorations for one chart.
#[derive(Clone, Debug, PartialEq, Eq)]
struct ChartLabels {
    title: Option<String>,
    x: String,
    y: String,
}

/// Fill in label defaults: empty title means no title at all, empty
/// axis labels fall back to the given column names (or "Frequency" for
/// a histogram's y-axis).
fn resolve_labels(req: &ChartRequest, x_default: &str, y_default: &str) -> ChartLabels {
    fn pick(custom: Option<&str>, default: &str) -> String {
        match custom {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => default.to_string(),
        }
    }
    ChartLabels {
        title: req.title.clone().filter(|t| !t.is_empty()),
        x: pick(req.x_label.as_deref(), x_default),
        y: pick(req.y_label.as_deref(), y_default),
    }
}

fn parse_color(raw: Option<&str>) -> Result<RGBColor, ChartError> {
    let raw = match raw {
        Some(s) if !s.is_empty() => s,
        _ => DEFAULT_COLOR,
    };
    let caps = HEX_COLOR
        .captures(raw)
        .ok_or_else(|| ChartError::Render(format!("invalid color '{raw}', expected #rrggbb")))?;
    let hex = &caps[1];
    let channel = |i: usize| u8::from_str_radix(&hex[2 * i..2 * i + 2], 16).unwrap_or(0);
    Ok(RGBColor(channel(0), channel(1), channel(2)))
}

/// Find the column a request named for a given role.
fn selected<'a>(table: &'a Table, name: Option<&str>, role: &str) -> Result<&'a Column, ChartError> {
    let name = name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ChartError::Render(format!("no {role} column selected")))?;
    table
        .column(name)
        .ok_or_else(|| ChartError::Render(format!("unknown {role} column '{name}'")))
}

/// Reject non-numeric columns for roles that need numbers.
fn require_numeric(col: &Column, kind: ChartKind) -> Result<(), ChartError> {
    if col.is_numeric() {
        return Ok(());
    }
    let role = match kind {
        ChartKind::Histogram => "for a Histogram".to_string(),
        other => format!("for the y-axis in a {}", other.label()),
    };
    Err(ChartError::Warning(format!(
        "Column '{}' is not numerical and cannot be used {role}. Please select a numerical column.",
        col.name
    )))
}

/// A column projected onto one chart axis.
///
/// Numeric columns keep their values. Other columns are coded by first
/// appearance and carry the category names for tick labelling. Cells
/// without a position are `None` and drop the whole point.
struct AxisValues {
    points: Vec<Option<f64>>,
    categories: Option<Vec<String>>,
}

fn axis_values(col: &Column) -> AxisValues {
    if col.is_numeric() {
        return AxisValues {
            points: col.numbers().collect(),
            categories: None,
        };
    }
    let mut categories: Vec<String> = Vec::new();
    let mut codes: HashMap<String, usize> = HashMap::new();
    let points = col
        .values
        .iter()
        .map(|v| {
            if v.is_empty() {
                return None;
            }
            let key = v.render();
            let code = *codes.entry(key.clone()).or_insert_with(|| {
                categories.push(key.clone());
                categories.len() - 1
            });
            Some(code as f64)
        })
        .collect();
    AxisValues {
        points,
        categories: Some(categories),
    }
}

/// Group y by the display form of x, averaging duplicates. Categories
/// keep their first-seen order; rows with an empty cell on either side
/// are skipped.
fn mean_by_category(x: &Column, y: &Column) -> (Vec<String>, Vec<f64>) {
    let mut order: Vec<String> = Vec::new();
    let mut sums: HashMap<String, (f64, u32)> = HashMap::new();
    for (label, value) in x.values.iter().zip(y.numbers()) {
        if label.is_empty() {
            continue;
        }
        let Some(v) = value else { continue };
        let key = label.render();
        if !sums.contains_key(&key) {
            order.push(key.clone());
        }
        let entry = sums.entry(key).or_insert((0.0, 0));
        entry.0 += v;
        entry.1 += 1;
    }
    let means = order
        .iter()
        .map(|k| sums.get(k).map(|(sum, n)| sum / f64::from(*n)).unwrap_or(0.0))
        .collect();
    (order, means)
}

fn format_tick(v: f64) -> String {
    if (v - v.round()).abs() < 1e-9 && v.abs() < 1e15 {
        format!("{}", v.round() as i64)
    } else {
        format!("{v:.2}")
    }
}

/// Tick label for a coded category axis. Ticks that land between codes
/// stay blank rather than naming the wrong category.
fn category_tick(categories: &[String], v: f64) -> String {
    let i = v.round();
    if (v - i).abs() > 0.3 || i < 0.0 {
        return String::new();
    }
    categories.get(i as usize).cloned().unwrap_or_default()
}

fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values {
        min = min.min(v);
        max = max.max(v);
    }
    if !min.is_finite() || !max.is_finite() {
        return 0.0..1.0;
    }
    if min == max {
        return (min - 0.5)..(max + 0.5);
    }
    let pad = (max - min) * 0.05;
    (min - pad)..(max + pad)
}

/// Number of histogram bins by Sturges' rule.
fn sturges(n: usize) -> usize {
    if n == 0 {
        1
    } else {
        ((n as f64).log2().ceil() as usize + 1).max(1)
    }
}

/// Equal-width bin edges and counts. `edges` has one more entry than
/// `counts`; the maximum value falls into the last bin.
fn histogram_bins(values: &[f64]) -> (Vec<f64>, Vec<u32>) {
    if values.is_empty() {
        return (vec![0.0, 1.0], vec![0]);
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return (vec![min - 0.5, min + 0.5], vec![values.len() as u32]);
    }
    let bins = sturges(values.len());
    let width = (max - min) / bins as f64;
    let mut counts = vec![0u32; bins];
    for &v in values {
        let mut idx = ((v - min) / width) as usize;
        if idx >= bins {
            idx = bins - 1;
        }
        counts[idx] += 1;
    }
    let edges = (0..=bins).map(|i| min + width * i as f64).collect();
    (edges, counts)
}

fn frame_len() -> usize {
    (CHART_WIDTH * CHART_HEIGHT * 3) as usize
}

fn encode_png(frame: Vec<u8>) -> Result<Vec<u8>, ChartError> {
    let image = image::RgbImage::from_raw(CHART_WIDTH, CHART_HEIGHT, frame)
        .ok_or_else(|| ChartError::Render("pixel buffer does not match chart dimensions".into()))?;
    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), image::ImageOutputFormat::Png)?;
    Ok(png)
}

fn render_bar(table: &Table, req: &ChartRequest, color: RGBColor) -> Result<Vec<u8>, ChartError> {
    let x_col = selected(table, req.x.as_deref(), "x-axis")?;
    let y_col = selected(table, req.y.as_deref(), "y-axis")?;
    require_numeric(y_col, ChartKind::Bar)?;
    let labels = resolve_labels(req, &x_col.name, &y_col.name);
    let (categories, means) = mean_by_category(x_col, y_col);

    let n = categories.len();
    let x_range = -0.6..(n as f64 - 0.4).max(0.6);
    let y_min = means.iter().copied().fold(f64::INFINITY, f64::min).min(0.0);
    let y_max = means.iter().copied().fold(f64::NEG_INFINITY, f64::max).max(0.0);
    let span = (y_max - y_min).max(1.0);
    let y_lo = if y_min < 0.0 { y_min - span * 0.05 } else { 0.0 };
    let y_hi = if y_max > 0.0 { y_max + span * 0.05 } else { span * 0.05 };

    let mut frame = vec![0u8; frame_len()];
    {
        let root =
            BitMapBackend::with_buffer(&mut frame, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut builder = ChartBuilder::on(&root);
        builder.margin(12).x_label_area_size(70).y_label_area_size(60);
        if let Some(title) = &labels.title {
            builder.caption(title, ("sans-serif", 30).into_font());
        }
        let mut chart = builder.build_cartesian_2d(x_range, y_lo..y_hi)?;

        chart
            .configure_mesh()
            .x_desc(labels.x.as_str())
            .y_desc(labels.y.as_str())
            .x_labels(n.max(2))
            .x_label_style(("sans-serif", 12).into_font().transform(FontTransform::Rotate90))
            .x_label_formatter(&|v: &f64| category_tick(&categories, *v))
            .y_label_formatter(&|v: &f64| format_tick(*v))
            .draw()?;

        chart.draw_series(means.iter().enumerate().map(|(i, &mean)| {
            Rectangle::new(
                [(i as f64 - 0.4, 0.0), (i as f64 + 0.4, mean)],
                color.filled(),
            )
        }))?;

        root.present()?;
    }
    encode_png(frame)
}

fn render_line(table: &Table, req: &ChartRequest, color: RGBColor) -> Result<Vec<u8>, ChartError> {
    let x_col = selected(table, req.x.as_deref(), "x-axis")?;
    let y_col = selected(table, req.y.as_deref(), "y-axis")?;
    require_numeric(y_col, ChartKind::Line)?;
    let labels = resolve_labels(req, &x_col.name, &y_col.name);

    let xs = axis_values(x_col);
    let points: Vec<(f64, f64)> = xs
        .points
        .iter()
        .zip(y_col.numbers())
        .filter_map(|(x, y)| (*x).zip(y))
        .collect();

    let x_range = padded_range(points.iter().map(|p| p.0));
    let y_range = padded_range(points.iter().map(|p| p.1));
    let x_ticks = match &xs.categories {
        Some(cats) => cats.len().clamp(2, 40),
        None => 10,
    };

    let mut frame = vec![0u8; frame_len()];
    {
        let root =
            BitMapBackend::with_buffer(&mut frame, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut builder = ChartBuilder::on(&root);
        builder.margin(12).x_label_area_size(70).y_label_area_size(60);
        if let Some(title) = &labels.title {
            builder.caption(title, ("sans-serif", 30).into_font());
        }
        let mut chart = builder.build_cartesian_2d(x_range, y_range)?;

        let x_fmt = |v: &f64| match &xs.categories {
            Some(cats) => category_tick(cats, *v),
            None => format_tick(*v),
        };
        chart
            .configure_mesh()
            .x_desc(labels.x.as_str())
            .y_desc(labels.y.as_str())
            .x_labels(x_ticks)
            .x_label_style(("sans-serif", 12).into_font().transform(FontTransform::Rotate90))
            .x_label_formatter(&x_fmt)
            .y_label_formatter(&|v: &f64| format_tick(*v))
            .draw()?;

        chart.draw_series(LineSeries::new(points.iter().copied(), &color))?;

        root.present()?;
    }
    encode_png(frame)
}

fn render_scatter(
    table: &Table,
    req: &ChartRequest,
    color: RGBColor,
) -> Result<Vec<u8>, ChartError> {
    let x_col = selected(table, req.x.as_deref(), "x-axis")?;
    let y_col = selected(table, req.y.as_deref(), "y-axis")?;
    let labels = resolve_labels(req, &x_col.name, &y_col.name);

    let xs = axis_values(x_col);
    let ys = axis_values(y_col);
    let points: Vec<(f64, f64)> = xs
        .points
        .iter()
        .zip(ys.points.iter())
        .filter_map(|(x, y)| (*x).zip(*y))
        .collect();

    let x_range = padded_range(points.iter().map(|p| p.0));
    let y_range = padded_range(points.iter().map(|p| p.1));
    let x_ticks = match &xs.categories {
        Some(cats) => cats.len().clamp(2, 40),
        None => 10,
    };
    let y_ticks = match &ys.categories {
        Some(cats) => cats.len().clamp(2, 40),
        None => 10,
    };

    let mut frame = vec![0u8; frame_len()];
    {
        let root =
            BitMapBackend::with_buffer(&mut frame, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut builder = ChartBuilder::on(&root);
        builder.margin(12).x_label_area_size(70).y_label_area_size(60);
        if let Some(title) = &labels.title {
            builder.caption(title, ("sans-serif", 30).into_font());
        }
        let mut chart = builder.build_cartesian_2d(x_range, y_range)?;

        let x_fmt = |v: &f64| match &xs.categories {
            Some(cats) => category_tick(cats, *v),
            None => format_tick(*v),
        };
        let y_fmt = |v: &f64| match &ys.categories {
            Some(cats) => category_tick(cats, *v),
            None => format_tick(*v),
        };
        chart
            .configure_mesh()
            .x_desc(labels.x.as_str())
            .y_desc(labels.y.as_str())
            .x_labels(x_ticks)
            .y_labels(y_ticks)
            .x_label_style(("sans-serif", 12).into_font().transform(FontTransform::Rotate90))
            .x_label_formatter(&x_fmt)
            .y_label_formatter(&y_fmt)
            .draw()?;

        chart.draw_series(
            points
                .iter()
                .map(|&(x, y)| Circle::new((x, y), 4, color.filled())),
        )?;

        root.present()?;
    }
    encode_png(frame)
}

fn render_histogram(
    table: &Table,
    req: &ChartRequest,
    color: RGBColor,
) -> Result<Vec<u8>, ChartError> {
    let col = selected(table, req.x.as_deref(), "value")?;
    require_numeric(col, ChartKind::Histogram)?;
    let labels = resolve_labels(req, &col.name, "Frequency");

    let values: Vec<f64> = col.numbers().flatten().collect();
    let (edges, counts) = histogram_bins(&values);

    let x_range = padded_range(edges.iter().copied());
    let max_count = counts.iter().copied().max().unwrap_or(0).max(1);
    let y_range = 0.0..(f64::from(max_count) * 1.08);

    let mut frame = vec![0u8; frame_len()];
    {
        let root =
            BitMapBackend::with_buffer(&mut frame, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut builder = ChartBuilder::on(&root);
        builder.margin(12).x_label_area_size(70).y_label_area_size(60);
        if let Some(title) = &labels.title {
            builder.caption(title, ("sans-serif", 30).into_font());
        }
        let mut chart = builder.build_cartesian_2d(x_range, y_range)?;

        chart
            .configure_mesh()
            .x_desc(labels.x.as_str())
            .y_desc(labels.y.as_str())
            .x_label_style(("sans-serif", 12).into_font().transform(FontTransform::Rotate90))
            .x_label_formatter(&|v: &f64| format_tick(*v))
            .y_label_formatter(&|v: &f64| format_tick(*v))
            .draw()?;

        chart.draw_series(counts.iter().enumerate().map(|(i, &count)| {
            Rectangle::new(
                [(edges[i], 0.0), (edges[i + 1], f64::from(count))],
                color.filled(),
            )
        }))?;

        root.present()?;
    }
    encode_png(frame)
}

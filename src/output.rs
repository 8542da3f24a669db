//! Output formatting for CLI commands

use clap::ValueEnum;
use edgepulse_ml::{FeatureVector, StructuredLogger, WindowScore};
use std::io::Write;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// One JSON object per line
    Json,
}

#[derive(Tabled)]
struct FeatureRowView {
    #[tabled(rename = "window_end")]
    window_end: String,
    #[tabled(rename = "mean")]
    mean: String,
    #[tabled(rename = "std")]
    std: String,
    #[tabled(rename = "min")]
    min: String,
    #[tabled(rename = "max")]
    max: String,
    #[tabled(rename = "count")]
    count: u64,
    #[tabled(rename = "median")]
    median: String,
    #[tabled(rename = "mad")]
    mad: String,
    #[tabled(rename = "range")]
    range: String,
}

impl From<&FeatureVector> for FeatureRowView {
    fn from(v: &FeatureVector) -> Self {
        Self {
            window_end: v.window_end.to_rfc3339(),
            mean: format_value(v.mean),
            std: format_value(v.std),
            min: format_value(v.min),
            max: format_value(v.max),
            count: v.count,
            median: format_value(v.median),
            mad: format_value(v.mad),
            range: format_value(v.range),
        }
    }
}

#[derive(Tabled)]
struct ScoreRowView {
    #[tabled(rename = "window_end")]
    window_end: String,
    #[tabled(rename = "anomaly_score")]
    anomaly_score: String,
}

fn format_value(v: f64) -> String {
    format!("{:.4}", v)
}

/// Print the last `tail` feature windows
pub fn print_features(
    vectors: &[FeatureVector],
    tail: usize,
    format: OutputFormat,
    w: &mut impl Write,
) -> std::io::Result<()> {
    let start = vectors.len().saturating_sub(tail);
    let shown = &vectors[start..];
    match format {
        OutputFormat::Table => {
            let rows: Vec<FeatureRowView> = shown.iter().map(FeatureRowView::from).collect();
            writeln!(w, "{}", Table::new(rows).with(Style::rounded()))
        }
        OutputFormat::Json => StructuredLogger::emit_json(shown, w),
    }
}

pub fn print_scores(scores: &[WindowScore], format: OutputFormat, w: &mut impl Write) -> std::io::Result<()> {
    match format {
        OutputFormat::Table => {
            let rows: Vec<ScoreRowView> = scores
                .iter()
                .map(|s| ScoreRowView {
                    window_end: s.window_end.to_rfc3339(),
                    anomaly_score: format!("{:.6}", s.anomaly_score),
                })
                .collect();
            writeln!(w, "{}", Table::new(rows).with(Style::rounded()))
        }
        OutputFormat::Json => StructuredLogger::emit_json(scores, w),
    }
}

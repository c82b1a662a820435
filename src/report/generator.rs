//! Markdown report generation.
//!
//! This module renders a radar report as Markdown (one row per axis,
//! current score next to the profile target) or as JSON.

use crate::models::{MetricPoint, RadarReport, RadarSummary, ReportMetadata, TargetPoint};
use anyhow::Result;
use std::io::Write;
use std::path::Path;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &RadarReport) -> String {
    let mut output = String::new();

    output.push_str("# Quality Radar Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_axes_section(report));
    output.push_str(&generate_summary_section(
        &report.summary,
        report.target.is_some(),
    ));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    if let Some(ref document) = metadata.document {
        section.push_str(&format!("- **Document:** `{}`\n", document));
    }
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    match metadata.profile_name {
        Some(ref name) => section.push_str(&format!("- **Profile:** {}\n", name)),
        None => section.push_str("- **Profile:** none\n"),
    }
    section.push_str(&format!(
        "- **Duration:** {:.3}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the per-axis table.
fn generate_axes_section(report: &RadarReport) -> String {
    let mut section = String::new();

    section.push_str("## Axes\n\n");

    if report.current.points.is_empty() {
        section.push_str("No axes were scored.\n\n");
        return section;
    }

    match report.target {
        Some(ref target) => {
            section.push_str("| Axis | Score | Raw | Target | Tolerance | Status |\n");
            section.push_str("|:---|:---:|:---:|:---:|:---:|:---:|\n");
            for point in &report.current.points {
                section.push_str(&axis_row_with_target(point, target.point(&point.axis_name)));
            }
        }
        None => {
            section.push_str("| Axis | Score | Raw |\n");
            section.push_str("|:---|:---:|:---:|\n");
            for point in &report.current.points {
                section.push_str(&format!(
                    "| {} | {:.0} | {} |\n",
                    point.axis_name,
                    point.normalized_value,
                    format_raw(point)
                ));
            }
        }
    }
    section.push('\n');

    section
}

fn axis_row_with_target(point: &MetricPoint, target: Option<&TargetPoint>) -> String {
    let Some(target) = target else {
        return format!(
            "| {} | {:.0} | {} | - | - | - |\n",
            point.axis_name,
            point.normalized_value,
            format_raw(point)
        );
    };

    let tolerance = match (target.tolerance_min, target.tolerance_max) {
        (Some(min), Some(max)) => format!("{:.1} - {:.1}", min, max),
        _ => "-".to_string(),
    };
    let status = if target.accepts(point.raw_value) {
        "on target"
    } else {
        "off target"
    };

    format!(
        "| {} | {:.0} | {} | {:.0} ({:.1}) | {} | {} |\n",
        point.axis_name,
        point.normalized_value,
        format_raw(point),
        target.normalized_value,
        target.raw_value,
        tolerance,
        status
    )
}

fn format_raw(point: &MetricPoint) -> String {
    match point.unit {
        Some(ref unit) => format!("{:.1} {}", point.raw_value, unit),
        None => format!("{:.1}", point.raw_value),
    }
}

/// Generate the summary section.
fn generate_summary_section(summary: &RadarSummary, has_target: bool) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str(&format!(
        "- **Average Score:** {:.1}\n",
        summary.average_score
    ));
    if let Some(ref axis) = summary.strongest_axis {
        section.push_str(&format!("- **Strongest Axis:** {}\n", axis));
    }
    if let Some(ref axis) = summary.weakest_axis {
        section.push_str(&format!("- **Weakest Axis:** {}\n", axis));
    }
    if has_target {
        section.push_str(&format!(
            "- **Within Tolerance:** {} of {}\n",
            summary.within_tolerance, summary.compared
        ));
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    "---\n\n*Report generated by quality-radar*\n".to_string()
}

/// Write the report to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

/// Generate a JSON report.
pub fn generate_json_report(report: &RadarReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

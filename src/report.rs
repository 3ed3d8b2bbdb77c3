//! Report rendering
//!
//! Turns a [`BenchmarkReport`] into a human-readable table, a JSON
//! document or JSON-lines records.

use std::fmt::Write as _;
use std::str::FromStr;

use crate::models::{BenchmarkReport, CaseStatus};
use crate::util::units::{format_duration, format_latency, format_ops};
use crate::Result;

/// Output format for the final report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Jsonl,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "ndjson" => Ok(OutputFormat::Jsonl),
            other => Err(format!("Unknown format: {} (expected table, json or jsonl)", other)),
        }
    }
}

/// Render the report in the requested format
pub fn render(report: &BenchmarkReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(render_table(report)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Jsonl => render_jsonl(report),
    }
}

/// One JSON object per case, newline separated
pub fn render_jsonl(report: &BenchmarkReport) -> Result<String> {
    let mut out = String::new();
    for record in report.records() {
        out.push_str(&serde_json::to_string(&record)?);
        out.push('\n');
    }
    Ok(out)
}

const HEADERS: [&str; 12] = [
    "library", "workload", "mode", "iters", "errors", "mean", "p50", "p95", "p99", "throughput",
    "wall", "status",
];

pub fn render_table(report: &BenchmarkReport) -> String {
    let rows: Vec<[String; 12]> = report
        .cases
        .iter()
        .map(|case| {
            [
                case.library.to_string(),
                case.workload.clone(),
                case.mode.to_string(),
                case.iterations.to_string(),
                case.errors.to_string(),
                format_latency(case.latency.avg),
                format_latency(case.latency.p50()),
                format_latency(case.latency.p95()),
                format_latency(case.latency.p99()),
                format_ops(case.throughput_ops),
                format_duration(case.wall_time),
                match case.status {
                    CaseStatus::Completed => "ok".to_string(),
                    CaseStatus::Failed { .. } => "FAILED".to_string(),
                },
            ]
        })
        .collect();

    let mut widths: Vec<usize> = HEADERS.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", report.summary());
    let _ = writeln!(
        out,
        "{} logical CPUs, {}",
        report.system_info.logical_cpus, report.system_info.os
    );
    out.push('\n');

    push_row(&mut out, HEADERS.iter().map(|h| h.to_string()), &widths);
    push_row(&mut out, widths.iter().map(|w| "-".repeat(*w)), &widths);
    for row in rows {
        push_row(&mut out, row.into_iter(), &widths);
    }

    let failures: Vec<_> = report.failed_cases().collect();
    if !failures.is_empty() {
        out.push('\n');
        for case in failures {
            if let CaseStatus::Failed { error } = &case.status {
                let _ = writeln!(out, "{}: {}", case.case_id(), error);
            }
        }
    }

    out
}

fn push_row(out: &mut String, cells: impl Iterator<Item = String>, widths: &[usize]) {
    let line: Vec<String> = cells
        .zip(widths.iter())
        .map(|(cell, &width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{}{}", cell, " ".repeat(pad))
        })
        .collect();
    let _ = writeln!(out, "{}", line.join("  ").trim_end());
}

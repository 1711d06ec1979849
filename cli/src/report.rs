use crate::runner::FileReport;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use critpath_core::CriticalPath;
use std::fmt::Write;

/// Microsecond epoch timestamp as RFC 3339, or the raw value if it is out of
/// chrono's range.
pub fn format_timestamp(micros: i64) -> String {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Micros, true))
        .unwrap_or_else(|| micros.to_string())
}

pub fn format_duration(micros: i64) -> String {
    if micros >= 1_000_000 {
        format!("{:.2}s", micros as f64 / 1_000_000.0)
    } else if micros >= 1_000 {
        format!("{:.2}ms", micros as f64 / 1_000.0)
    } else {
        format!("{}µs", micros)
    }
}

/// Human readable rendering of one critical path.
pub fn render_path(path: &CriticalPath) -> String {
    let mut out = String::new();
    let trace = if path.trace_id.is_empty() {
        "<unnamed>"
    } else {
        path.trace_id.as_str()
    };

    let Some(root) = path.root_span_id.as_deref() else {
        let _ = writeln!(out, "Trace {}: no spans", trace);
        return out;
    };

    let _ = writeln!(
        out,
        "Trace {} (root {}, policy {}, {} spans dropped)",
        trace, root, path.policy, path.dropped_spans
    );
    let _ = writeln!(
        out,
        "  Critical {} of {} ({:.1}%) across {} sections on {} spans",
        format_duration(path.critical_duration()),
        format_duration(path.trace_duration),
        path.percentage_of_total(),
        path.sections.len(),
        path.span_ids().len()
    );

    let origin = path.start_time().unwrap_or_default();
    let _ = writeln!(
        out,
        "  {:<28} {:>12} {:>12}  SPAN",
        "START", "OFFSET(µs)", "LENGTH(µs)"
    );
    for section in &path.sections {
        let _ = writeln!(
            out,
            "  {:<28} {:>12} {:>12}  {}",
            format_timestamp(section.section_start),
            section.section_start - origin,
            section.duration(),
            section.span_id
        );
    }
    out
}

pub fn render_reports(reports: &[FileReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let _ = writeln!(out, "== {}", report.file);
        if let Some(error) = &report.error {
            let _ = writeln!(out, "  error: {}", error);
            continue;
        }
        for path in &report.critical_paths {
            out.push_str(&render_path(path));
        }
    }
    out
}

pub fn reports_to_json(reports: &[FileReport]) -> Result<String> {
    serde_json::to_string_pretty(reports).context("Failed to serialize critical paths")
}

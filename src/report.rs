//! Presenting a finished run.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::harness::RunReport;
use crate::measure::to_mb;
use crate::{Error, Result};

/// Write a human-readable summary of `report` to `out`.
pub fn write_summary<W: Write>(report: &RunReport, out: &mut W) -> io::Result<()> {
    writeln!(out, "Summary for {} pages", report.pages)?;
    writeln!(
        out,
        "{:<12} {:<8} {:>10} {:>12} {:>6}",
        "backend", "op", "seconds", "memory MB", "pages"
    )?;

    for m in &report.measurements {
        let memory = m
            .memory_bytes
            .map(|b| format!("{:.2}", to_mb(b)))
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "{:<12} {:<8} {:>10.3} {:>12} {:>6}",
            m.backend.name(),
            m.operation.name(),
            m.elapsed.as_secs_f64(),
            memory,
            m.page_count
        )?;
    }

    for f in &report.failures {
        writeln!(
            out,
            "{:<12} {:<8} FAILED after {:.3}s: {}",
            f.backend.name(),
            f.operation.name(),
            f.elapsed.as_secs_f64(),
            f.cause
        )?;
    }

    if !report.outputs.is_empty() {
        writeln!(out, "Documents kept for inspection:")?;
        for path in &report.outputs {
            writeln!(out, "  {}", path.display())?;
        }
    }

    Ok(())
}

/// Write `report` as pretty-printed JSON to `output_path`.
pub fn write_json(report: &RunReport, output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let json = serde_json::to_string_pretty(report)
        .map_err(|e| Error::Report(format!("failed to serialize report: {}", e)))?;

    fs::write(output_path, json).map_err(|e| Error::io(output_path, e))?;

    Ok(())
}

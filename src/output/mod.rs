//! Report sinks and run summary rendering

use crate::collection::{AuditReport, RunSummary};
use crate::config::OutputFormat;
use crate::inventory::HostStatus;
use crate::{AuditError, Result};
use colored::*;
use log::info;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const SOFTWARE_FILE: &str = "software.csv";
pub const DEVICES_FILE: &str = "devices.csv";
pub const EVENTS_FILE: &str = "events.csv";
pub const JSON_FILE: &str = "inventory.json";

/// Destination for a finished [`AuditReport`]
pub trait ReportSink {
    fn write(&self, report: &AuditReport) -> Result<()>;

    /// Files the sink produces, for the closing summary
    fn outputs(&self) -> Vec<PathBuf>;
}

/// Pick the sink for `format`, writing under `dir`
pub fn sink_for(format: OutputFormat, dir: impl Into<PathBuf>) -> Box<dyn ReportSink> {
    match format {
        OutputFormat::Csv => Box::new(CsvReportSink::new(dir)),
        OutputFormat::Json => Box::new(JsonReportSink::new(dir)),
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| {
        AuditError::ReportError(format!("Failed to create output directory {}: {}", dir.display(), e))
    })
}

/// One CSV file per record type
pub struct CsvReportSink {
    dir: PathBuf,
}

impl CsvReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn write_table<R: Serialize>(&self, file: &str, header: &[&str], rows: &[R]) -> Result<()> {
        let path = self.dir.join(file);
        // Header written by hand so empty tables still carry one
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(&path)?;
        writer.write_record(header)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        info!("Wrote {} rows to {}", rows.len(), path.display());
        Ok(())
    }
}

impl ReportSink for CsvReportSink {
    fn write(&self, report: &AuditReport) -> Result<()> {
        ensure_dir(&self.dir)?;
        self.write_table(SOFTWARE_FILE, &["ip", "app_name", "user"], &report.software)?;
        self.write_table(DEVICES_FILE, &["ip", "device_name", "user"], &report.devices)?;
        self.write_table(
            EVENTS_FILE,
            &["ip", "timestamp", "event_id", "message", "user"],
            &report.events,
        )?;
        Ok(())
    }

    fn outputs(&self) -> Vec<PathBuf> {
        [SOFTWARE_FILE, DEVICES_FILE, EVENTS_FILE]
            .iter()
            .map(|file| self.dir.join(file))
            .collect()
    }
}

/// Whole report, summary included, as one JSON document
pub struct JsonReportSink {
    dir: PathBuf,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: RunSummary,
    #[serde(flatten)]
    report: &'a AuditReport,
}

impl JsonReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ReportSink for JsonReportSink {
    fn write(&self, report: &AuditReport) -> Result<()> {
        ensure_dir(&self.dir)?;
        let path = self.dir.join(JSON_FILE);
        let mut writer = BufWriter::new(File::create(&path)?);

        let document = JsonReport {
            summary: report.summary(),
            report,
        };
        serde_json::to_writer_pretty(&mut writer, &document)?;
        writer.flush()?;

        info!("Wrote {} records to {}", report.record_count(), path.display());
        Ok(())
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.dir.join(JSON_FILE)]
    }
}

/// Human-readable run summary: one line per host, then totals
pub fn format_summary(summary: &RunSummary) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "{} {} hosts attempted at {}\n",
        "[~]".bright_blue(),
        summary.attempted.to_string().bright_white().bold(),
        summary.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    for outcome in &summary.hosts {
        let (marker, status) = match outcome.status {
            HostStatus::Success => ("[✓]".bright_green(), outcome.status.to_string().green()),
            HostStatus::PartialFailure => ("[!]".bright_yellow(), outcome.status.to_string().yellow()),
            HostStatus::Failed => ("[!]".bright_red(), outcome.status.to_string().red()),
        };
        match outcome.detail() {
            Some(detail) => output.push_str(&format!(
                "{} {:<15} {:<8} {}\n",
                marker,
                outcome.host.to_string(),
                status,
                detail.dimmed()
            )),
            None => output.push_str(&format!("{} {:<15} {}\n", marker, outcome.host.to_string(), status)),
        }
    }

    if summary.skipped > 0 {
        output.push_str(&format!(
            "{} {} hosts skipped after cancellation\n",
            "[!]".bright_yellow(),
            summary.skipped
        ));
    }

    output.push_str(&format!(
        "{} {} ok, {} partial, {} failed | {} software, {} devices, {} events\n",
        "[✓]".bright_green(),
        summary.succeeded,
        summary.partial,
        summary.failed,
        summary.software_records,
        summary.device_records,
        summary.event_records
    ));

    if !summary.failure_kinds.is_empty() {
        let kinds = summary
            .failure_kinds
            .iter()
            .map(|(kind, count)| format!("{} {}", count, kind))
            .collect::<Vec<_>>()
            .join(", ");
        output.push_str(&format!("{} Failures by kind: {}\n", "[!]".bright_yellow(), kinds));
    }

    output
}

pub fn print_summary(summary: &RunSummary) {
    print!("{}", format_summary(summary));
}

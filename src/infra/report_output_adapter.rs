use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::app::ports::ReportSinkPort;
use crate::app::run_use_case::RunReport;

pub const SUMMARY_JSON: &str = "summary.json";
pub const SUMMARY_CSV: &str = "summary.csv";
pub const VIOLATIONS_CSV: &str = "violations.csv";
pub const NOTIFICATIONS_CSV: &str = "notifications.csv";
pub const METRICS_PROM: &str = "metrics.prom";

/// File-based implementation of ReportSinkPort.
/// Writes the run summary, violation and notification tables into one directory.
pub struct FileReportAdapter {
    output_dir: PathBuf,
}

impl FileReportAdapter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).with_context(|| {
            format!("Failed to create report directory {}", output_dir.display())
        })?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }

    fn write_summary_json(&self, report: &RunReport) -> Result<()> {
        let writer = BufWriter::new(File::create(self.path(SUMMARY_JSON))?);
        serde_json::to_writer_pretty(writer, report)?;
        Ok(())
    }

    fn write_summary_csv(&self, report: &RunReport) -> Result<()> {
        let mut writer = csv::Writer::from_path(self.path(SUMMARY_CSV))?;
        writer.write_record(["metric", "value"])?;
        let run_id = report.run_id.to_string();
        writer.write_record(["run_id", run_id.as_str()])?;
        writer.write_record(["domain", report.domain.as_str()])?;
        for (metric, value) in report.summary.to_rows() {
            writer.write_record([metric.as_str(), value.as_str()])?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_violations_csv(&self, report: &RunReport) -> Result<()> {
        let mut writer = csv::Writer::from_path(self.path(VIOLATIONS_CSV))?;
        writer.write_record(["record_id", "rule", "category", "severity", "field", "message"])?;
        for v in &report.violations {
            writer.write_record([
                v.record_id.as_str(),
                v.rule.as_str(),
                v.category.as_str(),
                v.severity.as_str(),
                v.field.as_deref().unwrap_or(""),
                v.message.as_str(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_notifications_csv(&self, report: &RunReport) -> Result<()> {
        let mut writer = csv::Writer::from_path(self.path(NOTIFICATIONS_CSV))?;
        writer.write_record(["record_id", "contact_email", "outcome", "attempts", "elapsed_ms", "error"])?;
        // Completion order is arbitrary; sort so reruns diff cleanly
        let mut results: Vec<_> = report.notifications.iter().collect();
        results.sort_by(|a, b| a.record_id.cmp(&b.record_id));
        for r in results {
            let attempts = r.attempts.to_string();
            let elapsed_ms = r.elapsed_ms.to_string();
            writer.write_record([
                r.record_id.as_str(),
                r.contact_email.as_str(),
                r.outcome.as_str(),
                attempts.as_str(),
                elapsed_ms.as_str(),
                r.error.as_deref().unwrap_or(""),
            ])?;
        }
        for id in &report.skipped {
            writer.write_record([id.as_str(), "", "skipped", "0", "0", ""])?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_metrics(&self, report: &RunReport) -> Result<()> {
        if let Some(text) = &report.metrics {
            let mut file = BufWriter::new(File::create(self.path(METRICS_PROM))?);
            file.write_all(text.as_bytes())?;
            file.flush()?;
        }
        Ok(())
    }
}

#[async_trait]
impl ReportSinkPort for FileReportAdapter {
    async fn write_report(&self, report: &RunReport) -> Result<()> {
        self.write_summary_json(report).context("Failed to write summary.json")?;
        self.write_summary_csv(report).context("Failed to write summary.csv")?;
        self.write_violations_csv(report).context("Failed to write violations.csv")?;
        self.write_notifications_csv(report).context("Failed to write notifications.csv")?;
        self.write_metrics(report).context("Failed to write metrics.prom")?;

        info!("Wrote run report {} to {}", report.run_id, self.output_dir.display());
        Ok(())
    }
}

/// Keeps reports in memory; used by tests and embedders.
#[derive(Default)]
pub struct InMemoryReportSink {
    reports: Arc<Mutex<Vec<RunReport>>>,
}

impl InMemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to everything written so far
    pub fn reports(&self) -> Arc<Mutex<Vec<RunReport>>> {
        self.reports.clone()
    }
}

#[async_trait]
impl ReportSinkPort for InMemoryReportSink {
    async fn write_report(&self, report: &RunReport) -> Result<()> {
        self.reports.lock().await.push(report.clone());
        Ok(())
    }
}

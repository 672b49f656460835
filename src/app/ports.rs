use async_trait::async_trait;

use crate::app::run_use_case::RunReport;

/// Reporting collaborator: owns every on-disk or external representation of a run.
#[async_trait]
pub trait ReportSinkPort: Send + Sync {
    async fn write_report(&self, report: &RunReport) -> anyhow::Result<()>;
}

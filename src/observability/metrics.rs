//! Metrics for the order pipeline
//!
//! Stages record through the `metrics` facade using the names below. When a
//! Prometheus recorder has been installed with [`init`], [`render`] returns
//! the exposition text so the report sink can persist it alongside the run.
//! Without a recorder every call is a no-op.

use std::fmt;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{debug, info};

/// Enum representing all metric names used in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Normalize metrics
    NormalizeRecordsProcessed,
    NormalizeAnomalies,
    NormalizeBatchSize,

    // Validate metrics
    ValidateRecordsChecked,
    ValidateViolations,

    // Partition metrics
    PartitionAccepted,
    PartitionRejected,
    PartitionDuplicates,

    // Dispatch metrics
    DispatchAttempts,
    DispatchRetries,
    DispatchSent,
    DispatchFailed,
    DispatchSkipped,
    DispatchDuration,

    // Run metrics
    RunsCompleted,
    RunDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::NormalizeRecordsProcessed => "order_pipeline_normalize_records_processed_total",
            MetricName::NormalizeAnomalies => "order_pipeline_normalize_anomalies_total",
            MetricName::NormalizeBatchSize => "order_pipeline_normalize_batch_size",

            MetricName::ValidateRecordsChecked => "order_pipeline_validate_records_checked_total",
            MetricName::ValidateViolations => "order_pipeline_validate_violations_total",

            MetricName::PartitionAccepted => "order_pipeline_partition_accepted_total",
            MetricName::PartitionRejected => "order_pipeline_partition_rejected_total",
            MetricName::PartitionDuplicates => "order_pipeline_partition_duplicates_total",

            MetricName::DispatchAttempts => "order_pipeline_dispatch_attempts_total",
            MetricName::DispatchRetries => "order_pipeline_dispatch_retries_total",
            MetricName::DispatchSent => "order_pipeline_dispatch_sent_total",
            MetricName::DispatchFailed => "order_pipeline_dispatch_failed_total",
            MetricName::DispatchSkipped => "order_pipeline_dispatch_skipped_total",
            MetricName::DispatchDuration => "order_pipeline_dispatch_duration_seconds",

            MetricName::RunsCompleted => "order_pipeline_runs_completed_total",
            MetricName::RunDuration => "order_pipeline_run_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Calling it again is harmless.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_HANDLE.get().is_some() {
        debug!("Metrics recorder already installed");
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    METRICS_HANDLE.set(handle).ok();

    info!("Metrics system initialized");
    Ok(())
}

/// Prometheus exposition text, or `None` when no recorder is installed
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

// ============================================================================
// Normalize Metrics
// ============================================================================

pub mod normalize {
    use super::MetricName;

    pub fn record_processed() {
        ::metrics::counter!(MetricName::NormalizeRecordsProcessed.as_str()).increment(1);
    }

    /// A present value that could not be parsed and was marked missing
    pub fn anomaly(field: &str) {
        ::metrics::counter!(MetricName::NormalizeAnomalies.as_str(), "field" => field.to_string())
            .increment(1);
    }

    pub fn batch_processed(size: usize) {
        ::metrics::histogram!(MetricName::NormalizeBatchSize.as_str()).record(size as f64);
    }
}

// ============================================================================
// Validate Metrics
// ============================================================================

pub mod validate {
    use super::MetricName;

    pub fn record_checked() {
        ::metrics::counter!(MetricName::ValidateRecordsChecked.as_str()).increment(1);
    }

    pub fn violation(category: &'static str, severity: &'static str) {
        ::metrics::counter!(
            MetricName::ValidateViolations.as_str(),
            "category" => category,
            "severity" => severity
        )
        .increment(1);
    }
}

// ============================================================================
// Partition Metrics
// ============================================================================

pub mod partition {
    use super::MetricName;

    pub fn accepted(count: usize) {
        ::metrics::counter!(MetricName::PartitionAccepted.as_str()).increment(count as u64);
    }

    pub fn rejected(count: usize) {
        ::metrics::counter!(MetricName::PartitionRejected.as_str()).increment(count as u64);
    }

    pub fn duplicates_dropped(count: usize) {
        ::metrics::counter!(MetricName::PartitionDuplicates.as_str()).increment(count as u64);
    }
}

// ============================================================================
// Dispatch Metrics
// ============================================================================

pub mod dispatch {
    use super::MetricName;

    pub fn attempt() {
        ::metrics::counter!(MetricName::DispatchAttempts.as_str()).increment(1);
    }

    pub fn retry() {
        ::metrics::counter!(MetricName::DispatchRetries.as_str()).increment(1);
    }

    pub fn sent() {
        ::metrics::counter!(MetricName::DispatchSent.as_str()).increment(1);
    }

    pub fn failed() {
        ::metrics::counter!(MetricName::DispatchFailed.as_str()).increment(1);
    }

    pub fn skipped() {
        ::metrics::counter!(MetricName::DispatchSkipped.as_str()).increment(1);
    }

    /// Wall time from first attempt to final outcome for one record
    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::DispatchDuration.as_str()).record(secs);
    }
}

// ============================================================================
// Run Metrics
// ============================================================================

pub mod run {
    use super::MetricName;

    pub fn completed(secs: f64) {
        ::metrics::counter!(MetricName::RunsCompleted.as_str()).increment(1);
        ::metrics::histogram!(MetricName::RunDuration.as_str()).record(secs);
    }
}

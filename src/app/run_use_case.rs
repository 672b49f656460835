use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::app::ports::ReportSinkPort;
use crate::config::{PipelineConfig, ReportConfig};
use crate::domain::Domain;
use crate::observability::metrics;
use crate::pipeline::dispatch::{
    DispatchReport, MessageTemplate, NotificationDispatcher, NotificationResult,
    NotificationTransport,
};
use crate::pipeline::ingestion::RecordSource;
use crate::pipeline::processing::normalize::{DefaultNormalizer, Normalizer};
use crate::pipeline::processing::partition::{self, Partition};
use crate::pipeline::processing::validate::{DefaultValidator, Validator, Violation};
use crate::pipeline::summary::Summary;

/// Output of the sequential stages: normalize, validate, partition.
#[derive(Debug, Clone)]
pub struct Screening {
    /// Raw records supplied by the source, duplicates included
    pub raw_count: usize,
    pub partition: Partition,
}

impl Screening {
    /// Every violation of the unique records, in input order
    pub fn violations(&self) -> Vec<Violation> {
        let mut records: Vec<_> = self
            .partition
            .accepted
            .iter()
            .chain(self.partition.rejected.iter())
            .collect();
        records.sort_by_key(|v| v.record.row);
        records.into_iter().flat_map(|v| v.violations.clone()).collect()
    }
}

/// Everything one run produced, handed to the report sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub domain: Domain,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub raw_count: usize,
    pub summary: Summary,
    pub violations: Vec<Violation>,
    pub notifications: Vec<NotificationResult>,
    pub skipped: Vec<String>,
    /// Prometheus exposition text captured at the end of the run
    #[serde(skip)]
    pub metrics: Option<String>,
}

/// Use case wiring source -> normalizer -> validator -> partitioner ->
/// dispatcher -> aggregator -> sink for a single run.
pub struct PipelineRunUseCase {
    domain: Domain,
    normalizer: Box<dyn Normalizer>,
    validator: Box<dyn Validator>,
    dispatcher: NotificationDispatcher,
    sink: Box<dyn ReportSinkPort>,
    report: ReportConfig,
}

impl PipelineRunUseCase {
    pub fn new(
        domain: Domain,
        normalizer: Box<dyn Normalizer>,
        validator: Box<dyn Validator>,
        dispatcher: NotificationDispatcher,
        sink: Box<dyn ReportSinkPort>,
        report: ReportConfig,
    ) -> Self {
        Self {
            domain,
            normalizer,
            validator,
            dispatcher,
            sink,
            report,
        }
    }

    /// Build the default stages from a resolved configuration
    pub fn from_config(
        config: &PipelineConfig,
        transport: Arc<dyn NotificationTransport>,
        sink: Box<dyn ReportSinkPort>,
    ) -> Result<Self> {
        let validator = DefaultValidator::from_config(&config.rules)
            .context("Failed to build validation rules")?;
        let dispatcher = NotificationDispatcher::new(
            transport,
            MessageTemplate::from(&config.template),
            &config.dispatch,
        );

        Ok(Self::new(
            config.domain,
            Box::new(DefaultNormalizer::new(config.fields.clone())),
            Box::new(validator),
            dispatcher,
            sink,
            config.report.clone(),
        ))
    }

    /// Load, normalize, de-duplicate, validate and partition.
    ///
    /// Only an unreadable source is an error; per-record problems end up as
    /// violations.
    #[instrument(skip(self, source), fields(input = %source.describe()))]
    pub fn screen(&self, source: &dyn RecordSource) -> Result<Screening> {
        let raw = source
            .load()
            .with_context(|| format!("Failed to load records from {}", source.describe()))?;
        let raw_count = raw.len();

        let canonical = self.normalizer.normalize_batch(&raw);
        let deduplicated = partition::deduplicate(canonical);
        let validated = self.validator.validate_batch(deduplicated.unique);
        let partition = partition::partition(validated, &deduplicated.duplicates);

        Ok(Screening {
            raw_count,
            partition,
        })
    }

    /// Execute a full run and hand the report to the sink.
    #[instrument(skip(self, source), fields(domain = %self.domain))]
    pub async fn run(&self, source: &dyn RecordSource) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        info!(%run_id, "Starting pipeline run");

        let screening = self.screen(source)?;
        let dispatch: DispatchReport = self.dispatcher.dispatch(&screening.partition.accepted).await;
        let summary = Summary::compute(&screening.partition, &dispatch, &self.report);

        metrics::run::completed(clock.elapsed().as_secs_f64());

        let report = RunReport {
            run_id,
            domain: self.domain,
            source: source.describe(),
            started_at,
            finished_at: Utc::now(),
            raw_count: screening.raw_count,
            violations: screening.violations(),
            notifications: dispatch.results,
            skipped: dispatch.skipped,
            summary,
            metrics: metrics::render(),
        };

        self.sink
            .write_report(&report)
            .await
            .context("Failed to write run report")?;

        info!(
            %run_id,
            total = report.summary.total,
            valid = report.summary.valid,
            sent = report.summary.sent,
            failed = report.summary.failed,
            "Pipeline run finished"
        );
        Ok(report)
    }
}

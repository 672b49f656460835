// Notification dispatch: bounded concurrent sends with retry

pub mod pool;
pub mod retry;
pub mod template;
pub mod transport;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::DispatchConfig;
use crate::observability::metrics;
use crate::pipeline::processing::validate::ValidatedRecord;

pub use pool::{TaskFailure, WorkerPool};
pub use retry::RetryPolicy;
pub use template::{MessageTemplate, NotificationMessage};
pub use transport::{
    transport_for, DryRunTransport, NotificationTransport, SimulatedTransport, TransportError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    Sent,
    Failed,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Sent => "sent",
            DispatchOutcome::Failed => "failed",
        }
    }
}

/// Final state of one dispatched record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationResult {
    pub record_id: String,
    pub contact_email: String,
    pub outcome: DispatchOutcome,
    /// Last error seen, present only when the record failed
    pub error: Option<String>,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl NotificationResult {
    pub fn is_sent(&self) -> bool {
        self.outcome == DispatchOutcome::Sent
    }
}

/// Everything the dispatcher produced for one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// One entry per record that had a usable contact email, in completion order
    pub results: Vec<NotificationResult>,
    /// Accepted records without a contact email, never attempted
    pub skipped: Vec<String>,
}

impl DispatchReport {
    pub fn sent(&self) -> usize {
        self.results.iter().filter(|r| r.is_sent()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.sent()
    }
}

/// Sends one templated notification per accepted record.
pub struct NotificationDispatcher {
    transport: Arc<dyn NotificationTransport>,
    template: MessageTemplate,
    retry: RetryPolicy,
    max_concurrency: usize,
    attempt_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        transport: Arc<dyn NotificationTransport>,
        template: MessageTemplate,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            transport,
            template,
            retry: RetryPolicy::from(config),
            max_concurrency: config.max_concurrency.max(1),
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    #[instrument(skip(self, accepted), fields(count = accepted.len(), transport = self.transport.name()))]
    pub async fn dispatch(&self, accepted: &[ValidatedRecord]) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut pool: WorkerPool<(String, String), NotificationResult> =
            WorkerPool::new(self.max_concurrency());
        debug!(slots = pool.size(), "Worker pool ready");

        for validated in accepted {
            let record = &validated.record;
            let Some(email) = record.contact_email() else {
                debug!(id = %record.key(), "No contact email, skipping notification");
                metrics::dispatch::skipped();
                report.skipped.push(record.key());
                continue;
            };

            let id = record.key();
            let email = email.to_string();
            let message = self.template.render(record);
            let transport = Arc::clone(&self.transport);
            let retry = self.retry.clone();
            let timeout = self.attempt_timeout;

            pool.submit(
                (id.clone(), email.clone()),
                deliver(transport, id, email, message, retry, timeout),
            )
            .await;
        }

        for ((id, email), outcome) in pool.await_all().await {
            let result = outcome.unwrap_or_else(|failure| {
                warn!(id = %id, "Dispatch task failed: {}", failure);
                metrics::dispatch::failed();
                NotificationResult {
                    record_id: id,
                    contact_email: email,
                    outcome: DispatchOutcome::Failed,
                    error: Some(failure.to_string()),
                    attempts: 0,
                    elapsed_ms: 0,
                }
            });
            report.results.push(result);
        }

        info!(
            "Dispatch complete: {} sent, {} failed, {} skipped",
            report.sent(),
            report.failed(),
            report.skipped.len()
        );
        report
    }
}

/// Attempts one record until it is sent or the attempt budget runs out.
async fn deliver(
    transport: Arc<dyn NotificationTransport>,
    id: String,
    email: String,
    message: NotificationMessage,
    retry: RetryPolicy,
    attempt_timeout: Duration,
) -> NotificationResult {
    let start = Instant::now();
    let mut attempts = 0;

    let last_error = loop {
        attempts += 1;
        metrics::dispatch::attempt();

        let sent = match tokio::time::timeout(attempt_timeout, transport.send(&id, &email, &message)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(attempt_timeout.as_millis() as u64)),
        };

        match sent {
            Ok(()) => {
                let elapsed = start.elapsed();
                metrics::dispatch::sent();
                metrics::dispatch::duration(elapsed.as_secs_f64());
                debug!(id = %id, attempts, "Notification sent");
                return NotificationResult {
                    record_id: id,
                    contact_email: email,
                    outcome: DispatchOutcome::Sent,
                    error: None,
                    attempts,
                    elapsed_ms: elapsed.as_millis() as u64,
                };
            }
            Err(e) => {
                warn!(id = %id, attempt = attempts, max = retry.max_attempts, "Send failed: {}", e);
                if !retry.has_attempts_left(attempts) {
                    break e.to_string();
                }
                metrics::dispatch::retry();
                tokio::time::sleep(retry.backoff_for(attempts)).await;
            }
        }
    };

    let elapsed = start.elapsed();
    metrics::dispatch::failed();
    metrics::dispatch::duration(elapsed.as_secs_f64());
    NotificationResult {
        record_id: id,
        contact_email: email,
        outcome: DispatchOutcome::Failed,
        error: Some(last_error),
        attempts,
        elapsed_ms: elapsed.as_millis() as u64,
    }
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

use super::template::NotificationMessage;
use crate::config::DispatchConfig;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("message rejected: {0}")]
    Rejected(String),

    #[error("attempt timed out after {0} ms")]
    Timeout(u64),
}

/// Notification transport collaborator. Any error is treated as retryable.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(
        &self,
        identifier: &str,
        contact_email: &str,
        message: &NotificationMessage,
    ) -> Result<(), TransportError>;
}

/// The transport a run uses: dry-run when configured, simulated otherwise.
pub fn transport_for(config: &DispatchConfig) -> Arc<dyn NotificationTransport> {
    if config.dry_run {
        Arc::new(DryRunTransport)
    } else {
        Arc::new(SimulatedTransport::from_config(config))
    }
}

/// Logs the message, waits a random latency and fails with a fixed probability.
pub struct SimulatedTransport {
    success_rate: f64,
    min_latency_ms: u64,
    max_latency_ms: u64,
}

impl SimulatedTransport {
    pub fn new(success_rate: f64, min_latency_ms: u64, max_latency_ms: u64) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
            min_latency_ms,
            max_latency_ms: max_latency_ms.max(min_latency_ms),
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(
            config.simulated_success_rate,
            config.simulated_min_latency_ms,
            config.simulated_max_latency_ms,
        )
    }
}

#[async_trait]
impl NotificationTransport for SimulatedTransport {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn send(
        &self,
        identifier: &str,
        contact_email: &str,
        message: &NotificationMessage,
    ) -> Result<(), TransportError> {
        // ThreadRng is not Send, so draw everything before the first await
        let (latency_ms, delivered) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(self.min_latency_ms..=self.max_latency_ms),
                rng.gen_bool(self.success_rate),
            )
        };

        debug!(
            id = identifier,
            to = contact_email,
            subject = %message.subject,
            latency_ms,
            "Simulating notification send"
        );
        tokio::time::sleep(Duration::from_millis(latency_ms)).await;

        if delivered {
            Ok(())
        } else {
            Err(TransportError::Unavailable(format!(
                "simulated delivery failure for {identifier}"
            )))
        }
    }
}

/// Logs every message and reports success without sending anything.
#[derive(Debug, Default)]
pub struct DryRunTransport;

#[async_trait]
impl NotificationTransport for DryRunTransport {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn send(
        &self,
        identifier: &str,
        contact_email: &str,
        message: &NotificationMessage,
    ) -> Result<(), TransportError> {
        info!(id = identifier, to = contact_email, subject = %message.subject, "[dry-run] notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> NotificationMessage {
        NotificationMessage {
            subject: "s".into(),
            body: "b".into(),
        }
    }

    #[tokio::test]
    async fn simulated_transport_honours_extreme_rates() {
        let always = SimulatedTransport::new(1.0, 0, 0);
        assert!(always.send("A", "a@b.com", &message()).await.is_ok());

        let never = SimulatedTransport::new(0.0, 0, 0);
        let err = never.send("A", "a@b.com", &message()).await.unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(_)));
    }

    #[test]
    fn dry_run_flag_selects_transport() {
        let mut config = DispatchConfig::default();
        assert_eq!(transport_for(&config).name(), "simulated");
        config.dry_run = true;
        assert_eq!(transport_for(&config).name(), "dry-run");
    }

    #[tokio::test]
    async fn dry_run_always_succeeds() {
        assert!(DryRunTransport.send("A", "a@b.com", &message()).await.is_ok());
        assert_eq!(DryRunTransport.name(), "dry-run");
    }
}

use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use crate::ledger::error::LedgerError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Exponential-backoff retry for ledger submissions.
///
/// Only failures the gateway affirmatively knows never landed are retried;
/// an "outcome unknown" timeout is surfaced instead, because resubmitting a
/// mint or flag-set that may have landed would duplicate its effect.
#[derive(Debug, Default)]
pub struct LedgerRetryHandler {
    config: RetryConfig,
}

impl LedgerRetryHandler {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub async fn execute_with_retry<F, Fut, R>(&self, mut operation: F) -> Result<R, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, LedgerError>>,
    {
        let strategy = ExponentialBackoff::from_millis(self.config.base_delay.as_millis() as u64)
            .max_delay(self.config.max_delay)
            .take(self.config.max_attempts as usize)
            .map(jitter);

        let operation_id = uuid::Uuid::new_v4();
        debug!(
            operation.id = %operation_id,
            max_attempts = self.config.max_attempts,
            "Starting ledger retry operation"
        );

        RetryIf::spawn(
            strategy,
            || operation(),
            |error: &LedgerError| {
                if error.is_safely_resubmittable() {
                    warn!(operation.id = %operation_id, %error, "Ledger operation failed, will retry");
                    true
                } else {
                    debug!(operation.id = %operation_id, %error, "Ledger failure is not safely resubmittable");
                    false
                }
            },
        )
        .await
    }
}

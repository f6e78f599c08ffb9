use thiserror::Error;

/// Ledger failures, classified for the retry-vs-abort decision.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// Transient failure. `submitted` records whether the transaction was
    /// already accepted by the node: if so the outcome is unknown and blind
    /// resubmission could duplicate a financial effect.
    #[error("retryable ledger failure: {reason}")]
    Retryable { reason: String, submitted: bool },

    /// Contract revert or malformed parameters. No retry will help.
    #[error("permanent ledger failure: {reason}")]
    Permanent { reason: String },

    /// The confirmed receipt did not carry the event the operation is
    /// contractually expected to emit. Data-integrity failure; an identifier
    /// is never fabricated in its place.
    #[error("expected event '{event}' missing from confirmed receipt")]
    EventNotFound { event: &'static str },

    /// The gateway is missing its connection or signing credentials.
    #[error("ledger gateway not ready: {reason}")]
    NotReady { reason: String },
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Retryable { .. })
    }

    /// Safe to resubmit without risking a duplicated effect: the failure is
    /// transient and the gateway affirmatively knows the operation never
    /// landed.
    pub fn is_safely_resubmittable(&self) -> bool {
        matches!(
            self,
            LedgerError::Retryable {
                submitted: false,
                ..
            }
        )
    }
}

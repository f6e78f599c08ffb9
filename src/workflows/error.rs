use thiserror::Error;

use crate::ledger::LedgerError;
use crate::providers::ProviderError;
use crate::store::StoreError;

/// Failures surfaced by a workflow trigger. Every variant leaves the session
/// either resumable or clearly terminal, never ambiguous.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The trigger was issued from a state that does not permit it. Guidance
    /// for the caller; no side effect was performed.
    #[error("operation '{trigger}' is not permitted from state '{from}'")]
    InvalidTransition { trigger: &'static str, from: String },

    /// A concurrent transition for the same subject won the race; this
    /// invocation was discarded.
    #[error("another transition is already in progress for this subject")]
    Conflict,

    /// The session is missing an external reference a later step depends on.
    #[error("session is missing its {provider} reference")]
    MissingReference { provider: &'static str },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("session store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => WorkflowError::Conflict,
            other => WorkflowError::Store(other),
        }
    }
}

impl WorkflowError {
    /// Whether re-invoking the same trigger can succeed without operator
    /// intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::Provider(e) => e.is_retryable(),
            WorkflowError::Ledger(e) => e.is_retryable(),
            WorkflowError::Conflict => false,
            WorkflowError::InvalidTransition { .. } => false,
            WorkflowError::MissingReference { .. } => false,
            WorkflowError::Store(_) => false,
        }
    }
}

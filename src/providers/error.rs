use thiserror::Error;

/// Failures from the external verification/interview providers.
///
/// The orchestrator only needs to know whether re-invoking the same trigger
/// can succeed; everything else is carried as a human-readable reason.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned HTTP {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("provider response missing expected field '{field}'")]
    MalformedResponse { field: &'static str },

    #[error("provider credential missing: {0}")]
    CredentialMissing(&'static str),
}

impl ProviderError {
    /// Transient failures: the caller may retry the same trigger.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(err) => {
                err.is_timeout() || err.is_connect() || err.is_request()
            }
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderError::MalformedResponse { .. } => false,
            ProviderError::CredentialMissing(_) => false,
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Workflow family a session belongs to. Together with the subject id it
/// forms the session key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowKind {
    Kyc,
    PolicyApplication,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Kyc => "kyc",
            WorkflowKind::PolicyApplication => "policy",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "kyc" => Some(WorkflowKind::Kyc),
            "policy" => Some(WorkflowKind::PolicyApplication),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// KYC saga states. `DocVerified`, `WalletProvisioned` and `OnChainVerified`
/// are passed through within a single trigger; the durable commit points are
/// the remaining variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KycState {
    Start,
    DocSubmitted,
    DocVerified,
    InterviewCreated,
    WalletProvisioned,
    OnChainVerified,
    Completed,
    DocRejected,
    SetupFailed,
}

impl KycState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            KycState::Completed | KycState::DocRejected | KycState::SetupFailed
        )
    }

    /// Terminal failures a user may restart from via a fresh verification.
    pub fn is_restartable(&self) -> bool {
        matches!(self, KycState::DocRejected | KycState::SetupFailed)
    }
}

/// Policy application saga states. `ReadyToSubmit` is passed through within
/// the finalize trigger once the on-chain payload is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyState {
    Collecting,
    InterviewCreated,
    ReadyToSubmit,
    OnChainCreated,
    ApplicationFailed,
}

impl PolicyState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PolicyState::OnChainCreated | PolicyState::ApplicationFailed
        )
    }
}

/// The state slot of a session, tagged by workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "workflow", content = "state")]
pub enum SessionState {
    Kyc(KycState),
    Policy(PolicyState),
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Kyc(state) => write!(f, "kyc:{state:?}"),
            SessionState::Policy(state) => write!(f, "policy:{state:?}"),
        }
    }
}

/// Durable per-subject workflow progress. One record per subject per
/// workflow kind; mutated in place by each successful transition.
#[derive(Clone, Serialize, Deserialize)]
pub struct WorkflowSession {
    pub subject_id: String,
    pub kind: WorkflowKind,
    pub state: SessionState,
    /// Provider name -> opaque identifier (inquiry id, interview session id,
    /// created policy id).
    pub external_refs: HashMap<String, String>,
    pub wallet_address: Option<String>,
    /// Capability token for the subject's keystore account. Never logged,
    /// never returned to callers.
    pub wallet_secret: Option<String>,
    /// Workflow-specific structured data (policy application fields).
    pub payload: Option<serde_json::Value>,
    /// Last recorded failure reason; cleared on each successful transition.
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowSession {
    pub fn new(subject_id: &str, kind: WorkflowKind, state: SessionState) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            kind,
            state,
            external_refs: HashMap::new(),
            wallet_address: None,
            wallet_secret: None,
            payload: None,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn external_ref(&self, provider: &str) -> Option<&str> {
        self.external_refs.get(provider).map(String::as_str)
    }
}

impl std::fmt::Debug for WorkflowSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowSession")
            .field("subject_id", &self.subject_id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("external_refs", &self.external_refs)
            .field("wallet_address", &self.wallet_address)
            .field(
                "wallet_secret",
                &self.wallet_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("last_error", &self.last_error)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// A mint that failed after KYC completion, retained for out-of-band retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedMint {
    pub wallet_address: String,
    pub amount: String,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

// Session store: durable, linearizable read-modify-write of workflow
// sessions, keyed by (subject, workflow kind).

pub mod memory;
pub mod session;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemorySessionStore;
pub use session::{
    FailedMint, KycState, PolicyState, SessionState, WorkflowKind, WorkflowSession,
};
pub use sqlite::SqliteSessionStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The session changed underneath the caller; the attempted transition
    /// was discarded.
    #[error("concurrent transition detected for subject '{subject_id}' ({kind})")]
    Conflict {
        subject_id: String,
        kind: WorkflowKind,
    },

    #[error("session serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Durable keyed storage of per-subject workflow state.
///
/// `compare_and_swap` is the only mutation primitive: callers read, compute
/// the next session and write it back with the state they read. A stale
/// expectation means another transition won the race and this one must be
/// discarded, which is what gives each trigger exactly-once commit semantics.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(
        &self,
        subject_id: &str,
        kind: WorkflowKind,
    ) -> Result<Option<WorkflowSession>, StoreError>;

    /// Commit `session`, provided the stored state still equals `expected`.
    /// `None` expects no record to exist yet (creation).
    async fn compare_and_swap(
        &self,
        expected: Option<&SessionState>,
        session: &WorkflowSession,
    ) -> Result<(), StoreError>;

    /// Record a mint that failed after KYC completion, keyed by wallet.
    async fn record_failed_mint(
        &self,
        wallet_address: &str,
        amount: &str,
        reason: &str,
    ) -> Result<(), StoreError>;

    async fn list_failed_mints(&self) -> Result<Vec<FailedMint>, StoreError>;

    async fn clear_failed_mint(&self, wallet_address: &str) -> Result<(), StoreError>;
}

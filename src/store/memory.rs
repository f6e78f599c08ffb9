use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::store::session::{FailedMint, SessionState, WorkflowKind, WorkflowSession};
use crate::store::{SessionStore, StoreError};

/// In-memory session store with the same compare-and-swap semantics as the
/// durable one. Used by tests and demos; progress does not survive restarts.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<(String, WorkflowKind), WorkflowSession>>,
    failed_mints: Mutex<HashMap<String, FailedMint>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(
        &self,
        subject_id: &str,
        kind: WorkflowKind,
    ) -> Result<Option<WorkflowSession>, StoreError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.get(&(subject_id.to_string(), kind)).cloned())
    }

    async fn compare_and_swap(
        &self,
        expected: Option<&SessionState>,
        session: &WorkflowSession,
    ) -> Result<(), StoreError> {
        let key = (session.subject_id.clone(), session.kind);
        let mut sessions = self.sessions.lock().await;

        let current = sessions.get(&key).map(|s| s.state);
        if current != expected.copied() {
            return Err(StoreError::Conflict {
                subject_id: session.subject_id.clone(),
                kind: session.kind,
            });
        }

        let mut committed = session.clone();
        committed.updated_at = Utc::now();
        sessions.insert(key, committed);
        Ok(())
    }

    async fn record_failed_mint(
        &self,
        wallet_address: &str,
        amount: &str,
        reason: &str,
    ) -> Result<(), StoreError> {
        let mut mints = self.failed_mints.lock().await;
        mints.insert(
            wallet_address.to_string(),
            FailedMint {
                wallet_address: wallet_address.to_string(),
                amount: amount.to_string(),
                reason: reason.to_string(),
                recorded_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list_failed_mints(&self) -> Result<Vec<FailedMint>, StoreError> {
        let mints = self.failed_mints.lock().await;
        let mut all: Vec<FailedMint> = mints.values().cloned().collect();
        all.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));
        Ok(all)
    }

    async fn clear_failed_mint(&self, wallet_address: &str) -> Result<(), StoreError> {
        let mut mints = self.failed_mints.lock().await;
        mints.remove(wallet_address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::session::KycState;

    fn session(subject: &str, state: KycState) -> WorkflowSession {
        WorkflowSession::new(subject, WorkflowKind::Kyc, SessionState::Kyc(state))
    }

    #[tokio::test]
    async fn create_requires_absent_record() {
        let store = InMemorySessionStore::new();
        let s = session("u1", KycState::DocSubmitted);

        store.compare_and_swap(None, &s).await.unwrap();
        // A second creation for the same key observes a conflict.
        let err = store.compare_and_swap(None, &s).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn stale_expected_state_is_rejected() {
        let store = InMemorySessionStore::new();
        store
            .compare_and_swap(None, &session("u1", KycState::DocSubmitted))
            .await
            .unwrap();

        let next = session("u1", KycState::InterviewCreated);
        store
            .compare_and_swap(Some(&SessionState::Kyc(KycState::DocSubmitted)), &next)
            .await
            .unwrap();

        // Replaying the same transition sees the already-advanced state.
        let err = store
            .compare_and_swap(Some(&SessionState::Kyc(KycState::DocSubmitted)), &next)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn kinds_are_independent_keys() {
        let store = InMemorySessionStore::new();
        store
            .compare_and_swap(None, &session("u1", KycState::Completed))
            .await
            .unwrap();

        let policy = WorkflowSession::new(
            "u1",
            WorkflowKind::PolicyApplication,
            SessionState::Policy(crate::store::session::PolicyState::Collecting),
        );
        store.compare_and_swap(None, &policy).await.unwrap();

        assert!(store.load("u1", WorkflowKind::Kyc).await.unwrap().is_some());
        assert!(store
            .load("u1", WorkflowKind::PolicyApplication)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn failed_mints_round_trip() {
        let store = InMemorySessionStore::new();
        store
            .record_failed_mint("0xabc", "3000", "node unavailable")
            .await
            .unwrap();

        let mints = store.list_failed_mints().await.unwrap();
        assert_eq!(mints.len(), 1);
        assert_eq!(mints[0].wallet_address, "0xabc");

        store.clear_failed_mint("0xabc").await.unwrap();
        assert!(store.list_failed_mints().await.unwrap().is_empty());
    }
}

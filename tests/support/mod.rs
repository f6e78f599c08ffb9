// Scripted collaborators for saga tests. Each mock records the calls it
// receives and plays back a configured script, so tests can assert both the
// committed session state and the external side effects.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Barrier, Mutex};

use inzo_orchestrator::ledger::{
    Confirmation, LedgerError, LedgerOperation, LedgerSubmitter, WalletIdentity,
};
use inzo_orchestrator::providers::{
    DocumentVerification, InquiryStatus, InterviewProvider, InterviewSession, ProviderError,
};
use inzo_orchestrator::store::InMemorySessionStore;
use inzo_orchestrator::workflows::{
    KycOrchestrator, KycSettings, PolicyOrchestrator, PolicySettings,
};

/// Document provider that numbers inquiries and plays back scripted
/// statuses. An optional barrier lets concurrency tests hold every
/// in-flight `create_inquiry` at the same point.
#[derive(Default)]
pub struct ScriptedDocuments {
    inquiry_counter: AtomicUsize,
    statuses: Mutex<VecDeque<InquiryStatus>>,
    pub created_subject_refs: Mutex<Vec<String>>,
    pub rendezvous: Option<Arc<Barrier>>,
}

impl ScriptedDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rendezvous(barrier: Arc<Barrier>) -> Self {
        Self {
            rendezvous: Some(barrier),
            ..Self::default()
        }
    }

    pub async fn push_status(&self, status: InquiryStatus) {
        self.statuses.lock().await.push_back(status);
    }

    pub fn inquiries_created(&self) -> usize {
        self.inquiry_counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentVerification for ScriptedDocuments {
    async fn create_inquiry(&self, subject_ref: &str) -> Result<String, ProviderError> {
        if let Some(barrier) = &self.rendezvous {
            barrier.wait().await;
        }
        let n = self.inquiry_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.created_subject_refs
            .lock()
            .await
            .push(subject_ref.to_string());
        Ok(format!("inq-{n}"))
    }

    async fn generate_link(&self, inquiry_id: &str) -> Result<String, ProviderError> {
        Ok(format!("https://verify/{inquiry_id}"))
    }

    async fn get_status(&self, _inquiry_id: &str) -> Result<InquiryStatus, ProviderError> {
        Ok(self
            .statuses
            .lock()
            .await
            .pop_front()
            .unwrap_or(InquiryStatus::Pending))
    }
}

/// Interview provider that numbers sessions and records what was requested.
#[derive(Default)]
pub struct ScriptedInterviews {
    session_counter: AtomicUsize,
    pub requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedInterviews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sessions_created(&self) -> usize {
        self.session_counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InterviewProvider for ScriptedInterviews {
    async fn create_session(
        &self,
        replica_id: &str,
        name: &str,
        _context: &str,
    ) -> Result<InterviewSession, ProviderError> {
        let n = self.session_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests
            .lock()
            .await
            .push((replica_id.to_string(), name.to_string()));
        Ok(InterviewSession {
            session_id: format!("tv-{n}"),
            session_url: format!("https://interview/tv-{n}"),
        })
    }
}

/// Ledger that plays back scripted submit results (success by default) and
/// records every operation it was handed.
#[derive(Default)]
pub struct ScriptedLedger {
    wallet_counter: AtomicUsize,
    submit_script: Mutex<VecDeque<Result<Confirmation, LedgerError>>>,
    wallet_failure: Mutex<Option<LedgerError>>,
    pub submitted: Mutex<Vec<LedgerOperation>>,
}

impl ScriptedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next `submit` call. Unscripted calls succeed
    /// with a generated tx hash.
    pub async fn push_submit(&self, result: Result<Confirmation, LedgerError>) {
        self.submit_script.lock().await.push_back(result);
    }

    pub async fn fail_wallet_generation(&self, err: LedgerError) {
        *self.wallet_failure.lock().await = Some(err);
    }

    pub async fn submitted_ops(&self) -> Vec<LedgerOperation> {
        self.submitted.lock().await.clone()
    }
}

pub fn confirmed(tx_hash: &str, policy_id: Option<u128>) -> Confirmation {
    Confirmation {
        tx_hash: tx_hash.to_string(),
        policy_id,
    }
}

#[async_trait]
impl LedgerSubmitter for ScriptedLedger {
    async fn submit(&self, op: LedgerOperation) -> Result<Confirmation, LedgerError> {
        let n = {
            let mut submitted = self.submitted.lock().await;
            submitted.push(op);
            submitted.len()
        };
        match self.submit_script.lock().await.pop_front() {
            Some(result) => result,
            None => Ok(confirmed(&format!("0xtx{n}"), None)),
        }
    }

    async fn generate_wallet(&self) -> Result<WalletIdentity, LedgerError> {
        if let Some(err) = self.wallet_failure.lock().await.take() {
            return Err(err);
        }
        let n = self.wallet_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(WalletIdentity {
            address: format!("0xwallet{n}"),
            secret: format!("passphrase-{n}"),
        })
    }
}

/// A fully wired KYC saga over in-memory collaborators.
pub struct KycHarness {
    pub store: Arc<InMemorySessionStore>,
    pub documents: Arc<ScriptedDocuments>,
    pub interviews: Arc<ScriptedInterviews>,
    pub ledger: Arc<ScriptedLedger>,
    pub saga: KycOrchestrator,
}

pub fn kyc_harness() -> KycHarness {
    kyc_harness_with_documents(ScriptedDocuments::new())
}

pub fn kyc_harness_with_documents(documents: ScriptedDocuments) -> KycHarness {
    let store = Arc::new(InMemorySessionStore::new());
    let documents = Arc::new(documents);
    let interviews = Arc::new(ScriptedInterviews::new());
    let ledger = Arc::new(ScriptedLedger::new());

    let saga = KycOrchestrator::new(
        store.clone(),
        documents.clone(),
        interviews.clone(),
        ledger.clone(),
        KycSettings {
            interview_replica_id: "replica-kyc".to_string(),
            mint_amount: "3000".to_string(),
        },
    );

    KycHarness {
        store,
        documents,
        interviews,
        ledger,
        saga,
    }
}

/// A fully wired policy saga over in-memory collaborators.
pub struct PolicyHarness {
    pub store: Arc<InMemorySessionStore>,
    pub interviews: Arc<ScriptedInterviews>,
    pub ledger: Arc<ScriptedLedger>,
    pub saga: PolicyOrchestrator,
}

pub fn policy_harness() -> PolicyHarness {
    let store = Arc::new(InMemorySessionStore::new());
    let interviews = Arc::new(ScriptedInterviews::new());
    let ledger = Arc::new(ScriptedLedger::new());

    let saga = PolicyOrchestrator::new(
        store.clone(),
        interviews.clone(),
        ledger.clone(),
        PolicySettings {
            interview_replica_id: "replica-policy".to_string(),
        },
    );

    PolicyHarness {
        store,
        interviews,
        ledger,
        saga,
    }
}

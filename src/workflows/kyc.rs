use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::ledger::{LedgerOperation, LedgerRetryHandler, LedgerSubmitter};
use crate::providers::{DocumentVerification, InquiryStatus, InterviewProvider};
use crate::store::{KycState, SessionState, SessionStore, WorkflowKind, WorkflowSession};
use crate::workflows::error::WorkflowError;

/// External reference keys on the KYC session.
pub const REF_DOCUMENT_INQUIRY: &str = "document_inquiry";
pub const REF_INTERVIEW_SESSION: &str = "interview_session";

/// Context handed to the interview replica for onboarding interviews.
const KYC_INTERVIEW_CONTEXT: &str = "You are an Inzo insurance KYC agent. Ask the applicant to \
confirm their identity details, residency and the source of funds for their first premium. \
Close by telling them to say 'I finished the KYC interview'.";

/// What the caller should do next after polling document verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocCheckOutcome {
    /// Verification still in flight; poll again later. No state change.
    StillPending { status: InquiryStatus },
    /// Documents passed and the interview is open; share the join URL.
    InterviewReady { join_url: String },
    /// Verification ended unsuccessfully; the saga is terminal until the
    /// subject restarts from the beginning.
    Rejected { status: InquiryStatus },
}

/// Durable outcome of a completed KYC saga.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KycCompletion {
    pub wallet_address: String,
    /// Populated when the onboarding mint failed; KYC itself still completed.
    pub mint_warning: Option<String>,
}

/// Outcome of an out-of-band sweep over previously failed mints.
#[derive(Debug, Default)]
pub struct MintRetryReport {
    pub minted: Vec<String>,
    pub still_failing: Vec<(String, String)>,
}

/// Settings the KYC saga needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct KycSettings {
    /// Interview replica used for onboarding interviews.
    pub interview_replica_id: String,
    /// Stablecoin amount credited on completion, decimal string.
    pub mint_amount: String,
}

/// The KYC saga: document verification, AI interview, wallet provisioning,
/// on-chain attestation and the onboarding mint.
///
/// Every trigger loads the session, validates that the current state permits
/// it, performs the external work, and commits the new state with a
/// compare-and-swap against the state it read.
pub struct KycOrchestrator {
    store: Arc<dyn SessionStore>,
    documents: Arc<dyn DocumentVerification>,
    interviews: Arc<dyn InterviewProvider>,
    ledger: Arc<dyn LedgerSubmitter>,
    settings: KycSettings,
}

impl KycOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        documents: Arc<dyn DocumentVerification>,
        interviews: Arc<dyn InterviewProvider>,
        ledger: Arc<dyn LedgerSubmitter>,
        settings: KycSettings,
    ) -> Self {
        Self {
            store,
            documents,
            interviews,
            ledger,
            settings,
        }
    }

    fn kyc_state(session: &WorkflowSession) -> KycState {
        match session.state {
            SessionState::Kyc(state) => state,
            // A policy state under the KYC key cannot be committed through
            // this orchestrator; treat it as a foreign record.
            SessionState::Policy(_) => KycState::SetupFailed,
        }
    }

    /// Start (or restart) identity verification for a subject.
    ///
    /// Valid from an absent session, `Start`, or either terminal failure
    /// state. Returns the one-time verification link to present to the user.
    #[instrument(skip(self), fields(workflow = "kyc", trigger = "begin_verification"))]
    pub async fn begin_verification(&self, subject_id: &str) -> Result<String, WorkflowError> {
        let existing = self.store.load(subject_id, WorkflowKind::Kyc).await?;
        let expected = match &existing {
            None => None,
            Some(session) => {
                let state = Self::kyc_state(session);
                if state != KycState::Start && !state.is_restartable() {
                    return Err(WorkflowError::InvalidTransition {
                        trigger: "begin_verification",
                        from: session.state.to_string(),
                    });
                }
                Some(session.state)
            }
        };

        let inquiry_id = self
            .documents
            .create_inquiry(&format!("inzo-user-{subject_id}"))
            .await?;
        let link = self.documents.generate_link(&inquiry_id).await?;

        let mut session = WorkflowSession::new(
            subject_id,
            WorkflowKind::Kyc,
            SessionState::Kyc(KycState::DocSubmitted),
        );
        session
            .external_refs
            .insert(REF_DOCUMENT_INQUIRY.to_string(), inquiry_id.clone());

        self.store
            .compare_and_swap(expected.as_ref(), &session)
            .await?;

        info!(subject.id = subject_id, inquiry.id = %inquiry_id, "Document verification started");
        Ok(link)
    }

    /// Poll document verification and, once it passes, open the onboarding
    /// interview. Valid only from `DocSubmitted`.
    #[instrument(skip(self), fields(workflow = "kyc", trigger = "check_document"))]
    pub async fn check_document(&self, subject_id: &str) -> Result<DocCheckOutcome, WorkflowError> {
        let mut session = self
            .store
            .load(subject_id, WorkflowKind::Kyc)
            .await?
            .ok_or(WorkflowError::InvalidTransition {
                trigger: "check_document",
                from: "(none)".to_string(),
            })?;

        if Self::kyc_state(&session) != KycState::DocSubmitted {
            return Err(WorkflowError::InvalidTransition {
                trigger: "check_document",
                from: session.state.to_string(),
            });
        }

        let inquiry_id = session
            .external_ref(REF_DOCUMENT_INQUIRY)
            .ok_or(WorkflowError::MissingReference {
                provider: "document verification",
            })?
            .to_string();

        let status = self.documents.get_status(&inquiry_id).await?;

        if status == InquiryStatus::Completed {
            info!(
                subject.id = subject_id,
                state = %SessionState::Kyc(KycState::DocVerified),
                "Documents verified, opening interview"
            );
            let interview = self
                .interviews
                .create_session(
                    &self.settings.interview_replica_id,
                    &format!("Inzo KYC Interview - {subject_id}"),
                    KYC_INTERVIEW_CONTEXT,
                )
                .await?;

            let expected = session.state;
            session.state = SessionState::Kyc(KycState::InterviewCreated);
            session
                .external_refs
                .insert(REF_INTERVIEW_SESSION.to_string(), interview.session_id);
            session.last_error = None;

            self.store
                .compare_and_swap(Some(&expected), &session)
                .await?;
            return Ok(DocCheckOutcome::InterviewReady {
                join_url: interview.session_url,
            });
        }

        if status.is_in_progress() {
            // Pure read: no state change, no side effect.
            return Ok(DocCheckOutcome::StillPending { status });
        }

        warn!(subject.id = subject_id, status = %status, "Document verification rejected");
        let expected = session.state;
        session.state = SessionState::Kyc(KycState::DocRejected);
        session.last_error = Some(format!("document verification ended as '{status}'"));
        self.store
            .compare_and_swap(Some(&expected), &session)
            .await?;
        Ok(DocCheckOutcome::Rejected { status })
    }

    /// Finalize KYC after the interview: provision a wallet, assert the KYC
    /// flag on-chain, then credit the onboarding amount. Valid only from
    /// `InterviewCreated`.
    ///
    /// The mint is deliberately non-fatal: the KYC flag is the authoritative
    /// completion signal, so a failed mint is recorded for out-of-band retry
    /// and the saga still completes.
    #[instrument(skip(self), fields(workflow = "kyc", trigger = "finalize_verification"))]
    pub async fn finalize_verification(
        &self,
        subject_id: &str,
    ) -> Result<KycCompletion, WorkflowError> {
        let mut session = self
            .store
            .load(subject_id, WorkflowKind::Kyc)
            .await?
            .ok_or(WorkflowError::InvalidTransition {
                trigger: "finalize_verification",
                from: "(none)".to_string(),
            })?;

        if Self::kyc_state(&session) != KycState::InterviewCreated {
            return Err(WorkflowError::InvalidTransition {
                trigger: "finalize_verification",
                from: session.state.to_string(),
            });
        }
        let expected = session.state;

        // Step a: wallet identity. Nothing is on-chain yet, so failure here
        // needs no compensation.
        let wallet = match self.ledger.generate_wallet().await {
            Ok(wallet) => wallet,
            Err(e) => {
                self.fail_setup(&mut session, expected, format!("wallet provisioning failed: {e}"))
                    .await?;
                return Err(e.into());
            }
        };
        info!(
            subject.id = subject_id,
            wallet.address = %wallet.address,
            state = %SessionState::Kyc(KycState::WalletProvisioned),
            "Wallet provisioned"
        );

        // Step b: the authoritative on-chain attestation. The wallet is
        // discarded on failure; it was never linked on-chain.
        if let Err(e) = self
            .ledger
            .submit(LedgerOperation::SetKycFlag {
                address: wallet.address.clone(),
                verified: true,
            })
            .await
        {
            self.fail_setup(&mut session, expected, format!("on-chain KYC update failed: {e}"))
                .await?;
            return Err(e.into());
        }
        info!(
            subject.id = subject_id,
            state = %SessionState::Kyc(KycState::OnChainVerified),
            "KYC flag set on-chain"
        );

        // Step c: onboarding mint, non-fatal.
        let mint_warning = match self
            .ledger
            .submit(LedgerOperation::MintToken {
                to: wallet.address.clone(),
                amount: self.settings.mint_amount.clone(),
            })
            .await
        {
            Ok(_) => None,
            Err(e) => {
                warn!(
                    subject.id = subject_id,
                    wallet.address = %wallet.address,
                    error = %e,
                    "Onboarding mint failed; KYC completes regardless"
                );
                self.store
                    .record_failed_mint(&wallet.address, &self.settings.mint_amount, &e.to_string())
                    .await?;
                Some(format!("mint failed: {e}"))
            }
        };

        session.state = SessionState::Kyc(KycState::Completed);
        session.wallet_address = Some(wallet.address.clone());
        session.wallet_secret = Some(wallet.secret);
        session.last_error = mint_warning.clone();

        self.store
            .compare_and_swap(Some(&expected), &session)
            .await?;

        info!(subject.id = subject_id, wallet.address = %wallet.address, "KYC completed");
        Ok(KycCompletion {
            wallet_address: wallet.address,
            mint_warning,
        })
    }

    /// Re-submit previously failed onboarding mints. Only failures the
    /// gateway knows never landed are resubmitted automatically.
    #[instrument(skip(self), fields(workflow = "kyc", trigger = "retry_failed_mints"))]
    pub async fn retry_failed_mints(&self) -> Result<MintRetryReport, WorkflowError> {
        let retry = LedgerRetryHandler::default();
        let mut report = MintRetryReport::default();

        for mint in self.store.list_failed_mints().await? {
            let outcome = retry
                .execute_with_retry(|| {
                    self.ledger.submit(LedgerOperation::MintToken {
                        to: mint.wallet_address.clone(),
                        amount: mint.amount.clone(),
                    })
                })
                .await;

            match outcome {
                Ok(confirmation) => {
                    info!(
                        wallet.address = %mint.wallet_address,
                        tx.hash = %confirmation.tx_hash,
                        "Recovered failed onboarding mint"
                    );
                    self.store.clear_failed_mint(&mint.wallet_address).await?;
                    report.minted.push(mint.wallet_address);
                }
                Err(e) => {
                    warn!(wallet.address = %mint.wallet_address, error = %e, "Mint retry failed");
                    report.still_failing.push((mint.wallet_address, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    async fn fail_setup(
        &self,
        session: &mut WorkflowSession,
        expected: SessionState,
        reason: String,
    ) -> Result<(), WorkflowError> {
        error!(subject.id = %session.subject_id, reason = %reason, "KYC setup failed");
        session.state = SessionState::Kyc(KycState::SetupFailed);
        session.last_error = Some(reason);
        self.store.compare_and_swap(Some(&expected), session).await?;
        Ok(())
    }
}

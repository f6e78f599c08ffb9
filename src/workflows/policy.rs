use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::ledger::{LedgerError, LedgerOperation, LedgerSubmitter, PolicyParams};
use crate::providers::InterviewProvider;
use crate::store::{PolicyState, SessionState, SessionStore, WorkflowKind, WorkflowSession};
use crate::workflows::error::WorkflowError;

/// External reference keys on the policy session.
pub const REF_INTERVIEW_SESSION: &str = "interview_session";
pub const REF_POLICY_ID: &str = "policy_id";
pub const REF_POLICY_TX: &str = "policy_tx";

/// Context handed to the interview replica for policy applications.
const POLICY_INTERVIEW_CONTEXT: &str = "You are an Inzo insurance policy advisor. Walk the \
applicant through the coverage they requested, confirm the insured asset, the premium and the \
coverage amount, and flag anything inconsistent with their application. Close by telling them to \
say 'I finished the policy interview'.";

/// Application data collected before the interview. Stored verbatim in the
/// session payload; finalization rebuilds the on-chain call from it, so a
/// resubmission hashes identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyApplicationFields {
    pub risk_tier: u8,
    /// Decimal strings; converted to fixed-point at the ledger boundary
    pub premium: String,
    pub coverage: String,
    /// Unix timestamps
    pub start_date: u64,
    pub end_date: u64,
    pub asset_identifier: String,
    /// Free-text policy terms, bound on-chain by their content hash
    pub details: String,
}

/// Durable outcome of a finalized policy application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyCreated {
    pub policy_id: u128,
    pub tx_hash: String,
}

/// Settings the policy saga needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct PolicySettings {
    /// Interview replica used for policy application interviews.
    pub interview_replica_id: String,
}

/// The policy application saga: collect fields, interview the applicant,
/// create the policy on-chain and record the emitted policy identifier.
pub struct PolicyOrchestrator {
    store: Arc<dyn SessionStore>,
    interviews: Arc<dyn InterviewProvider>,
    ledger: Arc<dyn LedgerSubmitter>,
    settings: PolicySettings,
}

impl PolicyOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        interviews: Arc<dyn InterviewProvider>,
        ledger: Arc<dyn LedgerSubmitter>,
        settings: PolicySettings,
    ) -> Self {
        Self {
            store,
            interviews,
            ledger,
            settings,
        }
    }

    fn policy_state(session: &WorkflowSession) -> PolicyState {
        match session.state {
            SessionState::Policy(state) => state,
            SessionState::Kyc(_) => PolicyState::ApplicationFailed,
        }
    }

    /// Store the application fields and open the policy interview.
    ///
    /// Valid from an absent session, `Collecting`, or a finalized
    /// application (starting a fresh one; the previous record is archived
    /// in its terminal state until then).
    #[instrument(skip(self, fields), fields(workflow = "policy", trigger = "initiate_application"))]
    pub async fn initiate_application(
        &self,
        subject_id: &str,
        fields: PolicyApplicationFields,
    ) -> Result<String, WorkflowError> {
        let existing = self
            .store
            .load(subject_id, WorkflowKind::PolicyApplication)
            .await?;
        let expected = match &existing {
            None => None,
            Some(session) => {
                let state = Self::policy_state(session);
                if !matches!(state, PolicyState::Collecting | PolicyState::OnChainCreated) {
                    return Err(WorkflowError::InvalidTransition {
                        trigger: "initiate_application",
                        from: session.state.to_string(),
                    });
                }
                Some(session.state)
            }
        };

        let interview = self
            .interviews
            .create_session(
                &self.settings.interview_replica_id,
                &format!("Inzo Policy Interview - {subject_id}"),
                POLICY_INTERVIEW_CONTEXT,
            )
            .await?;

        let mut session = WorkflowSession::new(
            subject_id,
            WorkflowKind::PolicyApplication,
            SessionState::Policy(PolicyState::InterviewCreated),
        );
        session.payload = Some(serde_json::to_value(&fields).map_err(crate::store::StoreError::from)?);
        session
            .external_refs
            .insert(REF_INTERVIEW_SESSION.to_string(), interview.session_id);

        self.store
            .compare_and_swap(expected.as_ref(), &session)
            .await?;

        info!(subject.id = subject_id, "Policy application initiated");
        Ok(interview.session_url)
    }

    /// Create the policy on-chain from the stored fields.
    ///
    /// Valid from `InterviewCreated` (interview completion is trusted on
    /// user assertion) and from `ApplicationFailed` for an idempotent
    /// resubmission: the payload is rebuilt from the same stored fields, so
    /// the details hash is identical.
    #[instrument(skip(self), fields(workflow = "policy", trigger = "finalize_application"))]
    pub async fn finalize_application(
        &self,
        subject_id: &str,
        wallet_address: &str,
    ) -> Result<PolicyCreated, WorkflowError> {
        let mut session = self
            .store
            .load(subject_id, WorkflowKind::PolicyApplication)
            .await?
            .ok_or(WorkflowError::InvalidTransition {
                trigger: "finalize_application",
                from: "(none)".to_string(),
            })?;

        let state = Self::policy_state(&session);
        if !matches!(
            state,
            PolicyState::InterviewCreated | PolicyState::ApplicationFailed
        ) {
            return Err(WorkflowError::InvalidTransition {
                trigger: "finalize_application",
                from: session.state.to_string(),
            });
        }
        let expected = session.state;

        let fields: PolicyApplicationFields = session
            .payload
            .as_ref()
            .cloned()
            .ok_or(WorkflowError::MissingReference {
                provider: "policy application fields",
            })
            .and_then(|value| {
                serde_json::from_value(value)
                    .map_err(|e| WorkflowError::Store(crate::store::StoreError::from(e)))
            })?;

        // Payload built; the saga is at its submission point.
        info!(subject.id = subject_id, state = %SessionState::Policy(PolicyState::ReadyToSubmit), "Submitting policy creation");

        let op = LedgerOperation::CreatePolicy {
            params: PolicyParams {
                holder: wallet_address.to_string(),
                risk_tier: fields.risk_tier,
                premium: fields.premium.clone(),
                coverage: fields.coverage.clone(),
                start: fields.start_date,
                end: fields.end_date,
                asset_id: fields.asset_identifier.clone(),
                details: fields.details.clone(),
            },
        };

        let outcome = self.ledger.submit(op).await.and_then(|confirmation| {
            let policy_id = confirmation.policy_id.ok_or(LedgerError::EventNotFound {
                event: "PolicyCreated",
            })?;
            Ok((policy_id, confirmation.tx_hash))
        });

        match outcome {
            Ok((policy_id, tx_hash)) => {
                session.state = SessionState::Policy(PolicyState::OnChainCreated);
                session.wallet_address = Some(wallet_address.to_string());
                session
                    .external_refs
                    .insert(REF_POLICY_ID.to_string(), policy_id.to_string());
                session
                    .external_refs
                    .insert(REF_POLICY_TX.to_string(), tx_hash.clone());
                session.last_error = None;

                self.store
                    .compare_and_swap(Some(&expected), &session)
                    .await?;

                info!(subject.id = subject_id, policy.id = policy_id, "Policy created on-chain");
                Ok(PolicyCreated { policy_id, tx_hash })
            }
            Err(e @ LedgerError::Retryable { .. }) => {
                // Transient: leave the session where it is so the caller can
                // re-invoke the same trigger.
                warn!(subject.id = subject_id, error = %e, "Policy creation will need a retry");
                Err(e.into())
            }
            Err(e) => {
                warn!(subject.id = subject_id, error = %e, "Policy creation failed permanently");
                session.state = SessionState::Policy(PolicyState::ApplicationFailed);
                session.last_error = Some(e.to_string());
                self.store
                    .compare_and_swap(Some(&expected), &session)
                    .await?;
                Err(e.into())
            }
        }
    }
}

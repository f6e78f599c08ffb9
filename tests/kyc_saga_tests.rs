// End-to-end KYC saga scenarios over scripted collaborators.

mod support;

use inzo_orchestrator::ledger::{LedgerError, LedgerOperation};
use inzo_orchestrator::providers::InquiryStatus;
use inzo_orchestrator::store::{KycState, SessionState, SessionStore, WorkflowKind};
use inzo_orchestrator::workflows::{kyc, DocCheckOutcome, WorkflowError};

use support::kyc_harness;

async fn kyc_state(harness: &support::KycHarness, subject: &str) -> KycState {
    let session = harness
        .store
        .load(subject, WorkflowKind::Kyc)
        .await
        .unwrap()
        .expect("session should exist");
    match session.state {
        SessionState::Kyc(state) => state,
        other => panic!("unexpected session state {other}"),
    }
}

#[tokio::test]
async fn begin_verification_creates_inquiry_and_session() {
    let harness = kyc_harness();

    let link = harness.saga.begin_verification("u1").await.unwrap();

    assert_eq!(link, "https://verify/inq-1");
    assert_eq!(kyc_state(&harness, "u1").await, KycState::DocSubmitted);

    let session = harness
        .store
        .load("u1", WorkflowKind::Kyc)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        session.external_ref(kyc::REF_DOCUMENT_INQUIRY),
        Some("inq-1")
    );

    // The provider sees a namespaced subject reference, not the raw id.
    let refs = harness.documents.created_subject_refs.lock().await;
    assert_eq!(refs.as_slice(), ["inzo-user-u1"]);
}

#[tokio::test]
async fn completed_documents_open_the_interview() {
    let harness = kyc_harness();
    harness.saga.begin_verification("u1").await.unwrap();
    harness
        .documents
        .push_status(InquiryStatus::Completed)
        .await;

    let outcome = harness.saga.check_document("u1").await.unwrap();

    assert_eq!(
        outcome,
        DocCheckOutcome::InterviewReady {
            join_url: "https://interview/tv-1".to_string(),
        }
    );
    assert_eq!(kyc_state(&harness, "u1").await, KycState::InterviewCreated);

    let requests = harness.interviews.requests.lock().await;
    assert_eq!(requests[0].0, "replica-kyc");
    assert_eq!(requests[0].1, "Inzo KYC Interview - u1");
}

#[tokio::test]
async fn pending_documents_change_nothing() {
    let harness = kyc_harness();
    harness.saga.begin_verification("u1").await.unwrap();
    harness.documents.push_status(InquiryStatus::Pending).await;
    harness
        .documents
        .push_status(InquiryStatus::NeedsReview)
        .await;

    for _ in 0..2 {
        let outcome = harness.saga.check_document("u1").await.unwrap();
        assert!(matches!(outcome, DocCheckOutcome::StillPending { .. }));
    }

    // Polling is a pure read: state unchanged, no interview opened.
    assert_eq!(kyc_state(&harness, "u1").await, KycState::DocSubmitted);
    assert_eq!(harness.interviews.sessions_created(), 0);
}

#[tokio::test]
async fn failed_documents_reject_and_allow_restart() {
    let harness = kyc_harness();
    harness.saga.begin_verification("u2").await.unwrap();
    harness.documents.push_status(InquiryStatus::Failed).await;

    let outcome = harness.saga.check_document("u2").await.unwrap();
    assert_eq!(
        outcome,
        DocCheckOutcome::Rejected {
            status: InquiryStatus::Failed,
        }
    );
    assert_eq!(kyc_state(&harness, "u2").await, KycState::DocRejected);

    let session = harness
        .store
        .load("u2", WorkflowKind::Kyc)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        session.last_error.as_deref(),
        Some("document verification ended as 'failed'")
    );

    // A rejected subject may start over from the beginning.
    let link = harness.saga.begin_verification("u2").await.unwrap();
    assert_eq!(link, "https://verify/inq-2");
    assert_eq!(kyc_state(&harness, "u2").await, KycState::DocSubmitted);
}

#[tokio::test]
async fn finalize_flags_mints_and_completes() {
    let harness = kyc_harness();
    harness.saga.begin_verification("u1").await.unwrap();
    harness
        .documents
        .push_status(InquiryStatus::Completed)
        .await;
    harness.saga.check_document("u1").await.unwrap();

    let completion = harness.saga.finalize_verification("u1").await.unwrap();

    assert_eq!(completion.wallet_address, "0xwallet1");
    assert!(completion.mint_warning.is_none());
    assert_eq!(kyc_state(&harness, "u1").await, KycState::Completed);

    let ops = harness.ledger.submitted_ops().await;
    assert_eq!(
        ops,
        vec![
            LedgerOperation::SetKycFlag {
                address: "0xwallet1".to_string(),
                verified: true,
            },
            LedgerOperation::MintToken {
                to: "0xwallet1".to_string(),
                amount: "3000".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn mint_failure_is_recorded_but_kyc_still_completes() {
    let harness = kyc_harness();
    harness.saga.begin_verification("u1").await.unwrap();
    harness
        .documents
        .push_status(InquiryStatus::Completed)
        .await;
    harness.saga.check_document("u1").await.unwrap();

    // KYC flag succeeds, mint does not.
    harness
        .ledger
        .push_submit(Ok(support::confirmed("0xflag", None)))
        .await;
    harness
        .ledger
        .push_submit(Err(LedgerError::Permanent {
            reason: "mint reverted".to_string(),
        }))
        .await;

    let completion = harness.saga.finalize_verification("u1").await.unwrap();

    assert_eq!(kyc_state(&harness, "u1").await, KycState::Completed);
    assert_eq!(
        completion.mint_warning.as_deref(),
        Some("mint failed: permanent ledger failure: mint reverted")
    );

    let mints = harness.store.list_failed_mints().await.unwrap();
    assert_eq!(mints.len(), 1);
    assert_eq!(mints[0].wallet_address, "0xwallet1");
    assert_eq!(mints[0].amount, "3000");
}

#[tokio::test]
async fn kyc_flag_failure_fails_setup_and_allows_restart() {
    let harness = kyc_harness();
    harness.saga.begin_verification("u1").await.unwrap();
    harness
        .documents
        .push_status(InquiryStatus::Completed)
        .await;
    harness.saga.check_document("u1").await.unwrap();

    harness
        .ledger
        .push_submit(Err(LedgerError::Permanent {
            reason: "registry reverted".to_string(),
        }))
        .await;

    let err = harness.saga.finalize_verification("u1").await.unwrap_err();
    assert!(matches!(err, WorkflowError::Ledger(_)));
    assert_eq!(kyc_state(&harness, "u1").await, KycState::SetupFailed);

    // Nothing was completed, so the mint never ran and nothing is owed.
    assert!(harness.store.list_failed_mints().await.unwrap().is_empty());

    // Setup failures are restartable from the beginning.
    harness.saga.begin_verification("u1").await.unwrap();
    assert_eq!(kyc_state(&harness, "u1").await, KycState::DocSubmitted);
}

#[tokio::test]
async fn wallet_provisioning_failure_fails_setup_without_chain_writes() {
    let harness = kyc_harness();
    harness.saga.begin_verification("u1").await.unwrap();
    harness
        .documents
        .push_status(InquiryStatus::Completed)
        .await;
    harness.saga.check_document("u1").await.unwrap();

    harness
        .ledger
        .fail_wallet_generation(LedgerError::NotReady {
            reason: "node unavailable".to_string(),
        })
        .await;

    harness.saga.finalize_verification("u1").await.unwrap_err();

    assert_eq!(kyc_state(&harness, "u1").await, KycState::SetupFailed);
    assert!(harness.ledger.submitted_ops().await.is_empty());
}

#[tokio::test]
async fn triggers_are_rejected_from_the_wrong_state() {
    let harness = kyc_harness();

    // No session at all: only begin is permitted.
    let err = harness.saga.check_document("u1").await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    let err = harness.saga.finalize_verification("u1").await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));

    harness.saga.begin_verification("u1").await.unwrap();

    // DocSubmitted permits neither a fresh begin nor finalize.
    let err = harness.saga.begin_verification("u1").await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    let err = harness.saga.finalize_verification("u1").await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
}

#[tokio::test]
async fn completed_sessions_never_finalize_twice() {
    let harness = kyc_harness();
    harness.saga.begin_verification("u1").await.unwrap();
    harness
        .documents
        .push_status(InquiryStatus::Completed)
        .await;
    harness.saga.check_document("u1").await.unwrap();
    harness.saga.finalize_verification("u1").await.unwrap();

    let before = harness.ledger.submitted_ops().await.len();
    let err = harness.saga.finalize_verification("u1").await.unwrap_err();

    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    // The replay performed no ledger work at all.
    assert_eq!(harness.ledger.submitted_ops().await.len(), before);
}

#[tokio::test]
async fn retry_sweep_clears_recovered_mints() {
    let harness = kyc_harness();
    harness
        .store
        .record_failed_mint("0xaaa", "3000", "node unavailable")
        .await
        .unwrap();
    harness
        .store
        .record_failed_mint("0xbbb", "3000", "node unavailable")
        .await
        .unwrap();

    // First wallet recovers, second fails permanently.
    harness
        .ledger
        .push_submit(Ok(support::confirmed("0xretry", None)))
        .await;
    harness
        .ledger
        .push_submit(Err(LedgerError::Permanent {
            reason: "mint reverted".to_string(),
        }))
        .await;

    let report = harness.saga.retry_failed_mints().await.unwrap();

    assert_eq!(report.minted, vec!["0xaaa".to_string()]);
    assert_eq!(report.still_failing.len(), 1);
    assert_eq!(report.still_failing[0].0, "0xbbb");

    let remaining = harness.store.list_failed_mints().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].wallet_address, "0xbbb");
}

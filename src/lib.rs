// Inzo Orchestrator Library - Insurance Onboarding Workflows
// This exposes the core components for testing and integration

pub mod config;
pub mod ledger;
pub mod providers;
pub mod store;
pub mod telemetry;
pub mod workflows;

// Re-export key types for easy access
pub use config::{config, init_config, InzoConfig};
pub use ledger::{
    Confirmation, LedgerError, LedgerGateway, LedgerOperation, LedgerRetryHandler,
    LedgerSubmitter, OperationSchemas, SignerRole, WalletIdentity,
};
pub use providers::{
    DocumentVerification, InquiryStatus, InterviewProvider, InterviewSession, PersonaClient,
    ProviderError, RateLimitedHttpClient, TavusClient,
};
pub use store::{
    InMemorySessionStore, KycState, PolicyState, SessionState, SessionStore, SqliteSessionStore,
    StoreError, WorkflowKind, WorkflowSession,
};
pub use telemetry::{
    create_workflow_span, generate_correlation_id, init_telemetry, shutdown_telemetry,
};
pub use workflows::{
    DocCheckOutcome, KycCompletion, KycOrchestrator, KycSettings, MintRetryReport,
    PolicyApplicationFields, PolicyCreated, PolicyOrchestrator, PolicySettings, WorkflowError,
};

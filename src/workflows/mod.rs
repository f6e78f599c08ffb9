// Saga orchestrators: each trigger validates the current session state,
// performs external work, and commits the transition with a compare-and-swap.

pub mod error;
pub mod kyc;
pub mod policy;

pub use error::WorkflowError;
pub use kyc::{DocCheckOutcome, KycCompletion, KycOrchestrator, KycSettings, MintRetryReport};
pub use policy::{
    PolicyApplicationFields, PolicyCreated, PolicyOrchestrator, PolicySettings,
};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::config::LedgerConfig;
use crate::ledger::error::LedgerError;
use crate::ledger::operation::{
    LedgerOperation, OperationSchemas, SchemaError, SignerRole,
};
use crate::ledger::rpc::{ChainRpc, RpcError, TxReceipt, WalletIdentity};

/// Result of a finalized ledger operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub tx_hash: String,
    /// Present only for operations that emit a PolicyCreated event.
    pub policy_id: Option<u128>,
}

/// The gateway surface the workflow orchestrator depends on.
#[async_trait]
pub trait LedgerSubmitter: Send + Sync {
    /// Turn an operation into a durable on-chain effect: exactly one ledger
    /// write per successful call, blocking until one confirmation. Finalized
    /// writes are irreversible; the gateway never compensates.
    async fn submit(&self, op: LedgerOperation) -> Result<Confirmation, LedgerError>;

    /// Provision a new wallet identity for a verified subject.
    async fn generate_wallet(&self) -> Result<WalletIdentity, LedgerError>;
}

/// Submits signed operations to the distributed ledger and decodes results.
///
/// Same-signer submissions are serialized through a per-role queue so nonce
/// ordering stays intact; different roles proceed in parallel.
pub struct LedgerGateway {
    rpc: Arc<dyn ChainRpc>,
    schemas: OperationSchemas,
    oracle_account: String,
    orchestrator_account: String,
    decimals: u32,
    oracle_queue: Mutex<()>,
    orchestrator_queue: Mutex<()>,
}

impl LedgerGateway {
    /// Build the gateway, validating contract interfaces and signer
    /// credentials up front. Submissions are refused until both signers are
    /// configured.
    pub fn new(rpc: Arc<dyn ChainRpc>, config: &LedgerConfig) -> Result<Self, LedgerError> {
        if config.oracle_account.is_empty() || config.orchestrator_account.is_empty() {
            return Err(LedgerError::NotReady {
                reason: "both oracle and orchestrator signer accounts must be configured"
                    .to_string(),
            });
        }

        let schemas = OperationSchemas::from_config(&config.contracts)
            .map_err(|e: SchemaError| LedgerError::NotReady {
                reason: format!("contract interface validation failed: {e}"),
            })?;

        Ok(Self {
            rpc,
            schemas,
            oracle_account: config.oracle_account.clone(),
            orchestrator_account: config.orchestrator_account.clone(),
            decimals: config.decimals,
            oracle_queue: Mutex::new(()),
            orchestrator_queue: Mutex::new(()),
        })
    }

    fn signer_account(&self, role: SignerRole) -> &str {
        match role {
            SignerRole::Oracle => &self.oracle_account,
            SignerRole::Orchestrator => &self.orchestrator_account,
        }
    }

    fn queue_for(&self, role: SignerRole) -> &Mutex<()> {
        match role {
            SignerRole::Oracle => &self.oracle_queue,
            SignerRole::Orchestrator => &self.orchestrator_queue,
        }
    }

    /// Classify an error from the send phase: the transaction never landed.
    fn classify_send_error(err: RpcError) -> LedgerError {
        match err {
            RpcError::Transport(e) => LedgerError::Retryable {
                reason: format!("transport failure before submission: {e}"),
                submitted: false,
            },
            RpcError::Node { code, message } => LedgerError::Permanent {
                reason: format!("node rejected submission ({code}): {message}"),
            },
            RpcError::ConfirmationTimeout { tx_hash } => LedgerError::Retryable {
                reason: format!("confirmation timed out for {tx_hash}"),
                submitted: true,
            },
            RpcError::Protocol { reason } => LedgerError::Permanent { reason },
        }
    }

    /// Classify an error from the wait phase: the transaction is in flight,
    /// so the outcome may be unknown.
    fn classify_wait_error(err: RpcError, tx_hash: &str) -> LedgerError {
        match err {
            RpcError::Transport(e) => LedgerError::Retryable {
                reason: format!("lost node connection while awaiting {tx_hash}: {e}"),
                submitted: true,
            },
            RpcError::ConfirmationTimeout { tx_hash } => LedgerError::Retryable {
                reason: format!("no confirmation for {tx_hash}; outcome unknown"),
                submitted: true,
            },
            RpcError::Node { code, message } => LedgerError::Permanent {
                reason: format!("receipt lookup failed ({code}): {message}"),
            },
            RpcError::Protocol { reason } => LedgerError::Permanent { reason },
        }
    }

    fn decode_policy_id(&self, receipt: &TxReceipt) -> Option<u128> {
        let expected_topic = self.schemas.policy_created_topic.as_str();
        receipt
            .logs
            .iter()
            .find(|log| {
                log.topics
                    .first()
                    .map(|t| t.eq_ignore_ascii_case(expected_topic))
                    .unwrap_or(false)
            })
            .and_then(|log| {
                // Indexed id lands in topic1, unindexed in the first data word.
                let word = log
                    .topics
                    .get(1)
                    .map(String::as_str)
                    .unwrap_or(log.data.as_str());
                parse_uint_word(word)
            })
    }
}

fn parse_uint_word(word: &str) -> Option<u128> {
    let digits = word.strip_prefix("0x").unwrap_or(word);
    if digits.is_empty() {
        return None;
    }
    let tail = if digits.len() > 32 {
        let (head, tail) = digits.split_at(digits.len() - 32);
        if head.chars().any(|c| c != '0') {
            return None;
        }
        tail
    } else {
        digits
    };
    u128::from_str_radix(tail, 16).ok()
}

#[async_trait]
impl LedgerSubmitter for LedgerGateway {
    #[instrument(skip(self), fields(kind = op.kind().as_str(), signer = op.signer_role().as_str()))]
    async fn submit(&self, op: LedgerOperation) -> Result<Confirmation, LedgerError> {
        let role = op.signer_role();
        let call = self
            .schemas
            .encode(&op, self.decimals)
            .map_err(|e| LedgerError::Permanent {
                reason: format!("operation encoding failed: {e}"),
            })?;

        // Hold the signer's queue across send-and-wait so concurrent
        // submissions under the same role cannot collide on nonce order.
        let _queue = self.queue_for(role).lock().await;

        let tx_hash = self
            .rpc
            .send_transaction(self.signer_account(role), &call.to, &call.data)
            .await
            .map_err(Self::classify_send_error)?;

        let receipt = self
            .rpc
            .wait_for_receipt(&tx_hash)
            .await
            .map_err(|e| Self::classify_wait_error(e, &tx_hash))?;

        if !receipt.succeeded {
            warn!(tx_hash = %receipt.tx_hash, "Transaction reverted on-chain");
            return Err(LedgerError::Permanent {
                reason: format!("contract reverted transaction {}", receipt.tx_hash),
            });
        }

        let policy_id = match op.kind() {
            crate::ledger::operation::OperationKind::CreatePolicy => {
                let id = self.decode_policy_id(&receipt);
                if id.is_none() {
                    return Err(LedgerError::EventNotFound {
                        event: "PolicyCreated",
                    });
                }
                id
            }
            _ => None,
        };

        info!(tx_hash = %receipt.tx_hash, policy_id = ?policy_id, "Ledger operation finalized");
        Ok(Confirmation {
            tx_hash: receipt.tx_hash,
            policy_id,
        })
    }

    async fn generate_wallet(&self) -> Result<WalletIdentity, LedgerError> {
        self.rpc.generate_wallet().await.map_err(|e| match e {
            RpcError::Transport(err) => LedgerError::Retryable {
                reason: format!("wallet provisioning transport failure: {err}"),
                submitted: false,
            },
            other => LedgerError::Permanent {
                reason: format!("wallet provisioning failed: {other}"),
            },
        })
    }
}

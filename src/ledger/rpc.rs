use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// A log entry emitted by a confirmed transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

/// A confirmed transaction receipt.
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub succeeded: bool,
    pub logs: Vec<LogEntry>,
}

/// A freshly provisioned wallet identity. The secret is a capability token
/// guarding the keystore account; it never appears in logs or user output.
#[derive(Clone)]
pub struct WalletIdentity {
    pub address: String,
    pub secret: String,
}

impl std::fmt::Debug for WalletIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletIdentity")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("chain transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("node rejected request ({code}): {message}")]
    Node { code: i64, message: String },

    #[error("no confirmation for {tx_hash} within the configured timeout")]
    ConfirmationTimeout { tx_hash: String },

    #[error("malformed node response: {reason}")]
    Protocol { reason: String },
}

/// Low-level chain access the gateway is built on. Split into send and wait
/// so failure classification can distinguish "never landed" from "outcome
/// unknown".
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Submit a contract call from a node-managed account. Returns the
    /// transaction hash once the node has accepted the submission.
    async fn send_transaction(
        &self,
        from: &str,
        to: &str,
        data: &[u8],
    ) -> Result<String, RpcError>;

    /// Block until the transaction reaches one confirmation, then return the
    /// decoded receipt.
    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt, RpcError>;

    /// Provision a new keystore account guarded by a generated passphrase.
    async fn generate_wallet(&self) -> Result<WalletIdentity, RpcError>;
}

#[derive(Deserialize)]
struct RpcEnvelope {
    result: Option<serde_json::Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RawReceipt {
    status: Option<String>,
    #[serde(default)]
    logs: Vec<LogEntry>,
}

/// JSON-RPC chain client speaking to a node with keystore-managed signer
/// accounts.
pub struct JsonRpcChain {
    http: reqwest::Client,
    url: String,
    poll_interval: Duration,
    confirmation_timeout: Duration,
    next_id: AtomicU64,
}

impl JsonRpcChain {
    pub fn new(url: String, poll_interval: Duration, confirmation_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            poll_interval,
            confirmation_timeout,
            next_id: AtomicU64::new(1),
        }
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self.http.post(&self.url).json(&body).send().await?;
        let envelope: RpcEnvelope = response.json().await?;

        if let Some(err) = envelope.error {
            return Err(RpcError::Node {
                code: err.code,
                message: err.message,
            });
        }
        envelope.result.ok_or(RpcError::Protocol {
            reason: format!("{method} returned neither result nor error"),
        })
    }
}

#[async_trait]
impl ChainRpc for JsonRpcChain {
    async fn send_transaction(
        &self,
        from: &str,
        to: &str,
        data: &[u8],
    ) -> Result<String, RpcError> {
        let params = serde_json::json!([{
            "from": from,
            "to": to,
            "data": format!("0x{}", hex::encode(data)),
        }]);
        let result = self.call("eth_sendTransaction", params).await?;
        let tx_hash = result.as_str().ok_or(RpcError::Protocol {
            reason: "transaction hash is not a string".to_string(),
        })?;
        debug!(tx_hash = %tx_hash, "Transaction accepted by node");
        Ok(tx_hash.to_string())
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt, RpcError> {
        let deadline = tokio::time::Instant::now() + self.confirmation_timeout;

        loop {
            let result = self
                .call("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
                .await?;

            if !result.is_null() {
                let raw: RawReceipt =
                    serde_json::from_value(result).map_err(|e| RpcError::Protocol {
                        reason: format!("unreadable receipt: {e}"),
                    })?;
                let succeeded = matches!(raw.status.as_deref(), Some("0x1") | None);
                debug!(tx_hash = %tx_hash, succeeded, "Transaction reached finality");
                return Ok(TxReceipt {
                    tx_hash: tx_hash.to_string(),
                    succeeded,
                    logs: raw.logs,
                });
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(tx_hash = %tx_hash, "Gave up waiting for confirmation");
                return Err(RpcError::ConfirmationTimeout {
                    tx_hash: tx_hash.to_string(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn generate_wallet(&self) -> Result<WalletIdentity, RpcError> {
        // The passphrase is the capability guarding the keystore account; it
        // stays inside the orchestrator boundary.
        let entropy: [u8; 32] = rand::rng().random();
        let passphrase = hex::encode(entropy);

        let result = self
            .call("personal_newAccount", serde_json::json!([passphrase]))
            .await?;
        let address = result.as_str().ok_or(RpcError::Protocol {
            reason: "new account address is not a string".to_string(),
        })?;

        Ok(WalletIdentity {
            address: address.to_string(),
            secret: passphrase,
        })
    }
}

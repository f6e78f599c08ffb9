// Ledger transaction gateway: encodes operations, submits them through the
// right signer, blocks until finality and classifies failures.

pub mod amount;
pub mod error;
pub mod gateway;
pub mod operation;
pub mod retry;
pub mod rpc;

pub use amount::{format_units, parse_units, AmountError, LEDGER_DECIMALS};
pub use error::LedgerError;
pub use gateway::{Confirmation, LedgerGateway, LedgerSubmitter};
pub use operation::{
    details_hash, EncodedCall, LedgerOperation, OperationKind, OperationSchemas, PolicyParams,
    SignerRole,
};
pub use retry::{LedgerRetryHandler, RetryConfig};
pub use rpc::{ChainRpc, JsonRpcChain, LogEntry, RpcError, TxReceipt, WalletIdentity};

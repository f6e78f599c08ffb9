use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::ContractsConfig;
use crate::ledger::amount::{parse_units, AmountError};

/// Which credential signs an operation. Truth-assertion writes (KYC flags)
/// go through the oracle; value-moving or record-creating writes go through
/// the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignerRole {
    Oracle,
    Orchestrator,
}

impl SignerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignerRole::Oracle => "oracle",
            SignerRole::Orchestrator => "orchestrator",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    SetKycFlag,
    MintToken,
    CreatePolicy,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::SetKycFlag => "set_kyc_flag",
            OperationKind::MintToken => "mint_token",
            OperationKind::CreatePolicy => "create_policy",
        }
    }
}

/// Arguments for the on-chain policy creation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyParams {
    pub holder: String,
    pub risk_tier: u8,
    /// Decimal string, converted to fixed-point at the boundary
    pub premium: String,
    /// Decimal string, converted to fixed-point at the boundary
    pub coverage: String,
    /// Unix timestamps
    pub start: u64,
    pub end: u64,
    /// Short asset identifier, encoded as bytes32
    pub asset_id: String,
    /// Free-text policy terms; only their SHA-256 digest goes on-chain
    pub details: String,
}

/// A single ledger write. Transient: built per trigger, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOperation {
    SetKycFlag { address: String, verified: bool },
    MintToken { to: String, amount: String },
    CreatePolicy { params: PolicyParams },
}

impl LedgerOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            LedgerOperation::SetKycFlag { .. } => OperationKind::SetKycFlag,
            LedgerOperation::MintToken { .. } => OperationKind::MintToken,
            LedgerOperation::CreatePolicy { .. } => OperationKind::CreatePolicy,
        }
    }

    pub fn signer_role(&self) -> SignerRole {
        match self {
            LedgerOperation::SetKycFlag { .. } => SignerRole::Oracle,
            LedgerOperation::MintToken { .. } | LedgerOperation::CreatePolicy { .. } => {
                SignerRole::Orchestrator
            }
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("{field} is not a valid contract address: '{value}'")]
    BadAddress { field: &'static str, value: String },

    #[error("{field} is not a valid 4-byte selector: '{value}'")]
    BadSelector { field: &'static str, value: String },

    #[error("{field} is not a valid 32-byte event topic: '{value}'")]
    BadTopic { field: &'static str, value: String },
}

#[derive(Debug, Clone, Error)]
pub enum EncodeError {
    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error("'{0}' is not a valid account address")]
    BadAddress(String),

    #[error("asset identifier exceeds 32 bytes ({len})")]
    AssetTooLong { len: usize },
}

/// One contract call target: address plus 4-byte function selector.
#[derive(Debug, Clone)]
pub struct CallSchema {
    pub contract: String,
    pub selector: [u8; 4],
}

/// Statically declared call interfaces for every operation kind, built from
/// configuration and validated before the gateway accepts any submission.
#[derive(Debug, Clone)]
pub struct OperationSchemas {
    pub set_kyc_flag: CallSchema,
    pub mint_token: CallSchema,
    pub create_policy: CallSchema,
    /// topic0 of the PolicyCreated event emitted by createPolicy
    pub policy_created_topic: String,
}

/// An encoded, ready-to-submit contract call.
#[derive(Debug, Clone)]
pub struct EncodedCall {
    pub to: String,
    pub data: Vec<u8>,
}

impl OperationSchemas {
    /// Build and validate the schemas from configuration. Malformed contract
    /// interface declarations are caught here, at startup, instead of
    /// surfacing later as opaque chain errors.
    pub fn from_config(contracts: &ContractsConfig) -> Result<Self, SchemaError> {
        Ok(Self {
            set_kyc_flag: CallSchema {
                contract: validate_address("kyc_registry_address", &contracts.kyc_registry_address)?,
                selector: validate_selector("set_kyc_flag_selector", &contracts.set_kyc_flag_selector)?,
            },
            mint_token: CallSchema {
                contract: validate_address("stablecoin_address", &contracts.stablecoin_address)?,
                selector: validate_selector("mint_selector", &contracts.mint_selector)?,
            },
            create_policy: CallSchema {
                contract: validate_address("policy_ledger_address", &contracts.policy_ledger_address)?,
                selector: validate_selector("create_policy_selector", &contracts.create_policy_selector)?,
            },
            policy_created_topic: validate_topic(
                "policy_created_topic",
                &contracts.policy_created_topic,
            )?,
        })
    }

    /// Encode an operation into its contract call, converting amounts to
    /// fixed-point at `decimals` precision.
    pub fn encode(&self, op: &LedgerOperation, decimals: u32) -> Result<EncodedCall, EncodeError> {
        match op {
            LedgerOperation::SetKycFlag { address, verified } => {
                let mut data = self.set_kyc_flag.selector.to_vec();
                data.extend_from_slice(&address_word(address)?);
                data.extend_from_slice(&bool_word(*verified));
                Ok(EncodedCall {
                    to: self.set_kyc_flag.contract.clone(),
                    data,
                })
            }
            LedgerOperation::MintToken { to, amount } => {
                let raw = parse_units(amount, decimals)?;
                let mut data = self.mint_token.selector.to_vec();
                data.extend_from_slice(&address_word(to)?);
                data.extend_from_slice(&uint_word(raw));
                Ok(EncodedCall {
                    to: self.mint_token.contract.clone(),
                    data,
                })
            }
            LedgerOperation::CreatePolicy { params } => {
                let premium = parse_units(&params.premium, decimals)?;
                let coverage = parse_units(&params.coverage, decimals)?;

                // Static tuple: every field occupies exactly one word.
                let mut data = self.create_policy.selector.to_vec();
                data.extend_from_slice(&address_word(&params.holder)?);
                data.extend_from_slice(&uint_word(params.risk_tier as u128));
                data.extend_from_slice(&uint_word(premium));
                data.extend_from_slice(&uint_word(coverage));
                data.extend_from_slice(&uint_word(params.start as u128));
                data.extend_from_slice(&uint_word(params.end as u128));
                data.extend_from_slice(&bytes32_word(&params.asset_id)?);
                data.extend_from_slice(&details_hash(&params.details));
                Ok(EncodedCall {
                    to: self.create_policy.contract.clone(),
                    data,
                })
            }
        }
    }
}

/// SHA-256 digest binding the human-readable policy terms to the on-chain
/// record. Identical details always hash identically, which is what makes
/// policy resubmission idempotent.
pub fn details_hash(details: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(details.as_bytes());
    hasher.finalize().into()
}

fn strip_0x(value: &str) -> &str {
    value.strip_prefix("0x").unwrap_or(value)
}

fn validate_address(field: &'static str, value: &str) -> Result<String, SchemaError> {
    let digits = strip_0x(value);
    if digits.len() == 40 && digits.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(format!("0x{}", digits.to_lowercase()))
    } else {
        Err(SchemaError::BadAddress {
            field,
            value: value.to_string(),
        })
    }
}

fn validate_selector(field: &'static str, value: &str) -> Result<[u8; 4], SchemaError> {
    let bad = || SchemaError::BadSelector {
        field,
        value: value.to_string(),
    };
    let bytes = hex::decode(strip_0x(value)).map_err(|_| bad())?;
    bytes.try_into().map_err(|_| bad())
}

fn validate_topic(field: &'static str, value: &str) -> Result<String, SchemaError> {
    let digits = strip_0x(value);
    if digits.len() == 64 && digits.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(format!("0x{}", digits.to_lowercase()))
    } else {
        Err(SchemaError::BadTopic {
            field,
            value: value.to_string(),
        })
    }
}

fn address_word(address: &str) -> Result<[u8; 32], EncodeError> {
    let bytes = hex::decode(strip_0x(address))
        .map_err(|_| EncodeError::BadAddress(address.to_string()))?;
    if bytes.len() != 20 {
        return Err(EncodeError::BadAddress(address.to_string()));
    }
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

fn uint_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn bool_word(value: bool) -> [u8; 32] {
    uint_word(value as u128)
}

fn bytes32_word(value: &str) -> Result<[u8; 32], EncodeError> {
    let bytes = value.as_bytes();
    if bytes.len() > 32 {
        return Err(EncodeError::AssetTooLong { len: bytes.len() });
    }
    let mut word = [0u8; 32];
    word[..bytes.len()].copy_from_slice(bytes);
    Ok(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0x00000000000000000000000000000000000000aa";

    fn contracts() -> ContractsConfig {
        ContractsConfig {
            kyc_registry_address: "0x1111111111111111111111111111111111111111".to_string(),
            set_kyc_flag_selector: "0x0af4187d".to_string(),
            stablecoin_address: "0x2222222222222222222222222222222222222222".to_string(),
            mint_selector: "0x40c10f19".to_string(),
            policy_ledger_address: "0x3333333333333333333333333333333333333333".to_string(),
            create_policy_selector: "0xb1a7d07c".to_string(),
            policy_created_topic: format!("0x{}", "ab".repeat(32)),
        }
    }

    #[test]
    fn schemas_validate_from_config() {
        let schemas = OperationSchemas::from_config(&contracts()).unwrap();
        assert_eq!(schemas.mint_token.selector, [0x40, 0xc1, 0x0f, 0x19]);
        assert_eq!(
            schemas.set_kyc_flag.contract,
            "0x1111111111111111111111111111111111111111"
        );
    }

    #[test]
    fn malformed_selector_is_rejected_at_startup() {
        let mut cfg = contracts();
        cfg.mint_selector = "0x40c1".to_string();
        assert!(matches!(
            OperationSchemas::from_config(&cfg).unwrap_err(),
            SchemaError::BadSelector { field: "mint_selector", .. }
        ));
    }

    #[test]
    fn mint_encoding_has_selector_and_two_words() {
        let schemas = OperationSchemas::from_config(&contracts()).unwrap();
        let call = schemas
            .encode(
                &LedgerOperation::MintToken {
                    to: ADDR.to_string(),
                    amount: "3000".to_string(),
                },
                18,
            )
            .unwrap();

        assert_eq!(call.to, "0x2222222222222222222222222222222222222222");
        assert_eq!(call.data.len(), 4 + 32 * 2);
        assert_eq!(&call.data[..4], &[0x40, 0xc1, 0x0f, 0x19]);
        // address word: 12 zero bytes then the 20-byte address
        assert_eq!(call.data[4 + 31], 0xaa);
        // amount word: 3000 * 10^18
        let amount = u128::from_be_bytes(call.data[4 + 32 + 16..].try_into().unwrap());
        assert_eq!(amount, 3_000_000_000_000_000_000_000u128);
    }

    #[test]
    fn set_kyc_flag_uses_oracle_signer() {
        let op = LedgerOperation::SetKycFlag {
            address: ADDR.to_string(),
            verified: true,
        };
        assert_eq!(op.signer_role(), SignerRole::Oracle);

        let mint = LedgerOperation::MintToken {
            to: ADDR.to_string(),
            amount: "1".to_string(),
        };
        assert_eq!(mint.signer_role(), SignerRole::Orchestrator);
    }

    #[test]
    fn policy_encoding_is_eight_static_words() {
        let schemas = OperationSchemas::from_config(&contracts()).unwrap();
        let call = schemas
            .encode(
                &LedgerOperation::CreatePolicy {
                    params: PolicyParams {
                        holder: ADDR.to_string(),
                        risk_tier: 2,
                        premium: "100".to_string(),
                        coverage: "5000".to_string(),
                        start: 1_700_000_000,
                        end: 1_731_536_000,
                        asset_id: "PHONE-IPHONE15".to_string(),
                        details: "screen and water damage".to_string(),
                    },
                },
                18,
            )
            .unwrap();

        assert_eq!(call.data.len(), 4 + 32 * 8);
        // last word is the details digest, which is deterministic
        let tail: [u8; 32] = call.data[4 + 32 * 7..].try_into().unwrap();
        assert_eq!(tail, details_hash("screen and water damage"));
    }

    #[test]
    fn identical_details_hash_identically() {
        assert_eq!(details_hash("terms"), details_hash("terms"));
        assert_ne!(details_hash("terms"), details_hash("terms changed"));
    }

    #[test]
    fn oversized_asset_identifier_is_rejected() {
        let schemas = OperationSchemas::from_config(&contracts()).unwrap();
        let err = schemas
            .encode(
                &LedgerOperation::CreatePolicy {
                    params: PolicyParams {
                        holder: ADDR.to_string(),
                        risk_tier: 0,
                        premium: "1".to_string(),
                        coverage: "1".to_string(),
                        start: 0,
                        end: 1,
                        asset_id: "X".repeat(33),
                        details: String::new(),
                    },
                },
                18,
            )
            .unwrap_err();
        assert!(matches!(err, EncodeError::AssetTooLong { len: 33 }));
    }
}

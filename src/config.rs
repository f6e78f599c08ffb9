use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for the Inzo orchestrator
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InzoConfig {
    /// External verification/interview provider settings
    pub providers: ProvidersConfig,
    /// Distributed ledger connection, signers and contract interfaces
    pub ledger: LedgerConfig,
    /// Onboarding workflow parameters
    pub onboarding: OnboardingConfig,
    /// Session store settings
    pub database: DatabaseConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvidersConfig {
    pub document: DocumentProviderConfig,
    pub interview: InterviewProviderConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentProviderConfig {
    /// Base URL of the document verification API
    pub base_url: String,
    /// API key (can be set via PERSONA_API_KEY env var)
    pub api_key: Option<String>,
    /// Outbound request rate limit, requests per second
    pub requests_per_second: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InterviewProviderConfig {
    /// Base URL of the interview API
    pub base_url: String,
    /// API key (can be set via TAVUS_API_KEY env var)
    pub api_key: Option<String>,
    /// Replica used for KYC onboarding interviews
    pub kyc_replica_id: String,
    /// Replica used for policy application interviews
    pub policy_replica_id: String,
    /// Outbound request rate limit, requests per second
    pub requests_per_second: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint of the chain node
    pub rpc_url: String,
    /// Funded account used for truth-assertion writes (KYC flag)
    pub oracle_account: String,
    /// Funded account used for value-moving writes (mint, policy creation)
    pub orchestrator_account: String,
    /// Fixed-point precision for monetary amounts crossing the boundary
    pub decimals: u32,
    /// How long to wait for one confirmation before giving up
    pub confirmation_timeout_secs: u64,
    /// Receipt polling interval in milliseconds
    pub receipt_poll_ms: u64,
    /// Statically declared contract call interfaces, validated at startup
    pub contracts: ContractsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractsConfig {
    /// KYC registry: setKycFlag(address,bool)
    pub kyc_registry_address: String,
    pub set_kyc_flag_selector: String,
    /// Stablecoin: mint(address,uint256)
    pub stablecoin_address: String,
    pub mint_selector: String,
    /// Policy ledger: createPolicy(...) emitting PolicyCreated(policyId)
    pub policy_ledger_address: String,
    pub create_policy_selector: String,
    pub policy_created_topic: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OnboardingConfig {
    /// Stablecoin amount credited to a freshly verified wallet, decimal string
    pub mint_amount: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite file path for the session store
    pub url: String,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level when RUST_LOG is not set
    pub log_level: String,
    /// Emit structured JSON logs
    pub json_logs: bool,
}

impl Default for InzoConfig {
    fn default() -> Self {
        Self {
            providers: ProvidersConfig {
                document: DocumentProviderConfig {
                    base_url: "https://withpersona.com/api/v1".to_string(),
                    api_key: None,
                    requests_per_second: 5,
                },
                interview: InterviewProviderConfig {
                    base_url: "https://tavusapi.com/v2".to_string(),
                    api_key: None,
                    kyc_replica_id: String::new(),
                    policy_replica_id: String::new(),
                    requests_per_second: 2,
                },
            },
            ledger: LedgerConfig {
                rpc_url: "http://127.0.0.1:8545".to_string(),
                oracle_account: String::new(),
                orchestrator_account: String::new(),
                decimals: 18,
                confirmation_timeout_secs: 120,
                receipt_poll_ms: 1500,
                contracts: ContractsConfig {
                    kyc_registry_address: String::new(),
                    set_kyc_flag_selector: String::new(),
                    stablecoin_address: String::new(),
                    mint_selector: String::new(),
                    policy_ledger_address: String::new(),
                    create_policy_selector: String::new(),
                    policy_created_topic: String::new(),
                },
            },
            onboarding: OnboardingConfig {
                mint_amount: "3000".to_string(),
            },
            database: DatabaseConfig {
                url: ".inzo/sessions.db".to_string(),
                auto_migrate: true,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: true,
            },
        }
    }
}

impl InzoConfig {
    /// Load configuration with precedence:
    /// 1. Default values
    /// 2. Configuration file (inzo.toml)
    /// 3. Environment variables (prefixed with INZO_)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("inzo.toml").exists() {
            builder = builder.add_source(File::with_name("inzo"));
        }

        builder = builder.add_source(
            Environment::with_prefix("INZO")
                .separator("__")
                .try_parsing(true),
        );

        let defaults = Config::try_from(&InzoConfig::default())?;
        let config = Config::builder()
            .add_source(defaults)
            .add_source(builder.build()?)
            .build()?;

        let mut inzo_config: InzoConfig = config.try_deserialize()?;

        // API keys are secrets; accept the providers' conventional env vars too.
        if inzo_config.providers.document.api_key.is_none() {
            if let Ok(key) = std::env::var("PERSONA_API_KEY") {
                inzo_config.providers.document.api_key = Some(key);
            }
        }
        if inzo_config.providers.interview.api_key.is_none() {
            if let Ok(key) = std::env::var("TAVUS_API_KEY") {
                inzo_config.providers.interview.api_key = Some(key);
            }
        }

        Ok(inzo_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<InzoConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = InzoConfig::load_env_file();
        InzoConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static InzoConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_eighteen_decimals() {
        let cfg = InzoConfig::default();
        assert_eq!(cfg.ledger.decimals, 18);
        assert_eq!(cfg.onboarding.mint_amount, "3000");
    }

    #[test]
    fn config_round_trips_through_toml() {
        let cfg = InzoConfig::default();
        let serialized = toml::to_string_pretty(&cfg).unwrap();
        let parsed: InzoConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.database.url, cfg.database.url);
        assert_eq!(parsed.ledger.rpc_url, cfg.ledger.rpc_url);
    }
}

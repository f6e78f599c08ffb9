use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;

use inzo_orchestrator::config::{self, InzoConfig};
use inzo_orchestrator::ledger::{JsonRpcChain, LedgerGateway};
use inzo_orchestrator::providers::{PersonaClient, RateLimitedHttpClient, TavusClient};
use inzo_orchestrator::store::{SessionStore, SqliteSessionStore, WorkflowKind};
use inzo_orchestrator::telemetry::init_telemetry;
use inzo_orchestrator::workflows::{
    DocCheckOutcome, KycOrchestrator, KycSettings, PolicyApplicationFields, PolicyOrchestrator,
    PolicySettings,
};

#[derive(Parser)]
#[command(name = "inzo")]
#[command(about = "Insurance onboarding orchestration over external providers and a ledger")]
#[command(long_about = "Inzo coordinates identity verification, AI interviews, wallet \
                       provisioning and on-chain policy creation as resumable per-user \
                       workflows. Start a user with 'inzo kyc begin <subject>'.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identity verification workflow commands
    Kyc {
        #[command(subcommand)]
        command: KycCommands,
    },
    /// Policy application workflow commands
    Policy {
        #[command(subcommand)]
        command: PolicyCommands,
    },
    /// Failed onboarding mint maintenance
    Mints {
        #[command(subcommand)]
        command: MintCommands,
    },
    /// Display the stored workflow state for a subject
    Status {
        /// Subject identifier
        subject: String,
    },
}

#[derive(Subcommand)]
enum KycCommands {
    /// Start (or restart) document verification and print the upload link
    Begin {
        /// Subject identifier
        subject: String,
    },
    /// Poll document verification; opens the interview once documents pass
    Check {
        /// Subject identifier
        subject: String,
    },
    /// Finish KYC after the interview: wallet, on-chain flag, onboarding mint
    Finalize {
        /// Subject identifier
        subject: String,
    },
}

#[derive(Subcommand)]
enum PolicyCommands {
    /// Record application details and print the interview link
    Initiate {
        /// Subject identifier
        subject: String,
        /// Risk tier (0-255)
        #[arg(long)]
        risk_tier: u8,
        /// Premium amount, decimal string (e.g. "120.50")
        #[arg(long)]
        premium: String,
        /// Coverage amount, decimal string
        #[arg(long)]
        coverage: String,
        /// Coverage start, unix timestamp
        #[arg(long)]
        start: u64,
        /// Coverage end, unix timestamp
        #[arg(long)]
        end: u64,
        /// Identifier of the insured asset
        #[arg(long)]
        asset: String,
        /// Free-text policy details, bound on-chain by hash
        #[arg(long)]
        details: String,
    },
    /// Create the policy on-chain for a verified wallet
    Finalize {
        /// Subject identifier
        subject: String,
        /// Policy holder wallet address
        #[arg(long)]
        wallet: String,
    },
}

#[derive(Subcommand)]
enum MintCommands {
    /// Re-submit onboarding mints that previously failed
    Retry,
}

fn main() -> Result<()> {
    InzoConfig::load_env_file()?;
    let cli = Cli::parse();

    tokio::runtime::Runtime::new()?.block_on(async {
        config::init_config()?;
        let cfg = config::config()?;
        init_telemetry(&cfg.observability.log_level, cfg.observability.json_logs)?;

        let app = App::build(cfg).await?;

        match cli.command {
            Commands::Kyc { command } => app.run_kyc(command).await,
            Commands::Policy { command } => app.run_policy(command).await,
            Commands::Mints {
                command: MintCommands::Retry,
            } => app.run_mint_retry().await,
            Commands::Status { subject } => app.run_status(&subject).await,
        }
    })
}

/// Wired-up application: one store, one ledger gateway, both sagas.
struct App {
    store: Arc<SqliteSessionStore>,
    kyc: KycOrchestrator,
    policy: PolicyOrchestrator,
}

impl App {
    async fn build(cfg: &'static InzoConfig) -> Result<Self> {
        let store = Arc::new(
            SqliteSessionStore::connect(&cfg.database.url, cfg.database.auto_migrate)
                .await
                .context("Failed to open session database")?,
        );

        let documents = Arc::new(PersonaClient::new(
            RateLimitedHttpClient::new(cfg.providers.document.requests_per_second),
            cfg.providers.document.base_url.clone(),
            cfg.providers.document.api_key.clone(),
        )?);
        let interviews = Arc::new(TavusClient::new(
            RateLimitedHttpClient::new(cfg.providers.interview.requests_per_second),
            cfg.providers.interview.base_url.clone(),
            cfg.providers.interview.api_key.clone(),
        )?);

        let rpc = Arc::new(JsonRpcChain::new(
            cfg.ledger.rpc_url.clone(),
            Duration::from_millis(cfg.ledger.receipt_poll_ms),
            Duration::from_secs(cfg.ledger.confirmation_timeout_secs),
        ));
        let ledger = Arc::new(LedgerGateway::new(rpc, &cfg.ledger)?);

        let kyc = KycOrchestrator::new(
            store.clone(),
            documents,
            interviews.clone(),
            ledger.clone(),
            KycSettings {
                interview_replica_id: cfg.providers.interview.kyc_replica_id.clone(),
                mint_amount: cfg.onboarding.mint_amount.clone(),
            },
        );
        let policy = PolicyOrchestrator::new(
            store.clone(),
            interviews,
            ledger,
            PolicySettings {
                interview_replica_id: cfg.providers.interview.policy_replica_id.clone(),
            },
        );

        Ok(Self { store, kyc, policy })
    }

    async fn run_kyc(&self, command: KycCommands) -> Result<()> {
        match command {
            KycCommands::Begin { subject } => {
                let link = self.kyc.begin_verification(&subject).await?;
                println!("📄 Document verification started for {subject}");
                println!("   Upload link: {link}");
            }
            KycCommands::Check { subject } => match self.kyc.check_document(&subject).await? {
                DocCheckOutcome::StillPending { status } => {
                    println!("⏳ Documents still being verified (status: {status})");
                    println!("   Run 'inzo kyc check {subject}' again in a moment");
                }
                DocCheckOutcome::InterviewReady { join_url } => {
                    println!("✅ Documents verified for {subject}");
                    println!("   Interview link: {join_url}");
                    println!("   After the interview, run 'inzo kyc finalize {subject}'");
                }
                DocCheckOutcome::Rejected { status } => {
                    println!("❌ Document verification ended as '{status}'");
                    println!("   Restart with 'inzo kyc begin {subject}'");
                }
            },
            KycCommands::Finalize { subject } => {
                let completion = self.kyc.finalize_verification(&subject).await?;
                println!("✅ KYC completed for {subject}");
                println!("   Wallet: {}", completion.wallet_address);
                if let Some(warning) = completion.mint_warning {
                    println!("⚠️  {warning}");
                    println!("   The credit will be retried; run 'inzo mints retry'");
                }
            }
        }
        Ok(())
    }

    async fn run_policy(&self, command: PolicyCommands) -> Result<()> {
        match command {
            PolicyCommands::Initiate {
                subject,
                risk_tier,
                premium,
                coverage,
                start,
                end,
                asset,
                details,
            } => {
                let fields = PolicyApplicationFields {
                    risk_tier,
                    premium,
                    coverage,
                    start_date: start,
                    end_date: end,
                    asset_identifier: asset,
                    details,
                };
                let url = self.policy.initiate_application(&subject, fields).await?;
                println!("📋 Policy application recorded for {subject}");
                println!("   Interview link: {url}");
                println!("   After the interview, run 'inzo policy finalize {subject} --wallet <address>'");
            }
            PolicyCommands::Finalize { subject, wallet } => {
                let created = self.policy.finalize_application(&subject, &wallet).await?;
                println!("✅ Policy created on-chain for {subject}");
                println!("   Policy ID: {}", created.policy_id);
                println!("   Transaction: {}", created.tx_hash);
            }
        }
        Ok(())
    }

    async fn run_mint_retry(&self) -> Result<()> {
        let report = self.kyc.retry_failed_mints().await?;
        if report.minted.is_empty() && report.still_failing.is_empty() {
            println!("✅ No failed mints on record");
            return Ok(());
        }
        for wallet in &report.minted {
            println!("✅ Recovered mint for {wallet}");
        }
        for (wallet, reason) in &report.still_failing {
            println!("❌ Mint for {wallet} still failing: {reason}");
        }
        Ok(())
    }

    async fn run_status(&self, subject: &str) -> Result<()> {
        println!("📊 Workflow status for {subject}");
        let mut found = false;
        for kind in [WorkflowKind::Kyc, WorkflowKind::PolicyApplication] {
            if let Some(session) = self.store.load(subject, kind).await? {
                found = true;
                println!("   {}: {}", kind, session.state);
                if let Some(address) = &session.wallet_address {
                    println!("      wallet: {address}");
                }
                for (key, value) in &session.external_refs {
                    println!("      {key}: {value}");
                }
                if let Some(error) = &session.last_error {
                    println!("      last error: {error}");
                }
                println!("      updated: {}", session.updated_at.to_rfc3339());
            }
        }
        if !found {
            println!("   No workflows on record. Start with 'inzo kyc begin {subject}'");
        }
        Ok(())
    }
}

//! Universal Token deployer CLI.
//!
//! Deploys a token to ZetaChain plus connected EVM chains and keeps a
//! JSON record of every deployment under the configured data directory.
//!
//! # Usage
//!
//! ```bash
//! # Deploy to ZetaChain Athens and Sepolia
//! export DEPLOYER_PRIVATE_KEY=0x...
//! utoken-deployer deploy --name "Omni Token" --symbol OMNI \
//!     --supply 1000000000000000000000000 --chains 7001,11155111 \
//!     --owner 0xYourWallet
//!
//! # Retry whatever failed
//! utoken-deployer resume <id>
//!
//! # Inspect records
//! utoken-deployer status <id>
//! utoken-deployer history
//!
//! # Verify a single contract
//! utoken-deployer verify --address 0x... --chain 97 --kind leaf
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use utoken::{DeploymentRecord, DeploymentStatus, VerificationState};
use utoken_deployer::artifacts::{ArtifactLoader, ArtifactSource};
use utoken_deployer::chains;
use utoken_deployer::client::AlloyClientFactory;
use utoken_deployer::config::Config;
use utoken_deployer::orchestrator::{Orchestrator, PipelineSettings};
use utoken_deployer::request::{DeployRequest, VerifyRequest};
use utoken_deployer::store::{JsonFileStore, RecordStore};
use utoken_deployer::verify::{self, ExplorerVerifier};

/// Universal Token multi-chain deployer.
#[derive(Debug, Parser)]
#[command(name = "utoken-deployer", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "utoken.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Deploy a new token and hand it over to its owner.
    Deploy {
        /// Token name.
        #[arg(long)]
        name: String,

        /// Token ticker.
        #[arg(long)]
        symbol: String,

        /// Decimal places.
        #[arg(long, default_value_t = 18)]
        decimals: u32,

        /// Total supply in the smallest unit.
        #[arg(long)]
        supply: String,

        /// Comma-separated chain IDs; must include one ZetaChain hub.
        #[arg(long, value_delimiter = ',', required = true)]
        chains: Vec<String>,

        /// Final owner of every contract and of the supply.
        #[arg(long)]
        owner: String,
    },

    /// Resume a deployment that did not complete.
    Resume {
        /// Deployment ID.
        id: String,
    },

    /// Print one deployment record.
    Status {
        /// Deployment ID.
        id: String,
    },

    /// List all deployments, newest first.
    History,

    /// Verify one deployed contract on its block explorer.
    Verify {
        /// Contract address.
        #[arg(long)]
        address: String,

        /// Chain ID the contract lives on.
        #[arg(long)]
        chain: String,

        /// Contract kind: `hub` or `leaf`.
        #[arg(long, default_value = "leaf")]
        kind: String,
    },

    /// List all supported chains.
    Chains,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Deploy {
            name,
            symbol,
            decimals,
            supply,
            chains,
            owner,
        } => {
            let request = DeployRequest {
                token_name: name,
                token_symbol: symbol,
                decimals,
                total_supply: supply,
                selected_chains: chains,
                final_owner: owner,
            };
            cmd_deploy(&cli.config, &request).await
        }
        Command::Resume { id } => cmd_resume(&cli.config, &id).await,
        Command::Status { id } => cmd_status(&cli.config, &id),
        Command::History => cmd_history(&cli.config),
        Command::Verify {
            address,
            chain,
            kind,
        } => {
            let request = VerifyRequest {
                contract_address: address,
                chain_id: chain,
                contract_type: kind,
            };
            cmd_verify(&cli.config, &request).await
        }
        Command::Chains => {
            cmd_chains();
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<Arc<Config>> {
    let config = Config::load(path)?;
    tracing::debug!(
        path = %path.display(),
        environment = ?config.environment,
        data_dir = %config.data_dir.display(),
        "configuration loaded"
    );
    Ok(Arc::new(config))
}

fn artifact_source(config: &Config) -> Arc<dyn ArtifactSource> {
    Arc::new(ArtifactLoader::new(
        config.contracts_dir.clone(),
        config.environment,
    ))
}

fn build_orchestrator(config: &Arc<Config>) -> Result<Orchestrator> {
    let factory = AlloyClientFactory::from_env(Arc::clone(config))?;
    let artifacts = artifact_source(config);
    let verifier = ExplorerVerifier::new(Arc::clone(&artifacts), Arc::clone(config))?;
    Ok(Orchestrator::new(
        Arc::new(factory),
        artifacts,
        Arc::new(verifier),
        Arc::new(JsonFileStore::new(&config.data_dir)),
        PipelineSettings::from_config(config),
    ))
}

/// Print a record and turn a `failed` status into a non-zero exit.
fn report(record: &DeploymentRecord) -> Result<()> {
    print_json(record)?;
    if record.overall_status() == DeploymentStatus::Failed {
        bail!(
            "deployment {} failed: {}",
            record.id,
            record.error_message().unwrap_or("no error recorded")
        );
    }
    tracing::info!(id = %record.id, status = %record.overall_status(), "done");
    Ok(())
}

/// Execute the `deploy` subcommand.
async fn cmd_deploy(config_path: &Path, request: &DeployRequest) -> Result<()> {
    let deployment = request.validate()?;
    let config = load_config(config_path)?;
    let orchestrator = build_orchestrator(&config)?;
    let record = orchestrator.run(deployment).await?;
    report(&record)
}

/// Execute the `resume` subcommand.
async fn cmd_resume(config_path: &Path, id: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let orchestrator = build_orchestrator(&config)?;
    let record = orchestrator.resume(id).await?;
    report(&record)
}

/// Execute the `status` subcommand.
fn cmd_status(config_path: &Path, id: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let record = JsonFileStore::new(&config.data_dir)
        .load(id)?
        .with_context(|| format!("no deployment with id `{id}`"))?;
    print_json(&record)
}

/// Execute the `history` subcommand.
#[allow(clippy::print_stdout, reason = "CLI table output")]
fn cmd_history(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let records = JsonFileStore::new(&config.data_dir).list()?;

    println!(
        "{:<38} {:<10} {:<28} {:<22} Hub",
        "ID", "Symbol", "Status", "Created"
    );
    println!("{}", "-".repeat(142));
    for record in &records {
        println!(
            "{:<38} {:<10} {:<28} {:<22} {}",
            record.id,
            record.token.symbol,
            record.overall_status().to_string(),
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record
                .hub_contract_address()
                .map_or_else(|| "-".to_owned(), |a| a.to_string()),
        );
    }
    Ok(())
}

/// Execute the `verify` subcommand.
async fn cmd_verify(config_path: &Path, request: &VerifyRequest) -> Result<()> {
    let config = load_config(config_path)?;
    let verifier = ExplorerVerifier::new(artifact_source(&config), Arc::clone(&config))?;
    let outcome = verify::verify_contract(&verifier, request).await?;
    print_json(&outcome)?;
    if outcome.status == VerificationState::Failed {
        bail!(
            "verification failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

/// Execute the `chains` subcommand.
#[allow(clippy::print_stdout, reason = "CLI table output")]
fn cmd_chains() {
    println!(
        "{:<10} {:<28} {:<8} {:<6} {:<11} Explorer",
        "Chain ID", "Name", "Type", "Role", "Verifier"
    );
    println!("{}", "-".repeat(100));

    for chain in chains::ALL {
        let net_type = if chain.network.is_testnet() { "test" } else { "main" };
        let role = if chain.is_hub() { "hub" } else { "leaf" };
        println!(
            "{:<10} {:<28} {:<8} {:<6} {:<11} {}",
            chain.chain_id(),
            chain.name(),
            net_type,
            role,
            chain.verifier.to_string(),
            chain.explorer_url,
        );
    }
}

#[allow(clippy::print_stdout, reason = "records are the command output")]
fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

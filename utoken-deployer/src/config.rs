//! Runtime configuration loaded from `utoken.toml`.
//!
//! Every field has a default, so the binary works without any file. The
//! service-wallet key is deliberately not part of the file: it is read from
//! the `DEPLOYER_PRIVATE_KEY` environment variable only.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::chains::ChainConfig;
use crate::retry::RetryPolicy;

/// Environment variable holding the service-wallet private key.
pub const PRIVATE_KEY_ENV: &str = "DEPLOYER_PRIVATE_KEY";

/// Environment variable used when no explorer API key is configured.
pub const ETHERSCAN_KEY_ENV: &str = "ETHERSCAN_API_KEY";

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Real artifacts are mandatory.
    #[default]
    Production,
    /// Missing artifacts fall back to placeholder bytecode.
    Development,
}

/// What to do when some leaf deployments fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafFailurePolicy {
    /// Stop the whole deployment and mark it `failed`.
    #[default]
    Halt,
    /// Carry on with the chains that deployed and end in `partial`.
    Continue,
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Whether placeholder artifacts are acceptable.
    pub environment: Environment,
    /// Root directory of the deployment record store.
    pub data_dir: PathBuf,
    /// Hardhat project root holding `contracts/`, `artifacts/` and
    /// `node_modules/`.
    pub contracts_dir: PathBuf,
    /// Leaf failure escalation.
    pub leaf_failure_policy: LeafFailurePolicy,
    /// Contract creation settings.
    pub deploy: DeploySettings,
    /// Hub↔leaf registration settings.
    pub link: LinkSettings,
    /// Explorer verification settings.
    pub verification: VerificationSettings,
    /// Compiler metadata reported to explorers.
    pub compiler: CompilerSettings,
    /// Per-chain overrides, keyed by chain ID.
    pub chains: HashMap<u64, ChainOverride>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            data_dir: PathBuf::from("data"),
            contracts_dir: PathBuf::from("contracts"),
            leaf_failure_policy: LeafFailurePolicy::default(),
            deploy: DeploySettings::default(),
            link: LinkSettings::default(),
            verification: VerificationSettings::default(),
            compiler: CompilerSettings::default(),
            chains: HashMap::new(),
        }
    }
}

/// Contract creation and call settings.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    /// Safety margin added on top of the RPC gas estimate, in percent.
    pub gas_margin_percent: u64,
    /// Gas limit used when estimation itself fails.
    pub fallback_gas_limit: u64,
    /// Extra attempts after the first failed transaction.
    pub max_retries: u32,
    /// Fixed delay between attempts, in seconds.
    pub retry_delay_secs: u64,
    /// Upper bound on waiting for a receipt. Unbounded when unset.
    pub receipt_timeout_secs: Option<u64>,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            gas_margin_percent: 25,
            fallback_gas_limit: 5_000_000,
            max_retries: 2,
            retry_delay_secs: 5,
            receipt_timeout_secs: None,
        }
    }
}

/// Hub↔leaf registration settings.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Attempts per direction.
    pub attempts: u32,
    /// Base delay for exponential backoff, in seconds.
    pub base_delay_secs: u64,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_secs: 2,
        }
    }
}

/// Explorer verification settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    /// Delay between status checks, in seconds.
    pub poll_interval_secs: u64,
    /// Maximum status checks before giving up.
    pub max_polls: u32,
    /// Default Etherscan-family API key.
    pub etherscan_api_key: Option<String>,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            max_polls: 10,
            etherscan_api_key: None,
        }
    }
}

/// Compiler metadata reported to explorers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerSettings {
    /// Full solc version string, e.g. `v0.8.26+commit.8a97fa7a`.
    pub version: String,
    /// Optimizer runs; `0` disables the optimizer.
    pub optimizer_runs: u32,
    /// Target EVM version.
    pub evm_version: String,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            version: "v0.8.26+commit.8a97fa7a".to_owned(),
            optimizer_runs: 200,
            evm_version: "paris".to_owned(),
        }
    }
}

/// Per-chain overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainOverride {
    /// RPC endpoint replacing the built-in default.
    pub rpc: Option<String>,
    /// Confirmations replacing the built-in default.
    pub confirmations: Option<u64>,
    /// Explorer API key for this chain only.
    pub explorer_api_key: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Returns [`Config::default`] if the file does not exist,
    /// allowing the binary to work without any config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// RPC URL for a chain, falling back to the built-in default.
    #[must_use]
    pub fn rpc_for(&self, chain: &ChainConfig) -> String {
        self.chains
            .get(&chain.chain_id())
            .and_then(|c| c.rpc.clone())
            .unwrap_or_else(|| chain.default_rpc.to_owned())
    }

    /// Confirmations to wait for on a chain.
    #[must_use]
    pub fn confirmations_for(&self, chain: &ChainConfig) -> u64 {
        self.chains
            .get(&chain.chain_id())
            .and_then(|c| c.confirmations)
            .unwrap_or(chain.confirmations)
    }

    /// Explorer API key for a chain: per-chain override, then the
    /// `[verification]` default, then `ETHERSCAN_API_KEY`.
    #[must_use]
    pub fn explorer_key_for(&self, chain_id: u64) -> Option<String> {
        self.chains
            .get(&chain_id)
            .and_then(|c| c.explorer_api_key.clone())
            .or_else(|| self.verification.etherscan_api_key.clone())
            .or_else(|| std::env::var(ETHERSCAN_KEY_ENV).ok())
            .filter(|k| !k.is_empty())
    }

    /// Fixed-delay policy for contract creation and ownership calls.
    #[must_use]
    pub const fn deploy_retry(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.deploy.max_retries.saturating_add(1),
            Duration::from_secs(self.deploy.retry_delay_secs),
        )
    }

    /// Exponential policy for hub↔leaf registration calls.
    #[must_use]
    pub const fn link_retry(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.link.attempts,
            Duration::from_secs(self.link.base_delay_secs),
        )
    }

    /// Optional receipt timeout.
    #[must_use]
    pub fn receipt_timeout(&self) -> Option<Duration> {
        self.deploy.receipt_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains;

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(Path::new("/definitely/not/here.toml")).expect("defaults");
        assert_eq!(config.environment, Environment::Production, "production default");
        assert_eq!(config.leaf_failure_policy, LeafFailurePolicy::Halt, "halt default");
        assert_eq!(config.deploy_retry().max_attempts, 3, "two extra attempts");
        assert_eq!(config.link_retry().max_attempts, 3, "three link attempts");
    }

    #[test]
    fn parses_overrides() {
        let text = r#"
            environment = "development"
            leaf_failure_policy = "continue"

            [deploy]
            max_retries = 4
            gas_margin_percent = 30

            [chains.97]
            rpc = "https://bsc.example.com"
            confirmations = 5
        "#;
        let config: Config = toml::from_str(text).expect("valid toml");
        assert_eq!(config.environment, Environment::Development, "env");
        assert_eq!(config.deploy.max_retries, 4, "retries");
        assert_eq!(config.deploy.retry_delay_secs, 5, "unset field keeps default");

        let bsc = chains::by_chain_id(97).expect("registered");
        assert_eq!(config.rpc_for(bsc), "https://bsc.example.com", "rpc override");
        assert_eq!(config.confirmations_for(bsc), 5, "confirmation override");

        let sepolia = chains::by_chain_id(11_155_111).expect("registered");
        assert_eq!(config.rpc_for(sepolia), sepolia.default_rpc, "default rpc");
    }

    #[test]
    fn per_chain_explorer_key_wins() {
        let mut config = Config::default();
        config.verification.etherscan_api_key = Some("global".into());
        config.chains.insert(
            56,
            ChainOverride {
                explorer_api_key: Some("bsc-only".into()),
                ..ChainOverride::default()
            },
        );
        assert_eq!(config.explorer_key_for(56).as_deref(), Some("bsc-only"), "override");
        assert_eq!(config.explorer_key_for(1).as_deref(), Some("global"), "default");
    }
}

//! Durable deployment record and its status state machine.
//!
//! A [`DeploymentRecord`] is the single source of truth for one deployment.
//! Every mutation goes through a method here so that the invariants below
//! hold for any persisted snapshot:
//!
//! - `hub_contract_address` is set iff the hub chain deployed successfully.
//! - A chain's verification status leaves `pending` only after its
//!   deployment succeeded; a failed deployment is always `skipped`.
//! - `overall_status` only moves forward, except into `failed`, and
//!   `completed` requires every chain to have deployed.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{DeployedContract, TokenParams, VerificationOutcome, VerificationState};

/// Overall deployment status surfaced to status-polling clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DeploymentStatus {
    /// Record created, nothing sent yet.
    Starting,
    /// Hub contract deployment in flight.
    DeployingHub,
    /// Leaf deployments in flight, optionally naming the current chain.
    DeployingLeafChains(Option<u64>),
    /// Hub and leaf contracts are being linked.
    Connecting,
    /// Source verification in flight.
    Verifying,
    /// Verification finished with at least one chain not verified.
    VerificationIssues,
    /// Ownership and balance are moving to the final owner.
    TransferringOwnership,
    /// Every chain deployed and handed over.
    Completed,
    /// Finished with a subset of chains only.
    Partial,
    /// Stopped on an unrecoverable error.
    Failed,
}

impl DeploymentStatus {
    /// Position in the forward-only pipeline order.
    const fn rank(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::DeployingHub => 1,
            Self::DeployingLeafChains(_) => 2,
            Self::Connecting => 3,
            Self::Verifying => 4,
            Self::VerificationIssues => 5,
            Self::TransferringOwnership => 6,
            Self::Completed | Self::Partial => 7,
            Self::Failed => 8,
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Partial | Self::Failed)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => f.write_str("starting"),
            Self::DeployingHub => f.write_str("deploying_hub"),
            Self::DeployingLeafChains(None) => f.write_str("deploying_leaf_chains"),
            Self::DeployingLeafChains(Some(id)) => write!(f, "deploying_leaf_chains:{id}"),
            Self::Connecting => f.write_str("connecting"),
            Self::Verifying => f.write_str("verifying"),
            Self::VerificationIssues => f.write_str("verification_issues"),
            Self::TransferringOwnership => f.write_str("transferring_ownership"),
            Self::Completed => f.write_str("completed"),
            Self::Partial => f.write_str("partial"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

impl FromStr for DeploymentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(chain) = s.strip_prefix("deploying_leaf_chains:") {
            let id = chain
                .parse()
                .map_err(|_| Error::validation(format!("bad chain id in status `{s}`")))?;
            return Ok(Self::DeployingLeafChains(Some(id)));
        }
        Ok(match s {
            "starting" => Self::Starting,
            "deploying_hub" => Self::DeployingHub,
            "deploying_leaf_chains" => Self::DeployingLeafChains(None),
            "connecting" => Self::Connecting,
            "verifying" => Self::Verifying,
            "verification_issues" => Self::VerificationIssues,
            "transferring_ownership" => Self::TransferringOwnership,
            "completed" => Self::Completed,
            "partial" => Self::Partial,
            "failed" => Self::Failed,
            other => return Err(Error::validation(format!("unknown status `{other}`"))),
        })
    }
}

impl From<DeploymentStatus> for String {
    fn from(status: DeploymentStatus) -> Self {
        status.to_string()
    }
}

impl TryFrom<String> for DeploymentStatus {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Deployment progress of one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainDeploymentStatus {
    /// Not attempted yet.
    Pending,
    /// Creation transaction in flight.
    Deploying,
    /// Contract exists on-chain.
    Success,
    /// Every attempt failed.
    Failed,
}

/// Source verification progress of one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Not attempted yet.
    Pending,
    /// Submitted, awaiting the explorer.
    Processing,
    /// Source published.
    Verified,
    /// Rejected or timed out.
    Failed,
    /// Never attempted because the deployment failed.
    Skipped,
}

/// Hub↔leaf registration progress of one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// Not attempted yet.
    #[default]
    Pending,
    /// Both directions registered.
    Linked,
    /// At least one direction failed after retries.
    Failed,
    /// Nothing to link (hub chain or failed deployment).
    Skipped,
}

/// Record-level verification aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationSummary {
    /// Every deployed contract is verified.
    AllVerified,
    /// At least one deployed contract is not verified.
    IssuesFound,
}

/// Per-chain sub-record embedded in a [`DeploymentRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerChainStatus {
    /// EIP-155 chain ID.
    pub chain_id: u64,
    /// Human-readable chain name.
    pub chain_name: String,
    /// Whether this chain hosts the hub contract.
    pub is_hub: bool,
    /// Deployed contract address.
    pub contract_address: Option<Address>,
    /// Creation transaction hash.
    pub tx_hash: Option<B256>,
    /// Creation block.
    pub block_number: Option<u64>,
    /// Deployment progress.
    pub deployment_status: ChainDeploymentStatus,
    /// Number of deployment attempts made across all runs.
    #[serde(default)]
    pub deploy_attempts: u32,
    /// Deployment failure text.
    pub error: Option<String>,
    /// Hub↔leaf registration progress.
    #[serde(default)]
    pub link_status: LinkStatus,
    /// Verification progress.
    pub verification_status: VerificationStatus,
    /// Verification failure text.
    pub verification_error: Option<String>,
    /// Explorer page with the verified source.
    pub verified_url: Option<String>,
    /// Whether ownership and balance reached the final owner.
    #[serde(default)]
    pub ownership_transferred: bool,
}

impl PerChainStatus {
    /// Fresh sub-record with every status at `pending`.
    #[must_use]
    pub fn new(chain_id: u64, chain_name: impl Into<String>, is_hub: bool) -> Self {
        Self {
            chain_id,
            chain_name: chain_name.into(),
            is_hub,
            contract_address: None,
            tx_hash: None,
            block_number: None,
            deployment_status: ChainDeploymentStatus::Pending,
            deploy_attempts: 0,
            error: None,
            link_status: LinkStatus::Pending,
            verification_status: VerificationStatus::Pending,
            verification_error: None,
            verified_url: None,
            ownership_transferred: false,
        }
    }

    /// Whether the contract on this chain exists.
    #[must_use]
    pub fn is_deployed(&self) -> bool {
        self.deployment_status == ChainDeploymentStatus::Success
    }
}

/// Durable record of one deployment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    /// Opaque identifier assigned at creation.
    pub id: String,
    /// Token parameters.
    #[serde(flatten)]
    pub token: TokenParams,
    /// Address that ends up owning every contract and the supply.
    pub final_owner: Address,
    /// Interim owner and signer of every transaction.
    pub service_wallet: Address,
    /// Hub contract address once deployed.
    hub_contract_address: Option<Address>,
    /// Per-chain sub-records keyed by chain ID.
    chains: BTreeMap<u64, PerChainStatus>,
    /// Overall pipeline status.
    overall_status: DeploymentStatus,
    /// Record-level verification aggregate.
    verification_summary: Option<VerificationSummary>,
    /// Append-only failure text.
    error_message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl DeploymentRecord {
    /// Create a record with every chain `pending` and status `starting`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] unless exactly one chain is the hub.
    pub fn new(
        id: impl Into<String>,
        token: TokenParams,
        final_owner: Address,
        service_wallet: Address,
        chains: impl IntoIterator<Item = PerChainStatus>,
    ) -> Result<Self> {
        let chains: BTreeMap<u64, PerChainStatus> =
            chains.into_iter().map(|c| (c.chain_id, c)).collect();
        let hubs = chains.values().filter(|c| c.is_hub).count();
        if hubs != 1 {
            return Err(Error::validation(format!(
                "a deployment needs exactly one hub chain, got {hubs}"
            )));
        }
        let now = Utc::now();
        Ok(Self {
            id: id.into(),
            token,
            final_owner,
            service_wallet,
            hub_contract_address: None,
            chains,
            overall_status: DeploymentStatus::Starting,
            verification_summary: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Current overall status.
    #[must_use]
    pub const fn overall_status(&self) -> DeploymentStatus {
        self.overall_status
    }

    /// Hub contract address, set once the hub deployed.
    #[must_use]
    pub const fn hub_contract_address(&self) -> Option<Address> {
        self.hub_contract_address
    }

    /// Record-level verification aggregate, once verification ran.
    #[must_use]
    pub const fn verification_summary(&self) -> Option<VerificationSummary> {
        self.verification_summary
    }

    /// Accumulated failure text.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// All per-chain sub-records, ordered by chain ID.
    pub fn chains(&self) -> impl Iterator<Item = &PerChainStatus> {
        self.chains.values()
    }

    /// Sub-record for `chain_id`.
    #[must_use]
    pub fn chain(&self, chain_id: u64) -> Option<&PerChainStatus> {
        self.chains.get(&chain_id)
    }

    /// The hub sub-record.
    ///
    /// # Panics
    ///
    /// Never: [`DeploymentRecord::new`] rejects records without a hub, and
    /// the chain set is fixed afterwards.
    #[must_use]
    #[allow(clippy::expect_used, reason = "hub presence is a construction invariant")]
    pub fn hub(&self) -> &PerChainStatus {
        self.chains
            .values()
            .find(|c| c.is_hub)
            .expect("record always has a hub chain")
    }

    /// Non-hub sub-records, ordered by chain ID.
    pub fn leaves(&self) -> impl Iterator<Item = &PerChainStatus> {
        self.chains.values().filter(|c| !c.is_hub)
    }

    /// Chain IDs whose contracts exist.
    #[must_use]
    pub fn deployed_chain_ids(&self) -> Vec<u64> {
        self.chains
            .values()
            .filter(|c| c.is_deployed())
            .map(|c| c.chain_id)
            .collect()
    }

    fn chain_mut(&mut self, chain_id: u64) -> Result<&mut PerChainStatus> {
        self.chains
            .get_mut(&chain_id)
            .ok_or_else(|| Error::validation(format!("chain {chain_id} is not part of this deployment")))
    }

    fn transition_error(&self, to: DeploymentStatus) -> Error {
        Error::InvalidTransition {
            from: self.overall_status.to_string(),
            to: to.to_string(),
        }
    }

    /// Move the overall status forward.
    ///
    /// Moving to the same rank is allowed (it re-qualifies
    /// `deploying_leaf_chains` with the current chain).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] when the record is terminal, the
    /// move goes backwards, `failed` is requested (use
    /// [`DeploymentRecord::fail`]), `completed` is requested while a chain
    /// has not deployed, or `partial` is requested before linking started.
    pub fn advance(&mut self, to: DeploymentStatus) -> Result<()> {
        let from = self.overall_status;
        if from.is_terminal() || to == DeploymentStatus::Failed || to.rank() < from.rank() {
            return Err(self.transition_error(to));
        }
        match to {
            DeploymentStatus::Completed if !self.chains.values().all(PerChainStatus::is_deployed) => {
                return Err(self.transition_error(to));
            }
            DeploymentStatus::Partial if from.rank() < DeploymentStatus::Connecting.rank() => {
                return Err(self.transition_error(to));
            }
            _ => {}
        }
        self.overall_status = to;
        Ok(())
    }

    /// Move to `failed` and append `message` to the error text.
    ///
    /// Calling this on an already-failed record only appends the message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] from `completed` or `partial`.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        if matches!(
            self.overall_status,
            DeploymentStatus::Completed | DeploymentStatus::Partial
        ) {
            return Err(self.transition_error(DeploymentStatus::Failed));
        }
        self.overall_status = DeploymentStatus::Failed;
        self.append_error(message);
        Ok(())
    }

    /// Append `message` to the error text without touching the status.
    pub fn append_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.error_message = Some(match self.error_message.take() {
            Some(existing) => format!("{existing}; {message}"),
            None => message,
        });
    }

    /// Re-open a non-completed record for another run.
    ///
    /// Failed chains go back to `pending`; deployed chains, verifications
    /// and ownership flags are kept. The error history is kept too.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] for a completed record.
    pub fn reopen(&mut self) -> Result<()> {
        if self.overall_status == DeploymentStatus::Completed {
            return Err(self.transition_error(DeploymentStatus::Starting));
        }
        for chain in self.chains.values_mut() {
            if !chain.is_deployed() {
                chain.deployment_status = ChainDeploymentStatus::Pending;
                chain.error = None;
                chain.link_status = LinkStatus::Pending;
                chain.verification_status = VerificationStatus::Pending;
                chain.verification_error = None;
            } else if chain.link_status == LinkStatus::Failed {
                chain.link_status = LinkStatus::Pending;
            }
        }
        self.verification_summary = None;
        self.overall_status = DeploymentStatus::Starting;
        Ok(())
    }

    /// Mark `chain_id` as deploying.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an unknown chain.
    pub fn mark_deploying(&mut self, chain_id: u64) -> Result<()> {
        let chain = self.chain_mut(chain_id)?;
        chain.deployment_status = ChainDeploymentStatus::Deploying;
        Ok(())
    }

    /// Add `attempts` to the deployment attempt counter of `chain_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an unknown chain.
    pub fn add_deploy_attempts(&mut self, chain_id: u64, attempts: u32) -> Result<()> {
        let chain = self.chain_mut(chain_id)?;
        chain.deploy_attempts = chain.deploy_attempts.saturating_add(attempts);
        Ok(())
    }

    /// Record a successful deployment. Sets the hub address for the hub.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an unknown chain.
    pub fn mark_deployed(&mut self, chain_id: u64, deployed: DeployedContract) -> Result<()> {
        let chain = self.chain_mut(chain_id)?;
        chain.deployment_status = ChainDeploymentStatus::Success;
        chain.contract_address = Some(deployed.address);
        chain.tx_hash = Some(deployed.tx_hash);
        chain.block_number = Some(deployed.block_number);
        chain.error = None;
        let is_hub = chain.is_hub;
        if is_hub {
            self.hub_contract_address = Some(deployed.address);
        }
        Ok(())
    }

    /// Record a failed deployment; verification and linking become skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an unknown chain.
    pub fn mark_deploy_failed(&mut self, chain_id: u64, error: impl Into<String>) -> Result<()> {
        let chain = self.chain_mut(chain_id)?;
        chain.deployment_status = ChainDeploymentStatus::Failed;
        chain.error = Some(error.into());
        chain.link_status = LinkStatus::Skipped;
        chain.verification_status = VerificationStatus::Skipped;
        Ok(())
    }

    /// Record the linking result of `chain_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an unknown chain.
    pub fn set_link_status(&mut self, chain_id: u64, status: LinkStatus) -> Result<()> {
        self.chain_mut(chain_id)?.link_status = status;
        Ok(())
    }

    /// Mark `chain_id` as submitted for verification.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the chain has not deployed.
    pub fn mark_verifying(&mut self, chain_id: u64) -> Result<()> {
        let chain = self.chain_mut(chain_id)?;
        if !chain.is_deployed() {
            return Err(Error::InvalidTransition {
                from: format!("chain {chain_id} {:?}", chain.deployment_status),
                to: "verification processing".into(),
            });
        }
        chain.verification_status = VerificationStatus::Processing;
        Ok(())
    }

    /// Record a verification outcome for `chain_id`.
    ///
    /// A chain that is already `verified` keeps that status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the chain has not deployed.
    pub fn record_verification(&mut self, chain_id: u64, outcome: VerificationOutcome) -> Result<()> {
        let chain = self.chain_mut(chain_id)?;
        if !chain.is_deployed() {
            return Err(Error::InvalidTransition {
                from: format!("chain {chain_id} {:?}", chain.deployment_status),
                to: "verification result".into(),
            });
        }
        if chain.verification_status == VerificationStatus::Verified {
            return Ok(());
        }
        chain.verification_status = match outcome.status {
            VerificationState::Verified => VerificationStatus::Verified,
            VerificationState::Pending => VerificationStatus::Processing,
            VerificationState::Failed => VerificationStatus::Failed,
        };
        chain.verified_url = outcome.explorer_url;
        chain.verification_error = outcome.error;
        Ok(())
    }

    /// Set the record-level verification aggregate.
    pub const fn set_verification_summary(&mut self, summary: VerificationSummary) {
        self.verification_summary = Some(summary);
    }

    /// Flag `chain_id` as handed over to the final owner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an unknown chain.
    pub fn mark_ownership_transferred(&mut self, chain_id: u64) -> Result<()> {
        self.chain_mut(chain_id)?.ownership_transferred = true;
        Ok(())
    }

    /// Bump `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

//! Multi-chain deployment pipeline.
//!
//! One run drives a [`DeploymentRecord`] through
//! `starting → deploying_hub → deploying_leaf_chains → connecting →
//! verifying → transferring_ownership → completed`, persisting the record
//! after every step so a crash leaves an inspectable snapshot behind.
//!
//! Failures are contained to the chain they happened on. Two places
//! escalate to `failed`: a hub deployment failure, and an ownership
//! transfer failure. Leaf deployment failures escalate according to
//! [`LeafFailurePolicy`]. Linking and verification are best-effort.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use futures::future::join_all;
use utoken::contracts::{IHubToken, ILeafToken, chain_id_word, hub_constructor_args, leaf_constructor_args};
use utoken::{
    ContractKind, DeploymentRecord, DeploymentStatus, Error, LinkStatus, PerChainStatus, Result,
    VerificationStatus, VerificationSummary,
};

use crate::artifacts::{ArtifactSource, ContractArtifact};
use crate::chains::{self, ChainConfig};
use crate::client::{ChainClient, ClientFactory, read_call, send_call};
use crate::config::{Config, LeafFailurePolicy};
use crate::request::ValidatedDeployment;
use crate::retry::{RetryPolicy, retry};
use crate::store::RecordStore;
use crate::verify::{VerificationRequest, Verifier};

/// Retry and escalation settings for one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Contract creation and ownership calls.
    pub deploy_retry: RetryPolicy,
    /// Hub↔leaf registration calls, per direction.
    pub link_retry: RetryPolicy,
    /// Leaf failure escalation.
    pub leaf_failure_policy: LeafFailurePolicy,
}

impl PipelineSettings {
    /// Settings taken from the loaded configuration.
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            deploy_retry: config.deploy_retry(),
            link_retry: config.link_retry(),
            leaf_failure_policy: config.leaf_failure_policy,
        }
    }
}

/// Drives deployments end to end.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    factory: Arc<dyn ClientFactory>,
    artifacts: Arc<dyn ArtifactSource>,
    verifier: Arc<dyn Verifier>,
    store: Arc<dyn RecordStore>,
    settings: PipelineSettings,
}

/// A chain prepared for one run.
struct Connected {
    config: &'static ChainConfig,
    client: Arc<dyn ChainClient>,
}

/// Mutable state of one run: the record plus everything resolved during
/// pre-flight.
struct Run {
    record: DeploymentRecord,
    chains: BTreeMap<u64, Connected>,
    hub_artifact: ContractArtifact,
    leaf_artifact: Option<ContractArtifact>,
}

impl fmt::Debug for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Run")
            .field("id", &self.record.id)
            .field("status", &self.record.overall_status())
            .finish_non_exhaustive()
    }
}

impl Run {
    fn connected(&self, chain_id: u64) -> Result<&Connected> {
        self.chains
            .get(&chain_id)
            .ok_or_else(|| Error::config(format!("chain {chain_id} was not prepared for this run")))
    }

    fn client(&self, chain_id: u64) -> Result<Arc<dyn ChainClient>> {
        self.connected(chain_id).map(|c| Arc::clone(&c.client))
    }

    fn artifact(&self, kind: ContractKind) -> Result<&ContractArtifact> {
        match kind {
            ContractKind::Hub => Ok(&self.hub_artifact),
            ContractKind::Leaf => self
                .leaf_artifact
                .as_ref()
                .ok_or_else(|| Error::config("leaf artifact was not loaded")),
        }
    }

    fn constructor_args(&self, kind: ContractKind) -> Bytes {
        let record = &self.record;
        match kind {
            ContractKind::Hub => hub_constructor_args(&record.token, record.service_wallet),
            ContractKind::Leaf => leaf_constructor_args(&record.token, record.service_wallet),
        }
        .into()
    }

    /// Chain label used in error text: `Name (id)`.
    fn label(&self, chain_id: u64) -> String {
        self.record.chain(chain_id).map_or_else(
            || chain_id.to_string(),
            |c| format!("{} ({chain_id})", c.chain_name),
        )
    }
}

const fn kind_of(chain: &PerChainStatus) -> ContractKind {
    if chain.is_hub {
        ContractKind::Hub
    } else {
        ContractKind::Leaf
    }
}

impl Orchestrator {
    /// Orchestrator over the given collaborators.
    #[must_use]
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        artifacts: Arc<dyn ArtifactSource>,
        verifier: Arc<dyn Verifier>,
        store: Arc<dyn RecordStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            factory,
            artifacts,
            verifier,
            store,
            settings,
        }
    }

    /// Start a new deployment and drive it to a terminal status.
    ///
    /// Pipeline failures are reported through the returned record's status
    /// and error text.
    ///
    /// # Errors
    ///
    /// Returns an error, without creating any record, if artifacts or chain
    /// clients cannot be prepared. Also returns an error if the record
    /// cannot be persisted.
    pub async fn run(&self, deployment: ValidatedDeployment) -> Result<DeploymentRecord> {
        let has_leaves = deployment.chains.iter().any(|c| !c.is_hub());
        let (hub_artifact, leaf_artifact) = self.load_artifacts(has_leaves)?;
        let chains = self.connect(deployment.chains.iter().copied())?;

        let record = DeploymentRecord::new(
            uuid::Uuid::new_v4().to_string(),
            deployment.token,
            deployment.final_owner,
            self.factory.service_wallet(),
            deployment
                .chains
                .iter()
                .map(|c| PerChainStatus::new(c.chain_id(), c.name(), c.is_hub())),
        )?;
        self.store.save(&record)?;
        tracing::info!(
            id = %record.id,
            token = %record.token.symbol,
            chains = deployment.chains.len(),
            "deployment started"
        );

        let mut run = Run {
            record,
            chains,
            hub_artifact,
            leaf_artifact,
        };
        self.drive(&mut run).await?;
        Ok(run.record)
    }

    /// Re-run a non-completed deployment.
    ///
    /// Deployed contracts are reused, verified chains are not re-submitted
    /// and chains already handed over are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not exist, was created with a
    /// different service wallet, or cannot be prepared or persisted. Also
    /// refuses records whose hub already belongs to the final owner while
    /// some leaf is still unlinked, since the hub would reject the link.
    pub async fn resume(&self, id: &str) -> Result<DeploymentRecord> {
        let mut record = self
            .store
            .load(id)?
            .ok_or_else(|| Error::validation(format!("no deployment with id `{id}`")))?;

        if record.overall_status() == DeploymentStatus::Completed {
            tracing::info!(id, "deployment already completed");
            return Ok(record);
        }
        if record.service_wallet != self.factory.service_wallet() {
            return Err(Error::config(format!(
                "deployment `{id}` was signed by {}, not by the configured wallet {}",
                record.service_wallet,
                self.factory.service_wallet()
            )));
        }

        if let Some(unlinkable) = unlinkable_after_hand_over(&record) {
            return Err(Error::config(format!(
                "deployment `{id}` already handed the hub over to {}; {unlinkable} can no longer be \
                 registered on it by the service wallet",
                record.final_owner
            )));
        }

        let configs = record
            .chains()
            .map(|c| {
                chains::by_chain_id(c.chain_id).ok_or_else(|| {
                    Error::config(format!("chain {} is no longer supported", c.chain_id))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let has_leaves = record.leaves().next().is_some();
        let (hub_artifact, leaf_artifact) = self.load_artifacts(has_leaves)?;
        let chains = self.connect(configs)?;

        let previous = record.overall_status();
        record.reopen()?;
        tracing::info!(id, %previous, "resuming deployment");

        let mut run = Run {
            record,
            chains,
            hub_artifact,
            leaf_artifact,
        };
        self.checkpoint(&mut run)?;
        self.drive(&mut run).await?;
        Ok(run.record)
    }

    fn load_artifacts(&self, with_leaf: bool) -> Result<(ContractArtifact, Option<ContractArtifact>)> {
        let hub = self.artifacts.artifact(ContractKind::Hub)?;
        let leaf = if with_leaf {
            Some(self.artifacts.artifact(ContractKind::Leaf)?)
        } else {
            None
        };
        Ok((hub, leaf))
    }

    fn connect(
        &self,
        configs: impl IntoIterator<Item = &'static ChainConfig>,
    ) -> Result<BTreeMap<u64, Connected>> {
        configs
            .into_iter()
            .map(|config| {
                let client = self.factory.connect(config)?;
                Ok((config.chain_id(), Connected { config, client }))
            })
            .collect()
    }

    /// Persist the current snapshot.
    fn checkpoint(&self, run: &mut Run) -> Result<()> {
        run.record.touch();
        self.store.save(&run.record)
    }

    fn advance(&self, run: &mut Run, to: DeploymentStatus) -> Result<()> {
        run.record.advance(to)?;
        tracing::info!(id = %run.record.id, status = %to, "status changed");
        self.checkpoint(run)
    }

    fn fail(&self, run: &mut Run, message: String) -> Result<()> {
        tracing::error!(id = %run.record.id, error = %message, "deployment failed");
        run.record.fail(message)?;
        self.checkpoint(run)
    }

    async fn drive(&self, run: &mut Run) -> Result<()> {
        if self.deploy_hub(run).await?.is_break() {
            return Ok(());
        }
        if self.deploy_leaves(run).await?.is_break() {
            return Ok(());
        }
        self.link(run).await?;
        self.verify_all(run).await?;
        if self.hand_over(run).await?.is_break() {
            return Ok(());
        }

        let finished = if run.record.chains().all(PerChainStatus::is_deployed) {
            DeploymentStatus::Completed
        } else {
            DeploymentStatus::Partial
        };
        self.advance(run, finished)?;
        tracing::info!(
            id = %run.record.id,
            hub = ?run.record.hub_contract_address(),
            status = %finished,
            "deployment finished"
        );
        Ok(())
    }

    /// Deploy one contract with the creation retry policy. Returns whether
    /// the chain ended up deployed; failures are recorded on the chain.
    async fn deploy_chain(&self, run: &mut Run, chain_id: u64, kind: ContractKind) -> Result<bool> {
        run.record.mark_deploying(chain_id)?;
        self.checkpoint(run)?;

        let client = run.client(chain_id)?;
        let artifact = run.artifact(kind)?;
        if artifact.placeholder {
            tracing::warn!(chain_id, %kind, "deploying placeholder bytecode");
        }
        let bytecode = artifact.bytecode.clone();
        let args = run.constructor_args(kind);
        let operation = format!("deploy {kind} contract on chain {chain_id}");

        let (deployer, bytecode, args) = (client.as_ref(), &bytecode, &args);
        let attempted = retry(self.settings.deploy_retry, &operation, move |attempt| {
            tracing::info!(chain_id, %kind, attempt, "deploying contract");
            deployer.deploy_contract(bytecode, args)
        })
        .await;
        run.record.add_deploy_attempts(chain_id, attempted.attempts)?;

        let deployed = match attempted.result {
            Ok(deployed) => {
                tracing::info!(
                    chain_id,
                    %kind,
                    address = %deployed.address,
                    tx_hash = %deployed.tx_hash,
                    "contract deployed"
                );
                run.record.mark_deployed(chain_id, deployed)?;
                true
            }
            Err(e) => {
                tracing::error!(chain_id, %kind, error = %e, "deployment failed");
                run.record.mark_deploy_failed(chain_id, e.to_string())?;
                false
            }
        };
        self.checkpoint(run)?;
        Ok(deployed)
    }

    async fn deploy_hub(&self, run: &mut Run) -> Result<ControlFlow<()>> {
        self.advance(run, DeploymentStatus::DeployingHub)?;
        let hub = run.record.hub();
        let chain_id = hub.chain_id;
        if hub.is_deployed() {
            tracing::info!(chain_id, address = ?hub.contract_address, "reusing deployed hub");
            return Ok(ControlFlow::Continue(()));
        }

        if self.deploy_chain(run, chain_id, ContractKind::Hub).await? {
            return Ok(ControlFlow::Continue(()));
        }
        let cause = run
            .record
            .chain(chain_id)
            .and_then(|c| c.error.clone())
            .unwrap_or_default();
        let message = format!("hub deployment on {} failed: {cause}", run.label(chain_id));
        self.fail(run, message)?;
        Ok(ControlFlow::Break(()))
    }

    async fn deploy_leaves(&self, run: &mut Run) -> Result<ControlFlow<()>> {
        let pending: Vec<u64> = run
            .record
            .leaves()
            .filter(|c| !c.is_deployed())
            .map(|c| c.chain_id)
            .collect();
        if pending.is_empty() {
            self.advance(run, DeploymentStatus::DeployingLeafChains(None))?;
        }

        let mut failures = Vec::new();
        for chain_id in pending {
            self.advance(run, DeploymentStatus::DeployingLeafChains(Some(chain_id)))?;
            if !self.deploy_chain(run, chain_id, ContractKind::Leaf).await? {
                let cause = run
                    .record
                    .chain(chain_id)
                    .and_then(|c| c.error.clone())
                    .unwrap_or_default();
                failures.push(format!(
                    "leaf deployment on {} failed: {cause}",
                    run.label(chain_id)
                ));
            }
        }

        if failures.is_empty() {
            return Ok(ControlFlow::Continue(()));
        }
        match self.settings.leaf_failure_policy {
            LeafFailurePolicy::Halt => {
                self.fail(run, failures.join("; "))?;
                Ok(ControlFlow::Break(()))
            }
            LeafFailurePolicy::Continue => {
                tracing::warn!(
                    id = %run.record.id,
                    failed = failures.len(),
                    "continuing with the chains that deployed"
                );
                for failure in failures {
                    run.record.append_error(failure);
                }
                self.checkpoint(run)?;
                Ok(ControlFlow::Continue(()))
            }
        }
    }

    async fn link(&self, run: &mut Run) -> Result<()> {
        self.advance(run, DeploymentStatus::Connecting)?;
        let hub_id = run.record.hub().chain_id;
        let hub_address = run
            .record
            .hub_contract_address()
            .ok_or_else(|| Error::config("linking requires a deployed hub"))?;
        run.record.set_link_status(hub_id, LinkStatus::Skipped)?;

        let leaves: Vec<(u64, Address)> = run
            .record
            .leaves()
            .filter(|c| c.link_status != LinkStatus::Linked)
            .filter_map(|c| c.contract_address.filter(|_| c.is_deployed()).map(|a| (c.chain_id, a)))
            .collect();
        let hub_client = run.client(hub_id)?;
        let hub = hub_client.as_ref();
        let service = run.record.service_wallet;

        for (leaf_id, leaf_address) in leaves {
            let leaf_client = run.client(leaf_id)?;
            let leaf = leaf_client.as_ref();

            let hub_side = retry(
                self.settings.link_retry,
                &format!("register chain {leaf_id} on hub"),
                move |_| async move {
                    ensure_owner(hub, hub_address, service).await?;
                    send_call(
                        hub,
                        hub_address,
                        IHubToken::setConnectedContractCall {
                            chainId: chain_id_word(leaf_id),
                            contractAddress: leaf_address,
                        },
                    )
                    .await
                },
            )
            .await;
            let leaf_side = retry(
                self.settings.link_retry,
                &format!("register hub on chain {leaf_id}"),
                move |_| async move {
                    ensure_owner(leaf, leaf_address, service).await?;
                    send_call(
                        leaf,
                        leaf_address,
                        ILeafToken::setZetaChainContractCall { hub: hub_address },
                    )
                    .await
                },
            )
            .await;

            let status = match (hub_side.result, leaf_side.result) {
                (Ok(_), Ok(_)) => {
                    tracing::info!(chain_id = leaf_id, %hub_address, %leaf_address, "contracts linked");
                    LinkStatus::Linked
                }
                (hub_result, leaf_result) => {
                    for e in [hub_result.err(), leaf_result.err()].into_iter().flatten() {
                        tracing::warn!(chain_id = leaf_id, error = %e, "linking failed");
                    }
                    LinkStatus::Failed
                }
            };
            run.record.set_link_status(leaf_id, status)?;
            self.checkpoint(run)?;
        }
        Ok(())
    }

    async fn verify_all(&self, run: &mut Run) -> Result<()> {
        self.advance(run, DeploymentStatus::Verifying)?;

        let mut targets = Vec::new();
        for chain in run.record.chains() {
            if !chain.is_deployed() || chain.verification_status == VerificationStatus::Verified {
                continue;
            }
            if let Some(address) = chain.contract_address {
                let kind = kind_of(chain);
                let config = run.connected(chain.chain_id)?.config;
                targets.push((config, address, kind, run.constructor_args(kind)));
            }
        }
        for (config, ..) in &targets {
            run.record.mark_verifying(config.chain_id())?;
        }
        self.checkpoint(run)?;

        let outcomes = join_all(targets.iter().map(|(chain, address, kind, args)| {
            self.verifier.verify(VerificationRequest {
                chain,
                address: *address,
                kind: *kind,
                constructor_args: Some(args),
            })
        }))
        .await;
        for ((config, ..), outcome) in targets.iter().zip(outcomes) {
            run.record.record_verification(config.chain_id(), outcome)?;
        }

        let all_verified = run
            .record
            .chains()
            .filter(|c| c.is_deployed())
            .all(|c| c.verification_status == VerificationStatus::Verified);
        if all_verified {
            run.record.set_verification_summary(VerificationSummary::AllVerified);
            self.checkpoint(run)?;
        } else {
            run.record.set_verification_summary(VerificationSummary::IssuesFound);
            self.advance(run, DeploymentStatus::VerificationIssues)?;
        }
        Ok(())
    }

    async fn hand_over(&self, run: &mut Run) -> Result<ControlFlow<()>> {
        self.advance(run, DeploymentStatus::TransferringOwnership)?;
        let targets: Vec<(u64, Address)> = run
            .record
            .chains()
            .filter(|c| c.is_deployed() && !c.ownership_transferred)
            .filter_map(|c| c.contract_address.map(|a| (c.chain_id, a)))
            .collect();

        for (chain_id, contract) in targets {
            let client = run.client(chain_id)?;
            match self.transfer_one(&run.record, client.as_ref(), contract).await {
                Ok(()) => {
                    run.record.mark_ownership_transferred(chain_id)?;
                    self.checkpoint(run)?;
                }
                Err(e) => {
                    let message = format!("ownership transfer on {} failed: {e}", run.label(chain_id));
                    self.fail(run, message)?;
                    return Ok(ControlFlow::Break(()));
                }
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Move ownership, then the service wallet's balance, to the final
    /// owner.
    async fn transfer_one(
        &self,
        record: &DeploymentRecord,
        client: &dyn ChainClient,
        contract: Address,
    ) -> Result<()> {
        let chain_id = client.chain_id();
        let service = record.service_wallet;
        let owner = record.final_owner;

        let current = retry(
            self.settings.deploy_retry,
            &format!("read owner on chain {chain_id}"),
            move |_| read_call(client, contract, IHubToken::ownerCall {}),
        )
        .await
        .result?;
        if current == owner {
            tracing::info!(chain_id, %contract, "final owner already owns the contract");
        } else {
            if current != service {
                return Err(not_owner(chain_id, service, current));
            }
            retry(
                self.settings.deploy_retry,
                &format!("transfer ownership on chain {chain_id}"),
                move |_| send_call(client, contract, IHubToken::transferOwnershipCall { newOwner: owner }),
            )
            .await
            .result?;
            tracing::info!(chain_id, %contract, %owner, "ownership transferred");
        }

        if owner == service {
            return Ok(());
        }
        let balance = retry(
            self.settings.deploy_retry,
            &format!("read service balance on chain {chain_id}"),
            move |_| read_call(client, contract, IHubToken::balanceOfCall { account: service }),
        )
        .await
        .result?;
        if balance == U256::ZERO {
            return Ok(());
        }
        retry(
            self.settings.deploy_retry,
            &format!("transfer balance on chain {chain_id}"),
            move |_| {
                send_call(
                    client,
                    contract,
                    IHubToken::transferCall {
                        to: owner,
                        amount: balance,
                    },
                )
            },
        )
        .await
        .result?;
        tracing::info!(chain_id, %contract, %balance, "balance transferred");
        Ok(())
    }
}

/// Leaves a resume could not link: the hub was already handed over while
/// they were undeployed or unlinked. Returns their labels joined by `, `.
fn unlinkable_after_hand_over(record: &DeploymentRecord) -> Option<String> {
    if !record.hub().ownership_transferred {
        return None;
    }
    let labels: Vec<String> = record
        .leaves()
        .filter(|c| c.link_status != LinkStatus::Linked)
        .map(|c| format!("{} ({})", c.chain_name, c.chain_id))
        .collect();
    (!labels.is_empty()).then(|| labels.join(", "))
}

/// Fail without spending gas unless `expected` owns `contract`.
///
/// The hub and leaf ABIs share `owner()`.
async fn ensure_owner(client: &dyn ChainClient, contract: Address, expected: Address) -> Result<()> {
    let owner = read_call(client, contract, IHubToken::ownerCall {}).await?;
    if owner == expected {
        return Ok(());
    }
    Err(not_owner(client.chain_id(), expected, owner))
}

fn not_owner(chain_id: u64, expected: Address, owner: Address) -> Error {
    Error::ContractRevert {
        chain_id,
        method: "owner()".to_owned(),
        reason: format!("{expected} is not the contract owner, {owner} is"),
    }
}

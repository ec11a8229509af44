//! End-to-end pipeline tests against in-memory chains, explorer and store.

#![allow(clippy::expect_used, reason = "tests")]
#![allow(clippy::unwrap_used, reason = "tests")]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use utoken::contracts::IHubToken;
use utoken::{
    ChainDeploymentStatus, ContractKind, DeployedContract, DeploymentStatus, Error, LinkStatus,
    Result, TxOutcome, VerificationOutcome, VerificationState, VerificationStatus,
    VerificationSummary,
};
use utoken_deployer::artifacts::{ArtifactSource, ContractArtifact, SourceBundle};
use utoken_deployer::chains::ChainConfig;
use utoken_deployer::client::{ChainClient, ClientFactory};
use utoken_deployer::config::LeafFailurePolicy;
use utoken_deployer::orchestrator::{Orchestrator, PipelineSettings};
use utoken_deployer::request::DeployRequest;
use utoken_deployer::retry::RetryPolicy;
use utoken_deployer::store::{MemoryStore, RecordStore};
use utoken_deployer::verify::{VerificationRequest, Verifier};

const HUB: u64 = 7001;
const LEAF: u64 = 11_155_111;
const SUPPLY: u64 = 1_000_000;

const SERVICE: Address = Address::repeat_byte(0xa1);
const OWNER: Address = Address::repeat_byte(0xf1);

/// In-memory chain: contracts are owner and balance maps.
#[derive(Debug)]
struct MockChain {
    chain_id: u64,
    /// Deployments fail while set.
    deploy_broken: AtomicBool,
    /// Calls to these methods revert while set.
    reverting: Mutex<HashSet<&'static str>>,
    /// Calls to these methods fail with a transient RPC error.
    flaky: Mutex<HashSet<&'static str>>,
    /// Views that fail with a transient RPC error this many more times.
    flaky_views: Mutex<HashMap<&'static str, u32>>,
    deploys: AtomicU32,
    calls: Mutex<Vec<String>>,
    owners: Mutex<HashMap<Address, Address>>,
    balances: Mutex<HashMap<Address, U256>>,
    journal: Arc<Mutex<Vec<u64>>>,
}

impl MockChain {
    fn new(chain_id: u64, journal: Arc<Mutex<Vec<u64>>>) -> Self {
        Self {
            chain_id,
            deploy_broken: AtomicBool::new(false),
            reverting: Mutex::new(HashSet::new()),
            flaky: Mutex::new(HashSet::new()),
            flaky_views: Mutex::new(HashMap::new()),
            deploys: AtomicU32::new(0),
            calls: Mutex::new(Vec::new()),
            owners: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            journal,
        }
    }

    fn revert(&self, method: &'static str, on: bool) {
        let mut set = self.reverting.lock().unwrap();
        if on {
            set.insert(method);
        } else {
            set.remove(method);
        }
    }

    fn count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|m| *m == method).count()
    }

    fn owner_of(&self, contract: Address) -> Option<Address> {
        self.owners.lock().unwrap().get(&contract).copied()
    }

    fn balance_of(&self, contract: Address) -> U256 {
        self.balances.lock().unwrap().get(&contract).copied().unwrap_or_default()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn signer(&self) -> Address {
        SERVICE
    }

    async fn deploy_contract(
        &self,
        _bytecode: &Bytes,
        _constructor_args: &[u8],
    ) -> Result<DeployedContract> {
        let n = self.deploys.fetch_add(1, Ordering::SeqCst) + 1;
        if self.deploy_broken.load(Ordering::SeqCst) {
            return Err(Error::rpc(self.chain_id, "connection reset"));
        }
        let tag = u8::try_from(self.chain_id % 200 + u64::from(n)).expect("few deployments");
        let address = Address::with_last_byte(tag);
        self.owners.lock().unwrap().insert(address, SERVICE);
        self.balances
            .lock()
            .unwrap()
            .insert(address, U256::from(SUPPLY));
        self.journal.lock().unwrap().push(self.chain_id);
        Ok(DeployedContract {
            address,
            tx_hash: B256::repeat_byte(tag),
            block_number: u64::from(n),
        })
    }

    async fn call_method(
        &self,
        contract: Address,
        method: &str,
        calldata: Bytes,
    ) -> Result<TxOutcome> {
        self.calls.lock().unwrap().push(method.to_owned());
        if self.reverting.lock().unwrap().contains(method) {
            return Err(Error::ContractRevert {
                chain_id: self.chain_id,
                method: method.to_owned(),
                reason: "execution reverted".into(),
            });
        }
        if self.flaky.lock().unwrap().contains(method) {
            return Err(Error::rpc(self.chain_id, "nonce too low"));
        }
        if method == IHubToken::transferOwnershipCall::SIGNATURE {
            let call = IHubToken::transferOwnershipCall::abi_decode(&calldata).expect("calldata");
            self.owners.lock().unwrap().insert(contract, call.newOwner);
        }
        if method == IHubToken::transferCall::SIGNATURE {
            self.balances.lock().unwrap().insert(contract, U256::ZERO);
        }
        Ok(TxOutcome {
            tx_hash: B256::repeat_byte(0xee),
            block_number: 99,
        })
    }

    async fn call_view(&self, contract: Address, method: &str, _calldata: Bytes) -> Result<Bytes> {
        if let Some(left) = self
            .flaky_views
            .lock()
            .unwrap()
            .get_mut(method)
            .filter(|left| **left > 0)
        {
            *left -= 1;
            return Err(Error::rpc(self.chain_id, "upstream timed out"));
        }
        if method == IHubToken::ownerCall::SIGNATURE {
            let owner = self.owner_of(contract).unwrap_or_default();
            return Ok(owner.abi_encode().into());
        }
        if method == IHubToken::balanceOfCall::SIGNATURE {
            return Ok(self.balance_of(contract).abi_encode().into());
        }
        Err(Error::rpc(self.chain_id, format!("unexpected view {method}")))
    }
}

#[derive(Debug)]
struct MockFactory {
    chains: BTreeMap<u64, Arc<MockChain>>,
}

impl ClientFactory for MockFactory {
    fn service_wallet(&self) -> Address {
        SERVICE
    }

    fn connect(&self, chain: &ChainConfig) -> Result<Arc<dyn ChainClient>> {
        let client = self
            .chains
            .get(&chain.chain_id())
            .ok_or_else(|| Error::config(format!("no RPC for chain {}", chain.chain_id())))?;
        Ok(Arc::clone(client) as Arc<dyn ChainClient>)
    }
}

#[derive(Debug, Default)]
struct MockArtifacts {
    missing: bool,
}

impl ArtifactSource for MockArtifacts {
    fn artifact(&self, kind: ContractKind) -> Result<ContractArtifact> {
        if self.missing {
            return Err(Error::config(format!("artifact for {kind} not found")));
        }
        Ok(ContractArtifact {
            kind,
            abi: JsonAbi::default(),
            bytecode: Bytes::from_static(&[0x60, 0x80]),
            placeholder: false,
        })
    }

    fn sources(&self, _kind: ContractKind) -> Result<SourceBundle> {
        Ok(SourceBundle::default())
    }
}

/// Explorer answering per chain; verified unless told otherwise.
#[derive(Debug, Default)]
struct MockVerifier {
    failing: HashSet<u64>,
    submissions: Mutex<Vec<u64>>,
}

impl MockVerifier {
    fn submissions(&self, chain_id: u64) -> usize {
        self.submissions
            .lock()
            .unwrap()
            .iter()
            .filter(|id| **id == chain_id)
            .count()
    }
}

#[async_trait]
impl Verifier for MockVerifier {
    async fn verify(&self, request: VerificationRequest<'_>) -> VerificationOutcome {
        let chain_id = request.chain.chain_id();
        self.submissions.lock().unwrap().push(chain_id);
        if self.failing.contains(&chain_id) {
            VerificationOutcome::failed(
                Error::VerificationTimeout {
                    chain_id,
                    attempts: 10,
                }
                .to_string(),
            )
        } else {
            VerificationOutcome::verified(request.chain.contract_url(request.address))
        }
    }
}

struct Harness {
    hub: Arc<MockChain>,
    leaf: Arc<MockChain>,
    verifier: Arc<MockVerifier>,
    store: Arc<MemoryStore>,
    journal: Arc<Mutex<Vec<u64>>>,
    policy: LeafFailurePolicy,
    missing_artifacts: bool,
}

impl Harness {
    fn new() -> Self {
        let journal = Arc::new(Mutex::new(Vec::new()));
        Self {
            hub: Arc::new(MockChain::new(HUB, Arc::clone(&journal))),
            leaf: Arc::new(MockChain::new(LEAF, Arc::clone(&journal))),
            verifier: Arc::new(MockVerifier::default()),
            store: Arc::new(MemoryStore::new()),
            journal,
            policy: LeafFailurePolicy::Halt,
            missing_artifacts: false,
        }
    }

    fn with_failing_verification(mut self, chain_id: u64) -> Self {
        self.verifier = Arc::new(MockVerifier {
            failing: HashSet::from([chain_id]),
            ..MockVerifier::default()
        });
        self
    }

    fn orchestrator(&self) -> Orchestrator {
        let factory = MockFactory {
            chains: BTreeMap::from([(HUB, Arc::clone(&self.hub)), (LEAF, Arc::clone(&self.leaf))]),
        };
        Orchestrator::new(
            Arc::new(factory),
            Arc::new(MockArtifacts {
                missing: self.missing_artifacts,
            }),
            Arc::clone(&self.verifier) as Arc<dyn Verifier>,
            Arc::clone(&self.store) as Arc<dyn RecordStore>,
            PipelineSettings {
                deploy_retry: RetryPolicy::fixed(3, Duration::ZERO),
                link_retry: RetryPolicy::exponential(3, Duration::ZERO),
                leaf_failure_policy: self.policy,
            },
        )
    }
}

fn request(chains: &[u64]) -> DeployRequest {
    DeployRequest {
        token_name: "Omni Token".into(),
        token_symbol: "OMNI".into(),
        decimals: 18,
        total_supply: SUPPLY.to_string(),
        selected_chains: chains.iter().map(ToString::to_string).collect(),
        final_owner: OWNER.to_string(),
    }
}

async fn deploy(h: &Harness) -> utoken::DeploymentRecord {
    let deployment = request(&[HUB, LEAF]).validate().expect("valid request");
    h.orchestrator().run(deployment).await.expect("pipeline runs")
}

#[tokio::test]
async fn scenario_a_happy_path_completes() {
    let h = Harness::new();
    let record = deploy(&h).await;

    assert_eq!(record.overall_status(), DeploymentStatus::Completed, "completed");
    assert_eq!(
        record.verification_summary(),
        Some(VerificationSummary::AllVerified),
        "all verified"
    );
    for chain in record.chains() {
        assert_eq!(chain.deployment_status, ChainDeploymentStatus::Success, "{}", chain.chain_id);
        assert_eq!(chain.verification_status, VerificationStatus::Verified, "{}", chain.chain_id);
        assert!(chain.ownership_transferred, "{} handed over", chain.chain_id);
    }
    assert_eq!(
        record.chain(LEAF).expect("leaf").link_status,
        LinkStatus::Linked,
        "both directions linked"
    );
    assert_eq!(h.hub.count("setConnectedContract(uint256,address)"), 1, "hub side");
    assert_eq!(h.leaf.count("setZetaChainContract(address)"), 1, "leaf side");

    let hub_address = record.hub_contract_address().expect("hub deployed");
    assert_eq!(h.hub.owner_of(hub_address), Some(OWNER), "final owner owns hub");
    assert_eq!(h.hub.balance_of(hub_address), U256::ZERO, "service balance moved");
    assert!(record.error_message().is_none(), "no errors");

    let stored = h.store.load(&record.id).expect("load").expect("persisted");
    assert_eq!(stored, record, "final snapshot persisted");
}

#[tokio::test]
async fn scenario_b_leaf_failure_halts_after_retry_budget() {
    let h = Harness::new();
    h.leaf.deploy_broken.store(true, Ordering::SeqCst);
    let record = deploy(&h).await;

    assert_eq!(h.leaf.deploys.load(Ordering::SeqCst), 3, "MAX_RETRIES + 1 attempts");
    assert_eq!(record.overall_status(), DeploymentStatus::Failed, "halted");
    assert!(record.hub_contract_address().is_some(), "hub work is kept");

    let leaf = record.chain(LEAF).expect("leaf");
    assert_eq!(leaf.deployment_status, ChainDeploymentStatus::Failed, "leaf failed");
    assert_eq!(leaf.verification_status, VerificationStatus::Skipped, "never verified");
    assert_eq!(leaf.deploy_attempts, 3, "attempts recorded");
    let message = record.error_message().expect("error text");
    assert!(
        message.contains("leaf deployment") && message.contains("11155111"),
        "names step and chain: {message}"
    );
    assert_eq!(h.verifier.submissions(HUB), 0, "pipeline stopped before verification");
}

#[tokio::test]
async fn scenario_c_verification_timeout_is_not_fatal() {
    let h = Harness::new().with_failing_verification(LEAF);
    let record = deploy(&h).await;

    assert_eq!(record.overall_status(), DeploymentStatus::Completed, "still completes");
    assert_eq!(
        record.verification_summary(),
        Some(VerificationSummary::IssuesFound),
        "issues noted"
    );
    let leaf = record.chain(LEAF).expect("leaf");
    assert_eq!(leaf.verification_status, VerificationStatus::Failed, "leaf not verified");
    assert!(leaf.verification_error.is_some(), "reason kept");
    assert!(
        h.store
            .history()
            .iter()
            .any(|r| r.overall_status() == DeploymentStatus::VerificationIssues),
        "verification_issues was surfaced"
    );
}

#[tokio::test]
async fn scenario_d_ownership_failure_fails_the_deployment() {
    let h = Harness::new();
    h.hub.revert(IHubToken::transferOwnershipCall::SIGNATURE, true);
    let record = deploy(&h).await;

    assert_eq!(record.overall_status(), DeploymentStatus::Failed, "final gate");
    for chain in record.chains() {
        assert!(chain.is_deployed(), "{} deployed", chain.chain_id);
        assert_eq!(chain.verification_status, VerificationStatus::Verified, "{}", chain.chain_id);
    }
    assert_eq!(
        h.hub.count(IHubToken::transferOwnershipCall::SIGNATURE),
        1,
        "reverts are not retried"
    );
    let message = record.error_message().expect("error text");
    assert!(message.contains("ownership transfer"), "names the step: {message}");
}

#[tokio::test]
async fn hub_deploys_before_any_leaf() {
    let h = Harness::new();
    deploy(&h).await;

    assert_eq!(*h.journal.lock().unwrap(), [HUB, LEAF], "hub first");
    for snapshot in h.store.history() {
        let leaf_done = snapshot.leaves().any(|c| c.is_deployed());
        assert!(!leaf_done || snapshot.hub().is_deployed(), "leaf never precedes hub");
        for chain in snapshot.chains() {
            if chain.verification_status != VerificationStatus::Pending {
                assert!(
                    chain.is_deployed() || chain.verification_status == VerificationStatus::Skipped,
                    "verification only after deployment"
                );
            }
        }
    }
}

#[tokio::test]
async fn hub_failure_stops_everything() {
    let h = Harness::new();
    h.hub.deploy_broken.store(true, Ordering::SeqCst);
    let record = deploy(&h).await;

    assert_eq!(record.overall_status(), DeploymentStatus::Failed, "failed");
    assert_eq!(record.hub_contract_address(), None, "no hub");
    assert_eq!(h.leaf.deploys.load(Ordering::SeqCst), 0, "no leaf without a hub");
    assert!(
        record.error_message().expect("error").contains("hub deployment"),
        "names the step"
    );
}

#[tokio::test]
async fn continue_policy_ends_partial() {
    let mut h = Harness::new();
    h.policy = LeafFailurePolicy::Continue;
    h.leaf.deploy_broken.store(true, Ordering::SeqCst);
    let record = deploy(&h).await;

    assert_eq!(record.overall_status(), DeploymentStatus::Partial, "partial");
    assert!(record.hub().ownership_transferred, "hub handed over");
    assert!(record.error_message().is_some(), "leaf failure recorded");
}

#[tokio::test]
async fn linking_failures_are_best_effort() {
    let h = Harness::new();
    h.leaf
        .flaky
        .lock()
        .unwrap()
        .insert("setZetaChainContract(address)");
    let record = deploy(&h).await;

    assert_eq!(h.leaf.count("setZetaChainContract(address)"), 3, "link retry budget");
    assert_eq!(
        record.chain(LEAF).expect("leaf").link_status,
        LinkStatus::Failed,
        "link failure recorded"
    );
    assert_eq!(record.overall_status(), DeploymentStatus::Completed, "not fatal");
}

#[tokio::test]
async fn resume_reuses_contracts_and_verifications() {
    let h = Harness::new();
    h.hub.revert(IHubToken::transferOwnershipCall::SIGNATURE, true);
    let failed = deploy(&h).await;
    assert_eq!(failed.overall_status(), DeploymentStatus::Failed, "first run failed");

    h.hub.revert(IHubToken::transferOwnershipCall::SIGNATURE, false);
    let resumed = h.orchestrator().resume(&failed.id).await.expect("resumes");

    assert_eq!(resumed.overall_status(), DeploymentStatus::Completed, "completed");
    assert_eq!(resumed.hub_contract_address(), failed.hub_contract_address(), "same hub");
    assert_eq!(h.hub.deploys.load(Ordering::SeqCst), 1, "hub not redeployed");
    assert_eq!(h.leaf.deploys.load(Ordering::SeqCst), 1, "leaf not redeployed");
    assert_eq!(h.verifier.submissions(HUB), 1, "hub not re-verified");
    assert_eq!(h.verifier.submissions(LEAF), 1, "leaf not re-verified");
    assert_eq!(
        h.leaf.count(IHubToken::transferOwnershipCall::SIGNATURE),
        1,
        "leaf handed over once"
    );

    let again = h.orchestrator().resume(&failed.id).await.expect("no-op");
    assert_eq!(again, resumed, "completed records are left alone");
}

#[tokio::test]
async fn resume_redeploys_only_failed_leaves() {
    let h = Harness::new();
    h.leaf.deploy_broken.store(true, Ordering::SeqCst);
    let failed = deploy(&h).await;

    h.leaf.deploy_broken.store(false, Ordering::SeqCst);
    let resumed = h.orchestrator().resume(&failed.id).await.expect("resumes");

    assert_eq!(resumed.overall_status(), DeploymentStatus::Completed, "completed");
    assert_eq!(h.hub.deploys.load(Ordering::SeqCst), 1, "hub reused");
    assert_eq!(resumed.chain(LEAF).expect("leaf").deploy_attempts, 4, "3 failed + 1 ok");
    assert!(resumed.error_message().is_some(), "history of the first failure kept");
}

#[tokio::test]
async fn resume_refuses_leaves_the_handed_over_hub_cannot_link() {
    let mut h = Harness::new();
    h.policy = LeafFailurePolicy::Continue;
    h.leaf.deploy_broken.store(true, Ordering::SeqCst);
    let partial = deploy(&h).await;
    assert_eq!(partial.overall_status(), DeploymentStatus::Partial, "partial");

    h.leaf.deploy_broken.store(false, Ordering::SeqCst);
    let err = h
        .orchestrator()
        .resume(&partial.id)
        .await
        .expect_err("hub already belongs to the final owner");

    assert!(matches!(err, Error::Configuration(_)), "{err}");
    assert!(err.to_string().contains("11155111"), "names the leaf: {err}");
    assert_eq!(h.leaf.deploys.load(Ordering::SeqCst), 3, "no leaf redeployed");
    assert_eq!(
        h.hub.count("setConnectedContract(uint256,address)"),
        0,
        "hub never asked to link"
    );
    let stored = h.store.load(&partial.id).expect("load").expect("persisted");
    assert_eq!(stored, partial, "record left untouched");
}

#[tokio::test]
async fn hand_over_retries_transient_view_failures() {
    let h = Harness::new();
    h.hub.flaky_views.lock().unwrap().extend([
        (IHubToken::ownerCall::SIGNATURE, 1),
        (IHubToken::balanceOfCall::SIGNATURE, 1),
    ]);
    let deployment = request(&[HUB]).validate().expect("valid request");
    let record = h.orchestrator().run(deployment).await.expect("runs");

    assert_eq!(record.overall_status(), DeploymentStatus::Completed, "completed");
    assert!(record.hub().ownership_transferred, "handed over");
    let hub_address = record.hub_contract_address().expect("hub deployed");
    assert_eq!(h.hub.owner_of(hub_address), Some(OWNER), "final owner owns hub");
    assert_eq!(h.hub.balance_of(hub_address), U256::ZERO, "balance moved");
}

#[tokio::test]
async fn preflight_failures_create_no_record() {
    let mut h = Harness::new();
    h.missing_artifacts = true;
    let deployment = request(&[HUB, LEAF]).validate().expect("valid request");
    let err = h.orchestrator().run(deployment).await.expect_err("missing artifacts");

    assert!(matches!(err, Error::Configuration(_)), "{err}");
    assert!(h.store.list().expect("list").is_empty(), "nothing persisted");
    assert_eq!(h.hub.deploys.load(Ordering::SeqCst), 0, "no chain touched");
}

#[tokio::test]
async fn hub_only_deployment_completes() {
    let h = Harness::new();
    let deployment = request(&[HUB]).validate().expect("valid request");
    let record = h.orchestrator().run(deployment).await.expect("runs");

    assert_eq!(record.overall_status(), DeploymentStatus::Completed, "completed");
    assert_eq!(record.chains().count(), 1, "one chain");
    assert_eq!(h.leaf.deploys.load(Ordering::SeqCst), 0, "leaf untouched");
}

#[tokio::test]
async fn single_verification_requests_go_through_the_verifier() {
    let verifier = MockVerifier::default();
    let request = utoken_deployer::request::VerifyRequest {
        contract_address: Address::repeat_byte(0xc1).to_string(),
        chain_id: LEAF.to_string(),
        contract_type: "leaf".into(),
    };
    let outcome = utoken_deployer::verify::verify_contract(&verifier, &request)
        .await
        .expect("valid request");
    assert_eq!(outcome.status, VerificationState::Verified, "verified");
    assert_eq!(verifier.submissions(LEAF), 1, "one submission");
}

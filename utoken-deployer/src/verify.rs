//! Block explorer source verification.
//!
//! Two dialects are spoken, selected by [`VerifierKind`]:
//!
//! - Etherscan family: submit returns a GUID, then `checkverifystatus` is
//!   polled until it passes, fails, or the poll budget runs out.
//! - Blockscout: the submission answer is authoritative; acceptance is
//!   confirmed by polling `getsourcecode` with the same budget.
//!
//! Both dialects first ask whether the source is already published, so
//! verifying twice never re-submits nor downgrades a verified contract.
//! Failures are returned as [`VerificationState::Failed`] outcomes, never as
//! errors.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alloy::hex;
use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use serde::Deserialize;
use utoken::{ContractKind, Error, Result, VerificationOutcome, VerificationState};

use crate::artifacts::ArtifactSource;
use crate::chains::{ChainConfig, VerifierKind};
use crate::config::Config;
use crate::request::VerifyRequest;

/// Per-request timeout for explorer HTTP calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One contract to verify.
#[derive(Debug, Clone, Copy)]
pub struct VerificationRequest<'a> {
    /// Chain the contract lives on.
    pub chain: &'a ChainConfig,
    /// Contract address.
    pub address: Address,
    /// Which contract source to submit.
    pub kind: ContractKind,
    /// ABI-encoded constructor arguments, when known.
    pub constructor_args: Option<&'a Bytes>,
}

/// Source verification against a chain's block explorer.
#[async_trait]
pub trait Verifier: Send + Sync + fmt::Debug {
    /// Verify one contract and resolve to a terminal outcome.
    async fn verify(&self, request: VerificationRequest<'_>) -> VerificationOutcome;
}

/// Verify one already-deployed contract outside any deployment.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the request is malformed; explorer
/// failures are reported in the outcome instead.
pub async fn verify_contract(
    verifier: &dyn Verifier,
    request: &VerifyRequest,
) -> Result<VerificationOutcome> {
    let target = request.validate()?;
    tracing::info!(
        chain_id = target.chain.chain_id(),
        address = %target.address,
        kind = %target.kind,
        "verifying single contract"
    );
    Ok(verifier
        .verify(VerificationRequest {
            chain: target.chain,
            address: target.address,
            kind: target.kind,
            constructor_args: None,
        })
        .await)
}

/// Generic explorer API envelope: `{status, message, result}`.
#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: serde_json::Value,
}

impl ExplorerResponse {
    fn result_text(&self) -> String {
        match &self.result {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => self.message.clone(),
            other => other.to_string(),
        }
    }

    fn accepted(&self) -> bool {
        self.status == "1" || self.message == "OK"
    }
}

/// How the explorer answered a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SubmitAnswer {
    /// Queued; Etherscan hands back a GUID to poll.
    Accepted(String),
    /// Source was already published.
    AlreadyVerified,
    /// Rejected with the explorer's explanation.
    Rejected(String),
}

fn classify_submit(resp: &ExplorerResponse) -> SubmitAnswer {
    let text = resp.result_text();
    if is_already_verified(&text) || is_already_verified(&resp.message) {
        SubmitAnswer::AlreadyVerified
    } else if resp.accepted() {
        SubmitAnswer::Accepted(text)
    } else {
        SubmitAnswer::Rejected(text)
    }
}

/// How the explorer answered a status check.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PollAnswer {
    Verified,
    Pending,
    Failed(String),
}

fn classify_poll(resp: &ExplorerResponse) -> PollAnswer {
    let text = resp.result_text();
    let lower = text.to_ascii_lowercase();
    if lower.contains("pending in queue") || lower.contains("in progress") {
        PollAnswer::Pending
    } else if lower.starts_with("pass") || is_already_verified(&text) {
        PollAnswer::Verified
    } else {
        PollAnswer::Failed(text)
    }
}

fn is_already_verified(text: &str) -> bool {
    text.to_ascii_lowercase().contains("already verified")
}

/// Whether a `getsourcecode` answer shows published source.
fn has_published_source(resp: &ExplorerResponse) -> bool {
    resp.result
        .as_array()
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.get("SourceCode"))
        .and_then(serde_json::Value::as_str)
        .is_some_and(|source| !source.trim().is_empty())
}

/// Explorer calls the verification loop is built from.
#[async_trait]
trait ExplorerApi: Send + Sync {
    /// Whether `getsourcecode` already shows published source.
    async fn is_verified(&self, chain: &ChainConfig, address: Address) -> Result<bool>;

    async fn submit(&self, request: VerificationRequest<'_>) -> Result<SubmitAnswer>;

    /// Etherscan `checkverifystatus` for a submission GUID.
    async fn check_status(&self, chain: &ChainConfig, guid: &str) -> Result<PollAnswer>;

    fn has_api_key(&self, chain_id: u64) -> bool;
}

/// Status polling budget after a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PollBudget {
    interval: Duration,
    max_polls: u32,
}

/// [`ExplorerApi`] over HTTP.
#[derive(Debug, Clone)]
struct HttpExplorer {
    http: reqwest::Client,
    sources: Arc<dyn ArtifactSource>,
    config: Arc<Config>,
}

impl HttpExplorer {
    async fn call(
        &self,
        chain: &ChainConfig,
        request: reqwest::RequestBuilder,
    ) -> Result<ExplorerResponse> {
        let chain_id = chain.chain_id();
        let fail = |e: reqwest::Error| Error::Verification {
            chain_id,
            message: e.to_string(),
        };
        request
            .send()
            .await
            .map_err(fail)?
            .error_for_status()
            .map_err(fail)?
            .json()
            .await
            .map_err(fail)
    }

    /// Common query parameters: API key and, for Etherscan v2, chain ID.
    fn base_query(&self, chain: &ChainConfig) -> Vec<(&'static str, String)> {
        let mut query = vec![("chainid", chain.chain_id().to_string())];
        if let Some(key) = self.config.explorer_key_for(chain.chain_id()) {
            query.push(("apikey", key));
        }
        query
    }
}

#[async_trait]
impl ExplorerApi for HttpExplorer {
    async fn is_verified(&self, chain: &ChainConfig, address: Address) -> Result<bool> {
        let address = address.to_string();
        let request = self
            .http
            .get(chain.explorer_api_url())
            .query(&self.base_query(chain))
            .query(&[
                ("module", "contract"),
                ("action", "getsourcecode"),
                ("address", address.as_str()),
            ]);
        Ok(has_published_source(&self.call(chain, request).await?))
    }

    async fn submit(&self, request: VerificationRequest<'_>) -> Result<SubmitAnswer> {
        let chain = request.chain;
        let bundle = self.sources.sources(request.kind)?;
        if !bundle.missing.is_empty() {
            tracing::warn!(
                chain_id = chain.chain_id(),
                missing = bundle.missing.len(),
                "submitting source bundle with unresolved imports"
            );
        }
        let input = bundle.standard_json(&self.config.compiler);
        let form = [
            ("module", "contract".to_owned()),
            ("action", "verifysourcecode".to_owned()),
            ("contractaddress", request.address.to_string()),
            ("sourceCode", input.to_string()),
            ("codeformat", "solidity-standard-json-input".to_owned()),
            ("contractname", request.kind.qualified_name()),
            ("compilerversion", self.config.compiler.version.clone()),
            (
                "constructorArguements",
                request.constructor_args.map(hex::encode).unwrap_or_default(),
            ),
        ];
        let http = self
            .http
            .post(chain.explorer_api_url())
            .query(&self.base_query(chain))
            .form(&form);
        Ok(classify_submit(&self.call(chain, http).await?))
    }

    async fn check_status(&self, chain: &ChainConfig, guid: &str) -> Result<PollAnswer> {
        let request = self
            .http
            .get(chain.explorer_api_url())
            .query(&self.base_query(chain))
            .query(&[
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ]);
        Ok(classify_poll(&self.call(chain, request).await?))
    }

    fn has_api_key(&self, chain_id: u64) -> bool {
        self.config.explorer_key_for(chain_id).is_some()
    }
}

/// Pre-check, submit, then poll until a terminal answer or the budget
/// runs out.
async fn run_verification(
    api: &dyn ExplorerApi,
    request: VerificationRequest<'_>,
    budget: PollBudget,
) -> Result<VerificationOutcome> {
    let chain = request.chain;
    let chain_id = chain.chain_id();
    let url = chain.contract_url(request.address);

    match api.is_verified(chain, request.address).await {
        Ok(true) => {
            tracing::info!(chain_id, address = %request.address, "already verified");
            return Ok(VerificationOutcome::verified(url));
        }
        Ok(false) => {}
        Err(e) => tracing::warn!(chain_id, error = %e, "verification pre-check failed"),
    }

    if chain.verifier == VerifierKind::Etherscan && !api.has_api_key(chain_id) {
        return Err(Error::config(format!(
            "no explorer API key configured for chain {chain_id}"
        )));
    }

    let ticket = match api.submit(request).await? {
        SubmitAnswer::AlreadyVerified => return Ok(VerificationOutcome::verified(url)),
        SubmitAnswer::Rejected(reason) => return Ok(VerificationOutcome::failed(reason)),
        SubmitAnswer::Accepted(ticket) => ticket,
    };
    tracing::info!(chain_id, address = %request.address, verifier = %chain.verifier, "source submitted");

    for attempt in 1..=budget.max_polls {
        tokio::time::sleep(budget.interval).await;
        let answer = match chain.verifier {
            VerifierKind::Etherscan => api.check_status(chain, &ticket).await?,
            VerifierKind::Blockscout => {
                if api.is_verified(chain, request.address).await? {
                    PollAnswer::Verified
                } else {
                    PollAnswer::Pending
                }
            }
        };
        match answer {
            PollAnswer::Verified => return Ok(VerificationOutcome::verified(url)),
            PollAnswer::Failed(reason) => return Ok(VerificationOutcome::failed(reason)),
            PollAnswer::Pending => {
                tracing::debug!(chain_id, attempt, "verification pending");
            }
        }
    }

    let timeout = Error::VerificationTimeout {
        chain_id,
        attempts: budget.max_polls,
    };
    Ok(match chain.verifier {
        VerifierKind::Etherscan => VerificationOutcome::failed(timeout.to_string()),
        VerifierKind::Blockscout => VerificationOutcome::pending(url, timeout.to_string()),
    })
}

/// [`Verifier`] talking to Etherscan-family and Blockscout explorers.
#[derive(Debug, Clone)]
pub struct ExplorerVerifier {
    api: HttpExplorer,
    budget: PollBudget,
}

impl ExplorerVerifier {
    /// Verifier packaging sources from `sources`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the HTTP client cannot be built.
    pub fn new(sources: Arc<dyn ArtifactSource>, config: Arc<Config>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("building explorer HTTP client: {e}")))?;
        let budget = PollBudget {
            interval: Duration::from_secs(config.verification.poll_interval_secs),
            max_polls: config.verification.max_polls,
        };
        Ok(Self {
            api: HttpExplorer {
                http,
                sources,
                config,
            },
            budget,
        })
    }
}

#[async_trait]
impl Verifier for ExplorerVerifier {
    async fn verify(&self, request: VerificationRequest<'_>) -> VerificationOutcome {
        let chain_id = request.chain.chain_id();
        let outcome = run_verification(&self.api, request, self.budget)
            .await
            .unwrap_or_else(|e| VerificationOutcome::failed(e.to_string()));
        if outcome.status == VerificationState::Verified {
            tracing::info!(chain_id, address = %request.address, "contract verified");
        } else {
            tracing::warn!(
                chain_id,
                address = %request.address,
                status = ?outcome.status,
                error = outcome.error.as_deref().unwrap_or_default(),
                "contract not verified"
            );
        }
        outcome
    }
}

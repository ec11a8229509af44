//! Single-chain contract deployment and invocation.
//!
//! [`ChainClient`] is the seam between the orchestrator and a chain. The
//! production implementation, [`AlloyChainClient`], signs with the service
//! wallet through an alloy provider; each chain gets its own client and
//! therefore its own nonce sequence.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use alloy::transports::TransportError;
use async_trait::async_trait;
use utoken::{DeployedContract, Error, Result, TxOutcome};

use crate::chains::ChainConfig;
use crate::config::{Config, PRIVATE_KEY_ENV};

/// Contract deployment and invocation on one chain.
#[async_trait]
pub trait ChainClient: Send + Sync + fmt::Debug {
    /// EIP-155 chain ID this client talks to.
    fn chain_id(&self) -> u64;

    /// Address of the signing service wallet.
    fn signer(&self) -> Address;

    /// Deploy `bytecode` with ABI-encoded `constructor_args` and wait for
    /// confirmations.
    async fn deploy_contract(
        &self,
        bytecode: &Bytes,
        constructor_args: &[u8],
    ) -> Result<DeployedContract>;

    /// Send a state-changing call and wait for confirmations. `method` is
    /// the Solidity signature, used for error reporting.
    async fn call_method(&self, contract: Address, method: &str, calldata: Bytes)
    -> Result<TxOutcome>;

    /// Read-only `eth_call`; returns the raw return data.
    async fn call_view(&self, contract: Address, method: &str, calldata: Bytes) -> Result<Bytes>;
}

/// Send a typed call through `client`.
///
/// # Errors
///
/// Propagates [`ChainClient::call_method`] failures.
pub async fn send_call<C: SolCall + Send>(
    client: &dyn ChainClient,
    contract: Address,
    call: C,
) -> Result<TxOutcome> {
    client
        .call_method(contract, C::SIGNATURE, call.abi_encode().into())
        .await
}

/// Run a typed view call through `client` and decode its return value.
///
/// # Errors
///
/// Propagates [`ChainClient::call_view`] failures; undecodable return data
/// is a [`Error::ContractRevert`].
pub async fn read_call<C: SolCall + Send>(
    client: &dyn ChainClient,
    contract: Address,
    call: C,
) -> Result<C::Return> {
    let raw = client
        .call_view(contract, C::SIGNATURE, call.abi_encode().into())
        .await?;
    C::abi_decode_returns(&raw).map_err(|e| Error::ContractRevert {
        chain_id: client.chain_id(),
        method: C::SIGNATURE.to_owned(),
        reason: format!("undecodable return data: {e}"),
    })
}

/// Builds one [`ChainClient`] per chain, all signing with the same wallet.
pub trait ClientFactory: Send + Sync + fmt::Debug {
    /// Address of the service wallet.
    fn service_wallet(&self) -> Address;

    /// Build a client for `chain`. Performs no network I/O.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the chain's RPC URL is unusable.
    fn connect(&self, chain: &ChainConfig) -> Result<Arc<dyn ChainClient>>;
}

/// Gas limit policy applied to every transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPolicy {
    /// Percentage added on top of the RPC estimate.
    pub margin_percent: u64,
    /// Limit used when estimation fails.
    pub fallback_limit: u64,
}

impl GasPolicy {
    /// Gas limit for an estimate, or the fallback when there is none.
    #[must_use]
    pub fn limit_for(&self, estimate: Option<u64>) -> u64 {
        estimate.map_or(self.fallback_limit, |gas| {
            gas.saturating_mul(100 + self.margin_percent) / 100
        })
    }
}

/// [`ChainClient`] backed by an alloy HTTP provider with a local signer.
#[derive(Clone)]
pub struct AlloyChainClient {
    chain_id: u64,
    signer: Address,
    provider: DynProvider,
    gas: GasPolicy,
    confirmations: u64,
    receipt_timeout: Option<Duration>,
}

impl fmt::Debug for AlloyChainClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlloyChainClient")
            .field("chain_id", &self.chain_id)
            .field("signer", &self.signer)
            .field("confirmations", &self.confirmations)
            .finish_non_exhaustive()
    }
}

impl AlloyChainClient {
    /// Connect to `rpc_url`, signing with `signer`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `rpc_url` is not a valid URL.
    pub fn new(
        chain_id: u64,
        rpc_url: &str,
        signer: PrivateKeySigner,
        gas: GasPolicy,
        confirmations: u64,
        receipt_timeout: Option<Duration>,
    ) -> Result<Self> {
        let url = rpc_url
            .parse()
            .map_err(|e| Error::config(format!("invalid RPC URL `{rpc_url}` for chain {chain_id}: {e}")))?;
        let address = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();
        Ok(Self {
            chain_id,
            signer: address,
            provider,
            gas,
            confirmations: confirmations.max(1),
            receipt_timeout,
        })
    }

    /// Classify a provider error: simulation reverts are permanent,
    /// everything else is transient.
    fn classify(&self, method: &str, err: &TransportError) -> Error {
        let reverted = err
            .as_error_resp()
            .is_some_and(|resp| resp.as_revert_data().is_some() || resp.message.contains("revert"));
        if reverted {
            Error::ContractRevert {
                chain_id: self.chain_id,
                method: method.to_owned(),
                reason: err.to_string(),
            }
        } else {
            Error::rpc(self.chain_id, format!("{method}: {err}"))
        }
    }

    /// Estimate gas, falling back to the fixed ceiling when estimation
    /// fails for any reason other than a revert.
    async fn gas_limit(&self, tx: &TransactionRequest, method: &str) -> Result<u64> {
        match self.provider.estimate_gas(tx.clone()).await {
            Ok(estimate) => Ok(self.gas.limit_for(Some(estimate))),
            Err(e) => match self.classify(method, &e) {
                revert @ Error::ContractRevert { .. } => Err(revert),
                _ => {
                    tracing::warn!(
                        chain_id = self.chain_id,
                        method,
                        fallback = self.gas.fallback_limit,
                        error = %e,
                        "gas estimation failed, using fallback limit"
                    );
                    Ok(self.gas.limit_for(None))
                }
            },
        }
    }

    /// Sign, send and wait for `tx`; reverted receipts are transient errors.
    async fn submit(&self, mut tx: TransactionRequest, method: &str) -> Result<(TxOutcome, Option<Address>)> {
        let gas = self.gas_limit(&tx, method).await?;
        tx.set_gas_limit(gas);

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| self.classify(method, &e))?;
        let tx_hash = *pending.tx_hash();
        tracing::debug!(chain_id = self.chain_id, method, %tx_hash, gas, "transaction sent");

        let receipt = pending
            .with_required_confirmations(self.confirmations)
            .with_timeout(self.receipt_timeout)
            .get_receipt()
            .await
            .map_err(|e| Error::rpc(self.chain_id, format!("{method}: waiting for {tx_hash}: {e}")))?;

        if !receipt.status() {
            return Err(Error::rpc(
                self.chain_id,
                format!("{method}: transaction {tx_hash} reverted"),
            ));
        }
        let outcome = TxOutcome {
            tx_hash,
            block_number: receipt.block_number.unwrap_or_default(),
        };
        Ok((outcome, receipt.contract_address))
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn signer(&self) -> Address {
        self.signer
    }

    async fn deploy_contract(
        &self,
        bytecode: &Bytes,
        constructor_args: &[u8],
    ) -> Result<DeployedContract> {
        let mut code = bytecode.to_vec();
        code.extend_from_slice(constructor_args);
        let tx = TransactionRequest::default()
            .with_from(self.signer)
            .with_deploy_code(code);

        let (outcome, address) = self.submit(tx, "constructor").await?;
        let address = address.ok_or_else(|| {
            Error::rpc(
                self.chain_id,
                format!("receipt for {} has no contract address", outcome.tx_hash),
            )
        })?;
        tracing::info!(chain_id = self.chain_id, %address, tx_hash = %outcome.tx_hash, "contract deployed");
        Ok(DeployedContract {
            address,
            tx_hash: outcome.tx_hash,
            block_number: outcome.block_number,
        })
    }

    async fn call_method(
        &self,
        contract: Address,
        method: &str,
        calldata: Bytes,
    ) -> Result<TxOutcome> {
        let tx = TransactionRequest::default()
            .with_from(self.signer)
            .with_to(contract)
            .with_input(calldata);
        let (outcome, _) = self.submit(tx, method).await?;
        tracing::info!(chain_id = self.chain_id, %contract, method, tx_hash = %outcome.tx_hash, "call confirmed");
        Ok(outcome)
    }

    async fn call_view(&self, contract: Address, method: &str, calldata: Bytes) -> Result<Bytes> {
        let tx = TransactionRequest::default()
            .with_to(contract)
            .with_input(calldata);
        self.provider
            .call(tx)
            .await
            .map_err(|e| self.classify(method, &e))
    }
}

/// Builds [`AlloyChainClient`]s from configuration and the service key.
#[derive(Clone)]
pub struct AlloyClientFactory {
    signer: PrivateKeySigner,
    config: Arc<Config>,
}

impl fmt::Debug for AlloyClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlloyClientFactory")
            .field("service_wallet", &self.signer.address())
            .finish_non_exhaustive()
    }
}

impl AlloyClientFactory {
    /// Factory signing with `signer`.
    #[must_use]
    pub const fn new(signer: PrivateKeySigner, config: Arc<Config>) -> Self {
        Self { signer, config }
    }

    /// Factory signing with the key in `DEPLOYER_PRIVATE_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the variable is unset or is not a
    /// valid private key.
    pub fn from_env(config: Arc<Config>) -> Result<Self> {
        let raw = std::env::var(PRIVATE_KEY_ENV)
            .map_err(|_| Error::config(format!("{PRIVATE_KEY_ENV} is not set")))?;
        let signer: PrivateKeySigner = raw
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("{PRIVATE_KEY_ENV} is not a valid private key")))?;
        Ok(Self::new(signer, config))
    }
}

impl ClientFactory for AlloyClientFactory {
    fn service_wallet(&self) -> Address {
        self.signer.address()
    }

    fn connect(&self, chain: &ChainConfig) -> Result<Arc<dyn ChainClient>> {
        let gas = GasPolicy {
            margin_percent: self.config.deploy.gas_margin_percent,
            fallback_limit: self.config.deploy.fallback_gas_limit,
        };
        let client = AlloyChainClient::new(
            chain.chain_id(),
            &self.config.rpc_for(chain),
            self.signer.clone(),
            gas,
            self.config.confirmations_for(chain),
            self.config.receipt_timeout(),
        )?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains;

    #[test]
    fn gas_margin_applies_to_estimates_only() {
        let gas = GasPolicy {
            margin_percent: 25,
            fallback_limit: 5_000_000,
        };
        assert_eq!(gas.limit_for(Some(1_000_000)), 1_250_000, "25% margin");
        assert_eq!(gas.limit_for(None), 5_000_000, "fallback ceiling");
    }

    #[test]
    fn factory_builds_clients_without_network_io() {
        let factory = AlloyClientFactory::new(
            PrivateKeySigner::random(),
            Arc::new(Config::default()),
        );
        let sepolia = chains::by_chain_id(11_155_111).expect("registered");
        let client = factory.connect(sepolia).expect("valid default rpc");
        assert_eq!(client.chain_id(), 11_155_111, "chain id");
        assert_eq!(client.signer(), factory.service_wallet(), "same wallet");
    }

    #[test]
    fn invalid_rpc_is_a_configuration_error() {
        let err = AlloyChainClient::new(
            1,
            "not a url",
            PrivateKeySigner::random(),
            GasPolicy {
                margin_percent: 20,
                fallback_limit: 1,
            },
            1,
            None,
        )
        .expect_err("bad url");
        assert!(matches!(err, Error::Configuration(_)), "{err}");
    }
}

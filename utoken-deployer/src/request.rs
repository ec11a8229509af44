//! Inbound request shapes and their validation.
//!
//! Validation happens before any chain interaction and before a
//! [`utoken::DeploymentRecord`] exists, so a rejected request leaves no
//! trace behind.

use std::collections::HashSet;
use std::sync::LazyLock;

use alloy::primitives::{Address, U256};
use regex::Regex;
use serde::Deserialize;
use utoken::{ContractKind, Error, Result, TokenParams};

use crate::chains::{self, ChainConfig};

static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^0x[a-fA-F0-9]{40}$").expect("address pattern is a valid regex"));

/// Highest accepted `decimals` value.
pub const MAX_DECIMALS: u32 = 18;

/// Token deployment request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    /// Token name.
    pub token_name: String,
    /// Token ticker.
    pub token_symbol: String,
    /// Decimal places.
    pub decimals: u32,
    /// Supply in the smallest unit, as a base-10 string.
    pub total_supply: String,
    /// Chain IDs as strings; must contain exactly one hub.
    pub selected_chains: Vec<String>,
    /// Final owner of every contract and of the supply.
    #[serde(alias = "deployerAddress")]
    pub final_owner: String,
}

/// A [`DeployRequest`] that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedDeployment {
    /// Token parameters.
    pub token: TokenParams,
    /// Selected chains, hub first, then leaves in request order.
    pub chains: Vec<&'static ChainConfig>,
    /// Final owner.
    pub final_owner: Address,
}

impl DeployRequest {
    /// Check every field and resolve chains against the registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<ValidatedDeployment> {
        let name = self.token_name.trim();
        if name.is_empty() {
            return Err(Error::validation("tokenName must not be empty"));
        }
        let symbol = self.token_symbol.trim();
        if symbol.is_empty() {
            return Err(Error::validation("tokenSymbol must not be empty"));
        }
        let decimals = u8::try_from(self.decimals)
            .ok()
            .filter(|d| u32::from(*d) <= MAX_DECIMALS)
            .ok_or_else(|| {
                Error::validation(format!(
                    "decimals must be between 0 and {MAX_DECIMALS}, got {}",
                    self.decimals
                ))
            })?;
        let total_supply = parse_supply(&self.total_supply)?;
        let final_owner = parse_address("finalOwner", &self.final_owner)?;
        let chains = resolve_chains(&self.selected_chains)?;

        Ok(ValidatedDeployment {
            token: TokenParams {
                name: name.to_owned(),
                symbol: symbol.to_owned(),
                decimals,
                total_supply,
            },
            chains,
            final_owner,
        })
    }
}

/// Single-contract verification request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Contract address.
    pub contract_address: String,
    /// Chain ID as a string.
    pub chain_id: String,
    /// `hub` or `leaf`.
    pub contract_type: String,
}

/// A [`VerifyRequest`] that passed validation.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedVerify {
    /// Chain the contract lives on.
    pub chain: &'static ChainConfig,
    /// Contract address.
    pub address: Address,
    /// Contract kind.
    pub kind: ContractKind,
}

impl VerifyRequest {
    /// Check every field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the offending field.
    pub fn validate(&self) -> Result<ValidatedVerify> {
        let address = parse_address("contractAddress", &self.contract_address)?;
        let chain = parse_chain(&self.chain_id)?;
        let kind: ContractKind = self.contract_type.parse()?;
        if kind == ContractKind::Hub && !chain.is_hub() {
            return Err(Error::validation(format!(
                "hub contracts only live on ZetaChain, not {}",
                chain.network
            )));
        }
        Ok(ValidatedVerify {
            chain,
            address,
            kind,
        })
    }
}

fn parse_supply(raw: &str) -> Result<U256> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::validation(format!(
            "totalSupply must be a base-10 integer string, got `{raw}`"
        )));
    }
    U256::from_str_radix(raw, 10)
        .map_err(|e| Error::validation(format!("totalSupply `{raw}` is out of range: {e}")))
}

fn parse_address(field: &str, raw: &str) -> Result<Address> {
    if !ADDRESS_RE.is_match(raw) {
        return Err(Error::validation(format!(
            "{field} must be a 0x-prefixed 20-byte hex address, got `{raw}`"
        )));
    }
    raw.parse()
        .map_err(|e| Error::validation(format!("{field} `{raw}`: {e}")))
}

fn parse_chain(raw: &str) -> Result<&'static ChainConfig> {
    let id: u64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::validation(format!("`{raw}` is not a chain ID")))?;
    chains::by_chain_id(id).ok_or_else(|| Error::validation(format!("chain {id} is not supported")))
}

fn resolve_chains(raw: &[String]) -> Result<Vec<&'static ChainConfig>> {
    if raw.is_empty() {
        return Err(Error::validation("selectedChains must not be empty"));
    }
    let mut seen = HashSet::new();
    let mut hubs = Vec::new();
    let mut leaves = Vec::new();
    for entry in raw {
        let chain = parse_chain(entry)?;
        if !seen.insert(chain.chain_id()) {
            return Err(Error::validation(format!(
                "chain {} selected twice",
                chain.chain_id()
            )));
        }
        if chain.is_hub() {
            hubs.push(chain);
        } else {
            leaves.push(chain);
        }
    }
    let hub = match hubs.as_slice() {
        [only] => *only,
        other => {
            return Err(Error::validation(format!(
                "selectedChains must include exactly one ZetaChain hub, got {}",
                other.len()
            )));
        }
    };
    let testnet = hub.network.is_testnet();
    if let Some(odd) = leaves.iter().find(|c| c.network.is_testnet() != testnet) {
        return Err(Error::validation(format!(
            "{} cannot be combined with hub {}: mainnets and testnets do not mix",
            odd.network, hub.network
        )));
    }
    Ok(std::iter::once(hub).chain(leaves).collect())
}

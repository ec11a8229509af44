//! Core domain types for Universal Token deployments.
//!
//! These model the token parameters captured at request intake and the
//! results reported back by chain and explorer collaborators.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Serialize a `U256` as a base-10 string.
fn serialize_u256_decimal<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

/// Deserialize a `U256` from either a JSON number or a base-10 string.
fn deserialize_u256_decimal<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNum {
        Num(u64),
        Str(String),
    }
    match StringOrNum::deserialize(deserializer)? {
        StringOrNum::Num(n) => Ok(U256::from(n)),
        StringOrNum::Str(s) => {
            U256::from_str_radix(s.trim(), 10).map_err(serde::de::Error::custom)
        }
    }
}

/// Immutable token parameters captured when a deployment is requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenParams {
    /// Token name, e.g. `"Omni Token"`.
    #[serde(rename = "tokenName")]
    pub name: String,

    /// Token ticker, e.g. `"OMNI"`.
    #[serde(rename = "tokenSymbol")]
    pub symbol: String,

    /// Decimal places, 0 through 18.
    pub decimals: u8,

    /// Supply in the smallest unit, minted to the service wallet on the hub.
    #[serde(
        serialize_with = "serialize_u256_decimal",
        deserialize_with = "deserialize_u256_decimal"
    )]
    pub total_supply: U256,
}

/// The two contract flavours of a Universal Token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    /// Canonical contract on the hub chain.
    Hub,
    /// Companion contract on a connected chain.
    Leaf,
}

impl ContractKind {
    /// Solidity contract name of the compiled artifact.
    #[must_use]
    pub const fn contract_name(self) -> &'static str {
        match self {
            Self::Hub => "ZetaChainUniversalToken",
            Self::Leaf => "EVMUniversalToken",
        }
    }

    /// Fully-qualified `path:Name` identifier explorers expect.
    #[must_use]
    pub fn qualified_name(self) -> String {
        let name = self.contract_name();
        format!("contracts/{name}.sol:{name}")
    }

    /// Kind-specific link method that must be present in the ABI.
    #[must_use]
    pub const fn link_method(self) -> &'static str {
        match self {
            Self::Hub => "setConnectedContract",
            Self::Leaf => "setZetaChainContract",
        }
    }
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hub => "hub",
            Self::Leaf => "leaf",
        })
    }
}

impl FromStr for ContractKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hub" | "zetachain" | "zeta" => Ok(Self::Hub),
            "leaf" | "evm" => Ok(Self::Leaf),
            other => Err(Error::validation(format!(
                "unknown contract type `{other}` (expected `hub` or `leaf`)"
            ))),
        }
    }
}

/// A contract creation confirmed on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedContract {
    /// Address of the new contract.
    pub address: Address,
    /// Creation transaction hash.
    pub tx_hash: B256,
    /// Block the creation was mined in.
    pub block_number: u64,
}

/// A confirmed state-changing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOutcome {
    /// Transaction hash.
    pub tx_hash: B256,
    /// Block the transaction was mined in.
    pub block_number: u64,
}

/// Terminal result of one explorer verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    /// Source is published on the explorer.
    Verified,
    /// Submission was accepted but not yet confirmed.
    Pending,
    /// Explorer rejected the source or never answered in time.
    Failed,
}

/// Outcome reported by a verification client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    /// Terminal state.
    pub status: VerificationState,
    /// Explorer page showing the verified source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
    /// Failure text, when not verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationOutcome {
    /// A successful verification.
    #[must_use]
    pub const fn verified(explorer_url: String) -> Self {
        Self {
            status: VerificationState::Verified,
            explorer_url: Some(explorer_url),
            error: None,
        }
    }

    /// An accepted submission still awaiting the explorer.
    #[must_use]
    pub fn pending(explorer_url: String, note: impl Into<String>) -> Self {
        Self {
            status: VerificationState::Pending,
            explorer_url: Some(explorer_url),
            error: Some(note.into()),
        }
    }

    /// A failed verification.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: VerificationState::Failed,
            explorer_url: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_params_use_request_field_names() {
        let json = r#"{"tokenName":"Omni","tokenSymbol":"OMNI","decimals":18,"totalSupply":"1000000000000000000000000"}"#;
        let token: TokenParams = serde_json::from_str(json).expect("valid json");
        assert_eq!(token.name, "Omni", "name");
        assert_eq!(
            token.total_supply,
            U256::from(10u64).pow(U256::from(24u64)),
            "supply parsed as base-10"
        );

        let back = serde_json::to_value(&token).expect("serializes");
        assert_eq!(
            back["totalSupply"], "1000000000000000000000000",
            "supply written as a decimal string"
        );
    }

    #[test]
    fn total_supply_accepts_plain_numbers() {
        let json = r#"{"tokenName":"A","tokenSymbol":"A","decimals":0,"totalSupply":42}"#;
        let token: TokenParams = serde_json::from_str(json).expect("valid json");
        assert_eq!(token.total_supply, U256::from(42u64), "numeric supply");
    }

    #[test]
    fn contract_kind_parsing() {
        assert_eq!("HUB".parse::<ContractKind>().ok(), Some(ContractKind::Hub), "hub");
        assert_eq!("evm".parse::<ContractKind>().ok(), Some(ContractKind::Leaf), "leaf");
        assert!("proxy".parse::<ContractKind>().is_err(), "unknown kind");
        assert_eq!(
            ContractKind::Leaf.qualified_name(),
            "contracts/EVMUniversalToken.sol:EVMUniversalToken",
            "qualified name"
        );
    }
}

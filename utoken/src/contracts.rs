//! Solidity bindings for the Universal Token contracts.
//!
//! Only the methods the deployment pipeline invokes are bound here; full
//! ABIs come from the compiled artifacts at deploy time.

use alloy::primitives::{Address, U256};
use alloy::sol;
use alloy::sol_types::{SolType, sol_data};

use crate::types::TokenParams;

sol! {
    /// Hub contract living on ZetaChain.
    interface IHubToken {
        function owner() external view returns (address);
        function transferOwnership(address newOwner) external;
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function setConnectedContract(uint256 chainId, address contractAddress) external;
    }

    /// Companion contract living on every connected EVM chain.
    interface ILeafToken {
        function owner() external view returns (address);
        function transferOwnership(address newOwner) external;
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function setZetaChainContract(address hub) external;
    }
}

/// Methods every artifact must expose, regardless of kind.
pub const COMMON_METHODS: &[&str] = &["owner", "transferOwnership", "balanceOf", "transfer"];

/// Hub constructor: `(name, symbol, uint8 decimals, uint256 totalSupply, initialOwner)`.
pub type HubConstructor = (
    sol_data::String,
    sol_data::String,
    sol_data::Uint<8>,
    sol_data::Uint<256>,
    sol_data::Address,
);

/// Leaf constructor: `(name, symbol, uint8 decimals, initialOwner)`.
pub type LeafConstructor = (
    sol_data::String,
    sol_data::String,
    sol_data::Uint<8>,
    sol_data::Address,
);

/// ABI-encode the hub constructor arguments.
///
/// The whole supply is minted to `initial_owner`, which is always the
/// service wallet.
#[must_use]
pub fn hub_constructor_args(token: &TokenParams, initial_owner: Address) -> Vec<u8> {
    HubConstructor::abi_encode_params(&(
        token.name.clone(),
        token.symbol.clone(),
        token.decimals,
        token.total_supply,
        initial_owner,
    ))
}

/// ABI-encode the leaf constructor arguments. Leaf contracts mint nothing.
#[must_use]
pub fn leaf_constructor_args(token: &TokenParams, initial_owner: Address) -> Vec<u8> {
    LeafConstructor::abi_encode_params(&(
        token.name.clone(),
        token.symbol.clone(),
        token.decimals,
        initial_owner,
    ))
}

/// Convert a chain ID into the `uint256` the hub link method expects.
#[must_use]
pub fn chain_id_word(chain_id: u64) -> U256 {
    U256::from(chain_id)
}

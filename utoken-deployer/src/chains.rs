//! Static chain registry for Universal Token deployments.
//!
//! Each entry pairs a [`utoken::Network`] variant with the operational
//! metadata the deployer needs: default RPC, block explorer endpoints,
//! which explorer API dialect verifies source, and how many confirmations
//! to wait for.

use std::fmt;

use alloy::primitives::Address;
use utoken::Network;

/// Explorer API dialect used for source verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierKind {
    /// Etherscan-compatible two-phase API (submit, then poll a GUID).
    Etherscan,
    /// Blockscout API; the submission answer is authoritative.
    Blockscout,
}

impl fmt::Display for VerifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Etherscan => "etherscan",
            Self::Blockscout => "blockscout",
        })
    }
}

/// Operational metadata for one supported chain.
#[derive(Debug, Clone, Copy)]
pub struct ChainConfig {
    /// The [`utoken::Network`] variant (chain ID, name, hub flag).
    pub network: Network,
    /// Suggested public RPC endpoint.
    pub default_rpc: &'static str,
    /// Block explorer base URL, without a trailing slash.
    pub explorer_url: &'static str,
    /// Explorer API endpoint. `None` means `<explorer_url>/api`.
    pub explorer_api: Option<&'static str>,
    /// Explorer API dialect.
    pub verifier: VerifierKind,
    /// Default confirmations to wait for after each transaction.
    pub confirmations: u64,
}

impl ChainConfig {
    /// Convenience: the EIP-155 chain ID.
    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        self.network.chain_id()
    }

    /// Convenience: human-readable chain name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.network.name()
    }

    /// Whether this chain hosts the hub contract.
    #[must_use]
    pub const fn is_hub(&self) -> bool {
        self.network.is_hub()
    }

    /// Effective explorer API endpoint.
    #[must_use]
    pub fn explorer_api_url(&self) -> String {
        self.explorer_api.map_or_else(
            || format!("{}/api", self.explorer_url),
            ToOwned::to_owned,
        )
    }

    /// Explorer page showing the source of `address`.
    #[must_use]
    pub fn contract_url(&self, address: Address) -> String {
        match self.verifier {
            VerifierKind::Etherscan => format!("{}/address/{address}#code", self.explorer_url),
            VerifierKind::Blockscout => {
                format!("{}/address/{address}?tab=contract", self.explorer_url)
            }
        }
    }
}

const ETHERSCAN_V2: &str = "https://api.etherscan.io/v2/api";

/// All supported chain configurations (single source of truth).
pub const ALL: &[ChainConfig] = &[
    // Hubs
    ChainConfig {
        network: Network::ZetaChainMainnet,
        default_rpc: "https://zetachain-evm.blockpi.network/v1/rpc/public",
        explorer_url: "https://zetachain.blockscout.com",
        explorer_api: None,
        verifier: VerifierKind::Blockscout,
        confirmations: 1,
    },
    ChainConfig {
        network: Network::ZetaChainAthens,
        default_rpc: "https://zetachain-athens-evm.blockpi.network/v1/rpc/public",
        explorer_url: "https://zetachain-athens.blockscout.com",
        explorer_api: None,
        verifier: VerifierKind::Blockscout,
        confirmations: 1,
    },
    // Mainnets
    ChainConfig {
        network: Network::EthereumMainnet,
        default_rpc: "https://ethereum-rpc.publicnode.com",
        explorer_url: "https://etherscan.io",
        explorer_api: Some(ETHERSCAN_V2),
        verifier: VerifierKind::Etherscan,
        confirmations: 2,
    },
    ChainConfig {
        network: Network::BscMainnet,
        default_rpc: "https://bsc-rpc.publicnode.com",
        explorer_url: "https://bscscan.com",
        explorer_api: Some(ETHERSCAN_V2),
        verifier: VerifierKind::Etherscan,
        confirmations: 2,
    },
    ChainConfig {
        network: Network::PolygonMainnet,
        default_rpc: "https://polygon-rpc.com",
        explorer_url: "https://polygonscan.com",
        explorer_api: Some(ETHERSCAN_V2),
        verifier: VerifierKind::Etherscan,
        confirmations: 2,
    },
    ChainConfig {
        network: Network::BaseMainnet,
        default_rpc: "https://mainnet.base.org",
        explorer_url: "https://base.blockscout.com",
        explorer_api: None,
        verifier: VerifierKind::Blockscout,
        confirmations: 2,
    },
    ChainConfig {
        network: Network::ArbitrumMainnet,
        default_rpc: "https://arb1.arbitrum.io/rpc",
        explorer_url: "https://arbiscan.io",
        explorer_api: Some(ETHERSCAN_V2),
        verifier: VerifierKind::Etherscan,
        confirmations: 2,
    },
    ChainConfig {
        network: Network::AvalancheMainnet,
        default_rpc: "https://api.avax.network/ext/bc/C/rpc",
        explorer_url: "https://snowtrace.io",
        explorer_api: Some("https://api.routescan.io/v2/network/mainnet/evm/43114/etherscan/api"),
        verifier: VerifierKind::Etherscan,
        confirmations: 2,
    },
    // Testnets
    ChainConfig {
        network: Network::EthereumSepolia,
        default_rpc: "https://ethereum-sepolia-rpc.publicnode.com",
        explorer_url: "https://sepolia.etherscan.io",
        explorer_api: Some(ETHERSCAN_V2),
        verifier: VerifierKind::Etherscan,
        confirmations: 2,
    },
    ChainConfig {
        network: Network::BscTestnet,
        default_rpc: "https://bsc-testnet-rpc.publicnode.com",
        explorer_url: "https://testnet.bscscan.com",
        explorer_api: Some(ETHERSCAN_V2),
        verifier: VerifierKind::Etherscan,
        confirmations: 1,
    },
    ChainConfig {
        network: Network::PolygonAmoy,
        default_rpc: "https://rpc-amoy.polygon.technology",
        explorer_url: "https://amoy.polygonscan.com",
        explorer_api: Some(ETHERSCAN_V2),
        verifier: VerifierKind::Etherscan,
        confirmations: 1,
    },
    ChainConfig {
        network: Network::BaseSepolia,
        default_rpc: "https://sepolia.base.org",
        explorer_url: "https://base-sepolia.blockscout.com",
        explorer_api: None,
        verifier: VerifierKind::Blockscout,
        confirmations: 1,
    },
    ChainConfig {
        network: Network::ArbitrumSepolia,
        default_rpc: "https://sepolia-rollup.arbitrum.io/rpc",
        explorer_url: "https://sepolia.arbiscan.io",
        explorer_api: Some(ETHERSCAN_V2),
        verifier: VerifierKind::Etherscan,
        confirmations: 1,
    },
    ChainConfig {
        network: Network::AvalancheFuji,
        default_rpc: "https://api.avax-test.network/ext/bc/C/rpc",
        explorer_url: "https://testnet.snowtrace.io",
        explorer_api: Some("https://api.routescan.io/v2/network/testnet/evm/43113/etherscan/api"),
        verifier: VerifierKind::Etherscan,
        confirmations: 1,
    },
];

/// Look up a [`ChainConfig`] by chain ID.
#[must_use]
pub fn by_chain_id(chain_id: u64) -> Option<&'static ChainConfig> {
    ALL.iter().find(|c| c.chain_id() == chain_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_network_has_exactly_one_entry() {
        for network in Network::ALL {
            let entries = ALL.iter().filter(|c| c.network == *network).count();
            assert_eq!(entries, 1, "{network:?} must appear once");
        }
    }

    #[test]
    fn blockscout_chains_derive_their_api_url() {
        let athens = by_chain_id(7001).expect("athens is registered");
        assert!(athens.is_hub(), "athens hosts the hub");
        assert_eq!(
            athens.explorer_api_url(),
            "https://zetachain-athens.blockscout.com/api",
            "well-known blockscout endpoint"
        );
        let sepolia = by_chain_id(11_155_111).expect("sepolia is registered");
        assert_eq!(sepolia.explorer_api_url(), ETHERSCAN_V2, "explicit endpoint");
    }

    #[test]
    fn contract_urls_follow_explorer_dialect() {
        let addr = Address::repeat_byte(0x11);
        let sepolia = by_chain_id(11_155_111).expect("registered");
        assert!(sepolia.contract_url(addr).ends_with("#code"), "etherscan tab");
        let base = by_chain_id(84532).expect("registered");
        assert!(
            base.contract_url(addr).ends_with("?tab=contract"),
            "blockscout tab"
        );
    }

    #[test]
    fn explorer_urls_have_no_trailing_slash() {
        for chain in ALL {
            assert!(
                !chain.explorer_url.ends_with('/'),
                "{} explorer url",
                chain.chain_id()
            );
        }
    }
}

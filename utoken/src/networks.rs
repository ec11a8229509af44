//! Pre-configured network definitions for Universal Token deployments.
//!
//! A deployment always has exactly one hub network (ZetaChain) and any
//! number of connected EVM networks from the same environment.

use std::fmt;

/// Networks a Universal Token can be deployed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum Network {
    /// ZetaChain Mainnet (chain ID 7000).
    ZetaChainMainnet,
    /// ZetaChain Athens testnet (chain ID 7001).
    ZetaChainAthens,
    /// Ethereum Mainnet (chain ID 1).
    EthereumMainnet,
    /// Ethereum Sepolia testnet (chain ID 11155111).
    EthereumSepolia,
    /// BNB Smart Chain Mainnet (chain ID 56).
    BscMainnet,
    /// BNB Smart Chain Testnet (chain ID 97).
    BscTestnet,
    /// Polygon Mainnet (chain ID 137).
    PolygonMainnet,
    /// Polygon Amoy testnet (chain ID 80002).
    PolygonAmoy,
    /// Base Mainnet (chain ID 8453).
    BaseMainnet,
    /// Base Sepolia testnet (chain ID 84532).
    BaseSepolia,
    /// Arbitrum One Mainnet (chain ID 42161).
    ArbitrumMainnet,
    /// Arbitrum Sepolia testnet (chain ID 421614).
    ArbitrumSepolia,
    /// Avalanche C-Chain Mainnet (chain ID 43114).
    AvalancheMainnet,
    /// Avalanche Fuji testnet (chain ID 43113).
    AvalancheFuji,
}

impl Network {
    /// All supported network variants.
    pub const ALL: &[Self] = &[
        Self::ZetaChainMainnet,
        Self::ZetaChainAthens,
        Self::EthereumMainnet,
        Self::EthereumSepolia,
        Self::BscMainnet,
        Self::BscTestnet,
        Self::PolygonMainnet,
        Self::PolygonAmoy,
        Self::BaseMainnet,
        Self::BaseSepolia,
        Self::ArbitrumMainnet,
        Self::ArbitrumSepolia,
        Self::AvalancheMainnet,
        Self::AvalancheFuji,
    ];

    /// Returns the EIP-155 chain ID for this network.
    #[must_use]
    pub const fn chain_id(self) -> u64 {
        match self {
            Self::ZetaChainMainnet => 7000,
            Self::ZetaChainAthens => 7001,
            Self::EthereumMainnet => 1,
            Self::EthereumSepolia => 11_155_111,
            Self::BscMainnet => 56,
            Self::BscTestnet => 97,
            Self::PolygonMainnet => 137,
            Self::PolygonAmoy => 80002,
            Self::BaseMainnet => 8453,
            Self::BaseSepolia => 84532,
            Self::ArbitrumMainnet => 42161,
            Self::ArbitrumSepolia => 421_614,
            Self::AvalancheMainnet => 43114,
            Self::AvalancheFuji => 43113,
        }
    }

    /// Human-readable network name, used in records and log output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ZetaChainMainnet => "ZetaChain Mainnet",
            Self::ZetaChainAthens => "ZetaChain Athens Testnet",
            Self::EthereumMainnet => "Ethereum Mainnet",
            Self::EthereumSepolia => "Ethereum Sepolia",
            Self::BscMainnet => "BNB Smart Chain",
            Self::BscTestnet => "BNB Smart Chain Testnet",
            Self::PolygonMainnet => "Polygon",
            Self::PolygonAmoy => "Polygon Amoy",
            Self::BaseMainnet => "Base",
            Self::BaseSepolia => "Base Sepolia",
            Self::ArbitrumMainnet => "Arbitrum One",
            Self::ArbitrumSepolia => "Arbitrum Sepolia",
            Self::AvalancheMainnet => "Avalanche C-Chain",
            Self::AvalancheFuji => "Avalanche Fuji",
        }
    }

    /// Whether this network hosts the hub contract.
    #[must_use]
    pub const fn is_hub(self) -> bool {
        matches!(self, Self::ZetaChainMainnet | Self::ZetaChainAthens)
    }

    /// Whether this is a testnet.
    #[must_use]
    pub const fn is_testnet(self) -> bool {
        matches!(
            self,
            Self::ZetaChainAthens
                | Self::EthereumSepolia
                | Self::BscTestnet
                | Self::PolygonAmoy
                | Self::BaseSepolia
                | Self::ArbitrumSepolia
                | Self::AvalancheFuji
        )
    }

    /// Look up a [`Network`] by its EIP-155 chain ID.
    ///
    /// Returns [`None`] if the chain ID is not supported.
    #[must_use]
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        Self::ALL.iter().find(|n| n.chain_id() == chain_id).copied()
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.chain_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_ids_round_trip() {
        for network in Network::ALL {
            assert_eq!(
                Network::from_chain_id(network.chain_id()),
                Some(*network),
                "{network:?} must resolve from its own chain id"
            );
        }
        assert_eq!(Network::from_chain_id(424_242), None, "unknown id");
    }

    #[test]
    fn exactly_two_hubs_one_per_environment() {
        let hubs: Vec<_> = Network::ALL.iter().filter(|n| n.is_hub()).collect();
        assert_eq!(hubs.len(), 2, "mainnet and testnet hub");
        assert_eq!(
            hubs.iter().filter(|n| n.is_testnet()).count(),
            1,
            "one testnet hub"
        );
    }

    #[test]
    fn display_includes_chain_id() {
        assert_eq!(
            Network::ZetaChainAthens.to_string(),
            "ZetaChain Athens Testnet (7001)"
        );
    }
}

//! Universal Token deployment SDK.
//!
//! Shared building blocks for deploying an omnichain token: a hub contract
//! on ZetaChain plus linked companion contracts on connected EVM chains.
//!
//! - [`Network`]: supported chains and their hub/testnet flags.
//! - [`DeploymentRecord`]: the durable, validated deployment state machine.
//! - [`contracts`]: Solidity bindings and constructor encoding.
//! - [`Error`]: the error taxonomy every component reports with.

pub mod contracts;
pub mod error;
pub mod networks;
pub mod record;
pub mod types;

pub use error::{Error, Result};
pub use networks::Network;
pub use record::{
    ChainDeploymentStatus, DeploymentRecord, DeploymentStatus, LinkStatus, PerChainStatus,
    VerificationStatus, VerificationSummary,
};
pub use types::{
    ContractKind, DeployedContract, TokenParams, TxOutcome, VerificationOutcome,
    VerificationState,
};

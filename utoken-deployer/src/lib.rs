//! Universal Token deployment orchestrator.
//!
//! Deploys the hub contract on ZetaChain and companion contracts on
//! connected EVM chains, links them, verifies their source on block
//! explorers and hands ownership and supply over to the final owner,
//! checkpointing a durable record after every step.

pub mod artifacts;
pub mod chains;
pub mod client;
pub mod config;
pub mod orchestrator;
pub mod request;
pub mod retry;
pub mod store;
pub mod verify;

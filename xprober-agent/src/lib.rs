//! Probing agent for xprober
//!
//! Responsibilities:
//! - Fetch the desired target set from the server
//! - Reconcile it against running per-target workers
//! - Cache each worker's latest batch and push the union to the server
//! - Announce this agent's address and region (heartbeat)

pub mod agent;
pub mod client;
pub mod heartbeat;
pub mod metadata;
pub mod probe;
pub mod pusher;
pub mod reconciler;
pub mod result_cache;
pub mod target_fetcher;
pub mod worker;

#[cfg(test)]
mod testing;

pub use agent::{Agent, AgentSettings};
pub use client::{ControlPlane, RpcClient};
pub use metadata::AgentIdentity;

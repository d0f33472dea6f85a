//! xprober server
//!
//! Hands target lists to agents, records their heartbeats, and turns the
//! results they push into Prometheus gauges.

pub mod aggregator;
pub mod config;
pub mod grpc_server;
pub mod metrics;
pub mod roster;
pub mod server;
pub mod store;
pub mod target_pool;

pub use config::Config;
pub use grpc_server::ControlService;
pub use server::{ProberServer, ServerSettings};

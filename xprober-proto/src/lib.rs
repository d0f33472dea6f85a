//! gRPC protocol definitions for xprober
//!
//! Defines:
//! - `ProberControl` - unary service connecting agents to the server
//! - Target, result, and heartbeat message types
//!
//! Generated from `proto/xprober.proto`.

pub mod v1 {
    tonic::include_proto!("xprober.v1");
}

pub use v1::prober_control_client::ProberControlClient;
pub use v1::prober_control_server::{ProberControl, ProberControlServer};
pub use v1::*;

//! TaskBridge Registry
//!
//! Client for the remote node registry and the background liveness reporter
//! that keeps this node registered and heartbeating.

pub mod client;
pub mod liveness;

pub use client::{RegistryApi, RegistryClient};
pub use liveness::{HandshakeOutcome, LivenessReporter};

//! TaskBridge common library
//!
//! This crate contains shared code used across TaskBridge components.

pub mod config;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use config::{NodeConfig, NodeIdentity};
pub use error::{Result, TaskBridgeError};
pub use metrics::{MetricsRegistry, METRICS};

//! Configuration structures for TaskBridge
//!
//! This module defines all configuration types used by the node.
//! Configurations are loaded from YAML files, overridden by command-line
//! arguments, and finally completed from environment variables for any
//! value that is still unset.

use crate::error::{Result, TaskBridgeError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default registry base URL for registration calls
pub const DEFAULT_REGISTRY_URL: &str = "https://api.roxonn.com/api/node";

/// Default heartbeat endpoint
pub const DEFAULT_HEARTBEAT_URL: &str = "https://api.roxonn.com/api/node/heartbeat";

/// Environment variable names consulted as fallbacks
pub mod env_keys {
    pub const WALLET_ADDRESS: &str = "ROXONN_WALLET_ADDRESS";
    pub const NODE_HOST: &str = "NODE_HOST";
    pub const NODE_PORT: &str = "NODE_PORT";
    pub const NODE_ID: &str = "NODE_ID";
    pub const HEARTBEAT_URL: &str = "ROXONN_HEARTBEAT_URL";
    pub const REGISTRY_URL: &str = "ROXONN_REGISTRY_URL";
    pub const DEBUG: &str = "DEBUG";
}

/// Top-level configuration for a TaskBridge node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Server binding address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Node identity as advertised to the registry
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Remote registry configuration
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Request bridge configuration
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Model shard served by the built-in backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelConfig>,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Identity values; every field may fall back to the environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Unique node identifier (generated when absent)
    pub node_id: Option<String>,

    /// Wallet/account address; liveness reporting is disabled without it
    pub wallet_address: Option<String>,

    /// Host advertised to the registry
    pub advertised_host: Option<String>,

    /// Port advertised to the registry
    pub advertised_port: Option<u16>,
}

/// Remote registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL for check-registration and register
    pub base_url: Option<String>,

    /// Heartbeat endpoint override
    pub heartbeat_url: Option<String>,

    /// Interval between heartbeats in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Per-call timeout for registry requests in seconds
    #[serde(default = "default_registry_timeout")]
    pub request_timeout_secs: u64,
}

/// Request bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Upper bound on one task, in seconds
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
}

/// Model shard configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name/identifier
    pub model_id: String,

    /// First layer served by this node (0-based, inclusive)
    #[serde(default)]
    pub start_layer: usize,

    /// Last layer served by this node (inclusive)
    pub end_layer: usize,

    /// Total number of layers in the model
    pub n_layers: usize,
}

/// Observability configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Debug verbosity (0 = info, 1 = debug, 2+ = trace)
    pub debug_level: Option<u8>,
}

/// Immutable identity snapshot shared for the process lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub node_id: String,
    pub wallet_address: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    52415
}

fn default_heartbeat_interval() -> u64 {
    60
}

fn default_registry_timeout() -> u64 {
    10
}

fn default_task_timeout() -> u64 {
    900
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            heartbeat_url: None,
            heartbeat_interval_secs: default_heartbeat_interval(),
            request_timeout_secs: default_registry_timeout(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            task_timeout_secs: default_task_timeout(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            identity: IdentityConfig::default(),
            registry: RegistryConfig::default(),
            bridge: BridgeConfig::default(),
            model: None,
            observability: ObservabilityConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Base URL for registration calls
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_REGISTRY_URL)
    }

    /// Heartbeat endpoint
    pub fn heartbeat_url(&self) -> &str {
        self.heartbeat_url.as_deref().unwrap_or(DEFAULT_HEARTBEAT_URL)
    }

    /// Get heartbeat interval as Duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Get per-call timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl NodeConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            TaskBridgeError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: NodeConfig = serde_yaml::from_str(&content).map_err(|e| {
            TaskBridgeError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;

        Ok(config)
    }

    /// Fill unset values from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Fill unset values from an arbitrary variable lookup.
    ///
    /// Values that are already set (from a file or the command line) are
    /// never replaced. A node id is generated if none is found.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let identity = &mut self.identity;
        fill(&mut identity.node_id, || lookup(env_keys::NODE_ID));
        fill(&mut identity.wallet_address, || lookup(env_keys::WALLET_ADDRESS));
        fill(&mut identity.advertised_host, || lookup(env_keys::NODE_HOST));

        if identity.advertised_port.is_none() {
            if let Some(raw) = lookup(env_keys::NODE_PORT) {
                let port = raw.trim().parse::<u16>().map_err(|_| {
                    TaskBridgeError::config(format!("Invalid {}: {}", env_keys::NODE_PORT, raw))
                })?;
                identity.advertised_port = Some(port);
            }
        }

        fill(&mut self.registry.heartbeat_url, || lookup(env_keys::HEARTBEAT_URL));
        fill(&mut self.registry.base_url, || lookup(env_keys::REGISTRY_URL));

        if self.observability.debug_level.is_none() {
            // Anything that is not an integer counts as 0
            let level = lookup(env_keys::DEBUG)
                .and_then(|raw| raw.trim().parse::<u8>().ok())
                .unwrap_or(0);
            self.observability.debug_level = Some(level);
        }

        if self.identity.node_id.is_none() {
            self.identity.node_id = Some(uuid::Uuid::new_v4().to_string());
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(node_id) = &self.identity.node_id {
            if node_id.trim().is_empty() {
                return Err(TaskBridgeError::config("node_id must not be empty"));
            }
        }

        if self.registry.heartbeat_interval_secs == 0 {
            return Err(TaskBridgeError::config("heartbeat_interval_secs must be positive"));
        }
        if self.registry.request_timeout_secs == 0 {
            return Err(TaskBridgeError::config("request_timeout_secs must be positive"));
        }
        if self.bridge.task_timeout_secs == 0 {
            return Err(TaskBridgeError::config("task_timeout_secs must be positive"));
        }

        url::Url::parse(self.registry.base_url())
            .map_err(|e| TaskBridgeError::config(format!("Invalid registry URL: {}", e)))?;
        url::Url::parse(self.registry.heartbeat_url())
            .map_err(|e| TaskBridgeError::config(format!("Invalid heartbeat URL: {}", e)))?;

        if let Some(model) = &self.model {
            if model.start_layer > model.end_layer || model.end_layer >= model.n_layers {
                return Err(TaskBridgeError::config(format!(
                    "Invalid layer range {}..={} for model {} with {} layers",
                    model.start_layer, model.end_layer, model.model_id, model.n_layers
                )));
            }
        }

        Ok(())
    }

    /// Snapshot the resolved identity
    pub fn identity(&self) -> Result<NodeIdentity> {
        let node_id = self
            .identity
            .node_id
            .clone()
            .ok_or_else(|| TaskBridgeError::config("node_id has not been resolved"))?;

        Ok(NodeIdentity {
            node_id,
            wallet_address: self
                .identity
                .wallet_address
                .clone()
                .filter(|w| !w.trim().is_empty()),
            host: self.identity.advertised_host.clone(),
            port: self.identity.advertised_port,
        })
    }

    /// Socket address the HTTP server binds to
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.bind_address, self.port).parse()?)
    }

    /// Get task timeout as Duration
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.bridge.task_timeout_secs)
    }

    /// Resolved debug verbosity
    pub fn debug_level(&self) -> u8 {
        self.observability.debug_level.unwrap_or(0)
    }
}

fn fill<F>(slot: &mut Option<String>, fallback: F)
where
    F: FnOnce() -> Option<String>,
{
    if slot.is_none() {
        *slot = fallback().filter(|v| !v.is_empty());
    }
}

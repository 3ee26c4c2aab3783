//! Command-line arguments
//!
//! Explicit arguments override the config file. Environment fallbacks are
//! applied afterwards and only fill what is still unset.

use clap::Parser;
use std::path::PathBuf;
use taskbridge_common::config::{ModelConfig, NodeConfig};
use taskbridge_common::error::Result;

#[derive(Parser, Debug, Clone)]
#[command(name = "taskbridge-node", version, about = "Inference task bridge node")]
pub struct Args {
    /// YAML config file
    #[arg(long, env = "TASKBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind the HTTP server to
    #[arg(long)]
    pub bind_address: Option<String>,

    /// Port to bind the HTTP server to
    #[arg(long)]
    pub port: Option<u16>,

    /// Node id reported to the registry
    #[arg(long)]
    pub node_id: Option<String>,

    /// Wallet address; enables liveness reporting
    #[arg(long)]
    pub wallet_address: Option<String>,

    /// Host advertised in heartbeats
    #[arg(long)]
    pub advertised_host: Option<String>,

    /// Port advertised in heartbeats
    #[arg(long)]
    pub advertised_port: Option<u16>,

    /// Heartbeat endpoint
    #[arg(long)]
    pub heartbeat_url: Option<String>,

    /// Registry base URL
    #[arg(long)]
    pub registry_url: Option<String>,

    /// Model to serve with the built-in backend
    #[arg(long)]
    pub model_id: Option<String>,

    /// Number of layers in the served model
    #[arg(long, default_value_t = 1)]
    pub n_layers: usize,

    /// Upper bound on a single task, in seconds
    #[arg(long)]
    pub task_timeout_secs: Option<u64>,
}

impl Args {
    /// Load the config file (if any) and apply explicit overrides
    pub fn load_config(&self) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_file(path)?,
            None => NodeConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    /// Apply explicit arguments on top of `config`
    pub fn apply(&self, config: &mut NodeConfig) {
        if let Some(bind_address) = &self.bind_address {
            config.bind_address = bind_address.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }

        let identity = &mut config.identity;
        override_with(&mut identity.node_id, &self.node_id);
        override_with(&mut identity.wallet_address, &self.wallet_address);
        override_with(&mut identity.advertised_host, &self.advertised_host);
        if self.advertised_port.is_some() {
            identity.advertised_port = self.advertised_port;
        }

        override_with(&mut config.registry.heartbeat_url, &self.heartbeat_url);
        override_with(&mut config.registry.base_url, &self.registry_url);

        if let Some(model_id) = &self.model_id {
            config.model = Some(ModelConfig {
                model_id: model_id.clone(),
                start_layer: 0,
                end_layer: self.n_layers.saturating_sub(1),
                n_layers: self.n_layers,
            });
        }

        if let Some(timeout) = self.task_timeout_secs {
            config.bridge.task_timeout_secs = timeout;
        }
    }
}

fn override_with(slot: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        slot.clone_from(value);
    }
}

/// Log filter used when `RUST_LOG` is not set
pub fn log_filter(debug_level: u8) -> String {
    let level = match debug_level {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    format!(
        "taskbridge_node={level},taskbridge_registry={level},taskbridge_common={level},axum=info"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_override_config() {
        let args = Args::try_parse_from([
            "taskbridge-node",
            "--port",
            "6000",
            "--wallet-address",
            "0xcli",
            "--model-id",
            "llama-3.2-1b",
            "--n-layers",
            "16",
        ])
        .unwrap();

        let mut config = NodeConfig::default();
        config.identity.wallet_address = Some("0xfile".to_string());
        args.apply(&mut config);

        assert_eq!(config.port, 6000);
        assert_eq!(config.identity.wallet_address.as_deref(), Some("0xcli"));
        let model = config.model.unwrap();
        assert_eq!(model.end_layer, 15);
        assert_eq!(model.n_layers, 16);
    }

    #[test]
    fn test_cli_value_wins_over_env() {
        let args = Args::try_parse_from(["taskbridge-node", "--advertised-host", "node.example"])
            .unwrap();
        let mut config = NodeConfig::default();
        args.apply(&mut config);
        config
            .apply_env_with(|key| (key == "NODE_HOST").then(|| "10.0.0.9".to_string()))
            .unwrap();

        assert_eq!(config.identity().unwrap().host.as_deref(), Some("node.example"));
    }

    #[test]
    fn test_unset_arguments_leave_config_alone() {
        let args = Args::try_parse_from(["taskbridge-node"]).unwrap();
        let mut config = NodeConfig::default();
        config.port = 7000;
        args.apply(&mut config);

        assert_eq!(config.port, 7000);
        assert!(config.model.is_none());
    }

    #[test]
    fn test_log_filter_follows_debug_level() {
        assert!(log_filter(0).starts_with("taskbridge_node=info,"));
        assert!(log_filter(1).contains("taskbridge_registry=debug"));
        assert!(log_filter(2).contains("taskbridge_common=trace"));
        assert!(log_filter(9).contains("taskbridge_node=trace"));
        assert!(log_filter(2).ends_with("axum=info"));
    }
}

//! Inference backend boundary
//!
//! The node never runs a model itself. It talks to an engine through
//! [`InferenceBackend`]: submit a formatted prompt under a request id, then
//! receive the generated tokens on the backend's [`TokenNotifier`].

pub mod echo;

use async_trait::async_trait;
use std::sync::Arc;
use taskbridge_common::config::ModelConfig;
use taskbridge_common::error::Result;
use taskbridge_proto::task::ChatMessage;

use crate::notifier::TokenNotifier;

pub use echo::{ByteTokenizer, EchoBackend};

/// Opaque token unit
pub type TokenId = u32;

/// The slice of a model loaded on this node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    pub model_id: String,
    pub start_layer: usize,
    pub end_layer: usize,
    pub n_layers: usize,
}

impl Shard {
    pub fn new(model_id: impl Into<String>, start_layer: usize, end_layer: usize, n_layers: usize) -> Self {
        Self {
            model_id: model_id.into(),
            start_layer,
            end_layer,
            n_layers,
        }
    }
}

impl From<&ModelConfig> for Shard {
    fn from(config: &ModelConfig) -> Self {
        Shard::new(
            config.model_id.clone(),
            config.start_layer,
            config.end_layer,
            config.n_layers,
        )
    }
}

/// Tokenizer capabilities the bridge relies on
pub trait Tokenizer: Send + Sync {
    /// Render a conversation into the model's prompt format, with the
    /// generation prompt appended
    fn apply_chat_template(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Turn token units back into text
    fn decode(&self, tokens: &[TokenId]) -> Result<String>;

    /// End-of-sequence token unit
    fn eos_token_id(&self) -> TokenId;
}

/// An inference engine the node can hand prompts to
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Currently loaded shard, if any
    fn shard(&self) -> Option<Shard>;

    /// Tokenizer for the loaded model
    fn tokenizer(&self) -> Arc<dyn Tokenizer>;

    /// Where generated tokens are published
    fn on_token(&self) -> Arc<TokenNotifier>;

    /// Submit a formatted prompt for generation.
    ///
    /// Tokens for `request_id` are published on [`InferenceBackend::on_token`],
    /// the last batch carrying `is_finished = true`.
    async fn process_prompt(&self, shard: &Shard, prompt: &str, request_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_from_model_config() {
        let config = ModelConfig {
            model_id: "llama-3.2-1b".to_string(),
            start_layer: 8,
            end_layer: 11,
            n_layers: 16,
        };
        assert_eq!(Shard::from(&config), Shard::new("llama-3.2-1b", 8, 11, 16));
    }
}

//! Built-in echo backend
//!
//! Streams the formatted prompt back as byte-level tokens. Lets the node run
//! end to end without a model engine attached.

use async_trait::async_trait;
use std::sync::Arc;
use taskbridge_common::error::{Result, TaskBridgeError};
use taskbridge_proto::task::ChatMessage;
use tracing::debug;

use super::{InferenceBackend, Shard, TokenId, Tokenizer};
use crate::notifier::TokenNotifier;

/// One token per byte, plus an end-of-sequence unit past the byte range
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteTokenizer;

impl ByteTokenizer {
    pub const EOS: TokenId = 256;

    pub fn encode(&self, text: &str) -> Vec<TokenId> {
        text.bytes().map(TokenId::from).collect()
    }
}

impl Tokenizer for ByteTokenizer {
    fn apply_chat_template(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut prompt = String::new();
        for message in messages {
            prompt.push_str(&format!("<|{}|>\n{}\n", message.role, message.content));
        }
        prompt.push_str("<|assistant|>\n");
        Ok(prompt)
    }

    fn decode(&self, tokens: &[TokenId]) -> Result<String> {
        let bytes = tokens
            .iter()
            .map(|&token| {
                u8::try_from(token)
                    .map_err(|_| TaskBridgeError::backend(format!("token {} is not a byte", token)))
            })
            .collect::<Result<Vec<u8>>>()?;

        String::from_utf8(bytes).map_err(|e| TaskBridgeError::backend(e.to_string()))
    }

    fn eos_token_id(&self) -> TokenId {
        Self::EOS
    }
}

/// Backend that echoes every prompt in fixed-size token batches
pub struct EchoBackend {
    shard: Option<Shard>,
    tokenizer: Arc<ByteTokenizer>,
    notifier: Arc<TokenNotifier>,
    chunk_size: usize,
}

impl EchoBackend {
    pub fn new(shard: Option<Shard>) -> Self {
        Self {
            shard,
            tokenizer: Arc::new(ByteTokenizer),
            notifier: TokenNotifier::new(),
            chunk_size: 16,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

#[async_trait]
impl InferenceBackend for EchoBackend {
    fn shard(&self) -> Option<Shard> {
        self.shard.clone()
    }

    fn tokenizer(&self) -> Arc<dyn Tokenizer> {
        self.tokenizer.clone()
    }

    fn on_token(&self) -> Arc<TokenNotifier> {
        self.notifier.clone()
    }

    async fn process_prompt(&self, shard: &Shard, prompt: &str, request_id: &str) -> Result<()> {
        if self.shard.as_ref() != Some(shard) {
            return Err(TaskBridgeError::backend(format!(
                "shard {} is not loaded",
                shard.model_id
            )));
        }

        let tokens = self.tokenizer.encode(prompt);
        let notifier = self.notifier.clone();
        let request_id = request_id.to_string();
        let chunk_size = self.chunk_size;

        debug!(
            "Echoing {} tokens for request {} in batches of {}",
            tokens.len(),
            request_id,
            chunk_size
        );

        tokio::spawn(async move {
            for chunk in tokens.chunks(chunk_size) {
                notifier.emit(&request_id, chunk.to_vec(), false);
                tokio::task::yield_now().await;
            }
            notifier.emit(&request_id, vec![ByteTokenizer::EOS], true);
        });

        Ok(())
    }
}

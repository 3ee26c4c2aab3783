//! Per-request token accumulation
//!
//! Collects the token batches streamed for one request id, in arrival order,
//! and yields the finished sequence exactly once.

use taskbridge_common::error::{Result, TaskBridgeError};
use taskbridge_common::METRICS;
use tracing::trace;

use crate::backend::{TokenId, Tokenizer};
use crate::notifier::{Subscription, TokenEvent};

/// Accumulator for a single request's token stream
#[derive(Debug)]
pub struct TokenAggregator {
    request_id: String,
    eos_token: TokenId,
    buffer: Vec<TokenId>,
    finished: bool,
}

impl TokenAggregator {
    pub fn new(request_id: impl Into<String>, eos_token: TokenId) -> Self {
        Self {
            request_id: request_id.into(),
            eos_token,
            buffer: Vec::new(),
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether nothing has been buffered yet
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Feed one event.
    ///
    /// Events for other requests are ignored. The first finishing event for
    /// this request returns the completed sequence with a trailing
    /// end-of-sequence unit removed; anything after that is a no-op.
    pub fn accept(&mut self, event: &TokenEvent) -> Option<Vec<TokenId>> {
        if self.finished || event.request_id != self.request_id {
            return None;
        }

        self.buffer.extend_from_slice(&event.tokens);
        if !event.is_finished {
            return None;
        }

        self.finished = true;
        let mut tokens = std::mem::take(&mut self.buffer);
        if tokens.last() == Some(&self.eos_token) {
            tokens.pop();
        }
        Some(tokens)
    }

    /// Drain `subscription` until this request finishes, then decode
    pub async fn collect(
        mut self,
        subscription: &mut Subscription,
        tokenizer: &dyn Tokenizer,
    ) -> Result<String> {
        while let Some(event) = subscription.recv().await {
            if event.request_id == self.request_id {
                METRICS
                    .bridge
                    .tokens_received_total
                    .inc_by(event.tokens.len() as u64);
                trace!(
                    "Request {} received {} tokens (finished={})",
                    self.request_id,
                    event.tokens.len(),
                    event.is_finished
                );
            }

            if let Some(tokens) = self.accept(&event) {
                return tokenizer.decode(&tokens);
            }
        }

        Err(TaskBridgeError::subscription(format!(
            "token stream for {} closed before it finished",
            self.request_id
        )))
    }
}

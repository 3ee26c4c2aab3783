//! Request bridge
//!
//! Turns one synchronous-looking task request into a streamed generation on
//! the backend and waits, with a deadline, for the finished text.
//!
//! Each call owns its request id, callback-id and subscription, so any
//! number of calls can run concurrently against the same backend.

use std::sync::Arc;
use std::time::{Duration, Instant};
use taskbridge_common::error::{Result, TaskBridgeError};
use taskbridge_common::metrics::BridgeMetrics;
use taskbridge_common::METRICS;
use taskbridge_proto::task::{ChatMessage, TaskResponse};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::aggregator::TokenAggregator;
use crate::backend::InferenceBackend;

/// Prefix for callback-ids registered by the bridge
pub const CALLBACK_PREFIX: &str = "task-response-";

/// Default upper bound on a single task
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(900);

/// Callback-id used for a request id
pub fn callback_id_for(request_id: &str) -> String {
    format!("{}{}", CALLBACK_PREFIX, request_id)
}

/// Bridges task requests onto an inference backend
#[derive(Clone)]
pub struct TaskBridge {
    backend: Option<Arc<dyn InferenceBackend>>,
    timeout: Duration,
    metrics: BridgeMetrics,
}

impl TaskBridge {
    /// Create a bridge; `None` means no node is attached yet
    pub fn new(backend: Option<Arc<dyn InferenceBackend>>) -> Self {
        Self {
            backend,
            timeout: DEFAULT_TASK_TIMEOUT,
            metrics: METRICS.bridge.clone(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Record request metrics somewhere other than the global registry
    pub fn with_metrics(mut self, metrics: BridgeMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Run one task to completion.
    ///
    /// Never fails: every error is folded into [`TaskResponse::Error`].
    pub async fn handle(&self, prompt: &str) -> TaskResponse {
        let metrics = &self.metrics;
        metrics.requests_total.inc();
        let in_flight = InFlight::start(metrics);

        let result = self.execute(prompt).await;
        let elapsed = in_flight.elapsed();
        drop(in_flight);

        match result {
            Ok(text) => {
                metrics.requests_success.inc();
                info!("Compute task finished in {:?}", elapsed);
                TaskResponse::complete(text)
            }
            Err(e) => {
                metrics.requests_failed.inc();
                if e.is_timeout() {
                    metrics.requests_timed_out.inc();
                }
                error!("Error during compute task: {}", e);
                TaskResponse::error(e.to_string())
            }
        }
    }

    async fn execute(&self, prompt: &str) -> Result<String> {
        let backend = self
            .backend
            .as_ref()
            .ok_or_else(|| TaskBridgeError::precondition("Node not initialized."))?;
        let shard = backend
            .shard()
            .ok_or_else(|| TaskBridgeError::precondition("Node has no model loaded."))?;

        let tokenizer = backend.tokenizer();
        let request_id = Uuid::new_v4().to_string();
        let callback_id = callback_id_for(&request_id);

        info!("Received compute task {} for model {}", request_id, shard.model_id);

        let formatted = tokenizer.apply_chat_template(&[ChatMessage::user(prompt)])?;

        let on_token = backend.on_token();
        let mut subscription = on_token.register(callback_id.as_str())?;
        let aggregator = TokenAggregator::new(request_id.as_str(), tokenizer.eos_token_id());

        // One deadline covers submission and the wait for the last token
        let deadline = tokio::time::Instant::now() + self.timeout;
        let work = async {
            backend
                .process_prompt(&shard, &formatted, &request_id)
                .await?;
            debug!("Prompt for {} submitted, awaiting tokens", request_id);
            aggregator.collect(&mut subscription, tokenizer.as_ref()).await
        };
        let outcome = tokio::time::timeout_at(deadline, work).await;

        // The subscription guard also deregisters if this future is dropped early
        on_token.deregister(&callback_id);
        drop(subscription);

        outcome.unwrap_or_else(|_| {
            Err(TaskBridgeError::timeout(format!(
                "no response for request {} within {:?}",
                request_id, self.timeout
            )))
        })
    }
}

/// In-flight marker for one request.
///
/// Dropping it decrements the active gauge and records the duration, so a
/// handler future dropped mid-request is still accounted for.
struct InFlight<'a> {
    metrics: &'a BridgeMetrics,
    start: Instant,
}

impl<'a> InFlight<'a> {
    fn start(metrics: &'a BridgeMetrics) -> Self {
        metrics.active_requests.inc();
        Self {
            metrics,
            start: Instant::now(),
        }
    }

    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.metrics.active_requests.dec();
        self.metrics
            .request_duration
            .observe(self.start.elapsed().as_secs_f64());
    }
}

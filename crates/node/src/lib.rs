//! TaskBridge Node
//!
//! Bridges HTTP task requests onto a token-streaming inference backend and
//! keeps the node registered with the remote registry.

pub mod aggregator;
pub mod backend;
pub mod bridge;
pub mod cli;
pub mod notifier;
pub mod server;

pub use aggregator::TokenAggregator;
pub use backend::{EchoBackend, InferenceBackend, Shard, TokenId, Tokenizer};
pub use bridge::{callback_id_for, TaskBridge};
pub use cli::Args;
pub use notifier::{Subscription, TokenEvent, TokenNotifier};
pub use server::ServiceFront;

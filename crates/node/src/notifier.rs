//! Token notification registry
//!
//! The backend publishes every emitted token batch to a [`TokenNotifier`].
//! Consumers register under a callback-id and receive a [`Subscription`]
//! carrying the receiving half of a channel. Each observer sees every event
//! and is responsible for filtering on the request id.
//!
//! A subscription removes itself from the registry when dropped, so no exit
//! path of a consumer can leave a stale observer behind.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use taskbridge_common::error::{Result, TaskBridgeError};
use tokio::sync::mpsc;
use tracing::trace;

use crate::backend::TokenId;

/// One batch of tokens emitted for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEvent {
    pub request_id: String,
    pub tokens: Vec<TokenId>,
    pub is_finished: bool,
}

impl TokenEvent {
    pub fn new(request_id: impl Into<String>, tokens: Vec<TokenId>, is_finished: bool) -> Self {
        Self {
            request_id: request_id.into(),
            tokens,
            is_finished,
        }
    }
}

struct Observer {
    generation: u64,
    sender: mpsc::UnboundedSender<Arc<TokenEvent>>,
}

/// Registry of token observers keyed by callback-id
#[derive(Default)]
pub struct TokenNotifier {
    observers: RwLock<HashMap<String, Observer>>,
    next_generation: AtomicU64,
}

impl TokenNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an observer under `callback_id`.
    ///
    /// Fails if the callback-id already has a live observer.
    pub fn register(self: &Arc<Self>, callback_id: impl Into<String>) -> Result<Subscription> {
        let callback_id = callback_id.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        {
            let mut observers = self.observers.write();
            if observers.contains_key(&callback_id) {
                return Err(TaskBridgeError::subscription(format!(
                    "callback {} is already registered",
                    callback_id
                )));
            }
            observers.insert(callback_id.clone(), Observer { generation, sender });
        }

        trace!("Registered token observer {}", callback_id);

        Ok(Subscription {
            callback_id,
            generation,
            receiver,
            notifier: Arc::clone(self),
        })
    }

    /// Remove the observer registered under `callback_id`
    pub fn deregister(&self, callback_id: &str) -> bool {
        let removed = self.observers.write().remove(callback_id).is_some();
        if removed {
            trace!("Deregistered token observer {}", callback_id);
        }
        removed
    }

    fn deregister_generation(&self, callback_id: &str, generation: u64) {
        let mut observers = self.observers.write();
        if observers
            .get(callback_id)
            .is_some_and(|observer| observer.generation == generation)
        {
            observers.remove(callback_id);
            trace!("Deregistered token observer {} on drop", callback_id);
        }
    }

    /// Deliver an event to every live observer.
    ///
    /// Returns how many observers received it.
    pub fn notify(&self, event: TokenEvent) -> usize {
        let event = Arc::new(event);
        let observers = self.observers.read();
        observers
            .values()
            .filter(|observer| observer.sender.send(Arc::clone(&event)).is_ok())
            .count()
    }

    /// Convenience wrapper around [`TokenNotifier::notify`]
    pub fn emit(&self, request_id: &str, tokens: Vec<TokenId>, is_finished: bool) -> usize {
        self.notify(TokenEvent::new(request_id, tokens, is_finished))
    }

    pub fn is_registered(&self, callback_id: &str) -> bool {
        self.observers.read().contains_key(callback_id)
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }
}

/// A live registration; dropping it deregisters the observer
pub struct Subscription {
    callback_id: String,
    generation: u64,
    receiver: mpsc::UnboundedReceiver<Arc<TokenEvent>>,
    notifier: Arc<TokenNotifier>,
}

impl Subscription {
    pub fn callback_id(&self) -> &str {
        &self.callback_id
    }

    /// Wait for the next event; `None` once the observer has been removed
    pub async fn recv(&mut self) -> Option<Arc<TokenEvent>> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.notifier
            .deregister_generation(&self.callback_id, self.generation);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("callback_id", &self.callback_id)
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_fan_out_to_all_observers() {
        let notifier = TokenNotifier::new();
        let mut a = notifier.register("a").unwrap();
        let mut b = notifier.register("b").unwrap();

        assert_eq!(notifier.emit("req-1", vec![1, 2], false), 2);

        assert_eq!(a.recv().await.unwrap().tokens, vec![1, 2]);
        assert_eq!(b.recv().await.unwrap().request_id, "req-1");
    }

    #[test]
    fn test_duplicate_callback_id_is_rejected() {
        let notifier = TokenNotifier::new();
        let _first = notifier.register("task").unwrap();
        assert!(notifier.register("task").is_err());
        assert_eq!(notifier.len(), 1);
    }

    #[test]
    fn test_drop_deregisters() {
        let notifier = TokenNotifier::new();
        let subscription = notifier.register("task").unwrap();
        assert!(notifier.is_registered("task"));

        drop(subscription);
        assert!(!notifier.is_registered("task"));
        assert_eq!(notifier.emit("req-1", vec![1], true), 0);
    }

    #[test]
    fn test_stale_guard_keeps_newer_registration() {
        let notifier = TokenNotifier::new();
        let old = notifier.register("task").unwrap();
        assert!(notifier.deregister("task"));

        let _new = notifier.register("task").unwrap();
        drop(old);
        assert!(notifier.is_registered("task"));
    }

    #[test]
    fn test_deregister_unknown_is_noop() {
        let notifier = TokenNotifier::new();
        assert!(!notifier.deregister("missing"));
        assert!(notifier.is_empty());
    }
}

//! Node liveness reporting
//!
//! The reporter runs a one-time registration handshake against the registry
//! and then heartbeats forever at a fixed interval. Every failure is logged
//! and swallowed; the loop only stops when its cancellation token fires.

use crate::client::RegistryApi;
use std::time::Duration;
use taskbridge_common::config::NodeIdentity;
use taskbridge_common::error::Result;
use taskbridge_common::METRICS;
use taskbridge_proto::registry::{HeartbeatRequest, RegisterRequest};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default pause between heartbeats
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Result of the registration handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Registry already knew this node
    AlreadyRegistered,

    /// Registration call succeeded
    Registered,

    /// Check or register failed; heartbeats start anyway
    Failed,
}

/// Background liveness reporter for one node
pub struct LivenessReporter<R> {
    registry: R,
    node_id: String,
    wallet_address: String,
    host: Option<String>,
    port: Option<u16>,
    interval: Duration,
}

impl<R: RegistryApi + 'static> LivenessReporter<R> {
    /// Create a reporter for an explicit identity
    pub fn new(
        registry: R,
        node_id: impl Into<String>,
        wallet_address: impl Into<String>,
        host: Option<String>,
        port: Option<u16>,
    ) -> Self {
        Self {
            registry,
            node_id: node_id.into(),
            wallet_address: wallet_address.into(),
            host,
            port,
            interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// Create a reporter from the resolved identity.
    ///
    /// Returns `None` when no wallet address is configured, in which case
    /// liveness reporting stays disabled.
    pub fn from_identity(registry: R, identity: &NodeIdentity) -> Option<Self> {
        let wallet = identity.wallet_address.clone()?;
        Some(Self::new(
            registry,
            identity.node_id.clone(),
            wallet,
            identity.host.clone(),
            identity.port,
        ))
    }

    /// Override the pause between heartbeats
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Check registration and register if the registry does not know us
    pub async fn ensure_registered(&self) -> HandshakeOutcome {
        match self.try_register().await {
            Ok(outcome) => outcome,
            Err(e) => {
                METRICS.liveness.registration_failures.inc();
                warn!("Error during node registration check: {}", e);
                HandshakeOutcome::Failed
            }
        }
    }

    async fn try_register(&self) -> Result<HandshakeOutcome> {
        if self.registry.check_registration(&self.node_id).await? {
            debug!("Node {} already registered", self.node_id);
            return Ok(HandshakeOutcome::AlreadyRegistered);
        }

        info!("Node {} not registered, attempting to register", self.node_id);
        METRICS.liveness.registration_attempts.inc();

        let request = RegisterRequest {
            node_id: self.node_id.clone(),
            wallet_address: self.wallet_address.clone(),
        };
        self.registry.register(&request).await?;

        info!("Node {} successfully registered", self.node_id);
        Ok(HandshakeOutcome::Registered)
    }

    /// Send a single heartbeat
    pub async fn beat(&self) -> Result<()> {
        let request = HeartbeatRequest {
            node_id: self.node_id.clone(),
            wallet_address: self.wallet_address.clone(),
            ip_address: self.host.clone(),
            port: self.port,
        };
        self.registry.heartbeat(&request).await
    }

    /// Run the handshake, then heartbeat until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Starting liveness reporter for node {} every {:?}",
            self.node_id, self.interval
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Liveness reporter cancelled during registration");
                return;
            }
            _ = self.ensure_registered() => {}
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.beat() => match result {
                    Ok(()) => {
                        METRICS.liveness.heartbeats_sent.inc();
                        debug!("Sent heartbeat for node {}", self.node_id);
                    }
                    Err(e) => {
                        METRICS.liveness.heartbeats_failed.inc();
                        debug!("Failed to send heartbeat: {}", e);
                    }
                },
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Liveness reporter for node {} stopped", self.node_id);
    }

    /// Start the reporter as a background task
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use taskbridge_common::error::TaskBridgeError;

    #[derive(Default)]
    struct FakeRegistry {
        registered: bool,
        failing: bool,
        checks: AtomicUsize,
        registrations: AtomicUsize,
        heartbeats: AtomicUsize,
        last_heartbeat: Mutex<Option<HeartbeatRequest>>,
    }

    impl FakeRegistry {
        fn registered() -> Arc<Self> {
            Arc::new(Self {
                registered: true,
                ..Default::default()
            })
        }

        fn unregistered() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                failing: true,
                ..Default::default()
            })
        }

        fn fail_if_needed(&self) -> Result<()> {
            if self.failing {
                Err(TaskBridgeError::registry("connection refused"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl RegistryApi for FakeRegistry {
        async fn check_registration(&self, _node_id: &str) -> Result<bool> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.fail_if_needed()?;
            Ok(self.registered)
        }

        async fn register(&self, _request: &RegisterRequest) -> Result<()> {
            self.registrations.fetch_add(1, Ordering::SeqCst);
            self.fail_if_needed()
        }

        async fn heartbeat(&self, request: &HeartbeatRequest) -> Result<()> {
            self.heartbeats.fetch_add(1, Ordering::SeqCst);
            *self.last_heartbeat.lock().unwrap() = Some(request.clone());
            self.fail_if_needed()
        }
    }

    fn reporter(registry: Arc<FakeRegistry>) -> LivenessReporter<Arc<FakeRegistry>> {
        LivenessReporter::new(
            registry,
            "node-1",
            "0xabc",
            Some("10.0.0.5".to_string()),
            Some(52415),
        )
    }

    #[tokio::test]
    async fn test_registers_when_not_registered() {
        let registry = FakeRegistry::unregistered();
        let outcome = reporter(registry.clone()).ensure_registered().await;

        assert_eq!(outcome, HandshakeOutcome::Registered);
        assert_eq!(registry.checks.load(Ordering::SeqCst), 1);
        assert_eq!(registry.registrations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skips_register_when_already_registered() {
        let registry = FakeRegistry::registered();
        let outcome = reporter(registry.clone()).ensure_registered().await;

        assert_eq!(outcome, HandshakeOutcome::AlreadyRegistered);
        assert_eq!(registry.registrations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handshake_failure_is_swallowed() {
        let registry = FakeRegistry::failing();
        let outcome = reporter(registry.clone()).ensure_registered().await;

        assert_eq!(outcome, HandshakeOutcome::Failed);
        assert_eq!(registry.registrations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_registers_when_check_answers_not_found() {
        use crate::client::RegistryClient;
        use httpmock::prelude::*;
        use serde_json::json;
        use taskbridge_common::config::RegistryConfig;

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/node/check-registration")
                    .query_param("nodeId", "node-1");
                then.status(404)
                    .json_body(json!({"isRegistered": false, "message": "Node not found"}));
            })
            .await;
        let register = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/node/register")
                    .json_body(json!({"nodeId": "node-1", "walletAddress": "0xabc"}));
                then.status(200);
            })
            .await;

        let config = RegistryConfig {
            base_url: Some(server.url("/api/node")),
            heartbeat_url: Some(server.url("/api/node/heartbeat")),
            ..RegistryConfig::default()
        };
        let client = RegistryClient::new(&config).unwrap();
        let outcome = LivenessReporter::new(client, "node-1", "0xabc", None, None)
            .ensure_registered()
            .await;

        assert_eq!(outcome, HandshakeOutcome::Registered);
        register.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_heartbeat_carries_identity() {
        let registry = FakeRegistry::registered();
        reporter(registry.clone()).beat().await.unwrap();

        let sent = registry.last_heartbeat.lock().unwrap().clone().unwrap();
        assert_eq!(sent.node_id, "node-1");
        assert_eq!(sent.wallet_address, "0xabc");
        assert_eq!(sent.ip_address.as_deref(), Some("10.0.0.5"));
        assert_eq!(sent.port, Some(52415));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keeps_beating_when_registry_always_fails() {
        let registry = FakeRegistry::failing();
        let cancel = CancellationToken::new();
        let handle = reporter(registry.clone()).spawn(cancel.clone());

        // Beats land at t = 0, 60, ..., 300
        tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;
        assert!(!handle.is_finished());
        assert_eq!(registry.heartbeats.load(Ordering::SeqCst), 6);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_are_spaced_by_interval() {
        let registry = FakeRegistry::registered();
        let cancel = CancellationToken::new();
        let handle = reporter(registry.clone())
            .with_interval(Duration::from_secs(10))
            .spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(registry.heartbeats.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(registry.heartbeats.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn test_no_wallet_disables_reporter() {
        let identity = NodeIdentity {
            node_id: "node-1".to_string(),
            wallet_address: None,
            host: None,
            port: None,
        };
        assert!(LivenessReporter::from_identity(FakeRegistry::registered(), &identity).is_none());
    }
}

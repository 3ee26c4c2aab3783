//! Registry client for registration and heartbeat calls

use async_trait::async_trait;
use reqwest::{Client, Response};
use std::sync::Arc;
use taskbridge_common::config::RegistryConfig;
use taskbridge_common::error::{Result, TaskBridgeError};
use taskbridge_proto::registry::{CheckRegistrationResponse, HeartbeatRequest, RegisterRequest};
use tracing::{debug, trace};
use url::Url;

/// The three calls the node makes against the remote registry
#[async_trait]
pub trait RegistryApi: Send + Sync {
    /// Whether the registry already knows `node_id`
    async fn check_registration(&self, node_id: &str) -> Result<bool>;

    /// Register this node under a wallet address
    async fn register(&self, request: &RegisterRequest) -> Result<()>;

    /// Report liveness
    async fn heartbeat(&self, request: &HeartbeatRequest) -> Result<()>;
}

#[async_trait]
impl<T: RegistryApi + ?Sized> RegistryApi for Arc<T> {
    async fn check_registration(&self, node_id: &str) -> Result<bool> {
        (**self).check_registration(node_id).await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<()> {
        (**self).register(request).await
    }

    async fn heartbeat(&self, request: &HeartbeatRequest) -> Result<()> {
        (**self).heartbeat(request).await
    }
}

/// HTTP implementation of [`RegistryApi`]
///
/// Every call is bounded by the configured request timeout so a hung
/// registry cannot stall the liveness loop.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: Client,
    base_url: String,
    heartbeat_url: String,
}

impl RegistryClient {
    /// Build a client from registry configuration
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        check_url("registry", config.base_url())?;
        check_url("heartbeat", config.heartbeat_url())?;
        let http = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self::with_client(
            http,
            config.base_url(),
            config.heartbeat_url(),
        ))
    }

    /// Build a client around an existing `reqwest::Client`
    pub fn with_client(http: Client, base_url: &str, heartbeat_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            heartbeat_url: heartbeat_url.to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

fn check_url(kind: &str, raw: &str) -> Result<()> {
    Url::parse(raw)
        .map(|_| ())
        .map_err(|e| TaskBridgeError::config(format!("Invalid {} URL {}: {}", kind, raw, e)))
}

/// Turn a non-2xx response into a registry error carrying the body
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    Err(TaskBridgeError::registry(format!(
        "{} returned {}: {}",
        url, status, body
    )))
}

#[async_trait]
impl RegistryApi for RegistryClient {
    async fn check_registration(&self, node_id: &str) -> Result<bool> {
        let url = self.endpoint("check-registration");
        trace!("Checking registration at {}", url);

        let response = self
            .http
            .get(&url)
            .query(&[("nodeId", node_id)])
            .send()
            .await?;

        // Registries answer unknown nodes with an error status and a regular body
        let status = response.status();
        let text = response.text().await?;
        match serde_json::from_str::<CheckRegistrationResponse>(&text) {
            Ok(body) => {
                if !status.is_success() {
                    debug!("{} returned {} with body {}", url, status, text);
                }
                Ok(body.registered())
            }
            Err(e) if status.is_success() => Err(e.into()),
            Err(_) => Err(TaskBridgeError::registry(format!(
                "{} returned {}: {}",
                url, status, text
            ))),
        }
    }

    async fn register(&self, request: &RegisterRequest) -> Result<()> {
        let url = self.endpoint("register");
        trace!("Registering node {} at {}", request.node_id, url);

        let response = self.http.post(&url).json(request).send().await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn heartbeat(&self, request: &HeartbeatRequest) -> Result<()> {
        let response = self
            .http
            .post(&self.heartbeat_url)
            .json(request)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn client_for(server: &MockServer) -> RegistryClient {
        let config = RegistryConfig {
            base_url: Some(server.url("/api/node/")),
            heartbeat_url: Some(server.url("/api/node/heartbeat")),
            heartbeat_interval_secs: 60,
            request_timeout_secs: 1,
        };
        RegistryClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_check_registration() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/node/check-registration")
                    .query_param("nodeId", "node-1");
                then.status(200).json_body(json!({"isRegistered": true}));
            })
            .await;

        let client = client_for(&server);
        assert!(client.check_registration("node-1").await.unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_check_registration_reads_body_of_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/node/check-registration");
                then.status(404)
                    .json_body(json!({"isRegistered": false, "message": "Node not found"}));
            })
            .await;

        let client = client_for(&server);
        assert!(!client.check_registration("node-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_check_registration_error_status_without_body_fails() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/node/check-registration");
                then.status(503).body("maintenance");
            })
            .await;

        let client = client_for(&server);
        let err = client.check_registration("node-1").await.unwrap_err();
        assert!(matches!(err, TaskBridgeError::Registry(_)));
        assert!(err.to_string().contains("maintenance"));
    }

    #[test]
    fn test_invalid_urls_are_rejected() {
        let config = RegistryConfig {
            heartbeat_url: Some("heartbeat".to_string()),
            ..RegistryConfig::default()
        };
        let err = RegistryClient::new(&config).unwrap_err();
        assert!(matches!(err, TaskBridgeError::Config(_)));
    }

    #[tokio::test]
    async fn test_register_sends_camel_case_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/node/register")
                    .json_body(json!({"nodeId": "node-1", "walletAddress": "0xabc"}));
                then.status(200);
            })
            .await;

        let client = client_for(&server);
        client
            .register(&RegisterRequest {
                node_id: "node-1".to_string(),
                wallet_address: "0xabc".to_string(),
            })
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_heartbeat_payload() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/node/heartbeat").json_body(json!({
                    "node_id": "node-1",
                    "wallet_address": "0xabc",
                    "ip_address": "10.0.0.5",
                    "port": 52415
                }));
                then.status(200);
            })
            .await;

        let client = client_for(&server);
        client
            .heartbeat(&HeartbeatRequest {
                node_id: "node-1".to_string(),
                wallet_address: "0xabc".to_string(),
                ip_address: Some("10.0.0.5".to_string()),
                port: Some(52415),
            })
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/node/register");
                then.status(500).body("chain unavailable");
            })
            .await;

        let client = client_for(&server);
        let err = client
            .register(&RegisterRequest {
                node_id: "node-1".to_string(),
                wallet_address: "0xabc".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TaskBridgeError::Registry(_)));
        assert!(err.to_string().contains("chain unavailable"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/node/check-registration");
                then.status(200).body("not json");
            })
            .await;

        let client = client_for(&server);
        let err = client.check_registration("node-1").await.unwrap_err();
        assert!(matches!(err, TaskBridgeError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_calls_are_bounded_by_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/node/heartbeat");
                then.status(200).delay(Duration::from_secs(3));
            })
            .await;

        let client = client_for(&server);
        let err = client
            .heartbeat(&HeartbeatRequest {
                node_id: "node-1".to_string(),
                wallet_address: "0xabc".to_string(),
                ip_address: None,
                port: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}

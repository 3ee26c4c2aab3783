//! HTTP service front
//!
//! Owns the process-wide bridge and node identity, exposes `/execute-task`
//! and `/metrics`, and starts the liveness reporter at startup when a wallet
//! address is configured.

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use taskbridge_common::config::{NodeIdentity, RegistryConfig};
use taskbridge_common::error::Result;
use taskbridge_common::METRICS;
use taskbridge_proto::task::{ExecuteTaskRequest, TaskResponse};
use taskbridge_registry::{LivenessReporter, RegistryClient};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bridge::TaskBridge;

/// Network-facing side of the node
pub struct ServiceFront {
    bridge: TaskBridge,
    identity: Arc<NodeIdentity>,
    registry: RegistryConfig,
}

impl ServiceFront {
    pub fn new(bridge: TaskBridge, identity: NodeIdentity, registry: RegistryConfig) -> Self {
        Self {
            bridge,
            identity: Arc::new(identity),
            registry,
        }
    }

    /// Build the HTTP router
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/execute-task", post(execute_task))
            .route("/metrics", get(metrics))
            .with_state(Arc::clone(self))
    }

    /// Spawn the liveness reporter if a wallet address is known
    pub fn start_liveness(&self, cancel: CancellationToken) -> Result<Option<JoinHandle<()>>> {
        info!(
            "Node {} identity: wallet={:?}, host={:?}, port={:?}",
            self.identity.node_id, self.identity.wallet_address, self.identity.host, self.identity.port
        );

        if self.identity.wallet_address.is_none() {
            warn!("No wallet address configured, liveness reporting disabled");
            return Ok(None);
        }

        let client = RegistryClient::new(&self.registry)?;
        let handle = LivenessReporter::from_identity(client, &self.identity).map(|reporter| {
            reporter
                .with_interval(self.registry.heartbeat_interval())
                .spawn(cancel)
        });
        Ok(handle)
    }

    /// Serve on an already bound listener until `cancel` fires
    pub async fn serve(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        let addr = listener.local_addr()?;
        let app = self.router();

        info!("TaskBridge node listening on {}", addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        info!("HTTP server on {} stopped", addr);
        Ok(())
    }

    /// Bind, start liveness reporting, and serve until `cancel` fires
    pub async fn run(self: Arc<Self>, addr: SocketAddr, cancel: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        let liveness = self.start_liveness(cancel.child_token())?;

        let served = self.serve(listener, cancel.clone()).await;

        cancel.cancel();
        if let Some(handle) = liveness {
            if let Err(e) = handle.await {
                warn!("Liveness reporter ended abnormally: {}", e);
            }
        }
        served
    }
}

async fn execute_task(State(front): State<Arc<ServiceFront>>, body: Bytes) -> Json<TaskResponse> {
    let request: ExecuteTaskRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected task request: {}", e);
            return Json(TaskResponse::error(format!("Invalid request body: {}", e)));
        }
    };

    Json(front.bridge.handle(&request.prompt).await)
}

async fn metrics() -> String {
    METRICS.gather()
}

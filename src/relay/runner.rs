//! Relay server lifecycle: bind, accept loop, graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, routing::get};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::domain::{AuthService, MessageStore};

use super::handler::ws_handler;
use super::registry::SessionRegistry;
use super::state::{RelayConfig, RelayState};

/// The chat relay server, ready to be started.
pub struct RelayServer {
    config: RelayConfig,
    auth: Arc<dyn AuthService>,
    store: Arc<dyn MessageStore>,
}

impl RelayServer {
    pub fn new(
        config: RelayConfig,
        auth: Arc<dyn AuthService>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            config,
            auth,
            store,
        }
    }

    /// Bind and start serving.
    ///
    /// Each accepted connection gets its own handler task; a failing
    /// listener bind is the only unrecoverable startup error.
    ///
    /// # Arguments
    ///
    /// * `bind_addr` - Address to listen on, e.g. "127.0.0.1:8081". Port 0
    ///   picks a free port; see [`RelayHandle::local_addr`].
    pub async fn start(self, bind_addr: &str) -> Result<RelayHandle, std::io::Error> {
        let listener = TcpListener::bind(bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let state = Arc::new(RelayState::new(
            self.config,
            self.auth,
            self.store,
            shutdown.clone(),
        ));

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/api/health", get(health_check))
            .layer(TraceLayer::new_for_http())
            .with_state(state.clone());

        let serve_shutdown = shutdown.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
            .await;
            if let Err(e) = result {
                tracing::error!("relay server error: {}", e);
            }
        });

        tracing::info!("chat relay listening on {}", local_addr);
        tracing::info!("connect to: ws://{}/ws", local_addr);

        Ok(RelayHandle {
            local_addr,
            state,
            shutdown,
            task,
        })
    }
}

/// Handle to a running relay instance.
pub struct RelayHandle {
    local_addr: SocketAddr,
    state: Arc<RelayState>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl RelayHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The authoritative session registry, mainly for inspection in tests
    /// and diagnostics.
    pub fn registry(&self) -> &SessionRegistry {
        &self.state.registry
    }

    /// Graceful shutdown: signals every handler and broadcaster task to
    /// stop, lets in-flight teardown run and waits for the accept loop to
    /// return.
    pub async fn stop(self) {
        tracing::info!("shutting down chat relay on {}", self.local_addr);
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("relay serve task ended abnormally: {}", e);
        }
        tracing::info!("relay shutdown complete");
    }
}

/// Health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

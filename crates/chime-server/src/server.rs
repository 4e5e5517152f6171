//! `ChimeServer`: Axum HTTP + WebSocket front of the hub.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use chime_core::ChannelId;
use futures::StreamExt;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::admission::Admission;
use crate::config::{ConnectionConfig, ServerConfig};
use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcaster::Broadcaster;
use crate::websocket::connection::ClientConnection;
use crate::websocket::hub::{Hub, HubHandle};
use crate::websocket::session::run_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Coordinator handle.
    pub hub: HubHandle,
    /// Token validation and channel authorization.
    pub admission: Arc<dyn Admission>,
    /// Policy applied to every admitted connection.
    pub connection: ConnectionConfig,
    /// Prometheus renderer, if a recorder was installed.
    pub metrics: Option<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
}

/// The chime server: one hub plus the routes that feed it.
pub struct ChimeServer {
    config: ServerConfig,
    hub: HubHandle,
    admission: Arc<dyn Admission>,
    metrics: Option<PrometheusHandle>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl ChimeServer {
    /// Create a server and spawn its hub. Must be called inside a Tokio runtime.
    pub fn new(
        config: ServerConfig,
        admission: Arc<dyn Admission>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let (hub, hub_task) = Hub::spawn(config.hub_command_buffer, shutdown.token());
        shutdown.track(hub_task);
        Self {
            config,
            hub,
            admission,
            metrics,
            shutdown,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            admission: Arc::clone(&self.admission),
            connection: self.config.connection.clone(),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/ws/channels/{channel_id}", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`). The serving task is
    /// tracked by the shutdown coordinator.
    pub async fn listen(&self) -> std::io::Result<SocketAddr> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "http server failed");
            }
        });
        self.shutdown.track(task);

        info!(addr = %local_addr, "chime server listening");
        Ok(local_addr)
    }

    /// Hub handle for registering connections or broadcasting directly.
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// A notification façade over this server's hub.
    pub fn broadcaster(&self) -> Broadcaster {
        Broadcaster::new(self.hub.clone())
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[derive(Debug, Deserialize)]
struct WsParams {
    token: Option<String>,
}

/// GET /ws/channels/{channel_id}?token=...
///
/// Admission runs before the upgrade so rejected requests get a plain HTTP
/// error and never reach the hub.
async fn ws_handler(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Query(params): Query<WsParams>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let channel_id = ChannelId::from(channel_id);
    let user_id = match state
        .admission
        .admit(params.token.as_deref(), &channel_id)
        .await
    {
        Ok(user_id) => user_id,
        Err(e) => {
            debug!(channel_id = %channel_id, error = %e, "admission rejected");
            return e.into_response();
        }
    };
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let config = state.connection;
    let hub = state.hub;
    upgrade
        .max_message_size(config.max_message_size)
        .on_upgrade(move |socket| async move {
            let conn = Arc::new(ClientConnection::new(user_id, channel_id));
            let (sink, stream) = socket.split();
            let _ = run_session(conn, sink, stream, hub, config).await;
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.hub.stats().await.ok();
    Json(health::health_check(state.start_time, stats))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::admission::OriginFilter;
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::registry::OriginRegistry;
use crate::session::SessionConfig;
use crate::shutdown::ShutdownCoordinator;
use crate::upstream::UpstreamConnector;
use crate::websocket::handler::ws_handler;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live sessions by origin.
    pub registry: Arc<OriginRegistry>,
    /// Origin allow-list.
    pub filter: Arc<OriginFilter>,
    /// Dials upstream for every session.
    pub connector: Arc<dyn UpstreamConnector>,
    /// Per-session limits.
    pub session_config: SessionConfig,
    /// Max downstream message size in bytes.
    pub max_message_size: usize,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The relay server.
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<OriginRegistry>,
    filter: Arc<OriginFilter>,
    connector: Arc<dyn UpstreamConnector>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics_handle: PrometheusHandle,
}

impl RelayServer {
    /// Create a new server.
    pub fn new(
        config: ServerConfig,
        connector: Arc<dyn UpstreamConnector>,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        Self {
            registry: Arc::new(OriginRegistry::new(config.max_sessions_per_origin)),
            filter: Arc::new(OriginFilter::new(&config.admission)),
            config,
            connector,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics_handle,
        }
    }

    /// Shared state handed to every handler.
    pub fn state(&self) -> AppState {
        AppState {
            registry: self.registry.clone(),
            filter: self.filter.clone(),
            connector: self.connector.clone(),
            session_config: self.config.session.clone(),
            max_message_size: self.config.max_message_size,
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics_handle.clone(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state())
    }

    /// Bind the listener and serve in a background task.
    ///
    /// Returns the bound address and the server task. The task ends after
    /// the shutdown token is cancelled and in-flight HTTP requests finish;
    /// on cancellation every live session is told to close.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();
        let registry = self.registry.clone();

        let handle = tokio::spawn(async move {
            let signal = async move {
                token.cancelled().await;
                let notified = registry.shutdown_all();
                info!(sessions = notified, "closing live sessions");
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await
            {
                error!(error = %e, "server error");
            }
        });

        info!(%addr, "relay listening");
        Ok((addr, handle))
    }

    /// Stop accepting, close every session, and wait for them (bounded).
    pub async fn shutdown_gracefully(&self, server: JoinHandle<()>) {
        self.shutdown
            .graceful_shutdown(vec![server], Some(self.config.shutdown_timeout))
            .await;
        info!("relay stopped");
    }

    /// Get the origin registry.
    pub fn registry(&self) -> &Arc<OriginRegistry> {
        &self.registry
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

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.session_count(),
        state.registry.origin_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}

//! `RelayServer`: Axum HTTP + WebSocket front end.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use relay_broker::{AnyBroker, Broker};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::orchestrator::Orchestrator;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::handler::ws_handler;

/// Shared state accessible from Axum handlers.
pub struct AppState<B: Broker = AnyBroker> {
    /// Message router.
    pub orchestrator: Arc<Orchestrator<B>>,
    /// Listener and connection limits.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl<B: Broker> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        }
    }
}

/// The relay's HTTP server.
pub struct RelayServer<B: Broker = AnyBroker> {
    config: Arc<ServerConfig>,
    orchestrator: Arc<Orchestrator<B>>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl<B: Broker + 'static> RelayServer<B> {
    /// Create a server routing through `orchestrator`.
    pub fn new(config: ServerConfig, orchestrator: Arc<Orchestrator<B>>) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            orchestrator: self.orchestrator.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler::<B>))
            .route("/health", get(health_handler::<B>))
            .route("/metrics", get(metrics_handler::<B>))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown is signalled.
    ///
    /// Returns the bound address (useful with port 0). The serve task is
    /// tracked by the [`shutdown`](Self::shutdown) coordinator.
    pub async fn listen(&self) -> Result<SocketAddr, ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(token.cancelled_owned());
            if let Err(e) = serve.await {
                error!(error = %e, "http server stopped with error");
            }
        });
        self.shutdown.track(handle);
        info!(%addr, "relay server listening");
        Ok(addr)
    }

    /// Message router.
    pub fn orchestrator(&self) -> &Arc<Orchestrator<B>> {
        &self.orchestrator
    }

    /// Shutdown coordinator for the serve task.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler<B: Broker + 'static>(
    State(state): State<AppState<B>>,
) -> Json<HealthResponse> {
    let orchestrator = &state.orchestrator;
    Json(health::health_check(
        state.start_time,
        orchestrator.connection_count(),
        orchestrator.broker().name(),
        orchestrator.pending_tasks(),
    ))
}

/// GET /metrics
async fn metrics_handler<B: Broker + 'static>(State(state): State<AppState<B>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

//! HTTP surface of both endpoints and the lifecycle of the running service.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    response::{IntoResponse, Response},
    routing::get,
};
use lingumate_protocol::ClosureReason;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::{error, info, warn};

use crate::audit::{AuditSink, SessionEvent};
use crate::config::ServiceConfig;
use crate::metrics::{HealthStatus, ServerMetrics};
use crate::provider::TranslationProvider;
use crate::registry::SessionRegistry;
use crate::session::TranslationMessage;
use crate::ws::{self, Endpoint};

/// How long shutdown waits for listeners to drain before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Custom span maker that tags each request with the endpoint and a request ID
#[derive(Clone)]
struct EndpointMakeSpan(Endpoint);

impl<B> MakeSpan<B> for EndpointMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            endpoint = %self.0,
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub provider: Arc<dyn TranslationProvider>,
    /// `None` unless `[audit] enabled = true`
    pub audit: Option<Arc<dyn AuditSink>>,
    pub config: Arc<ServiceConfig>,
    /// Server metrics for observability
    pub metrics: Arc<ServerMetrics>,
}

impl AppState {
    pub fn new(
        config: ServiceConfig,
        provider: Arc<dyn TranslationProvider>,
        audit: Option<Arc<dyn AuditSink>>,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            provider,
            audit,
            config: Arc::new(config),
            metrics: Arc::new(ServerMetrics::new()),
        }
    }

    /// Book-keeping for a session the registry has just closed.
    pub fn session_closed(&self, session_id: &str, reason: ClosureReason) {
        self.metrics.session_closed(reason);
        self.session_event(
            session_id,
            SessionEvent::Closed,
            Some(reason.as_str().to_string()),
        );
    }

    pub fn session_event(&self, session_id: &str, event: SessionEvent, detail: Option<String>) {
        let Some(audit) = self.audit.clone() else {
            return;
        };
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = audit
                .record_session_event(&session_id, event, detail.as_deref())
                .await
            {
                warn!(session_id = %session_id, %event, "Failed to record session event: {:#}", e);
            }
        });
    }

    pub fn audit_message(&self, message: TranslationMessage) {
        let Some(audit) = self.audit.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = audit.record_message(&message).await {
                warn!(session_id = %message.session_id, "Failed to record translation: {:#}", e);
            }
        });
    }
}

async fn handshake_ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| ws::serve_socket(socket, state, Endpoint::Handshake))
}

async fn relay_ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| ws::serve_socket(socket, state, Endpoint::Relay))
}

/// Health check endpoint - returns server status
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = state.metrics.snapshot();
    Json(HealthStatus {
        status: "healthy".to_string(),
        environment: state.config.server.environment.clone(),
        uptime_secs: metrics.uptime_secs,
        live_sessions: state.registry.len().await,
        connections: metrics.connections.active,
    })
}

/// Metrics endpoint - returns detailed server metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

fn common_routes(router: Router<AppState>, endpoint: Endpoint) -> Router<AppState> {
    router
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(EndpointMakeSpan(endpoint)))
        .layer(CorsLayer::permissive())
}

/// Session creation and pairing only.
pub fn handshake_router(state: AppState) -> Router {
    common_routes(
        Router::new().route("/ws", get(handshake_ws_handler)),
        Endpoint::Handshake,
    )
    .with_state(state)
}

/// Full protocol; also answers on `/` for clients that connect to the bare URL.
pub fn relay_router(state: AppState) -> Router {
    common_routes(
        Router::new()
            .route("/", get(relay_ws_handler))
            .route("/ws", get(relay_ws_handler)),
        Endpoint::Relay,
    )
    .with_state(state)
}

/// Both listeners plus the idle reaper, running in the background.
pub struct RunningServer {
    pub handshake_addr: SocketAddr,
    pub relay_addr: SocketAddr,
    state: AppState,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningServer {
    /// Bind both endpoints on the configured addresses and start serving.
    pub async fn bind(state: AppState) -> Result<Self> {
        let handshake_addr = state.config.server.handshake_addr()?;
        let relay_addr = state.config.server.relay_addr()?;
        let handshake = TcpListener::bind(handshake_addr)
            .await
            .with_context(|| format!("Failed to bind handshake endpoint on {handshake_addr}"))?;
        let relay = TcpListener::bind(relay_addr)
            .await
            .with_context(|| format!("Failed to bind relay endpoint on {relay_addr}"))?;
        Self::start(state, handshake, relay)
    }

    /// Start serving on already-bound listeners.
    pub fn start(state: AppState, handshake: TcpListener, relay: TcpListener) -> Result<Self> {
        let handshake_addr = handshake.local_addr()?;
        let relay_addr = relay.local_addr()?;
        let shutdown = CancellationToken::new();
        let mut tasks = Vec::new();

        for (endpoint, listener, router) in [
            (Endpoint::Handshake, handshake, handshake_router(state.clone())),
            (Endpoint::Relay, relay, relay_router(state.clone())),
        ] {
            let token = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                let result = axum::serve(listener, router)
                    .with_graceful_shutdown(async move { token.cancelled().await })
                    .await;
                if let Err(e) = result {
                    error!(%endpoint, "Server error: {}", e);
                }
            }));
        }

        if let Some(idle_timeout) = state.config.session.idle_timeout {
            tasks.push(tokio::spawn(reap_idle_sessions(
                state.clone(),
                idle_timeout,
                state.config.session.reap_interval,
                shutdown.clone(),
            )));
        }

        info!("Handshake endpoint: ws://{}/ws", handshake_addr);
        info!("Relay endpoint:     ws://{}/ws", relay_addr);

        Ok(Self {
            handshake_addr,
            relay_addr,
            state,
            shutdown,
            tasks,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Close every open session with `server_shutdown`, then stop the
    /// listeners and the reaper.
    pub async fn shutdown(self) {
        let closed = self
            .state
            .registry
            .close_all(ClosureReason::ServerShutdown)
            .await;
        for snapshot in &closed {
            self.state
                .session_closed(&snapshot.session_id, ClosureReason::ServerShutdown);
        }
        info!("Closed {} open sessions", closed.len());

        self.shutdown.cancel();
        for task in self.tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("Listener did not drain within {:?}, aborting", SHUTDOWN_GRACE);
                abort.abort();
            }
        }
        info!("Shutdown complete");
    }
}

async fn reap_idle_sessions(
    state: AppState,
    idle_timeout: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                for snapshot in state.registry.reap_idle(idle_timeout).await {
                    info!(session_id = %snapshot.session_id, "Closed idle session");
                    state.session_closed(&snapshot.session_id, ClosureReason::IdleTimeout);
                }
            }
        }
    }
}

//! The collector server (C4): binds an axum app exposing `/sdk`
//! (bidirectional, per-session) and `/events` (broadcast-only), plus the
//! ambient `GET /healthz`. Binding retries across a small port range
//! before giving up (spec.md §4.4).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use collector_core::config::CollectorConfig;
use collector_core::EventStore;

use crate::broadcast::Broadcaster;
use crate::command_router::CommandRouter;
use crate::connection::{events_upgrade, sdk_upgrade};
use crate::error::TransportError;
use crate::registry::Registry;

/// Shared application state reachable from every handler. Construct one
/// with [`CollectorServer::new`], then [`CollectorServer::start`] it.
pub struct CollectorServer {
    pub store: Arc<EventStore>,
    pub registry: Arc<Registry>,
    pub router: Arc<CommandRouter>,
    pub broadcaster: Arc<Broadcaster>,
    pub(crate) config: CollectorConfig,
}

impl CollectorServer {
    pub fn new(config: CollectorConfig) -> Arc<Self> {
        let store = Arc::new(EventStore::new(collector_core::store::StoreCapacities {
            session: config.ring_capacity,
            network: config.ring_capacity,
            console: config.ring_capacity,
            state: config.ring_capacity,
            render: config.ring_capacity,
            performance: config.ring_capacity,
            database: config.ring_capacity,
            dom_snapshot: config.ring_capacity,
            recon: config.ring_capacity,
        }));
        let registry = Arc::new(Registry::new());
        let broadcaster = Arc::new(Broadcaster::new(config.broadcast_queue_cap));
        let router = Arc::new(CommandRouter::new(registry.clone(), store.clone(), broadcaster.clone()));
        Arc::new(Self {
            store,
            registry,
            router,
            broadcaster,
            config,
        })
    }

    /// Dispatches a command to `session_id` using this server's
    /// configured default timeout. A thin convenience over
    /// [`CommandRouter::send_command`] for the common case.
    pub async fn send_command(
        &self,
        session_id: &str,
        command: &str,
        request_id: &str,
        params: serde_json::Value,
    ) -> crate::command_router::CommandResult {
        self.router
            .send_command(
                session_id,
                command,
                request_id,
                params,
                Duration::from_millis(self.config.command_timeout_ms),
            )
            .await
    }

    fn router_app(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/sdk", get(sdk_upgrade))
            .route("/events", get(events_upgrade))
            .route("/healthz", get(healthz))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    /// Binds the app, trying `config.port..=config.port + max_port_retries`
    /// in order, and spawns the accept loop. Returns a [`ServerHandle`]
    /// for graceful shutdown.
    pub async fn start(self: &Arc<Self>) -> Result<ServerHandle, TransportError> {
        let app = self.router_app();

        let mut last_error = None;
        for offset in 0..=self.config.max_port_retries {
            let port = self.config.port.saturating_add(offset);
            let addr = format!("{}:{}", self.config.host, port);
            match TcpListener::bind(&addr).await {
                Ok(listener) => {
                    let local_addr = listener.local_addr().map_err(TransportError::Io)?;
                    tracing::info!(%local_addr, "collector server bound");

                    let shutdown = Arc::new(Notify::new());
                    let shutdown_signal = shutdown.clone();
                    let join: JoinHandle<()> = tokio::spawn(async move {
                        let result = axum::serve(listener, app)
                            .with_graceful_shutdown(async move {
                                shutdown_signal.notified().await;
                            })
                            .await;
                        if let Err(error) = result {
                            tracing::error!(%error, "collector server exited with an error");
                        }
                    });

                    return Ok(ServerHandle {
                        local_addr,
                        shutdown,
                        join,
                        grace: Duration::from_millis(self.config.shutdown_grace_ms),
                    });
                }
                Err(error) => {
                    tracing::warn!(port, %error, "port unavailable, retrying");
                    last_error = Some(error);
                }
            }
        }

        let _ = last_error;
        Err(TransportError::PortInUse {
            start: self.config.port,
            end: self.config.port.saturating_add(self.config.max_port_retries),
        })
    }

    /// Resolves every pending command waiter with `Shutdown`, then signals
    /// the accept loop to stop and waits up to `shutdown_grace_ms` for it
    /// to finish.
    pub async fn shutdown(&self, handle: ServerHandle) {
        self.router.shutdown_all();
        handle.shutdown.notify_waiters();
        if tokio::time::timeout(handle.grace, handle.join).await.is_err() {
            tracing::warn!("collector server did not finish within the shutdown grace period");
        }
    }
}

/// Handle to a running [`CollectorServer`] accept loop.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
    grace: Duration,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

async fn healthz(State(server): State<Arc<CollectorServer>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": server.registry.all().len(),
        "events": server.store.event_count(),
        "invalidFrames": server.store.invalid_frame_count(),
        "invalidEvents": server.store.invalid_event_count(),
    }))
}

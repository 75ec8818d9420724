//! WebSocket transport for roleplay sessions.
//!
//! One route: `GET /ws/roleplay/:session_id` upgrades to a WebSocket bound
//! to that session. The wire protocol is defined in [`events`]; connection
//! lifecycle (eviction, heartbeats, idle timeout) lives in [`ws`].

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use dealcoach_engine::RoleplayService;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod events;
pub mod ws;

pub use events::{ClientEvent, ServerEvent};
pub use ws::{ConnectionManager, CLOSE_CODE_REPLACED};

/// Shared state behind every connection.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The engine all sessions run through.
    pub service: Arc<RoleplayService>,
    /// One-connection-per-session bookkeeping.
    pub connections: ConnectionManager,
    /// Interval between server heartbeats.
    pub heartbeat_interval: Duration,
    /// Client silence tolerated before the connection is dropped.
    pub idle_timeout: Duration,
}

impl AppState {
    /// Creates the shared state.
    #[must_use]
    pub fn new(
        service: Arc<RoleplayService>,
        heartbeat_interval: Duration,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            service,
            connections: ConnectionManager::new(),
            heartbeat_interval,
            idle_timeout,
        }
    }
}

/// Builds the router with tracing and permissive CORS.
#[must_use]
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/roleplay/:session_id", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

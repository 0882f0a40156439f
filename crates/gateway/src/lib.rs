//! # Crosstalk Gateway Crate
//!
//! HTTP and WebSocket surface of the relay. A single axum router exposes
//! the `/ws` endpoint every client speaks to, plus a `/health` probe.
//!
//! ## Architecture
//!
//! - **Session**: per-socket task driving authentication and the chat loop
//! - **Registry**: live connections, shared through [`RelayState`]
//! - **Fanout**: serialize-once broadcast with slow-client accounting
//! - **Auth**: signup and login checks in front of the account store

mod auth;
mod connection;
pub mod fanout;
mod registry;
mod session;
mod state;

pub use auth::AuthGate;
pub use connection::ClientConnection;
pub use registry::ConnectionRegistry;
pub use state::RelayState;

use axum::http::header::CONTENT_TYPE;
use axum::http::Method;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

/// Build the router serving the relay endpoints.
pub fn build_router(state: RelayState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(session::relay_websocket_handler))
        .with_state(state)
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
    })
}

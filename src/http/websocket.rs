//! Web-socket listener.
//!
//! # Data Flow
//! ```text
//! HTTP GET / with Upgrade: websocket
//!     → handshake (offers the `mqtt` subprotocol)
//!     → broker session over message frames
//! ```
//!
//! # Design Decisions
//! - No transport encryption; terminate TLS in a reverse proxy if needed
//! - Any path is accepted for the upgrade

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    response::Response,
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;

use crate::broker::hook::ClientInfo;
use crate::broker::session::Sessions;
use crate::net::listener::TransportKind;

/// Subprotocol offered during the upgrade.
pub const SUBPROTOCOL: &str = "mqtt";

#[derive(Clone)]
struct WsState {
    listener: Arc<str>,
    sessions: Arc<Sessions>,
}

/// Build the upgrade router for the listener called `name`.
pub fn router(name: String, sessions: Arc<Sessions>) -> Router {
    let state = WsState {
        listener: Arc::from(name),
        sessions,
    };
    Router::new()
        .route("/", get(upgrade))
        .route("/{*path}", get(upgrade))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn upgrade(
    State(state): State<WsState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let client = ClientInfo {
        listener: state.listener.to_string(),
        transport: TransportKind::WebSocket,
        remote_addr,
        peer_certificate: false,
    };

    ws.protocols([SUBPROTOCOL])
        .on_upgrade(move |socket| async move { state.sessions.run_websocket(client, socket).await })
}

//! HTTP-based listeners.
//!
//! # Data Flow
//! ```text
//! TcpListener (bound by net::listener)
//!     → websocket.rs (upgrade → broker session)
//!     → stats.rs (GET / → Info snapshot as JSON)
//! ```

pub mod stats;
pub mod websocket;

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;

use crate::lifecycle::ShutdownSignal;

/// Serve `router` on an already bound listener until shutdown is signalled.
pub async fn serve_router(
    listener: TcpListener,
    router: Router,
    mut shutdown: ShutdownSignal,
) -> Result<(), std::io::Error> {
    let app = router.into_make_service_with_connect_info::<SocketAddr>();

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.recv().await })
        .await
}

//! Diagnostics listener: a read-only view of broker `Info`.

use axum::{extract::State, routing::get, Json, Router};
use tower_http::trace::TraceLayer;

use crate::broker::Info;
use crate::net::listener::InfoFn;

/// Build the diagnostics router. Only `GET /` is routed.
pub fn router(info: InfoFn) -> Router {
    Router::new()
        .route("/", get(snapshot))
        .with_state(info)
        .layer(TraceLayer::new_for_http())
}

async fn snapshot(State(info): State<InfoFn>) -> Json<Info> {
    Json(info())
}

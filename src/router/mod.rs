//! HTTP metrics/trigger surface.
//!
//! A small `axum` router exposing host diagnostics and the ability to
//! trigger an out-of-band cycle, all behind bearer-token auth.

mod handlers;
mod middleware;

use std::sync::Arc;

use axum::{routing::get, routing::post, Router};
use tower_http::trace::TraceLayer;

use crate::host::HostClient;
use crate::scheduler::Scheduler;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub host: Arc<dyn HostClient>,
    pub bearer_token: String,
}

/// Build the HTTP router. `/healthz` is unauthenticated; everything under
/// `/v1` requires the bearer token.
pub fn build_router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/metrics/host/info", get(handlers::host_info))
        .route("/metrics/host/version", get(handlers::host_version))
        .route("/metrics/host/disk-usage", get(handlers::host_disk_usage))
        .route("/metrics", get(handlers::metrics))
        .route("/update", post(handlers::trigger_update))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .nest("/v1", v1)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! HTTP request handlers for the metrics/trigger surface.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

fn host_error_response(e: crate::host::HostError) -> axum::response::Response {
    (StatusCode::BAD_GATEWAY, Json(ErrorBody { error: "HostError".into(), message: e.to_string() })).into_response()
}

pub async fn host_info(State(state): State<AppState>) -> axum::response::Response {
    match state.host.host_info().await {
        Ok(info) => Json(serde_json::json!({
            "containers_running": info.containers_running,
            "containers_stopped": info.containers_stopped,
            "images": info.images,
            "driver": info.driver,
            "os": info.os,
            "architecture": info.architecture,
        }))
        .into_response(),
        Err(e) => host_error_response(e),
    }
}

pub async fn host_version(State(state): State<AppState>) -> axum::response::Response {
    match state.host.version().await {
        Ok(version) => Json(serde_json::json!({
            "version": version.version,
            "api_version": version.api_version,
            "os": version.os,
            "arch": version.arch,
        }))
        .into_response(),
        Err(e) => host_error_response(e),
    }
}

pub async fn host_disk_usage(State(state): State<AppState>) -> axum::response::Response {
    match state.host.disk_usage().await {
        Ok(usage) => Json(serde_json::json!({
            "images_size": usage.images_size,
            "containers_size": usage.containers_size,
            "volumes_size": usage.volumes_size,
        }))
        .into_response(),
        Err(e) => host_error_response(e),
    }
}

/// Snapshot of the most recent completed cycle. Empty before the first
/// cycle; never blocks on one in flight.
pub async fn metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    let report = state.scheduler.last_report();
    Json(serde_json::json!({
        "scanned": report.scanned.len(),
        "updated": report.updated.len(),
        "restarted": report.restarted.len(),
        "failed": report.failed.len(),
        "skipped": report.skipped.len(),
        "stale": report.stale.len(),
        "fresh": report.fresh.len(),
    }))
}

/// Coalesced external trigger: returns immediately, the cycle runs
/// asynchronously on the scheduler's own loop.
pub async fn trigger_update(State(state): State<AppState>) -> impl IntoResponse {
    state.scheduler.trigger();
    (StatusCode::ACCEPTED, Json(serde_json::json!({ "status": "triggered" })))
}

pub async fn healthz() -> &'static str {
    "ok"
}

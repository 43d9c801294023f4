//! Bearer-token authentication middleware for the metrics/trigger surface.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::super::AppState;

/// Validate the `Authorization: Bearer <token>` header against the
/// configured token. Missing or mismatched tokens are rejected before the
/// handler runs; there is no anonymous route under the mounted prefix.
pub async fn require_auth(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response {
    let auth_header = request.headers().get("Authorization").and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        _ => return unauthorized_response("missing or invalid authorization header"),
    };

    if token != state.bearer_token {
        return unauthorized_response("invalid authentication token");
    }

    next.run(request).await
}

fn unauthorized_response(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized", "message": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::engine::{CycleParams, UpdateEngine};
    use crate::git::{AuthConfig, GitError, GitTracker};
    use crate::host::{ContainerFilter, HostClient, HostError};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use std::sync::Arc;

    struct DeadHost;
    #[async_trait]
    impl HostClient for DeadHost {
        async fn list_containers(&self, _: &ContainerFilter) -> Result<Vec<Container>, HostError> {
            unimplemented!()
        }
        async fn get_container(&self, _: &str) -> Result<Container, HostError> {
            unimplemented!()
        }
        async fn pull_image(&self, _: &str) -> Result<(), HostError> {
            unimplemented!()
        }
        async fn local_image_id(&self, _: &str) -> Result<String, HostError> {
            unimplemented!()
        }
        async fn stop_container(&self, _: &Container, _: std::time::Duration) -> Result<(), HostError> {
            unimplemented!()
        }
        async fn start_container(&self, _: &Container) -> Result<String, HostError> {
            unimplemented!()
        }
        async fn rename_container(&self, _: &str, _: &str) -> Result<(), HostError> {
            unimplemented!()
        }
        async fn remove_container(&self, _: &str, _: bool) -> Result<(), HostError> {
            unimplemented!()
        }
        async fn remove_image(&self, _: &str) -> Result<(), HostError> {
            unimplemented!()
        }
        async fn create_from(&self, _: &Container, _: &str, _: &str) -> Result<String, HostError> {
            unimplemented!()
        }
        async fn exec(
            &self,
            _: &str,
            _: &str,
            _: std::time::Duration,
            _: Option<u32>,
            _: Option<u32>,
        ) -> Result<crate::host::ExecOutcome, HostError> {
            unimplemented!()
        }
        async fn wait_healthy(&self, _: &str, _: std::time::Duration) -> Result<(), HostError> {
            unimplemented!()
        }
        async fn has_healthcheck(&self, _: &str) -> Result<bool, HostError> {
            unimplemented!()
        }
        async fn host_info(&self) -> Result<crate::host::HostInfo, HostError> {
            unimplemented!()
        }
        async fn version(&self) -> Result<crate::host::VersionInfo, HostError> {
            unimplemented!()
        }
        async fn disk_usage(&self) -> Result<crate::host::DiskUsage, HostError> {
            unimplemented!()
        }
    }

    struct DeadGit;
    #[async_trait]
    impl GitTracker for DeadGit {
        async fn get_latest_commit(&self, _: &str, _: &str, _: &AuthConfig) -> Result<String, GitError> {
            unimplemented!()
        }
    }

    fn state() -> AppState {
        let engine = Arc::new(UpdateEngine::new(Arc::new(DeadHost), Arc::new(DeadGit)));
        let scheduler = Arc::new(crate::scheduler::Scheduler::new(engine, None, CycleParams::default()));
        AppState {
            scheduler,
            host: Arc::new(DeadHost),
            bearer_token: "secret".to_string(),
        }
    }

    async fn probe() -> &'static str {
        "ok"
    }

    fn protected_app(state: AppState) -> Router {
        Router::new()
            .route("/probe", get(probe))
            .layer(axum::middleware::from_fn_with_state(state.clone(), require_auth))
            .with_state(state)
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        use tower::ServiceExt;
        let app = protected_app(state());
        let response = app.oneshot(Request::builder().uri("/probe").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn correct_token_is_accepted() {
        use tower::ServiceExt;
        let app = protected_app(state());
        let request = Request::builder()
            .uri("/probe")
            .header("Authorization", "Bearer secret")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}


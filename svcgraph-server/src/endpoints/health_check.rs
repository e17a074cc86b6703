//! Liveness and readiness checks for orchestrators.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::service::ServiceState;

/// The kind of health check.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum IsHealthy {
    /// Check if the server is alive at all.
    #[serde(rename = "live")]
    Liveness,
    /// Check if the server should receive traffic, which stops once shutdown has begun.
    #[serde(rename = "ready")]
    Readiness,
}

#[derive(Serialize)]
struct Status {
    is_healthy: bool,
}

pub async fn handle(
    State(state): State<ServiceState>,
    Path(kind): Path<IsHealthy>,
) -> impl IntoResponse {
    let is_healthy = match kind {
        IsHealthy::Liveness => true,
        IsHealthy::Readiness => !state.is_shutting_down(),
    };

    let status = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, axum::Json(Status { is_healthy }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::endpoints::routes;
    use crate::testutils::{RecordingStore, state};

    async fn check(state: &ServiceState, path: &str) -> (StatusCode, String) {
        let app = routes(state.config()).with_state(state.clone());
        let response = app
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_readiness_fails_on_shutdown() {
        let state = state(Arc::new(RecordingStore::default()));

        let (status, body) = check(&state, "/api/health/ready").await;
        assert_eq!(status, StatusCode::OK);
        insta::assert_snapshot!(body, @r#"{"is_healthy":true}"#);

        state.begin_shutdown();

        let (status, body) = check(&state, "/api/health/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        insta::assert_snapshot!(body, @r#"{"is_healthy":false}"#);

        let (status, _) = check(&state, "/api/health/live").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_kind() {
        let state = state(Arc::new(RecordingStore::default()));
        let (status, _) = check(&state, "/api/health/startup").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

//! Web server endpoints.
//!
//! The server accepts OTLP trace exports on `/v1/traces` and exposes liveness and readiness
//! checks under `/api/health/`.

mod health_check;
mod traces;

use axum::Router;
use axum::routing::get;
use svcgraph_config::Config;

use crate::service::ServiceState;

/// All routes served by the HTTP server.
pub fn routes(config: &Config) -> Router<ServiceState> {
    Router::new()
        .route("/api/health/{kind}", get(health_check::handle))
        .route("/v1/traces", traces::route(config))
        .route("/v1/traces/", traces::route(config))
}

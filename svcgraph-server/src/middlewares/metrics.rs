use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use svcgraph_statsd::metric;
use tokio::time::Instant;

use crate::statsd::ServerTimers;

/// A middleware that emits the duration of every request.
///
/// Requests that do not match a route are reported as `unknown`.
pub async fn metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or("unknown", |path| path.as_str())
        .to_owned();

    let response = next.run(request).await;

    metric!(
        timer(ServerTimers::RequestsDuration) = start.elapsed(),
        route = &route,
        status_code = response.status().as_str(),
    );

    response
}

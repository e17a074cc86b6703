//! OTLP/HTTP trace export endpoint.

use std::convert::Infallible;

use axum::extract::{DefaultBodyLimit, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, post};
use bytes::Bytes;
use prost::Message as _;
use svcgraph_config::Config;
use svcgraph_spans::TracesData;
use svcgraph_statsd::metric;

use crate::service::ServiceState;
use crate::statsd::ServerCounters;

/// The raw value of the `Content-Type` header, empty if missing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawContentType(String);

impl AsRef<str> for RawContentType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for RawContentType
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        let mime = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_owned();

        Ok(Self(mime))
    }
}

/// Payload formats accepted by the OTLP endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtelFormat {
    /// `application/json`
    Json,
    /// `application/x-protobuf`
    Protobuf,
}

impl OtelFormat {
    /// Returns the MIME type of the format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Protobuf => "application/x-protobuf",
        }
    }

    /// Parses a `Content-Type` header value, ignoring parameters such as `charset`.
    fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type.split(';').next().unwrap_or_default().trim();

        if mime.eq_ignore_ascii_case(Self::Json.as_str()) {
            Some(Self::Json)
        } else if mime.eq_ignore_ascii_case(Self::Protobuf.as_str()) {
            Some(Self::Protobuf)
        } else {
            None
        }
    }
}

fn parse_traces_data(format: OtelFormat, payload: &[u8]) -> Option<TracesData> {
    match format {
        OtelFormat::Json => serde_json::from_slice(payload)
            .inspect_err(|e| {
                svcgraph_log::debug!(
                    error = e as &dyn std::error::Error,
                    "failed to parse traces data as JSON"
                );
            })
            .ok(),
        OtelFormat::Protobuf => TracesData::decode(payload)
            .inspect_err(|e| {
                svcgraph_log::debug!(
                    error = e as &dyn std::error::Error,
                    "failed to parse traces data as protobuf"
                );
            })
            .ok(),
    }
}

async fn handle(
    State(state): State<ServiceState>,
    content_type: RawContentType,
    payload: Bytes,
) -> Response {
    let Some(format) = OtelFormat::from_content_type(content_type.as_ref()) else {
        metric!(
            counter(ServerCounters::RequestsRejected) += 1,
            reason = "content_type"
        );
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    };

    let Some(traces) = parse_traces_data(format, &payload) else {
        metric!(
            counter(ServerCounters::RequestsRejected) += 1,
            reason = "invalid_payload"
        );
        return StatusCode::BAD_REQUEST.into_response();
    };

    let summary = state.processor().process(traces).await;
    svcgraph_log::debug!(
        received = summary.received,
        written = summary.written,
        deduplicated = summary.deduplicated,
        health_probes = summary.health_probes,
        skipped = summary.skipped,
        failed = summary.failed,
        "processed trace export"
    );

    // An empty export response encodes to an empty body in both formats we accept.
    ([(header::CONTENT_TYPE, format.as_str())], Bytes::new()).into_response()
}

pub fn route(config: &Config) -> MethodRouter<ServiceState> {
    post(handle).route_layer(DefaultBodyLimit::max(config.max_request_size()))
}

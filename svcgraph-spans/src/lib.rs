//! Span model and the first stages of the graph pipeline.
//!
//! Incoming OpenTelemetry spans are converted to a [`Span`] by [`normalize`]. [`derive`] and
//! [`enrich`] turn a span and the attributes of its resource into a caller to callee edge, and
//! [`is_health_probe`] recognizes spans of liveness and readiness checks that should not show up
//! in the graph.

#![warn(missing_docs)]

pub mod conventions;

mod edge;
mod otel;
mod probe;
mod span;

pub use edge::*;
pub use otel::*;
pub use probe::*;
pub use span::*;

pub use opentelemetry_proto::tonic::trace::v1::{Span as OtelSpan, TracesData};

use svcgraph_statsd::{CounterMetric, GaugeMetric, TimerMetric};

/// Counter metrics used by the server.
pub enum ServerCounters {
    /// Number of spans received on the traces endpoint.
    SpansReceived,
    /// Number of spans dropped as liveness, readiness or health checks.
    HealthProbe,
    /// Number of spans dropped because their edge was written within the dedup window.
    Deduplicated,
    /// Number of edges upserted into the graph.
    SpansWritten,
    /// Number of edges not written because they failed validation.
    ///
    /// This metric is tagged with:
    /// - `reason`: why the edge was skipped (`empty_name`, `ip_literal` or `self_loop`).
    SpansSkipped,
    /// Number of graph transactions that failed.
    WriteFailed,
    /// Number of admitted edges released from the dedup cache because their request was
    /// dropped before the edge was written.
    SpansCancelled,
    /// Number of ownership lookups that failed with a control plane error.
    OwnershipFailed,
    /// Number of spans for which an owning workload was found.
    ///
    /// This metric is tagged with:
    /// - `strategy`: the strategy that found the owner.
    OwnershipResolved,
    /// Number of export requests rejected for an unsupported content type or an invalid body.
    ///
    /// This metric is tagged with:
    /// - `reason`: `content_type` or `invalid_payload`.
    RequestsRejected,
}

impl CounterMetric for ServerCounters {
    fn name(&self) -> &'static str {
        match self {
            ServerCounters::SpansReceived => "spans.received",
            ServerCounters::HealthProbe => "spans.health_probe",
            ServerCounters::Deduplicated => "spans.deduplicated",
            ServerCounters::SpansWritten => "spans.written",
            ServerCounters::SpansSkipped => "spans.skipped",
            ServerCounters::WriteFailed => "spans.write_failed",
            ServerCounters::SpansCancelled => "spans.cancelled",
            ServerCounters::OwnershipFailed => "ownership.failed",
            ServerCounters::OwnershipResolved => "ownership.resolved",
            ServerCounters::RequestsRejected => "requests.rejected",
        }
    }
}

/// Timer metrics used by the server.
pub enum ServerTimers {
    /// Time spent resolving the owning workload of one span.
    OwnershipResolveDuration,
    /// Time spent in one graph transaction.
    GraphWriteDuration,
    /// Total duration of an HTTP request.
    ///
    /// This metric is tagged with:
    /// - `route`: the matched route.
    /// - `status_code`: the response status.
    RequestsDuration,
}

impl TimerMetric for ServerTimers {
    fn name(&self) -> &'static str {
        match self {
            ServerTimers::OwnershipResolveDuration => "ownership.resolve_duration",
            ServerTimers::GraphWriteDuration => "graph.write_duration",
            ServerTimers::RequestsDuration => "requests.duration",
        }
    }
}

/// Gauge metrics used by the server.
pub enum ServerGauges {
    /// Number of entries in the dedup cache, including expired ones not yet evicted.
    DedupEntries,
}

impl GaugeMetric for ServerGauges {
    fn name(&self) -> &'static str {
        match self {
            ServerGauges::DedupEntries => "dedup.entries",
        }
    }
}

use crate::conventions::{CLIENT_ADDRESS, SERVER_ADDRESS, SERVICE_NAME, UNKNOWN};
use crate::{EnrichedSpan, ResourceAttributes, Span, WorkloadOwnership};

/// A directed call between two services, derived from a single span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    /// Name of the service that reported the span.
    pub service_name: String,
    /// The calling side.
    pub caller: String,
    /// The called side.
    pub callee: String,
    /// Key identifying this edge within the deduplication window.
    pub dedup_key: String,
}

/// Derives the call edge from a span's address attributes.
///
/// A span carrying `client.address` is an inbound call from that client into the reporting
/// service. A span carrying `server.address` is an outbound call from the reporting service to
/// the host part of the address. If both are present the outbound interpretation is used. If
/// neither is present both sides are `unknown`. An empty `service.name` counts as missing.
///
/// The dedup key joins service, caller and callee with hyphens and is not escaped, so distinct
/// triples can collide. A collision only suppresses a write, it never produces a wrong edge.
pub fn derive(span: &Span, resource: &ResourceAttributes) -> Edge {
    let service_name = resource
        .get_str(SERVICE_NAME)
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN)
        .to_owned();

    let mut caller = UNKNOWN;
    let mut callee = UNKNOWN;

    if let Some(client) = span.attribute(CLIENT_ADDRESS) {
        caller = client;
        callee = &service_name;
    }

    if let Some(server) = span.attribute(SERVER_ADDRESS) {
        caller = &service_name;
        callee = host(server);
    }

    let caller = caller.to_owned();
    let callee = callee.to_owned();
    let dedup_key = format!("{service_name}-{caller}-{callee}");

    Edge {
        service_name,
        caller,
        callee,
        dedup_key,
    }
}

/// Derives the edge and wraps it with the span into an [`EnrichedSpan`].
///
/// Ownership is left unresolved.
pub fn enrich(span: Span, resource: &ResourceAttributes) -> EnrichedSpan {
    let Edge {
        service_name,
        caller,
        callee,
        dedup_key,
    } = derive(&span, resource);

    EnrichedSpan {
        span,
        service_name,
        dedup_key,
        caller_service: caller,
        callee_service: callee,
        ownership: WorkloadOwnership::default(),
    }
}

/// Strips a port suffix by splitting at the first colon.
fn host(address: &str) -> &str {
    address.split(':').next().unwrap_or(address)
}

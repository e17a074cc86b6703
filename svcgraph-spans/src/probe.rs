use crate::Span;
use crate::conventions::HTTP_ROUTE;

const PROBE_ROUTE_PREFIXES: &[&str] = &["/health", "/live", "/ready"];
const PROBE_OPERATION_MARKERS: &[&str] = &["health", "liveness", "ready"];

/// Returns `true` if the span is a liveness, readiness or health check.
///
/// The route check is case sensitive, the operation name check is not.
pub fn is_health_probe(span: &Span) -> bool {
    if let Some(route) = span.attribute(HTTP_ROUTE)
        && PROBE_ROUTE_PREFIXES
            .iter()
            .any(|prefix| route.starts_with(prefix))
    {
        return true;
    }

    let operation = span.operation_name().to_lowercase();
    PROBE_OPERATION_MARKERS
        .iter()
        .any(|marker| operation.contains(marker))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn span(operation: &str, route: Option<&str>) -> Span {
        let mut attributes = BTreeMap::new();
        if let Some(route) = route {
            attributes.insert(HTTP_ROUTE.to_owned(), route.to_owned());
        }
        Span::new(operation, attributes)
    }

    #[test]
    fn test_probe_routes() {
        assert!(is_health_probe(&span("GET", Some("/healthz"))));
        assert!(is_health_probe(&span("GET", Some("/health/live"))));
        assert!(is_health_probe(&span("GET", Some("/livez"))));
        assert!(is_health_probe(&span("GET", Some("/ready"))));
    }

    #[test]
    fn test_route_is_case_sensitive() {
        assert!(!is_health_probe(&span("GET", Some("/Healthz"))));
        assert!(!is_health_probe(&span("GET", Some("/api/health"))));
    }

    #[test]
    fn test_probe_operation_names() {
        assert!(is_health_probe(&span("HealthCheck", None)));
        assert!(is_health_probe(&span("grpc.Liveness/Check", None)));
        assert!(is_health_probe(&span("READY", None)));
        // The operation name is checked even if a regular route is present.
        assert!(is_health_probe(&span("health", Some("/orders"))));
    }

    #[test]
    fn test_regular_span() {
        assert!(!is_health_probe(&span("GET /orders", Some("/orders"))));
        assert!(!is_health_probe(&span("charge", None)));
    }
}

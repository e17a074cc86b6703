//! Attribute keys read by the pipeline.
//!
//! These follow the OpenTelemetry semantic conventions.

/// Logical name of the service, set on the resource.
pub const SERVICE_NAME: &str = "service.name";
/// Address of the client side of a connection, set on server spans.
pub const CLIENT_ADDRESS: &str = "client.address";
/// Address of the server side of a connection, set on client spans. May include a port.
pub const SERVER_ADDRESS: &str = "server.address";
/// The matched route template of an HTTP server span.
pub const HTTP_ROUTE: &str = "http.route";

/// Kubernetes namespace of the producing pod.
pub const K8S_NAMESPACE_NAME: &str = "k8s.namespace.name";
/// Name of the Deployment owning the producing pod.
pub const K8S_DEPLOYMENT_NAME: &str = "k8s.deployment.name";
/// Name of the ReplicaSet owning the producing pod.
pub const K8S_REPLICASET_NAME: &str = "k8s.replicaset.name";

/// Placeholder used when a service or peer name cannot be determined.
pub const UNKNOWN: &str = "unknown";

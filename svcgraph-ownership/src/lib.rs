//! Resolves the workload that owns the service behind a span.
//!
//! Resolution tries a list of strategies in order and stops at the first one that yields an
//! owner:
//!
//! 1. The `k8s.deployment.name` resource attribute.
//! 2. The `k8s.replicaset.name` resource attribute.
//! 3. A walk through the cluster: the Service named like the span's service, the Pods selected
//!    by it, and the owner chain of the first Pod up to its controlling workload.
//!
//! The namespace is always taken from the `k8s.namespace.name` resource attribute when present.

#![warn(missing_docs)]

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use svcgraph_cluster::{ClusterError, ControlPlane, OwnerReference};
use svcgraph_spans::conventions::{
    K8S_DEPLOYMENT_NAME, K8S_NAMESPACE_NAME, K8S_REPLICASET_NAME, UNKNOWN,
};
use svcgraph_spans::{EnrichedSpan, ResourceAttributes, WorkloadOwnership};

/// Maximum number of ReplicaSet lookups while walking up an owner chain.
///
/// Real chains are Pod, ReplicaSet, Deployment. The limit guards against cycles.
pub const MAX_OWNER_HOPS: usize = 5;

const KIND_DEPLOYMENT: &str = "Deployment";
const KIND_REPLICASET: &str = "ReplicaSet";

/// The strategy that resolved the owner.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Strategy {
    /// Taken from the deployment name resource attribute.
    DeploymentAttribute,
    /// Taken from the replicaset name resource attribute.
    ReplicaSetAttribute,
    /// Found by querying the cluster.
    TopologyWalk,
}

impl Strategy {
    /// Returns the name used in logs and metric tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeploymentAttribute => "deployment_attribute",
            Self::ReplicaSetAttribute => "replicaset_attribute",
            Self::TopologyWalk => "topology_walk",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves [`WorkloadOwnership`] for enriched spans.
#[derive(Clone)]
pub struct OwnershipResolver {
    control_plane: Arc<dyn ControlPlane>,
    timeout: Duration,
}

impl fmt::Debug for OwnershipResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnershipResolver")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OwnershipResolver {
    /// Creates a resolver. Every control plane query is bounded by `timeout`.
    pub fn new(control_plane: Arc<dyn ControlPlane>, timeout: Duration) -> Self {
        Self {
            control_plane,
            timeout,
        }
    }

    /// Fills `enriched.ownership` and returns the strategy that succeeded.
    ///
    /// Returns `Ok(None)` if no owner was found. Errors are only returned for failed control
    /// plane queries, in which case ownership stays unresolved apart from the namespace.
    pub async fn resolve(
        &self,
        enriched: &mut EnrichedSpan,
        resource: &ResourceAttributes,
    ) -> Result<Option<Strategy>, ClusterError> {
        let ownership = &mut enriched.ownership;

        if let Some(namespace) = non_empty(resource, K8S_NAMESPACE_NAME) {
            ownership.namespace = namespace.to_owned();
        }

        if let Some(deployment) = non_empty(resource, K8S_DEPLOYMENT_NAME) {
            ownership.owner_kind = KIND_DEPLOYMENT.to_owned();
            ownership.owner_name = deployment.to_owned();
            return Ok(Some(Strategy::DeploymentAttribute));
        }

        if let Some(replicaset) = non_empty(resource, K8S_REPLICASET_NAME) {
            ownership.owner_kind = KIND_REPLICASET.to_owned();
            ownership.owner_name = replicaset.to_owned();
            return Ok(Some(Strategy::ReplicaSetAttribute));
        }

        let lookup_name = lookup_name(enriched).to_owned();
        let found = self
            .walk_topology(&lookup_name, &mut enriched.ownership)
            .await?;

        Ok(found.then_some(Strategy::TopologyWalk))
    }

    /// Finds the owner via Service, Pod and owner references. Returns `true` if an owner was
    /// recorded.
    async fn walk_topology(
        &self,
        name: &str,
        ownership: &mut WorkloadOwnership,
    ) -> Result<bool, ClusterError> {
        let services = self
            .bounded(self.control_plane.list_services(name, &ownership.namespace))
            .await?;

        let Some(service) = services.into_iter().next() else {
            svcgraph_log::debug!(service = name, "no matching service in cluster");
            return Ok(false);
        };

        if ownership.namespace.is_empty() {
            ownership.namespace = service.namespace.clone();
        }

        if service.selector.is_empty() {
            svcgraph_log::debug!(service = name, "service has no pod selector");
            return Ok(false);
        }

        let pods = self
            .bounded(
                self.control_plane
                    .list_pods(&service.selector, &service.namespace),
            )
            .await?;

        let Some(pod) = pods.into_iter().next() else {
            svcgraph_log::debug!(service = name, "no pods selected by service");
            return Ok(false);
        };

        Ok(self
            .walk_owners(pod.owner_references, &service.namespace, ownership)
            .await)
    }

    /// Follows owner references up to the controlling workload.
    ///
    /// Each step records the first owner. The walk continues through ReplicaSets and
    /// non-controlling owners and ends at a controller of any other kind, or when a lookup fails
    /// or returns no further owners.
    async fn walk_owners(
        &self,
        mut owners: Vec<OwnerReference>,
        namespace: &str,
        ownership: &mut WorkloadOwnership,
    ) -> bool {
        let mut recorded = false;

        for _ in 0..MAX_OWNER_HOPS {
            let Some(owner) = owners.into_iter().next() else {
                return recorded;
            };

            ownership.owner_kind = owner.kind.clone();
            ownership.owner_name = owner.name.clone();
            ownership.owner_id = owner.uid.clone();
            recorded = true;

            if owner.is_controller() && owner.kind != KIND_REPLICASET {
                return true;
            }

            let replicaset = self
                .bounded(self.control_plane.get_replicaset(&owner.name, namespace))
                .await;

            owners = match replicaset {
                Ok(replicaset) => replicaset.owner_references,
                Err(error) => {
                    svcgraph_log::debug!(
                        error = &error as &dyn std::error::Error,
                        owner = owner.name.as_str(),
                        "stopping owner walk"
                    );
                    return true;
                }
            };
        }

        svcgraph_log::warn!(
            owner_kind = ownership.owner_kind.as_str(),
            owner_name = ownership.owner_name.as_str(),
            max_hops = MAX_OWNER_HOPS,
            "owner chain exceeds maximum depth"
        );
        recorded
    }

    async fn bounded<T>(
        &self,
        future: impl Future<Output = Result<T, ClusterError>>,
    ) -> Result<T, ClusterError> {
        tokio::time::timeout(self.timeout, future)
            .await
            .unwrap_or(Err(ClusterError::Timeout))
    }
}

fn non_empty<'a>(resource: &'a ResourceAttributes, key: &str) -> Option<&'a str> {
    resource.get_str(key).filter(|value| !value.is_empty())
}

/// The service name, or the operation name when the service is unknown.
fn lookup_name(enriched: &EnrichedSpan) -> &str {
    match enriched.service_name.as_str() {
        "" | UNKNOWN => enriched.span.operation_name(),
        name => name,
    }
}

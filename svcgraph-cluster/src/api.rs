use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::ClusterError;

/// A Service and the label selector choosing its Pods.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Name of the Service.
    pub name: String,
    /// Namespace of the Service.
    pub namespace: String,
    /// Labels a Pod must carry to back this Service. Empty if the Service has no selector.
    pub selector: BTreeMap<String, String>,
}

/// A reference from an object to the object owning it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    /// Kind of the owner, for example `ReplicaSet`.
    pub kind: String,
    /// Name of the owner.
    pub name: String,
    /// Unique identifier of the owner.
    #[serde(default)]
    pub uid: String,
    /// Set if the owner is the managing controller.
    #[serde(default)]
    pub controller: Option<bool>,
}

impl OwnerReference {
    /// Returns `true` if this owner is the managing controller.
    pub fn is_controller(&self) -> bool {
        self.controller.unwrap_or(false)
    }
}

/// A Pod with its owners.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodInfo {
    /// Name of the Pod.
    pub name: String,
    /// Namespace of the Pod.
    pub namespace: String,
    /// Owners of the Pod, usually a single ReplicaSet.
    pub owner_references: Vec<OwnerReference>,
}

/// A ReplicaSet with its owners.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicaSetInfo {
    /// Name of the ReplicaSet.
    pub name: String,
    /// Namespace of the ReplicaSet.
    pub namespace: String,
    /// Owners of the ReplicaSet, usually a single Deployment.
    pub owner_references: Vec<OwnerReference>,
}

/// Queries against the cluster control plane.
///
/// An empty `namespace` searches all namespaces where the API allows it.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Lists Services with the given name.
    async fn list_services(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Vec<ServiceInfo>, ClusterError>;

    /// Lists Pods matching all labels of the selector.
    async fn list_pods(
        &self,
        selector: &BTreeMap<String, String>,
        namespace: &str,
    ) -> Result<Vec<PodInfo>, ClusterError>;

    /// Fetches a single ReplicaSet.
    async fn get_replicaset(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<ReplicaSetInfo, ClusterError>;
}

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::{ClusterError, ControlPlane, PodInfo, ReplicaSetInfo, ServiceInfo};

/// A [`ControlPlane`] used when the cluster integration is disabled.
///
/// Never finds any objects, so topology walks end without a result.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopControlPlane;

#[async_trait]
impl ControlPlane for NoopControlPlane {
    async fn list_services(
        &self,
        _name: &str,
        _namespace: &str,
    ) -> Result<Vec<ServiceInfo>, ClusterError> {
        Ok(Vec::new())
    }

    async fn list_pods(
        &self,
        _selector: &BTreeMap<String, String>,
        _namespace: &str,
    ) -> Result<Vec<PodInfo>, ClusterError> {
        Ok(Vec::new())
    }

    async fn get_replicaset(
        &self,
        name: &str,
        _namespace: &str,
    ) -> Result<ReplicaSetInfo, ClusterError> {
        Err(ClusterError::NotFound(name.to_owned()))
    }
}

//! Access to the Kubernetes control plane.
//!
//! The [`ControlPlane`] trait covers the three queries needed to find the workload owning a
//! service: Services by name, Pods by label selector and the owners of a ReplicaSet.
//! [`KubeClient`] implements it against the REST API, [`NoopControlPlane`] is used when the
//! integration is disabled.

#![warn(missing_docs)]

use std::path::PathBuf;

mod api;
mod config;
mod kube;
mod noop;

pub use api::*;
pub use config::*;
pub use kube::*;
pub use noop::*;

/// An error returned from a [`ControlPlane`].
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// Neither an API url is configured nor is the process running inside a cluster.
    #[error("cluster api url not configured and KUBERNETES_SERVICE_HOST is not set")]
    NotConfigured,
    /// A credential file could not be read.
    #[error("failed to read cluster credentials from {}", path.display())]
    Credentials {
        /// The file that was read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configured API url is malformed.
    #[error("invalid cluster api url")]
    InvalidUrl(#[from] url::ParseError),
    /// The request could not be sent or the response not be read.
    #[error("could not send request to cluster api")]
    Reqwest(#[from] reqwest::Error),
    /// The API responded with an error status.
    #[error("cluster api request to {path} failed with status {status}")]
    Status {
        /// Path of the request.
        path: String,
        /// HTTP status code of the response.
        status: u16,
    },
    /// The requested object does not exist.
    #[error("{0} not found")]
    NotFound(String),
    /// The response exceeded the size limit.
    #[error("cluster api response too large")]
    Overflow,
    /// The response could not be parsed.
    #[error("failed to parse cluster api response")]
    Json(#[from] serde_json::Error),
    /// The request did not complete in time.
    #[error("cluster api request timed out")]
    Timeout,
}

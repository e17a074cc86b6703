use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const fn default_enabled() -> bool {
    true
}

fn default_token_path() -> PathBuf {
    PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/token")
}

fn default_ca_path() -> PathBuf {
    PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/ca.crt")
}

const fn default_timeout() -> u64 {
    5
}

/// Configuration for connecting to the Kubernetes API.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct ClusterConfig {
    /// Enables ownership lookups against the cluster.
    ///
    /// When disabled, only ownership attributes reported on the resource are used.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Base URL of the API server.
    ///
    /// Defaults to the in-cluster address from `KUBERNETES_SERVICE_HOST` and
    /// `KUBERNETES_SERVICE_PORT`.
    #[serde(default)]
    pub api_url: Option<String>,

    /// Path to the service account bearer token.
    ///
    /// The token is re-read for every request since projected tokens are rotated.
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,

    /// Path to the PEM encoded certificate of the cluster CA.
    #[serde(default = "default_ca_path")]
    pub ca_path: PathBuf,

    /// Timeout for a single API request in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            api_url: None,
            token_path: default_token_path(),
            ca_path: default_ca_path(),
            timeout: default_timeout(),
        }
    }
}

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Certificate, Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    ClusterConfig, ClusterError, ControlPlane, OwnerReference, PodInfo, ReplicaSetInfo,
    ServiceInfo,
};

/// Environment variable holding the API server host inside a cluster.
const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
/// Environment variable holding the API server port inside a cluster.
const SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";

/// Upper bound for a single API response body.
const MAX_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

/// Generic list response.
///
/// ```json
/// {"kind": "ServiceList", "items": [{"metadata": {...}, "spec": {...}}]}
/// ```
#[derive(Debug, Deserialize)]
struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
    #[serde(default)]
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    owner_references: Vec<OwnerReference>,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceSpec {
    #[serde(default)]
    selector: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct ServiceObject {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    spec: ServiceSpec,
}

#[derive(Debug, Deserialize)]
struct MetadataObject {
    #[serde(default)]
    metadata: ObjectMeta,
}

impl From<ServiceObject> for ServiceInfo {
    fn from(object: ServiceObject) -> Self {
        Self {
            name: object.metadata.name,
            namespace: object.metadata.namespace,
            selector: object.spec.selector.unwrap_or_default(),
        }
    }
}

impl From<MetadataObject> for PodInfo {
    fn from(object: MetadataObject) -> Self {
        Self {
            name: object.metadata.name,
            namespace: object.metadata.namespace,
            owner_references: object.metadata.owner_references,
        }
    }
}

impl From<MetadataObject> for ReplicaSetInfo {
    fn from(object: MetadataObject) -> Self {
        Self {
            name: object.metadata.name,
            namespace: object.metadata.namespace,
            owner_references: object.metadata.owner_references,
        }
    }
}

/// A [`ControlPlane`] backed by the Kubernetes REST API.
#[derive(Debug)]
pub struct KubeClient {
    base_url: Url,
    token_path: Option<PathBuf>,
    client: Client,
}

impl KubeClient {
    /// Creates a client from configuration.
    ///
    /// Without an explicit `api_url` the in-cluster service environment is used, and the service
    /// account token must be readable. The cluster CA is trusted when its file exists.
    pub fn new(config: &ClusterConfig) -> Result<Self, ClusterError> {
        Self::with_env(config, |key| std::env::var(key).ok())
    }

    fn with_env(
        config: &ClusterConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ClusterError> {
        let in_cluster = config.api_url.is_none();
        let base_url = api_url(config.api_url.as_deref(), env)?;

        let token_path = if config.token_path.is_file() {
            Some(config.token_path.clone())
        } else if in_cluster {
            return Err(ClusterError::Credentials {
                path: config.token_path.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        } else {
            None
        };

        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout));
        if config.ca_path.is_file() {
            builder = builder.add_root_certificate(read_certificate(&config.ca_path)?);
        }

        Ok(Self {
            base_url,
            token_path,
            client: builder.build()?,
        })
    }

    /// The base URL of the API server.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn token(&self) -> Result<Option<String>, ClusterError> {
        let Some(ref path) = self.token_path else {
            return Ok(None);
        };

        let token = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ClusterError::Credentials {
                path: path.clone(),
                source,
            })?;

        Ok(Some(token.trim().to_owned()))
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClusterError> {
        svcgraph_log::trace!(url = url.as_str(), "querying cluster api");

        let mut request = self.client.get(url.clone());
        if let Some(token) = self.token().await? {
            request = request.bearer_auth(token);
        }

        let mut response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ClusterError::NotFound(url.path().to_owned()));
        } else if !status.is_success() {
            return Err(ClusterError::Status {
                path: url.path().to_owned(),
                status: status.as_u16(),
            });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > MAX_RESPONSE_SIZE {
                return Err(ClusterError::Overflow);
            }
            body.extend_from_slice(&chunk);
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl ControlPlane for KubeClient {
    async fn list_services(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Vec<ServiceInfo>, ClusterError> {
        let list: ObjectList<ServiceObject> =
            self.get(services_url(&self.base_url, name, namespace)).await?;
        Ok(list.items.into_iter().map(ServiceInfo::from).collect())
    }

    async fn list_pods(
        &self,
        selector: &BTreeMap<String, String>,
        namespace: &str,
    ) -> Result<Vec<PodInfo>, ClusterError> {
        let list: ObjectList<MetadataObject> = self
            .get(pods_url(&self.base_url, selector, namespace))
            .await?;
        Ok(list.items.into_iter().map(PodInfo::from).collect())
    }

    async fn get_replicaset(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<ReplicaSetInfo, ClusterError> {
        let object: MetadataObject = self
            .get(replicaset_url(&self.base_url, name, namespace))
            .await?;
        Ok(object.into())
    }
}

fn api_url(
    configured: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Url, ClusterError> {
    let raw = match configured {
        Some(url) => url.to_owned(),
        None => {
            let host = env(SERVICE_HOST_ENV).ok_or(ClusterError::NotConfigured)?;
            let port = env(SERVICE_PORT_ENV).unwrap_or_else(|| "443".to_owned());
            if host.contains(':') {
                format!("https://[{host}]:{port}")
            } else {
                format!("https://{host}:{port}")
            }
        }
    };

    Ok(Url::parse(&raw)?)
}

fn read_certificate(path: &Path) -> Result<Certificate, ClusterError> {
    let pem = std::fs::read(path).map_err(|source| ClusterError::Credentials {
        path: path.to_owned(),
        source,
    })?;
    Ok(Certificate::from_pem(&pem)?)
}

/// Appends path segments to the base URL, escaping each segment.
fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

fn services_url(base: &Url, name: &str, namespace: &str) -> Url {
    let mut url = if namespace.is_empty() {
        endpoint(base, &["api", "v1", "services"])
    } else {
        endpoint(base, &["api", "v1", "namespaces", namespace, "services"])
    };

    url.query_pairs_mut()
        .append_pair("fieldSelector", &format!("metadata.name={name}"));
    url
}

fn pods_url(base: &Url, selector: &BTreeMap<String, String>, namespace: &str) -> Url {
    let mut url = if namespace.is_empty() {
        endpoint(base, &["api", "v1", "pods"])
    } else {
        endpoint(base, &["api", "v1", "namespaces", namespace, "pods"])
    };

    url.query_pairs_mut()
        .append_pair("labelSelector", &label_selector(selector));
    url
}

fn replicaset_url(base: &Url, name: &str, namespace: &str) -> Url {
    endpoint(
        base,
        &["apis", "apps", "v1", "namespaces", namespace, "replicasets", name],
    )
}

/// Formats a selector as `key=value` pairs joined by commas.
fn label_selector(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use axum::Router;
    use axum::extract::Path as RoutePath;
    use axum::http::StatusCode as HttpStatus;
    use axum::routing::get;

    use super::*;

    fn base() -> Url {
        Url::parse("https://10.0.0.1:6443").unwrap()
    }

    #[test]
    fn test_services_url() {
        insta::assert_snapshot!(
            services_url(&base(), "billing", "shop"),
            @"https://10.0.0.1:6443/api/v1/namespaces/shop/services?fieldSelector=metadata.name%3Dbilling"
        );
        insta::assert_snapshot!(
            services_url(&base(), "billing", ""),
            @"https://10.0.0.1:6443/api/v1/services?fieldSelector=metadata.name%3Dbilling"
        );
    }

    #[test]
    fn test_pods_url() {
        let selector = BTreeMap::from([
            ("app".to_owned(), "billing".to_owned()),
            ("tier".to_owned(), "backend".to_owned()),
        ]);

        insta::assert_snapshot!(
            pods_url(&base(), &selector, "shop"),
            @"https://10.0.0.1:6443/api/v1/namespaces/shop/pods?labelSelector=app%3Dbilling%2Ctier%3Dbackend"
        );
    }

    #[test]
    fn test_replicaset_url_escapes_segments() {
        let base = Url::parse("https://kube.internal/prefix/").unwrap();
        insta::assert_snapshot!(
            replicaset_url(&base, "billing-7d4b9", "shop"),
            @"https://kube.internal/prefix/apis/apps/v1/namespaces/shop/replicasets/billing-7d4b9"
        );
        insta::assert_snapshot!(
            replicaset_url(&base, "a/b", "shop"),
            @"https://kube.internal/prefix/apis/apps/v1/namespaces/shop/replicasets/a%2Fb"
        );
    }

    #[test]
    fn test_api_url_from_env() {
        let url = api_url(None, |key| match key {
            SERVICE_HOST_ENV => Some("10.96.0.1".to_owned()),
            SERVICE_PORT_ENV => Some("443".to_owned()),
            _ => None,
        })
        .unwrap();
        assert_eq!(url.as_str(), "https://10.96.0.1/");

        let url = api_url(None, |key| (key == SERVICE_HOST_ENV).then(|| "fd00::1".to_owned()))
            .unwrap();
        assert_eq!(url.as_str(), "https://[fd00::1]/");

        assert!(matches!(
            api_url(None, |_| None),
            Err(ClusterError::NotConfigured)
        ));
    }

    #[test]
    fn test_in_cluster_requires_token() {
        let config = ClusterConfig {
            token_path: PathBuf::from("/nonexistent/token"),
            ..Default::default()
        };

        let result = KubeClient::with_env(&config, |key| {
            (key == SERVICE_HOST_ENV).then(|| "10.96.0.1".to_owned())
        });
        assert!(matches!(result, Err(ClusterError::Credentials { .. })));
    }

    #[test]
    fn test_parse_service_list() {
        let json = r#"{
            "kind": "ServiceList",
            "items": [
                {
                    "metadata": {"name": "billing", "namespace": "shop"},
                    "spec": {"selector": {"app": "billing"}, "ports": [{"port": 80}]}
                },
                {
                    "metadata": {"name": "external", "namespace": "shop"},
                    "spec": {"type": "ExternalName"}
                }
            ]
        }"#;

        let list: ObjectList<ServiceObject> = serde_json::from_str(json).unwrap();
        let services: Vec<ServiceInfo> = list.items.into_iter().map(Into::into).collect();

        assert_eq!(services.len(), 2);
        assert_eq!(services[0].selector.get("app").map(String::as_str), Some("billing"));
        assert!(services[1].selector.is_empty());
    }

    #[test]
    fn test_parse_pod_owners() {
        let json = r#"{
            "items": [{
                "metadata": {
                    "name": "billing-7d4b9-x2x4z",
                    "namespace": "shop",
                    "ownerReferences": [{
                        "apiVersion": "apps/v1",
                        "kind": "ReplicaSet",
                        "name": "billing-7d4b9",
                        "uid": "1b2f0c8e",
                        "controller": true,
                        "blockOwnerDeletion": true
                    }]
                }
            }]
        }"#;

        let list: ObjectList<MetadataObject> = serde_json::from_str(json).unwrap();
        let pod = PodInfo::from(list.items.into_iter().next().unwrap());

        insta::assert_debug_snapshot!(pod, @r#"
        PodInfo {
            name: "billing-7d4b9-x2x4z",
            namespace: "shop",
            owner_references: [
                OwnerReference {
                    kind: "ReplicaSet",
                    name: "billing-7d4b9",
                    uid: "1b2f0c8e",
                    controller: Some(
                        true,
                    ),
                },
            ],
        }
        "#);
    }

    async fn serve(router: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        Url::parse(&format!("http://{addr}")).unwrap()
    }

    #[tokio::test]
    async fn test_client_against_fake_api() {
        let router = Router::new()
            .route(
                "/api/v1/namespaces/{namespace}/services",
                get(|RoutePath(namespace): RoutePath<String>| async move {
                    axum::Json(serde_json::json!({
                        "items": [{
                            "metadata": {"name": "billing", "namespace": namespace},
                            "spec": {"selector": {"app": "billing"}}
                        }]
                    }))
                }),
            )
            .route(
                "/apis/apps/v1/namespaces/{namespace}/replicasets/{name}",
                get(|headers: axum::http::HeaderMap| async move {
                    let authorized = headers
                        .get("authorization")
                        .is_some_and(|v| v == "Bearer secret-token");
                    if !authorized {
                        return Err(HttpStatus::UNAUTHORIZED);
                    }
                    Ok(axum::Json(serde_json::json!({
                        "metadata": {
                            "name": "billing-7d4b9",
                            "namespace": "shop",
                            "ownerReferences": [
                                {"kind": "Deployment", "name": "billing", "uid": "abc", "controller": true}
                            ]
                        }
                    })))
                }),
            );

        let mut token = tempfile::NamedTempFile::new().unwrap();
        writeln!(token, "secret-token").unwrap();

        let config = ClusterConfig {
            api_url: Some(serve(router).await.to_string()),
            token_path: token.path().to_owned(),
            ca_path: PathBuf::from("/nonexistent/ca.crt"),
            ..Default::default()
        };
        let client = KubeClient::new(&config).unwrap();

        let services = client.list_services("billing", "shop").await.unwrap();
        assert_eq!(services[0].namespace, "shop");

        let replicaset = client.get_replicaset("billing-7d4b9", "shop").await.unwrap();
        assert_eq!(replicaset.owner_references[0].kind, "Deployment");
        assert!(replicaset.owner_references[0].is_controller());

        let error = client.list_pods(&BTreeMap::new(), "shop").await.unwrap_err();
        assert!(matches!(error, ClusterError::NotFound(_)));
    }
}

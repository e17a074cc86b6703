use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{GraphStore, Statement, StoreConfig, StoreError};

/// Upper bound for a transaction response body.
const MAX_RESPONSE_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Serialize)]
struct TxRequest<'a> {
    statements: &'a [Statement],
}

/// Response of the transactional endpoint.
///
/// ```json
/// {
///   "results": [{"columns": [], "data": []}],
///   "errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "..."}]
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
struct TxResponse {
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    #[serde(default)]
    message: String,
}

/// A [`GraphStore`] using the Neo4j HTTP transaction API.
///
/// Every call to [`execute`](GraphStore::execute) posts to the implicit transaction endpoint,
/// which commits when all statements succeed and rolls back otherwise.
#[derive(Debug)]
pub struct Neo4jStore {
    commit_url: Url,
    username: String,
    password: String,
    client: Client,
}

impl Neo4jStore {
    /// Creates a store from configuration. No connection is made until the first request.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let base = Url::parse(&config.uri)?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(StoreError::UnsupportedScheme(base.scheme().to_owned()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(Self {
            commit_url: commit_url(&base, &config.database),
            username: config.username.clone(),
            password: config.password.clone(),
            client,
        })
    }

    async fn post(&self, statements: &[Statement]) -> Result<(), StoreError> {
        let mut response = self
            .client
            .post(self.commit_url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .json(&TxRequest { statements })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            svcgraph_log::debug!(
                status = status.as_u16(),
                url = self.commit_url.as_str(),
                "graph store rejected request"
            );
            return Err(StoreError::Status(status.as_u16()));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > MAX_RESPONSE_SIZE {
                return Err(StoreError::Overflow);
            }
            body.extend_from_slice(&chunk);
        }

        let response: TxResponse = serde_json::from_slice(&body)?;
        let Some(error) = response.errors.into_iter().next() else {
            return Ok(());
        };

        svcgraph_log::debug!(
            code = error.code.as_str(),
            statements = statements.len(),
            "graph store rolled back transaction"
        );
        Err(StoreError::Database {
            code: error.code,
            message: error.message,
        })
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn execute(&self, statements: Vec<Statement>) -> Result<(), StoreError> {
        self.post(&statements).await
    }

    async fn verify_connectivity(&self) -> Result<(), StoreError> {
        // An empty transaction still authenticates and checks the database exists.
        self.post(&[]).await
    }
}

fn commit_url(base: &Url, database: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty()
            .extend(["db", database, "tx", "commit"]);
    }
    url
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn test_commit_url() {
        let base = Url::parse("http://localhost:7474").unwrap();
        assert_eq!(
            commit_url(&base, "neo4j").as_str(),
            "http://localhost:7474/db/neo4j/tx/commit"
        );
    }

    #[test]
    fn test_rejects_bolt_uri() {
        let config = StoreConfig {
            uri: "bolt://localhost:7687".to_owned(),
            ..Default::default()
        };
        let error = Neo4jStore::new(&config).unwrap_err();
        assert!(matches!(&error, StoreError::UnsupportedScheme(scheme) if scheme == "bolt"));
        insta::assert_snapshot!(error, @r###"unsupported graph store scheme "bolt", use the HTTP API address instead, e.g. http://localhost:7474"###);
    }

    #[test]
    fn test_request_body() {
        let statements = [Statement::new("MERGE (s:Service {name: $name})").param("name", "billing")];
        let json = serde_json::to_string(&TxRequest {
            statements: &statements,
        })
        .unwrap();

        insta::assert_snapshot!(json, @r#"{"statements":[{"statement":"MERGE (s:Service {name: $name})","parameters":{"name":"billing"}}]}"#);
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_execute_against_fake_server() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let captured = received.clone();

        let router = Router::new().route(
            "/db/graph/tx/commit",
            post(move |headers: HeaderMap, body: String| {
                let captured = captured.clone();
                async move {
                    // "neo4j:secret" in base64.
                    if headers.get("authorization").is_none_or(|v| v != "Basic bmVvNGo6c2VjcmV0") {
                        return (StatusCode::UNAUTHORIZED, String::new());
                    }
                    let failing = body.contains("BROKEN");
                    captured.lock().push(body);
                    let response = if failing {
                        r#"{"results":[],"errors":[{"code":"Neo.ClientError.Statement.SyntaxError","message":"Invalid input"}]}"#
                    } else {
                        r#"{"results":[{"columns":[],"data":[]}],"errors":[]}"#
                    };
                    (StatusCode::OK, response.to_owned())
                }
            }),
        );

        let config = StoreConfig {
            uri: serve(router).await,
            password: "secret".to_owned(),
            database: "graph".to_owned(),
            ..Default::default()
        };
        let store = Neo4jStore::new(&config).unwrap();

        store.verify_connectivity().await.unwrap();
        store
            .execute(vec![Statement::new("RETURN 1")])
            .await
            .unwrap();

        let error = store
            .execute(vec![Statement::new("BROKEN")])
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::Database { ref code, .. } if code.ends_with("SyntaxError")));

        assert_eq!(received.lock().len(), 3);
        assert_eq!(received.lock()[0], r#"{"statements":[]}"#);

        let unauthorized = Neo4jStore::new(&StoreConfig {
            password: "wrong".to_owned(),
            ..config
        })
        .unwrap();
        assert!(matches!(
            unauthorized.verify_connectivity().await,
            Err(StoreError::Status(401))
        ));
    }
}

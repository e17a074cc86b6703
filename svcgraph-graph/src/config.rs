use serde::{Deserialize, Serialize};

fn default_uri() -> String {
    "http://localhost:7474".to_owned()
}

fn default_username() -> String {
    "neo4j".to_owned()
}

fn default_password() -> String {
    "password".to_owned()
}

fn default_database() -> String {
    "neo4j".to_owned()
}

const fn default_timeout() -> u64 {
    10
}

/// Connection settings of the graph database.
#[derive(Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct StoreConfig {
    /// Base URL of the Neo4j HTTP API.
    #[serde(default = "default_uri")]
    pub uri: String,
    /// User for basic authentication.
    #[serde(default = "default_username")]
    pub username: String,
    /// Password for basic authentication.
    #[serde(default = "default_password")]
    pub password: String,
    /// Name of the database holding the graph.
    #[serde(default = "default_database")]
    pub database: String,
    /// Timeout for a single transaction in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            username: default_username(),
            password: default_password(),
            database: default_database(),
            timeout: default_timeout(),
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("uri", &self.uri)
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .field("database", &self.database)
            .field("timeout", &self.timeout)
            .finish()
    }
}

use async_trait::async_trait;
use serde::Serialize;

use crate::StoreError;

/// A parameterized Cypher statement.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Statement {
    /// The Cypher query text.
    pub statement: String,
    /// Values bound to `$name` placeholders in the query.
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl Statement {
    /// Creates a statement without parameters.
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            parameters: serde_json::Map::new(),
        }
    }

    /// Binds a parameter.
    pub fn param(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(name.to_owned(), value.into());
        self
    }
}

/// A graph database that runs statements transactionally.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Runs all statements in a single transaction.
    ///
    /// Either all statements take effect or none does.
    async fn execute(&self, statements: Vec<Statement>) -> Result<(), StoreError>;

    /// Checks that the database is reachable and accepts the credentials.
    async fn verify_connectivity(&self) -> Result<(), StoreError>;
}

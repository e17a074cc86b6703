//! Storage of the service dependency graph.
//!
//! Services are `Service` nodes identified by their normalized name. A call from one service to
//! another is a single `CALLS` relationship per ordered pair. [`GraphWriter`] turns an
//! [`EnrichedSpan`](svcgraph_spans::EnrichedSpan) into an upsert of both nodes and the
//! relationship, and [`Neo4jStore`] runs it against Neo4j.

#![warn(missing_docs)]

mod config;
mod neo4j;
mod store;
mod writer;

pub use config::*;
pub use neo4j::*;
pub use store::*;
pub use writer::*;

/// An error returned from a [`GraphStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The configured database URI is malformed.
    #[error("invalid graph store uri")]
    InvalidUri(#[from] url::ParseError),
    /// The database URI uses a scheme other than HTTP, such as `bolt`.
    #[error(
        "unsupported graph store scheme {0:?}, use the HTTP API address instead, e.g. http://localhost:7474"
    )]
    UnsupportedScheme(String),
    /// The request could not be sent or the response not be read.
    #[error("could not send request to graph store")]
    Reqwest(#[from] reqwest::Error),
    /// The database responded with an error status.
    #[error("graph store responded with status {0}")]
    Status(u16),
    /// A statement failed and the transaction was rolled back.
    #[error("graph store rejected transaction: {code}: {message}")]
    Database {
        /// The Neo4j status code.
        code: String,
        /// Description of the failure.
        message: String,
    },
    /// The response exceeded the size limit.
    #[error("graph store response too large")]
    Overflow,
    /// A request or response body could not be (de)serialized.
    #[error("failed to encode or decode graph store payload")]
    Json(#[from] serde_json::Error),
    /// The transaction did not complete in time.
    #[error("graph store transaction timed out")]
    Timeout,
}

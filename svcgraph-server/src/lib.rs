//! The svcgraph server.
//!
//! The server accepts OpenTelemetry trace exports over HTTP and turns each span into an edge of
//! the service dependency graph:
//!
//! 1. The span is normalized and the caller and callee services are derived from its
//!    attributes.
//! 2. Liveness, readiness and health check spans are dropped.
//! 3. Edges already seen within the dedup window are dropped.
//! 4. The workload owning the service is resolved from resource attributes or the cluster.
//! 5. Both services and the `CALLS` relationship are upserted into the graph store.
//!
//! Failures in steps 4 and 5 are logged and never fail the export request.
//!
//! Use [`run`] to start the server with a [`Config`].

#![warn(missing_docs)]

use std::sync::Arc;

use svcgraph_cluster::ClusterError;
use svcgraph_config::Config;
use svcgraph_graph::StoreError;

mod archive;
mod constants;
mod endpoints;
mod middlewares;
mod processor;
mod server;
mod service;
mod statsd;

#[cfg(test)]
mod testutils;

pub use self::archive::{ArchiveError, ArchiveRecord, TraceArchive};
pub use self::processor::{ProcessingSummary, Processor};
pub use self::service::ServiceState;

/// Indicates the type of failure of the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding failed.
    #[error("bind to interface failed")]
    BindFailed(#[source] std::io::Error),

    /// The graph store is unreachable or rejected the schema.
    #[error("could not initialize graph store")]
    Store(#[from] StoreError),

    /// The cluster client could not be configured.
    #[error("could not initialize cluster client")]
    Cluster(#[from] ClusterError),

    /// The trace archive file could not be created.
    #[error("could not create trace archive")]
    Archive(#[source] std::io::Error),

    /// The async runtime could not be started.
    #[error("could not start runtime")]
    Runtime(#[source] std::io::Error),
}

/// Runs the svcgraph web server.
///
/// This boots the entire server application. It blocks the current thread until a shutdown
/// signal is received or a fatal error happens. Before accepting requests, the graph store must
/// be reachable.
pub fn run(config: Config) -> Result<(), ServerError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("svcgraph-rt")
        .enable_all()
        .build()
        .map_err(ServerError::Runtime)?;

    runtime.block_on(async {
        let state = ServiceState::start(Arc::new(config)).await?;
        server::serve(state).await
    })
}

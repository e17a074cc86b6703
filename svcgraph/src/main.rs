//! svcgraph builds a live map of which service calls which from OpenTelemetry traces.
//!
//! Services send their spans to the OTLP/HTTP endpoint of svcgraph. For every span, svcgraph
//! derives the calling and the called service, looks up the workload that owns the service in
//! the Kubernetes cluster and merges the call into a Neo4j graph. Repeated calls between the
//! same services are written at most once per dedup window.
//!
//! # Workspace Crates
//!
//! svcgraph is split into the following workspace crates:
//!
//!  - `svcgraph`: Main entry point and command line interface.
//!  - [`svcgraph-cache`]: Time-windowed deduplication cache.
//!  - [`svcgraph-cluster`]: Access to the Kubernetes control plane.
//!  - [`svcgraph-config`]: Static configuration for the CLI and server.
//!  - [`svcgraph-graph`]: Storage of the service dependency graph.
//!  - [`svcgraph-log`]: Logging facade.
//!  - [`svcgraph-ownership`]: Resolution of the workload owning a service.
//!  - [`svcgraph-server`]: Endpoints and the processing pipeline.
//!  - [`svcgraph-spans`]: Span normalization and call edge derivation.
//!  - [`svcgraph-statsd`]: High-level StatsD metric client for internal measurements.
//!
//! [`svcgraph-cache`]: ../svcgraph_cache/index.html
//! [`svcgraph-cluster`]: ../svcgraph_cluster/index.html
//! [`svcgraph-config`]: ../svcgraph_config/index.html
//! [`svcgraph-graph`]: ../svcgraph_graph/index.html
//! [`svcgraph-log`]: ../svcgraph_log/index.html
//! [`svcgraph-ownership`]: ../svcgraph_ownership/index.html
//! [`svcgraph-server`]: ../svcgraph_server/index.html
//! [`svcgraph-spans`]: ../svcgraph_spans/index.html
//! [`svcgraph-statsd`]: ../svcgraph_statsd/index.html

mod cli;
mod cliapp;
mod setup;

use std::process;

#[cfg(target_os = "linux")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            svcgraph_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

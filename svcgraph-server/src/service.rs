use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use svcgraph_cluster::{ControlPlane, KubeClient, NoopControlPlane};
use svcgraph_config::Config;
use svcgraph_graph::{GraphWriter, Neo4jStore, StoreError};
use svcgraph_ownership::OwnershipResolver;

use crate::ServerError;
use crate::archive::TraceArchive;
use crate::constants::STARTUP_CHECK_TIMEOUT;
use crate::processor::Processor;

struct StateInner {
    config: Arc<Config>,
    processor: Processor,
    shutting_down: AtomicBool,
}

/// Server state shared by all endpoints.
#[derive(Clone)]
pub struct ServiceState {
    inner: Arc<StateInner>,
}

impl ServiceState {
    /// Creates state from an already assembled processor.
    pub fn new(config: Arc<Config>, processor: Processor) -> Self {
        Self {
            inner: Arc::new(StateInner {
                config,
                processor,
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    /// Connects to the graph store and the cluster and assembles the pipeline.
    ///
    /// Fails if the graph store is not reachable, the schema cannot be installed, cluster
    /// credentials are missing or the trace archive cannot be created.
    pub async fn start(config: Arc<Config>) -> Result<Self, ServerError> {
        let store = Neo4jStore::new(config.store())?;
        let writer = GraphWriter::new(Arc::new(store), config.store_timeout());

        tokio::time::timeout(STARTUP_CHECK_TIMEOUT, writer.verify_connectivity())
            .await
            .unwrap_or(Err(StoreError::Timeout))?;
        writer.ensure_schema().await?;
        svcgraph_log::info!(uri = config.store().uri.as_str(), "connected to graph store");

        let control_plane: Arc<dyn ControlPlane> = if config.cluster_enabled() {
            let client = KubeClient::new(config.cluster())?;
            svcgraph_log::info!(api = client.base_url().as_str(), "using cluster api");
            Arc::new(client)
        } else {
            svcgraph_log::info!("cluster integration disabled");
            Arc::new(NoopControlPlane)
        };
        let resolver = OwnershipResolver::new(control_plane, config.cluster_timeout());

        let archive = match config.archive_path() {
            Some(path) => {
                let archive = TraceArchive::create(path).map_err(ServerError::Archive)?;
                svcgraph_log::info!(path = %archive.path().display(), "archiving traces");
                Some(Arc::new(archive))
            }
            None => None,
        };

        let processor = Processor::new(resolver, writer, config.dedup_ttl(), archive);
        Ok(Self::new(config, processor))
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the span processing pipeline.
    pub fn processor(&self) -> &Processor {
        &self.inner.processor
    }

    /// Marks the server as shutting down, which fails the readiness check.
    pub fn begin_shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceState")
            .field("processor", &self.inner.processor)
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}

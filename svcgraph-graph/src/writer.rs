use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use svcgraph_spans::EnrichedSpan;

use crate::{GraphStore, Statement, StoreError};

const UPSERT_NODES: &str = "\
MERGE (caller:Service {name: $caller})
SET caller.k8s_namespace = $k8sNamespace,
    caller.k8s_owner_kind = $k8sOwnerKind,
    caller.k8s_owner_name = $k8sOwnerName,
    caller.k8s_owner_uid = $k8sOwnerUid,
    caller.operation = $operation,
    caller.attributesJson = $attributesJson
MERGE (callee:Service {name: $callee})
SET callee.k8s_namespace = $k8sNamespace,
    callee.k8s_owner_kind = $k8sOwnerKind,
    callee.k8s_owner_name = $k8sOwnerName,
    callee.k8s_owner_uid = $k8sOwnerUid,
    callee.operation = $operation,
    callee.attributesJson = $attributesJson";

const UPSERT_CALLS: &str = "\
MATCH (c:Service {name: $caller}), (d:Service {name: $callee})
MERGE (c)-[r:CALLS]->(d)
SET r.operation = $operation,
    r.attributesJson = $attributesJson,
    r.k8s_namespace = $k8sNamespace,
    r.k8s_owner_kind = $k8sOwnerKind,
    r.k8s_owner_name = $k8sOwnerName,
    r.k8s_owner_uid = $k8sOwnerUid,
    r.last_seen = $lastSeen";

const SERVICE_NAME_CONSTRAINT: &str = "\
CREATE CONSTRAINT service_name_unique IF NOT EXISTS
FOR (s:Service) REQUIRE s.name IS UNIQUE";

/// Why an edge was not written.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SkipReason {
    /// The caller or callee name is empty after trimming.
    EmptyName,
    /// The caller or callee is an IP address instead of a service name.
    IpLiteral,
    /// Caller and callee are the same service.
    SelfLoop,
}

impl SkipReason {
    /// Returns the name used in logs and metric tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyName => "empty_name",
            Self::IpLiteral => "ip_literal",
            Self::SelfLoop => "self_loop",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`GraphWriter::write`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteOutcome {
    /// Nodes and relationship were upserted.
    Written,
    /// Nothing was written.
    Skipped(SkipReason),
}

/// Trims and lower-cases a service name.
///
/// Empty names and IP addresses are rejected, since they do not identify a service.
pub fn normalize_service_name(raw: &str) -> Result<String, SkipReason> {
    let name = raw.trim().to_lowercase();
    if name.is_empty() {
        Err(SkipReason::EmptyName)
    } else if name.parse::<IpAddr>().is_ok() {
        Err(SkipReason::IpLiteral)
    } else {
        Ok(name)
    }
}

/// Upserts call edges into a [`GraphStore`].
#[derive(Clone)]
pub struct GraphWriter {
    store: Arc<dyn GraphStore>,
    timeout: Duration,
}

impl fmt::Debug for GraphWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphWriter")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GraphWriter {
    /// Creates a writer. Every transaction is bounded by `timeout`.
    pub fn new(store: Arc<dyn GraphStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Checks that the store is reachable.
    pub async fn verify_connectivity(&self) -> Result<(), StoreError> {
        self.bounded(self.store.verify_connectivity()).await
    }

    /// Installs the uniqueness constraint on service names.
    ///
    /// With the constraint in place, concurrent writes of the same edge merge into one node per
    /// service and one relationship per ordered pair.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.bounded(
            self.store
                .execute(vec![Statement::new(SERVICE_NAME_CONSTRAINT)]),
        )
        .await?;

        svcgraph_log::debug!("service name constraint installed");
        Ok(())
    }

    /// Upserts the caller and callee nodes and the `CALLS` relationship between them.
    ///
    /// All properties are overwritten with the values of this span. Both statements run in one
    /// transaction.
    pub async fn write(&self, enriched: &EnrichedSpan) -> Result<WriteOutcome, StoreError> {
        let (caller, callee) = match edge_names(enriched) {
            Ok(names) => names,
            Err(reason) => return Ok(WriteOutcome::Skipped(reason)),
        };

        let last_seen = chrono::Utc::now().timestamp_millis();
        let statements = upsert_statements(&caller, &callee, enriched, last_seen)?;
        self.bounded(self.store.execute(statements)).await?;

        Ok(WriteOutcome::Written)
    }

    async fn bounded(
        &self,
        future: impl Future<Output = Result<(), StoreError>>,
    ) -> Result<(), StoreError> {
        tokio::time::timeout(self.timeout, future)
            .await
            .unwrap_or(Err(StoreError::Timeout))
    }
}

fn edge_names(enriched: &EnrichedSpan) -> Result<(String, String), SkipReason> {
    let caller = normalize_service_name(&enriched.caller_service)?;
    let callee = normalize_service_name(&enriched.callee_service)?;
    if caller == callee {
        return Err(SkipReason::SelfLoop);
    }
    Ok((caller, callee))
}

fn upsert_statements(
    caller: &str,
    callee: &str,
    enriched: &EnrichedSpan,
    last_seen: i64,
) -> Result<Vec<Statement>, StoreError> {
    let attributes_json = serde_json::to_string(enriched.span.attributes())?;
    let ownership = &enriched.ownership;

    let bind = |statement: Statement| {
        statement
            .param("caller", caller)
            .param("callee", callee)
            .param("k8sNamespace", ownership.namespace.as_str())
            .param("k8sOwnerKind", ownership.owner_kind.as_str())
            .param("k8sOwnerName", ownership.owner_name.as_str())
            .param("k8sOwnerUid", ownership.owner_id.as_str())
            .param("operation", enriched.span.operation_name())
            .param("attributesJson", attributes_json.as_str())
    };

    Ok(vec![
        bind(Statement::new(UPSERT_NODES)),
        bind(Statement::new(UPSERT_CALLS)).param("lastSeen", last_seen),
    ])
}

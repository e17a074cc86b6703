use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry_proto::tonic::common::v1::any_value::Value;
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};
use parking_lot::Mutex;
use svcgraph_cache::Clock;
use svcgraph_cluster::NoopControlPlane;
use svcgraph_config::Config;
use svcgraph_graph::{GraphStore, GraphWriter, Statement, StoreError};
use svcgraph_ownership::OwnershipResolver;
use svcgraph_spans::TracesData;

use crate::processor::Processor;
use crate::service::ServiceState;

/// A graph store that keeps all transactions in memory.
#[derive(Debug, Default)]
pub struct RecordingStore {
    transactions: Mutex<Vec<Vec<Statement>>>,
    delay: Mutex<Option<Duration>>,
    fail: bool,
}

impl RecordingStore {
    /// A store that rejects every transaction.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// A store that takes `delay` to commit every transaction.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Mutex::new(Some(delay)),
            ..Default::default()
        }
    }

    /// Changes the commit delay for subsequent transactions.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Returns `(caller, callee)` of every written relationship.
    pub fn edges(&self) -> Vec<(String, String)> {
        self.transactions
            .lock()
            .iter()
            .filter_map(|statements| {
                let parameters = &statements.last()?.parameters;
                let caller = parameters.get("caller")?.as_str()?;
                let callee = parameters.get("callee")?.as_str()?;
                Some((caller.to_owned(), callee.to_owned()))
            })
            .collect()
    }
}

#[async_trait]
impl GraphStore for RecordingStore {
    async fn execute(&self, statements: Vec<Statement>) -> Result<(), StoreError> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(StoreError::Status(503));
        }
        self.transactions.lock().push(statements);
        Ok(())
    }

    async fn verify_connectivity(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// A clock that only moves when advanced.
#[derive(Clone, Debug, Default)]
pub struct TestClock(Arc<AtomicI64>);

impl TestClock {
    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.0.fetch_add(by.as_secs() as i64, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

fn key_values(pairs: &[(&str, &str)]) -> Vec<KeyValue> {
    pairs
        .iter()
        .map(|(key, value)| KeyValue {
            key: (*key).to_owned(),
            value: Some(AnyValue {
                value: Some(Value::StringValue((*value).to_owned())),
            }),
        })
        .collect()
}

/// Builds a traces payload with one resource and one span per entry of `spans`.
pub fn traces(resource: &[(&str, &str)], spans: &[(&str, &[(&str, &str)])]) -> TracesData {
    let spans = spans
        .iter()
        .map(|(name, attributes)| Span {
            name: (*name).to_owned(),
            attributes: key_values(attributes),
            ..Default::default()
        })
        .collect();

    TracesData {
        resource_spans: vec![ResourceSpans {
            resource: Some(Resource {
                attributes: key_values(resource),
                ..Default::default()
            }),
            scope_spans: vec![ScopeSpans {
                spans,
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

/// Creates server state backed by `store`, without cluster access.
pub fn state(store: Arc<RecordingStore>) -> ServiceState {
    state_with(store, serde_json::json!({}), Duration::from_secs(1))
}

/// Creates server state from config overrides and a custom write timeout.
pub fn state_with(
    store: Arc<RecordingStore>,
    mut config: serde_json::Value,
    write_timeout: Duration,
) -> ServiceState {
    config["cluster"] = serde_json::json!({"enabled": false});
    let config = Config::from_json_value(config).unwrap();

    let resolver = OwnershipResolver::new(Arc::new(NoopControlPlane), Duration::from_secs(1));
    let writer = GraphWriter::new(store, write_timeout);
    let processor = Processor::new(resolver, writer, config.dedup_ttl(), None);

    ServiceState::new(Arc::new(config), processor)
}

//! The span processing pipeline.
//!
//! Spans of an export request are processed one after another. Each span runs through
//! normalization, edge derivation, the health probe filter and the dedup cache, and is then
//! resolved to its owning workload and written to the graph before the next span is admitted.

use std::sync::Arc;
use std::time::Duration;

use svcgraph_cache::{Clock, DedupCache, SystemClock};
use svcgraph_graph::{GraphWriter, WriteOutcome};
use svcgraph_ownership::OwnershipResolver;
use svcgraph_spans::{
    EnrichedSpan, OtelSpan, ResourceAttributes, TracesData, enrich, for_each_span,
    is_health_probe, normalize,
};
use svcgraph_statsd::metric;

use crate::archive::{ArchiveRecord, TraceArchive};
use crate::statsd::{ServerCounters, ServerGauges, ServerTimers};

/// Counts of what happened to the spans of one request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessingSummary {
    /// All spans in the request.
    pub received: usize,
    /// Spans dropped as health probes.
    pub health_probes: usize,
    /// Spans dropped by the dedup cache.
    pub deduplicated: usize,
    /// Edges upserted into the graph.
    pub written: usize,
    /// Edges that failed validation in the writer.
    pub skipped: usize,
    /// Edges whose transaction failed.
    pub failed: usize,
}

/// Runs received spans through the pipeline.
#[derive(Debug)]
pub struct Processor<C = SystemClock> {
    cache: DedupCache<EnrichedSpan, C>,
    dedup_ttl: Duration,
    resolver: OwnershipResolver,
    writer: GraphWriter,
    archive: Option<Arc<TraceArchive>>,
}

impl Processor {
    /// Creates a processor with an empty dedup cache.
    pub fn new(
        resolver: OwnershipResolver,
        writer: GraphWriter,
        dedup_ttl: Duration,
        archive: Option<Arc<TraceArchive>>,
    ) -> Self {
        Self::with_clock(resolver, writer, dedup_ttl, archive, SystemClock)
    }
}

impl<C: Clock> Processor<C> {
    /// Creates a processor whose dedup cache expires entries according to `clock`.
    pub fn with_clock(
        resolver: OwnershipResolver,
        writer: GraphWriter,
        dedup_ttl: Duration,
        archive: Option<Arc<TraceArchive>>,
        clock: C,
    ) -> Self {
        Self {
            cache: DedupCache::with_clock(clock),
            dedup_ttl,
            resolver,
            writer,
            archive,
        }
    }

    /// Processes all spans of an export request.
    ///
    /// Failures of single spans are logged and counted, they never fail the whole request. If
    /// the returned future is dropped, the edge in flight is released from the dedup cache and
    /// spans that were not reached yet are never admitted.
    pub async fn process(&self, traces: TracesData) -> ProcessingSummary {
        let mut spans = Vec::new();
        for_each_span(traces, |resource, otel_span| {
            spans.push((Arc::clone(resource), otel_span));
        });

        let mut summary = ProcessingSummary {
            received: spans.len(),
            ..Default::default()
        };
        metric!(counter(ServerCounters::SpansReceived) += summary.received as i64);

        for (resource, otel_span) in spans {
            let enriched = enrich(normalize(&otel_span), &resource);
            self.archive_span(&enriched, &otel_span, &resource).await;

            if is_health_probe(&enriched.span) {
                svcgraph_log::trace!(
                    operation = enriched.span.operation_name(),
                    "dropping health probe span"
                );
                metric!(counter(ServerCounters::HealthProbe) += 1);
                summary.health_probes += 1;
                continue;
            }

            let Some(admission) = self.admit(&enriched) else {
                svcgraph_log::trace!(dedup_key = enriched.dedup_key.as_str(), "edge seen recently");
                metric!(counter(ServerCounters::Deduplicated) += 1);
                summary.deduplicated += 1;
                continue;
            };

            match self.resolve_and_write(enriched, &resource).await {
                Some(WriteOutcome::Written) => summary.written += 1,
                Some(WriteOutcome::Skipped(_)) => summary.skipped += 1,
                None => summary.failed += 1,
            }
            admission.complete();
        }

        metric!(gauge(ServerGauges::DedupEntries) = self.cache.len() as u64);
        summary
    }

    async fn archive_span(
        &self,
        enriched: &EnrichedSpan,
        otel_span: &OtelSpan,
        resource: &ResourceAttributes,
    ) {
        let Some(archive) = &self.archive else {
            return;
        };

        let record = ArchiveRecord::new(
            &enriched.service_name,
            otel_span,
            enriched.span.attributes(),
            resource,
        );
        if let Err(error) = archive.append(&record).await {
            svcgraph_log::error!(
                error = &error as &dyn std::error::Error,
                path = %archive.path().display(),
                "failed to archive span"
            );
        }
    }

    /// Claims the edge in the dedup cache. Returns `None` if it was seen within the window.
    fn admit(&self, enriched: &EnrichedSpan) -> Option<Admission<'_, C>> {
        let admitted = self.cache.insert_if_absent(
            enriched.dedup_key.clone(),
            enriched.clone(),
            self.dedup_ttl,
        );

        admitted.then(|| Admission {
            cache: &self.cache,
            caller: enriched.caller_service.clone(),
            callee: enriched.callee_service.clone(),
            dedup_key: enriched.dedup_key.clone(),
            completed: false,
        })
    }

    /// Resolves ownership and writes the edge. Returns `None` if the write failed.
    async fn resolve_and_write(
        &self,
        mut enriched: EnrichedSpan,
        resource: &ResourceAttributes,
    ) -> Option<WriteOutcome> {
        let resolved = metric!(timer(ServerTimers::OwnershipResolveDuration), {
            self.resolver.resolve(&mut enriched, resource).await
        });

        match resolved {
            Ok(Some(strategy)) => {
                metric!(
                    counter(ServerCounters::OwnershipResolved) += 1,
                    strategy = strategy.as_str()
                );
                svcgraph_log::debug!(
                    dedup_key = enriched.dedup_key.as_str(),
                    owner = %enriched.ownership,
                    strategy = strategy.as_str(),
                    "resolved workload owner"
                );
            }
            Ok(None) => {
                svcgraph_log::debug!(
                    dedup_key = enriched.dedup_key.as_str(),
                    "no workload owner found"
                );
            }
            Err(error) => {
                metric!(counter(ServerCounters::OwnershipFailed) += 1);
                svcgraph_log::warn!(
                    error = &error as &dyn std::error::Error,
                    caller = enriched.caller_service.as_str(),
                    callee = enriched.callee_service.as_str(),
                    dedup_key = enriched.dedup_key.as_str(),
                    "failed to resolve workload owner"
                );
            }
        }

        let written = metric!(timer(ServerTimers::GraphWriteDuration), {
            self.writer.write(&enriched).await
        });

        match written {
            Ok(WriteOutcome::Written) => {
                metric!(counter(ServerCounters::SpansWritten) += 1);
                Some(WriteOutcome::Written)
            }
            Ok(WriteOutcome::Skipped(reason)) => {
                metric!(
                    counter(ServerCounters::SpansSkipped) += 1,
                    reason = reason.as_str()
                );
                svcgraph_log::debug!(
                    caller = enriched.caller_service.as_str(),
                    callee = enriched.callee_service.as_str(),
                    dedup_key = enriched.dedup_key.as_str(),
                    reason = reason.as_str(),
                    "skipped edge"
                );
                Some(WriteOutcome::Skipped(reason))
            }
            Err(error) => {
                metric!(counter(ServerCounters::WriteFailed) += 1);
                svcgraph_log::error!(
                    error = &error as &dyn std::error::Error,
                    caller = enriched.caller_service.as_str(),
                    callee = enriched.callee_service.as_str(),
                    dedup_key = enriched.dedup_key.as_str(),
                    "failed to write edge to graph"
                );
                None
            }
        }
    }
}

/// An edge admitted to the dedup cache that has not been written yet.
///
/// Dropping it without calling [`complete`](Self::complete) removes the edge from the cache, so
/// the next export carrying it is processed again.
struct Admission<'a, C: Clock> {
    cache: &'a DedupCache<EnrichedSpan, C>,
    caller: String,
    callee: String,
    dedup_key: String,
    completed: bool,
}

impl<C: Clock> Admission<'_, C> {
    fn complete(mut self) {
        self.completed = true;
    }
}

impl<C: Clock> Drop for Admission<'_, C> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }

        self.cache.delete(&self.dedup_key);
        metric!(counter(ServerCounters::SpansCancelled) += 1);
        svcgraph_log::warn!(
            caller = self.caller.as_str(),
            callee = self.callee.as_str(),
            dedup_key = self.dedup_key.as_str(),
            "edge processing cancelled before it was written"
        );
    }
}

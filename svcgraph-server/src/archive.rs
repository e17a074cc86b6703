use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use svcgraph_spans::{OtelSpan, ResourceAttributes};

/// One line of the trace archive.
#[derive(Debug, Serialize)]
pub struct ArchiveRecord<'a> {
    /// When the span was received.
    pub timestamp: DateTime<Utc>,
    /// The reporting service, `unknown` if not set.
    pub service_name: &'a str,
    /// The operation name.
    pub span_name: &'a str,
    /// Start of the span in unix nanoseconds.
    pub start_time_ns: u64,
    /// End of the span in unix nanoseconds.
    pub end_time_ns: u64,
    /// Difference between end and start, negative if the span ends before it starts.
    pub duration_ns: i64,
    /// Span attributes, reduced to strings.
    pub attributes: &'a BTreeMap<String, String>,
    /// Attributes of the reporting resource.
    pub resource_attributes: &'a ResourceAttributes,
}

impl<'a> ArchiveRecord<'a> {
    /// Creates a record stamped with the current time.
    pub fn new(
        service_name: &'a str,
        otel_span: &'a OtelSpan,
        attributes: &'a BTreeMap<String, String>,
        resource_attributes: &'a ResourceAttributes,
    ) -> Self {
        let start = otel_span.start_time_unix_nano;
        let end = otel_span.end_time_unix_nano;

        Self {
            timestamp: Utc::now(),
            service_name,
            span_name: &otel_span.name,
            start_time_ns: start,
            end_time_ns: end,
            duration_ns: (end as i128 - start as i128)
                .clamp(i64::MIN as i128, i64::MAX as i128) as i64,
            attributes,
            resource_attributes,
        }
    }
}

/// An error writing to the trace archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The record could not be serialized.
    #[error("failed to serialize archive record")]
    Json(#[from] serde_json::Error),
    /// The file could not be written.
    #[error("failed to write archive file")]
    Io(#[from] io::Error),
}

/// Appends received spans to a JSON lines file.
#[derive(Debug)]
pub struct TraceArchive {
    path: PathBuf,
    file: Mutex<File>,
}

impl TraceArchive {
    /// Creates a new archive file in `dir`, named after the current time.
    pub fn create(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;

        let name = format!("traces_{}.jsonl", Utc::now().format("%Y-%m-%d_%H-%M-%S"));
        let path = dir.join(name);
        let file = File::options().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// The file spans are written to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one record as a line and syncs it to disk.
    ///
    /// The write runs on the blocking thread pool.
    pub async fn append(self: &Arc<Self>, record: &ArchiveRecord<'_>) -> Result<(), ArchiveError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let archive = Arc::clone(self);
        let written = tokio::task::spawn_blocking(move || archive.write_line(&line))
            .await
            .map_err(io::Error::other)?;

        Ok(written?)
    }

    fn write_line(&self, line: &[u8]) -> io::Result<()> {
        let mut file = self.file.lock();
        file.write_all(line)?;
        file.sync_data()
    }
}

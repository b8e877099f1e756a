use crate::{GateError, Result};
use bytes::Bytes;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Default batch size a batch must exceed before workers are used.
pub const DEFAULT_MIN_PARALLEL_BATCH: usize = 12;

/// A keyed blob as received from a caller. `payload` is empty for reads and
/// deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub key: String,
    pub payload: Bytes,
}

impl Chunk {
    pub fn new(key: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
        }
    }

    pub fn key_only(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            payload: Bytes::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOp {
    Put,
    Get,
    Delete,
}

impl ChunkOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Put => "putObject",
            Self::Get => "getObject",
            Self::Delete => "deleteObject",
        }
    }

    pub fn streams_payload(&self) -> bool {
        matches!(self, Self::Get)
    }
}

impl fmt::Display for ChunkOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one chunk within a batch. Exactly one is produced per input
/// chunk.
#[derive(Debug)]
pub struct ChunkResult {
    pub key: String,
    pub payload: Option<Bytes>,
    pub error: Option<GateError>,
    pub started_at: Instant,
    pub finished_at: Instant,
}

impl ChunkResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn latency(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.started_at)
    }

    /// Length of the payload carried by this result, zero when absent.
    pub fn length(&self) -> usize {
        self.payload.as_ref().map(Bytes::len).unwrap_or(0)
    }

    pub(crate) fn cancelled(key: String) -> Self {
        let now = Instant::now();
        Self {
            key,
            payload: None,
            error: Some(GateError::Cancelled),
            started_at: now,
            finished_at: now,
        }
    }
}

/// Sequential-vs-parallel decision rule. Fixed for the lifetime of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPolicy {
    pub parallelism: usize,
    pub min_parallel_batch: usize,
    pub validate_keys: bool,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            parallelism: 0,
            min_parallel_batch: DEFAULT_MIN_PARALLEL_BATCH,
            validate_keys: false,
        }
    }
}

impl ExecutionPolicy {
    /// Builds a policy from signed configuration values; negatives clamp to
    /// zero, which always selects the sequential path.
    pub fn new(parallelism: i64, min_parallel_batch: i64) -> Self {
        Self {
            parallelism: parallelism.max(0) as usize,
            min_parallel_batch: min_parallel_batch.max(0) as usize,
            validate_keys: false,
        }
    }

    pub fn with_key_validation(mut self, validate_keys: bool) -> Self {
        self.validate_keys = validate_keys;
        self
    }

    pub fn is_parallel(&self, batch_len: usize) -> bool {
        self.parallelism > self.min_parallel_batch && batch_len > self.min_parallel_batch
    }

    /// Workers started for a parallel batch; never more than there are items.
    pub fn worker_count(&self, batch_len: usize) -> usize {
        self.parallelism.min(batch_len)
    }
}

/// Aggregated verdict for a whole batch.
///
/// `last_error` is whichever failure was drained last; it says nothing about
/// which items failed or how many.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub total: usize,
    pub success_count: usize,
    pub last_error: Option<GateError>,
}

impl BatchOutcome {
    pub fn record(&mut self, result: Result<()>) {
        self.total += 1;
        match result {
            Ok(()) => self.success_count += 1,
            Err(error) => self.last_error = Some(error),
        }
    }

    pub fn failed_count(&self) -> usize {
        self.total - self.success_count
    }

    pub fn is_success(&self) -> bool {
        self.last_error.is_none()
    }

    pub fn into_result(self) -> Result<()> {
        match self.last_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

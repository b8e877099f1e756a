//! Result consumption and batch aggregation.
//!
//! [`StreamSink`] drains [`ChunkResult`]s in whatever order the executor
//! yields them, forwards fetched payloads to the caller's [`ChunkSink`] and
//! folds every item into a [`BatchOutcome`].

use crate::{BatchOutcome, ChunkOp, ChunkResult, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;
use tracing::Level;

/// Number of keys carried by the aggregate batch log line.
pub const KEY_PREVIEW: usize = 8;

/// Outbound stream of fetched chunks.
#[async_trait]
pub trait ChunkSink: Send {
    async fn send_chunk(&mut self, key: &str, payload: Bytes) -> Result<()>;
}

/// Sink for operations that stream nothing back.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

#[async_trait]
impl ChunkSink for DiscardSink {
    async fn send_chunk(&mut self, _key: &str, _payload: Bytes) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ChunkSink for Vec<(String, Bytes)> {
    async fn send_chunk(&mut self, key: &str, payload: Bytes) -> Result<()> {
        self.push((key.to_string(), payload));
        Ok(())
    }
}

pub struct StreamSink<'a, S: ChunkSink + ?Sized> {
    op: ChunkOp,
    sink: &'a mut S,
    outcome: BatchOutcome,
}

impl<'a, S: ChunkSink + ?Sized> StreamSink<'a, S> {
    pub fn new(op: ChunkOp, sink: &'a mut S) -> Self {
        Self {
            op,
            sink,
            outcome: BatchOutcome::default(),
        }
    }

    /// Logs one result, streams its payload for reads and records it.
    pub async fn accept(&mut self, result: ChunkResult) {
        let latency = result.latency();
        let length = result.length();
        let ChunkResult {
            key,
            payload,
            error,
            ..
        } = result;

        if let Some(error) = error {
            tracing::error!(key = %key, length, ?latency, %error, "{}", self.op);
            self.outcome.record(Err(error));
            return;
        }

        tracing::debug!(key = %key, length, ?latency, "{}", self.op);

        if self.op.streams_payload() {
            let payload = payload.unwrap_or_default();
            let started = Instant::now();

            if let Err(error) = self.sink.send_chunk(&key, payload).await {
                tracing::error!(key = %key, length, latency = ?started.elapsed(), %error, "sendObject");
                self.outcome.record(Err(error));
                return;
            }

            tracing::debug!(key = %key, length, latency = ?started.elapsed(), "sendObject");
        }

        self.outcome.record(Ok(()));
    }

    pub fn finish(self) -> BatchOutcome {
        self.outcome
    }
}

/// Emits the aggregate line for a finished batch at `level`, carrying at
/// most [`KEY_PREVIEW`] keys.
pub fn report_batch<'k>(
    level: Level,
    name: &str,
    outcome: &BatchOutcome,
    keys: impl IntoIterator<Item = &'k str>,
) {
    let preview: Vec<&str> = keys.into_iter().take(KEY_PREVIEW).collect();
    let error = outcome.last_error.as_ref().map(ToString::to_string);
    let (count, failed, total) = (outcome.success_count, outcome.failed_count(), outcome.total);

    if level == Level::ERROR {
        tracing::error!(keys = ?preview, count, failed, total, ?error, "{}", name);
    } else if level == Level::WARN {
        tracing::warn!(keys = ?preview, count, failed, total, ?error, "{}", name);
    } else if level == Level::INFO {
        tracing::info!(keys = ?preview, count, failed, total, ?error, "{}", name);
    } else if level == Level::DEBUG {
        tracing::debug!(keys = ?preview, count, failed, total, ?error, "{}", name);
    } else {
        tracing::trace!(keys = ?preview, count, failed, total, ?error, "{}", name);
    }
}

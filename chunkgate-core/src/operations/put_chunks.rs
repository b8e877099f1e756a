use crate::executor::BatchExecutor;
use crate::sink::{DiscardSink, KEY_PREVIEW, StreamSink, report_batch};
use crate::{Chunk, ChunkOp, GateError, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Level;

#[derive(Clone)]
pub struct PutChunksOperation {
    executor: Option<Arc<BatchExecutor>>,
    log_level: Level,
}

#[derive(Debug, Clone)]
pub struct PutChunksOperationRequest {
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutChunksOperationResult {
    pub stored: usize,
}

impl PutChunksOperation {
    pub fn new(executor: Option<Arc<BatchExecutor>>, log_level: Level) -> Self {
        Self {
            executor,
            log_level,
        }
    }

    /// Stores every chunk. All puts are issued (or cancelled) before this
    /// returns; the error is the last item failure observed.
    pub async fn run(
        &self,
        request: PutChunksOperationRequest,
        cancel: &CancellationToken,
    ) -> Result<PutChunksOperationResult> {
        let executor = self
            .executor
            .as_ref()
            .ok_or_else(|| GateError::Unimplemented("PutChunks".to_string()))?;

        let PutChunksOperationRequest { chunks } = request;
        let keys: Vec<String> = chunks
            .iter()
            .take(KEY_PREVIEW)
            .map(|chunk| chunk.key.clone())
            .collect();

        let mut discard = DiscardSink;
        let mut sink = StreamSink::new(ChunkOp::Put, &mut discard);
        executor
            .execute(ChunkOp::Put, chunks, cancel, &mut sink)
            .await;
        let outcome = sink.finish();

        report_batch(
            self.log_level,
            "putChunks",
            &outcome,
            keys.iter().map(String::as_str),
        );

        let stored = outcome.success_count;
        outcome.into_result()?;
        Ok(PutChunksOperationResult { stored })
    }
}

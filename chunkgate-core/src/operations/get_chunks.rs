use crate::executor::BatchExecutor;
use crate::sink::{ChunkSink, KEY_PREVIEW, StreamSink, report_batch};
use crate::{Chunk, ChunkOp, GateError, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Level;

#[derive(Clone)]
pub struct GetChunksOperation {
    executor: Option<Arc<BatchExecutor>>,
    log_level: Level,
}

#[derive(Debug, Clone)]
pub struct GetChunksOperationRequest {
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetChunksOperationResult {
    pub sent: usize,
}

impl GetChunksOperation {
    pub fn new(executor: Option<Arc<BatchExecutor>>, log_level: Level) -> Self {
        Self {
            executor,
            log_level,
        }
    }

    /// Fetches every key and streams each payload to `out` as it arrives.
    /// Delivery order follows the execution mode: input order when sequential,
    /// completion order when parallel.
    pub async fn run<S: ChunkSink + ?Sized>(
        &self,
        request: GetChunksOperationRequest,
        out: &mut S,
        cancel: &CancellationToken,
    ) -> Result<GetChunksOperationResult> {
        let executor = self
            .executor
            .as_ref()
            .ok_or_else(|| GateError::Unimplemented("GetChunks".to_string()))?;

        let GetChunksOperationRequest { keys } = request;
        let preview: Vec<String> = keys.iter().take(KEY_PREVIEW).cloned().collect();
        let chunks: Vec<Chunk> = keys.into_iter().map(Chunk::key_only).collect();

        let mut sink = StreamSink::new(ChunkOp::Get, out);
        executor
            .execute(ChunkOp::Get, chunks, cancel, &mut sink)
            .await;
        let outcome = sink.finish();

        report_batch(
            self.log_level,
            "getChunks",
            &outcome,
            preview.iter().map(String::as_str),
        );

        let sent = outcome.success_count;
        outcome.into_result()?;
        Ok(GetChunksOperationResult { sent })
    }
}

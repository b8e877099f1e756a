use crate::executor::BatchExecutor;
use crate::sink::{DiscardSink, StreamSink, report_batch};
use crate::{Chunk, ChunkOp, GateError, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Level;

#[derive(Clone)]
pub struct DeleteChunkOperation {
    executor: Option<Arc<BatchExecutor>>,
    log_level: Level,
}

#[derive(Debug, Clone)]
pub struct DeleteChunkOperationRequest {
    pub key: String,
}

impl DeleteChunkOperation {
    pub fn new(executor: Option<Arc<BatchExecutor>>, log_level: Level) -> Self {
        Self {
            executor,
            log_level,
        }
    }

    pub async fn run(
        &self,
        request: DeleteChunkOperationRequest,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let executor = self
            .executor
            .as_ref()
            .ok_or_else(|| GateError::Unimplemented("DeleteChunk".to_string()))?;

        let DeleteChunkOperationRequest { key } = request;
        let chunks = vec![Chunk::key_only(key.as_str())];

        let mut discard = DiscardSink;
        let mut sink = StreamSink::new(ChunkOp::Delete, &mut discard);
        executor
            .execute(ChunkOp::Delete, chunks, cancel, &mut sink)
            .await;
        let outcome = sink.finish();

        report_batch(self.log_level, "deleteChunk", &outcome, [key.as_str()]);

        outcome.into_result()
    }
}

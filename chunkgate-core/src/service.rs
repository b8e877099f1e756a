use crate::executor::BatchExecutor;
use crate::health::{DEFAULT_PROBE_INTERVAL, HealthProber, ProbeStats};
use crate::operations::{
    DeleteChunkOperation, DeleteChunkOperationRequest, GetChunksOperation,
    GetChunksOperationRequest, GetChunksOperationResult, PutChunksOperation,
    PutChunksOperationRequest, PutChunksOperationResult,
};
use crate::sink::ChunkSink;
use crate::storage::DynBackend;
use crate::{Chunk, ExecutionPolicy, GateError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::Level;

#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    pub policy: ExecutionPolicy,
    /// Level of the per-batch aggregate log line.
    pub log_level: Level,
    pub health_interval: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            policy: ExecutionPolicy::default(),
            log_level: Level::DEBUG,
            health_interval: DEFAULT_PROBE_INTERVAL,
        }
    }
}

/// Chunk storage service: the three chunk operations over one shared
/// backend, plus the backend health prober.
///
/// Without a backend every operation fails with
/// [`GateError::Unimplemented`] before touching any item.
pub struct ChunkService {
    put_chunks: PutChunksOperation,
    get_chunks: GetChunksOperation,
    delete_chunk: DeleteChunkOperation,
    configured: bool,
    probe_stats: Option<Arc<ProbeStats>>,
    prober: Mutex<Option<HealthProber>>,
}

impl ChunkService {
    /// Builds the service and starts probing the backend. Must be called from
    /// within a tokio runtime.
    pub fn start(backend: Option<DynBackend>, options: ServiceOptions) -> Self {
        let executor = backend
            .clone()
            .map(|backend| Arc::new(BatchExecutor::new(backend, options.policy)));

        let prober =
            backend.map(|backend| HealthProber::start(backend, options.health_interval));
        let probe_stats = prober.as_ref().map(HealthProber::stats);

        tracing::info!(
            parallelism = options.policy.parallelism,
            min_parallel_batch = options.policy.min_parallel_batch,
            validate_keys = options.policy.validate_keys,
            configured = executor.is_some(),
            "chunk service started"
        );

        Self {
            put_chunks: PutChunksOperation::new(executor.clone(), options.log_level),
            get_chunks: GetChunksOperation::new(executor.clone(), options.log_level),
            delete_chunk: DeleteChunkOperation::new(executor.clone(), options.log_level),
            configured: executor.is_some(),
            probe_stats,
            prober: Mutex::new(prober),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Fails with [`GateError::Unimplemented`] naming `method` when no
    /// backend is configured.
    pub fn ensure_backend(&self, method: &str) -> Result<()> {
        if self.configured {
            Ok(())
        } else {
            Err(GateError::Unimplemented(method.to_string()))
        }
    }

    pub fn probe_stats(&self) -> Option<Arc<ProbeStats>> {
        self.probe_stats.clone()
    }

    pub async fn put_chunks(
        &self,
        chunks: Vec<Chunk>,
        cancel: &CancellationToken,
    ) -> Result<PutChunksOperationResult> {
        self.put_chunks
            .run(PutChunksOperationRequest { chunks }, cancel)
            .await
    }

    pub async fn get_chunks<S: ChunkSink + ?Sized>(
        &self,
        keys: Vec<String>,
        out: &mut S,
        cancel: &CancellationToken,
    ) -> Result<GetChunksOperationResult> {
        self.get_chunks
            .run(GetChunksOperationRequest { keys }, out, cancel)
            .await
    }

    pub async fn delete_chunk(&self, key: &str, cancel: &CancellationToken) -> Result<()> {
        self.delete_chunk
            .run(
                DeleteChunkOperationRequest {
                    key: key.to_string(),
                },
                cancel,
            )
            .await
    }

    /// Stops the health prober. Idempotent.
    pub async fn shutdown(&self) {
        let prober = self.prober.lock().await.take();
        if let Some(prober) = prober {
            prober.stop().await;
            tracing::info!("chunk service stopped");
        }
    }
}

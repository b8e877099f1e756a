//! Batch execution against an [`ObjectBackend`].
//!
//! Small batches run sequentially and keep input order end to end. Batches
//! selected by the [`ExecutionPolicy`] fan out to a fixed pool of workers that
//! drain a shared queue; their results arrive in completion order, not input
//! order. Either way exactly one [`ChunkResult`] reaches the sink per input
//! chunk.

use crate::key::{ChunkId, SCRATCH_CAPACITY, normalize_key};
use crate::sink::{ChunkSink, StreamSink};
use crate::storage::{DynBackend, ObjectBackend};
use crate::{Chunk, ChunkOp, ChunkResult, ExecutionPolicy, GateError, Result};
use bytes::Bytes;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct BatchExecutor {
    backend: DynBackend,
    policy: ExecutionPolicy,
}

type WorkQueue = Arc<Mutex<mpsc::Receiver<Chunk>>>;

impl BatchExecutor {
    pub fn new(backend: DynBackend, policy: ExecutionPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> ExecutionPolicy {
        self.policy
    }

    /// Runs `op` over every chunk and feeds each result to `sink`.
    ///
    /// Once `cancel` fires no further backend calls are issued; calls already
    /// in flight complete, and every chunk not yet dispatched yields a
    /// [`GateError::Cancelled`] result.
    pub async fn execute<S: ChunkSink + ?Sized>(
        &self,
        op: ChunkOp,
        chunks: Vec<Chunk>,
        cancel: &CancellationToken,
        sink: &mut StreamSink<'_, S>,
    ) {
        if chunks.is_empty() {
            return;
        }

        if self.policy.is_parallel(chunks.len()) {
            self.execute_parallel(op, chunks, cancel, sink).await;
        } else {
            self.execute_sequential(op, chunks, cancel, sink).await;
        }
    }

    async fn execute_sequential<S: ChunkSink + ?Sized>(
        &self,
        op: ChunkOp,
        chunks: Vec<Chunk>,
        cancel: &CancellationToken,
        sink: &mut StreamSink<'_, S>,
    ) {
        let mut scratch = String::with_capacity(SCRATCH_CAPACITY);

        for chunk in chunks {
            let result = if cancel.is_cancelled() {
                ChunkResult::cancelled(chunk.key)
            } else {
                dispatch(
                    self.backend.as_ref(),
                    op,
                    chunk,
                    self.policy.validate_keys,
                    &mut scratch,
                )
                .await
            };
            sink.accept(result).await;
        }
    }

    async fn execute_parallel<S: ChunkSink + ?Sized>(
        &self,
        op: ChunkOp,
        chunks: Vec<Chunk>,
        cancel: &CancellationToken,
        sink: &mut StreamSink<'_, S>,
    ) {
        let total = chunks.len();
        let parallelism = self.policy.worker_count(total);

        let (work_tx, work_rx) = mpsc::channel::<Chunk>(parallelism);
        let (result_tx, mut result_rx) = mpsc::channel::<ChunkResult>(parallelism);
        let queue: WorkQueue = Arc::new(Mutex::new(work_rx));

        tokio::spawn(feed(chunks, work_tx));

        let workers: Vec<JoinHandle<()>> = (0..parallelism)
            .map(|worker_id| {
                tokio::spawn(work(
                    worker_id,
                    self.backend.clone(),
                    op,
                    self.policy.validate_keys,
                    queue.clone(),
                    result_tx.clone(),
                    cancel.clone(),
                ))
            })
            .collect();
        drop(queue);

        tokio::spawn(async move {
            for worker in workers {
                if let Err(error) = worker.await {
                    tracing::error!(%error, "chunk worker terminated abnormally");
                }
            }
            // last sender: the result channel closes once every worker is done
            drop(result_tx);
        });

        let mut received = 0usize;
        while let Some(result) = result_rx.recv().await {
            received += 1;
            sink.accept(result).await;
        }

        if received != total {
            tracing::error!(received, total, "{} results missing from parallel batch", op);
        }
    }
}

async fn feed(chunks: Vec<Chunk>, queue: mpsc::Sender<Chunk>) {
    for chunk in chunks {
        if queue.send(chunk).await.is_err() {
            // all workers are gone
            return;
        }
    }
}

async fn work(
    worker_id: usize,
    backend: DynBackend,
    op: ChunkOp,
    validate_keys: bool,
    queue: WorkQueue,
    results: mpsc::Sender<ChunkResult>,
    cancel: CancellationToken,
) {
    let mut scratch = String::with_capacity(SCRATCH_CAPACITY);

    loop {
        let next = queue.lock().await.recv().await;
        let Some(chunk) = next else {
            break;
        };

        let result = if cancel.is_cancelled() {
            ChunkResult::cancelled(chunk.key)
        } else {
            dispatch(backend.as_ref(), op, chunk, validate_keys, &mut scratch).await
        };

        if results.send(result).await.is_err() {
            tracing::debug!(worker_id, "result consumer gone, worker exiting");
            break;
        }
    }
}

async fn dispatch(
    backend: &dyn ObjectBackend,
    op: ChunkOp,
    chunk: Chunk,
    validate_keys: bool,
    scratch: &mut String,
) -> ChunkResult {
    let Chunk { key, payload } = chunk;
    // failed writes still report the size they tried to store
    let written = matches!(op, ChunkOp::Put).then(|| payload.clone());

    let started_at = Instant::now();
    let outcome = call_backend(backend, op, &key, payload, validate_keys, scratch).await;
    let finished_at = Instant::now();

    let (payload, error) = match outcome {
        Ok(payload) => (payload, None),
        Err(error) => (written, Some(error)),
    };

    ChunkResult {
        key,
        payload,
        error,
        started_at,
        finished_at,
    }
}

async fn call_backend(
    backend: &dyn ObjectBackend,
    op: ChunkOp,
    key: &str,
    payload: Bytes,
    validate_keys: bool,
    scratch: &mut String,
) -> Result<Option<Bytes>> {
    if validate_keys {
        ChunkId::parse(key)?;
    }

    let stored_key = normalize_key(key, scratch);
    let call = async {
        match op {
            ChunkOp::Put => backend
                .put_object(stored_key, payload.clone())
                .await
                .map(|()| Some(payload)),
            ChunkOp::Get => backend.get_object(stored_key).await.map(Some),
            ChunkOp::Delete => backend.delete_object(stored_key).await.map(|()| None),
        }
    };

    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(GateError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

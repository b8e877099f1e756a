//! Chunkgate Core - batched chunk storage over pluggable object backends
//!
//! - keys normalized so they never carry `:`
//! - batches executed sequentially or on a bounded worker pool
//! - partial failures aggregated, last failure wins
//! - fetched payloads streamed back one by one

pub mod chunk;
pub mod error;
pub mod executor;
pub mod health;
pub mod key;
pub mod operations;
pub mod registry;
pub mod service;
pub mod sink;
pub mod storage;

pub use chunk::{
    BatchOutcome, Chunk, ChunkOp, ChunkResult, DEFAULT_MIN_PARALLEL_BATCH, ExecutionPolicy,
};
pub use error::{GateError, Result};
pub use executor::BatchExecutor;
pub use health::{DEFAULT_PROBE_INTERVAL, HealthProber, ProbeStats};
pub use key::{ChunkId, SCRATCH_CAPACITY, format_key, normalize_key};
pub use operations::{
    DeleteChunkOperation, DeleteChunkOperationRequest, GetChunksOperation,
    GetChunksOperationRequest, GetChunksOperationResult, PutChunksOperation,
    PutChunksOperationRequest, PutChunksOperationResult,
};
pub use registry::{BackendBuilder, BackendFactory, BackendSettings, NO_BACKEND_DRIVER};
pub use service::{ChunkService, ServiceOptions};
pub use sink::{ChunkSink, DiscardSink, KEY_PREVIEW, StreamSink, report_batch};
pub use storage::{
    CloudBackend, DynBackend, EmptyBackend, FilesystemBackend, HttpBackend, MemoryBackend,
    ObjectBackend,
};

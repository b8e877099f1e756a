//! Storage backends for Chunkgate
//!
//! Every backend implements [`ObjectBackend`]. The dispatcher shares one
//! instance across all concurrent batches and never locks around it, so
//! implementations must be safe for concurrent use.

pub mod cloud;
pub mod empty;
pub mod filesystem;
pub mod http;
pub mod memory;

pub use cloud::CloudBackend;
pub use empty::EmptyBackend;
pub use filesystem::FilesystemBackend;
pub use http::HttpBackend;
pub use memory::MemoryBackend;

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Minimal capability set a storage backend provides.
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    async fn put_object(&self, key: &str, payload: Bytes) -> Result<()>;

    /// Fetches an object. An empty payload without an error is a valid
    /// answer for a missing object; backends that know the difference may
    /// return [`crate::GateError::ChunkNotFound`] instead.
    async fn get_object(&self, key: &str) -> Result<Bytes>;

    async fn delete_object(&self, key: &str) -> Result<()>;

    /// Side-effect-free liveness check.
    async fn ping(&self) -> Result<()>;
}

pub type DynBackend = Arc<dyn ObjectBackend>;

pub mod delete_chunk;
pub mod get_chunks;
pub mod put_chunks;

pub use delete_chunk::{DeleteChunkOperation, DeleteChunkOperationRequest};
pub use get_chunks::{GetChunksOperation, GetChunksOperationRequest, GetChunksOperationResult};
pub use put_chunks::{PutChunksOperation, PutChunksOperationRequest, PutChunksOperationResult};

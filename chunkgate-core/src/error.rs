use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid chunk ID {0:?}")]
    InvalidChunkId(String),

    #[error("chunk not found: {0}")]
    ChunkNotFound(String),

    #[error("method {0} not implemented")]
    Unimplemented(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("stream send failed: {0}")]
    Stream(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("backend call panicked: {0}")]
    Panicked(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

pub type Result<T> = std::result::Result<T, GateError>;

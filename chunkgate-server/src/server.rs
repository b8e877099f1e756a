use crate::config::Config;
use async_trait::async_trait;
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chunkgate_core::{Chunk, ChunkService, ChunkSink, GateError, Result};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

/// Lines buffered between the fetch task and the response body.
const STREAM_BUFFER: usize = 16;

pub struct ServerState {
    pub service: Arc<ChunkService>,
}

#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WireChunk {
    pub key: String,
    /// Base64 (standard alphabet, padded).
    pub payload: String,
}

#[derive(Debug, Deserialize)]
struct PutChunksBody {
    chunks: Vec<WireChunk>,
}

#[derive(Debug, Deserialize)]
struct FetchChunksBody {
    keys: Vec<String>,
}

/// Final line of a fetch stream.
#[derive(Debug, Serialize, Deserialize)]
pub struct FetchTrailer {
    pub status: String,
    pub count: usize,
    pub total: usize,
    pub error: Option<String>,
}

pub struct ApiError(GateError);

impl From<GateError> for ApiError {
    fn from(error: GateError) -> Self {
        Self(error)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(GateError::InvalidRequest(rejection.body_text()))
    }
}

pub fn status_for(error: &GateError) -> StatusCode {
    match error {
        GateError::Unimplemented(_) => StatusCode::NOT_IMPLEMENTED,
        GateError::InvalidRequest(_) | GateError::InvalidChunkId(_) => StatusCode::BAD_REQUEST,
        GateError::ChunkNotFound(_) => StatusCode::NOT_FOUND,
        GateError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "request rejected");
        }

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.0.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

pub async fn build_service(config: &Config) -> Result<ChunkService> {
    let options = config.chunk.service_options()?;
    let backend = config.store.backend_builder().build().await?;
    Ok(ChunkService::start(backend, options))
}

pub fn router(service: Arc<ChunkService>) -> Router {
    let state = Arc::new(ServerState { service });

    Router::new()
        .route("/health", get(health_handler))
        .route("/chunks", put(put_chunks))
        .route("/chunks/*key", delete(delete_chunk))
        .route("/fetch", post(fetch_chunks))
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(config: Config, service: ChunkService) -> Result<()> {
    let service = Arc::new(service);
    let app = router(service.clone());

    let bind_addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped accepting requests");
    service.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", error);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!("Failed to listen for SIGTERM: {}", error);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    };

    ApiError(GateError::Panicked(message)).into_response()
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "backend": state.service.is_configured(),
    });

    (StatusCode::OK, Json(response))
}

async fn put_chunks(
    State(state): State<Arc<ServerState>>,
    payload: std::result::Result<Json<PutChunksBody>, JsonRejection>,
) -> std::result::Result<StatusCode, ApiError> {
    let Json(body) = payload?;

    let chunks = body
        .chunks
        .into_iter()
        .map(|chunk| -> Result<Chunk> {
            let payload = BASE64.decode(chunk.payload.as_bytes()).map_err(|error| {
                GateError::InvalidRequest(format!("invalid payload for {}: {}", chunk.key, error))
            })?;
            Ok(Chunk::new(chunk.key, payload))
        })
        .collect::<Result<Vec<_>>>()?;

    // a dropped request stops dispatching the rest of the batch
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    state.service.put_chunks(chunks, &cancel).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_chunk(
    State(state): State<Arc<ServerState>>,
    Path(key): Path<String>,
) -> std::result::Result<StatusCode, ApiError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    state.service.delete_chunk(&key, &cancel).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Forwards fetched chunks as NDJSON lines to the response body.
struct ChannelSink {
    lines: mpsc::Sender<Bytes>,
    sent: usize,
}

impl ChannelSink {
    async fn send_line<T: Serialize>(&self, value: &T) -> Result<()> {
        let mut line = serde_json::to_vec(value)
            .map_err(|error| GateError::Internal(format!("encode stream line: {}", error)))?;
        line.push(b'\n');

        self.lines
            .send(Bytes::from(line))
            .await
            .map_err(|_| GateError::Stream("client disconnected".to_string()))
    }
}

#[async_trait]
impl ChunkSink for ChannelSink {
    async fn send_chunk(&mut self, key: &str, payload: Bytes) -> Result<()> {
        let chunk = WireChunk {
            key: key.to_string(),
            payload: BASE64.encode(&payload),
        };
        self.send_line(&chunk).await?;
        self.sent += 1;
        Ok(())
    }
}

async fn fetch_chunks(
    State(state): State<Arc<ServerState>>,
    payload: std::result::Result<Json<FetchChunksBody>, JsonRejection>,
) -> std::result::Result<Response, ApiError> {
    let Json(body) = payload?;
    state.service.ensure_backend("GetChunks")?;

    let total = body.keys.len();
    let (lines_tx, lines_rx) = mpsc::channel::<Bytes>(STREAM_BUFFER);
    let cancel = CancellationToken::new();

    let service = state.service.clone();
    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut sink = ChannelSink {
            lines: lines_tx,
            sent: 0,
        };
        let result = service.get_chunks(body.keys, &mut sink, &task_cancel).await;

        let (status, error) = match result {
            Ok(_) => ("ok", None),
            Err(error) => ("error", Some(error.to_string())),
        };
        let trailer = FetchTrailer {
            status: status.to_string(),
            count: sink.sent,
            total,
            error,
        };

        if let Err(error) = sink.send_line(&trailer).await {
            tracing::debug!(%error, "fetch trailer not delivered");
        }
    });

    // the response body owns the guard: a client hanging up cancels the batch
    let guard = cancel.drop_guard();
    let stream = futures_util::stream::unfold((lines_rx, guard), |(mut lines, guard)| async move {
        lines
            .recv()
            .await
            .map(|line| (Ok::<_, Infallible>(line), (lines, guard)))
    });

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(stream),
    )
        .into_response())
}

//! Chunkgate Server - HTTP front end for the chunk service

pub mod config;
pub mod server;

pub use config::Config;
pub use server::{ApiError, FetchTrailer, WireChunk, build_service, router, run_server};

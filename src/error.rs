//! Error types shared by the block service, metadata service and client.
//!
//! Version conflicts and missing blocks are not errors: they travel as
//! [`CommitOutcome`](crate::metadata::CommitOutcome) variants so callers match
//! on them. Everything here is either a transport failure or terminal.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::path::PathBuf;
use thiserror::Error;

use crate::hash::ContentHash;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Local file not found: {}", .0.display())]
    LocalFileNotFound(PathBuf),

    #[error("Remote file not found: {0}")]
    RemoteFileNotFound(String),

    #[error("Block not found for hash: {0}")]
    BlockNotFound(ContentHash),

    #[error("Invalid content hash: {0}")]
    InvalidHash(String),

    #[error("Shard index {index} out of range for {shard_count} block store(s)")]
    InvalidShard { index: usize, shard_count: usize },

    #[error("{operation} gave up after {attempts} attempt(s)")]
    RetriesExhausted { operation: String, attempts: u32 },

    #[error("Unexpected protocol outcome: {0}")]
    UnexpectedOutcome(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Http(err.to_string())
    }
}

impl ResponseError for StoreError {
    fn status_code(&self) -> StatusCode {
        match self {
            StoreError::BlockNotFound(_) | StoreError::RemoteFileNotFound(_) => StatusCode::NOT_FOUND,
            StoreError::InvalidHash(_) | StoreError::InvalidShard { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).body(self.to_string())
    }
}

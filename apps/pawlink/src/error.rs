//! # Application Errors
//!
//! Everything the binary can fail with. Graph errors pass through unchanged
//! so the HTTP layer can map them to status codes.

use pawlink_core::{GraphError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("storage: {0}")]
    Store(#[from] StoreError),

    #[error("configuration: {0}")]
    Config(String),

    #[error("I/O: {0}")]
    Io(String),

    #[error("{0}")]
    Usage(String),
}

pub type AppResult<T> = Result<T, AppError>;

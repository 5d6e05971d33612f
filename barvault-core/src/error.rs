//! Structured error types shared by every barvault component.
//!
//! Variants are designed to be displayable as-is in the CLI. Third-party
//! errors are flattened to strings so the enum stays `Send + Sync` and
//! independent of the polars / rusqlite / AWS SDK error types.

use std::path::PathBuf;
use thiserror::Error;

/// One file that failed during a batch upload sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("no data to save")]
    EmptyBatch,

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("failed to upload {} files ({uploaded} uploaded): {}", .failures.len(), format_failures(.failures))]
    BatchUpload {
        uploaded: usize,
        failures: Vec<UploadFailure>,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("no price data found in API response for {ticker}")]
    NoPriceData { ticker: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// True for errors a caller may reasonably retry later. The upload
    /// orchestrator stops retrying on anything else.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DataError::Upload(_)
                | DataError::NetworkUnreachable(_)
                | DataError::RateLimited { .. }
                | DataError::Io(_)
        )
    }
}

impl From<rusqlite::Error> for DataError {
    fn from(e: rusqlite::Error) -> Self {
        DataError::Catalog(e.to_string())
    }
}

impl From<polars::prelude::PolarsError> for DataError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        DataError::Parquet(e.to_string())
    }
}

fn format_failures(failures: &[UploadFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.file, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

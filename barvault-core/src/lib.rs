//! barvault core: minute crypto bars into monthly parquet files, tracked in
//! SQLite and pushed to object storage.
//!
//! This crate holds everything except the command line:
//! - Price records and monthly keys
//! - Month partitioning and the parquet merge store
//! - Upload orchestration with recorded, bounded retries
//! - The SQLite catalog (progress, monitored assets, collection runs)
//! - The Tiingo provider and the collection pipeline
//! - Configuration

pub mod catalog;
pub mod clock;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod storage;
pub mod upload;

pub use error::DataError;

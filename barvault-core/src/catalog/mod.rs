//! Persistence seams: progress per monthly file, the monitored-asset
//! registry and the collection-run log.
//!
//! The traits let the upload orchestrator and the ingest pipeline run against
//! any store; [`SqliteCatalog`] is the production implementation.

pub mod registry;
pub mod schema;
pub mod sqlite;

pub use registry::{sync_registry, SyncReport};
pub use sqlite::SqliteCatalog;

use crate::domain::MonthKey;
use crate::error::DataError;
use crate::storage::MonthlyFile;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Upload attempts after which a file drops out of automatic sweeps.
pub const MAX_SWEEP_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    NotAttempted,
    Uploaded,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::NotAttempted => "not_attempted",
            UploadStatus::Uploaded => "uploaded",
            UploadStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DataError> {
        match s {
            "not_attempted" => Ok(UploadStatus::NotAttempted),
            "uploaded" => Ok(UploadStatus::Uploaded),
            "failed" => Ok(UploadStatus::Failed),
            other => Err(DataError::Catalog(format!("unknown upload status '{other}'"))),
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data-volume side of a progress entry, written after each monthly merge.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub last_collected: Option<DateTime<Utc>>,
    pub is_month_complete: bool,
    pub records_count: u64,
    pub file_size_bytes: u64,
    pub content_hash: String,
    pub local_path: PathBuf,
    pub remote_key: String,
}

impl ProgressUpdate {
    pub fn from_file(file: &MonthlyFile, is_month_complete: bool) -> Self {
        Self {
            last_collected: file.last_timestamp,
            is_month_complete,
            records_count: file.row_count as u64,
            file_size_bytes: file.file_size,
            content_hash: file.content_hash.clone(),
            local_path: file.path.clone(),
            remote_key: file.key.remote_key(),
        }
    }
}

/// Upload side of a progress entry: one attempt, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadAttempt {
    pub success: bool,
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
    pub remote_key: String,
}

/// A full progress row.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEntry {
    pub key: MonthKey,
    pub last_collected: Option<DateTime<Utc>>,
    pub is_month_complete: bool,
    pub records_count: u64,
    pub file_size_bytes: u64,
    pub content_hash: Option<String>,
    pub local_path: Option<PathBuf>,
    pub remote_key: Option<String>,
    pub upload_status: UploadStatus,
    pub upload_attempts: u32,
    pub last_upload_attempt: Option<DateTime<Utc>>,
    pub last_upload_error: Option<String>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

pub trait ProgressStore {
    fn upsert_progress(&self, key: &MonthKey, update: &ProgressUpdate) -> Result<(), DataError>;

    /// Record one upload attempt: bumps the attempt counter, stamps the
    /// attempt time, and sets or clears the last error.
    fn upsert_upload_status(&self, key: &MonthKey, attempt: &UploadAttempt)
        -> Result<(), DataError>;

    /// Entries not yet uploaded, with fewer than [`MAX_SWEEP_ATTEMPTS`]
    /// attempts, a recorded local path, and an active owning asset.
    fn files_needing_upload(&self) -> Result<Vec<ProgressEntry>, DataError>;

    fn get_progress(&self, key: &MonthKey) -> Result<Option<ProgressEntry>, DataError>;

    fn list_progress(&self) -> Result<Vec<ProgressEntry>, DataError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Active,
    Inactive,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Active => "active",
            AssetStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DataError> {
        match s {
            "active" => Ok(AssetStatus::Active),
            "inactive" => Ok(AssetStatus::Inactive),
            other => Err(DataError::Catalog(format!("unknown asset status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredAsset {
    pub id: i64,
    pub ticker: String,
    pub exchange: String,
    pub status: AssetStatus,
    pub fetch_frequency_hours: u32,
    pub created_at: Option<DateTime<Utc>>,
}

impl MonitoredAsset {
    pub fn is_active(&self) -> bool {
        self.status == AssetStatus::Active
    }
}

/// Monitored (ticker, exchange) pairs. Removal is a status change, never a
/// row delete, so history stays attached.
pub trait AssetRegistry {
    /// Returns `true` when a new row was created.
    fn add(&self, ticker: &str, exchange: &str) -> Result<bool, DataError>;

    /// Returns `true` when the asset exists.
    fn deactivate(&self, ticker: &str, exchange: &str) -> Result<bool, DataError>;

    /// Returns `true` when the asset exists.
    fn reactivate(&self, ticker: &str, exchange: &str) -> Result<bool, DataError>;

    fn list(&self, active_only: bool) -> Result<Vec<MonitoredAsset>, DataError>;

    fn get(&self, ticker: &str, exchange: &str) -> Result<Option<MonitoredAsset>, DataError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DataError> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(DataError::Catalog(format!("unknown run status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRun {
    pub id: i64,
    pub ticker: String,
    pub exchange: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: RunStatus,
    pub records_fetched: u64,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub trait RunLog {
    fn start_run(
        &self,
        ticker: &str,
        exchange: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        started_at: DateTime<Utc>,
    ) -> Result<i64, DataError>;

    fn finish_run(
        &self,
        id: i64,
        status: RunStatus,
        records_fetched: u64,
        error: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<(), DataError>;

    fn recent_runs(&self, limit: usize) -> Result<Vec<CollectionRun>, DataError>;
}

//! SQLite-backed catalog: progress, monitored assets and collection runs in
//! one database file.

use super::schema::SCHEMA_SQL;
use super::{
    AssetRegistry, AssetStatus, CollectionRun, MonitoredAsset, ProgressEntry, ProgressStore,
    ProgressUpdate, RunLog, RunStatus, UploadAttempt, UploadStatus, MAX_SWEEP_ATTEMPTS,
};
use crate::domain::MonthKey;
use crate::error::DataError;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{named_params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

const PROGRESS_COLUMNS: &str = "ticker, exchange, year, month, last_date_collected, \
     is_month_complete, records_count, file_size_bytes, content_hash, local_file_path, r2_key, \
     upload_status, upload_attempts, last_upload_attempt, last_upload_error, uploaded_at";

pub struct SqliteCatalog {
    connection: Connection,
}

impl SqliteCatalog {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let connection = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened catalog");
        Self::init(connection)
    }

    pub fn open_in_memory() -> Result<Self, DataError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(connection: Connection) -> Result<Self, DataError> {
        connection.execute_batch(SCHEMA_SQL)?;
        Ok(Self { connection })
    }
}

fn conversion_error(index: usize, err: DataError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<ProgressEntry> {
    let status: String = row.get(11)?;
    let upload_status = UploadStatus::parse(&status).map_err(|e| conversion_error(11, e))?;
    let records: i64 = row.get(6)?;
    let size: i64 = row.get(7)?;
    let attempts: i64 = row.get(12)?;
    Ok(ProgressEntry {
        key: MonthKey::new(
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get(2)?,
            row.get(3)?,
        ),
        last_collected: row.get(4)?,
        is_month_complete: row.get(5)?,
        records_count: records.max(0) as u64,
        file_size_bytes: size.max(0) as u64,
        content_hash: row.get(8)?,
        local_path: row.get::<_, Option<String>>(9)?.map(PathBuf::from),
        remote_key: row.get(10)?,
        upload_status,
        upload_attempts: attempts.max(0) as u32,
        last_upload_attempt: row.get(13)?,
        last_upload_error: row.get(14)?,
        uploaded_at: row.get(15)?,
    })
}

fn asset_from_row(row: &Row<'_>) -> rusqlite::Result<MonitoredAsset> {
    let status: String = row.get(3)?;
    let status = AssetStatus::parse(&status).map_err(|e| conversion_error(3, e))?;
    Ok(MonitoredAsset {
        id: row.get(0)?,
        ticker: row.get(1)?,
        exchange: row.get(2)?,
        status,
        fetch_frequency_hours: row.get(4)?,
        created_at: row.get::<_, Option<String>>(5)?.and_then(|s| parse_sqlite_time(&s)),
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<CollectionRun> {
    let status: String = row.get(5)?;
    let status = RunStatus::parse(&status).map_err(|e| conversion_error(5, e))?;
    let fetched: i64 = row.get(6)?;
    Ok(CollectionRun {
        id: row.get(0)?,
        ticker: row.get(1)?,
        exchange: row.get(2)?,
        start_date: row.get(3)?,
        end_date: row.get(4)?,
        status,
        records_fetched: fetched.max(0) as u64,
        error_message: row.get(7)?,
        started_at: row.get(8)?,
        completed_at: row.get(9)?,
    })
}

/// `CURRENT_TIMESTAMP` defaults are written by SQLite as `YYYY-MM-DD HH:MM:SS`.
fn parse_sqlite_time(text: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

impl ProgressStore for SqliteCatalog {
    fn upsert_progress(&self, key: &MonthKey, update: &ProgressUpdate) -> Result<(), DataError> {
        let local_path = update.local_path.to_string_lossy().into_owned();
        self.connection.execute(
            "INSERT INTO data_collection_progress
                (ticker, exchange, year, month, last_date_collected, is_month_complete,
                 records_count, file_size_bytes, content_hash, local_file_path, r2_key)
             VALUES (:ticker, :exchange, :year, :month, :last, :complete,
                 :records, :size, :hash, :path, :r2_key)
             ON CONFLICT(ticker, exchange, year, month) DO UPDATE SET
                last_date_collected = excluded.last_date_collected,
                is_month_complete = excluded.is_month_complete,
                records_count = excluded.records_count,
                file_size_bytes = excluded.file_size_bytes,
                content_hash = excluded.content_hash,
                local_file_path = excluded.local_file_path,
                r2_key = excluded.r2_key,
                updated_at = CURRENT_TIMESTAMP",
            named_params! {
                ":ticker": key.ticker,
                ":exchange": key.exchange,
                ":year": key.year,
                ":month": key.month,
                ":last": update.last_collected,
                ":complete": update.is_month_complete,
                ":records": update.records_count as i64,
                ":size": update.file_size_bytes as i64,
                ":hash": update.content_hash,
                ":path": local_path,
                ":r2_key": update.remote_key,
            },
        )?;
        Ok(())
    }

    fn upsert_upload_status(
        &self,
        key: &MonthKey,
        attempt: &UploadAttempt,
    ) -> Result<(), DataError> {
        let status = if attempt.success {
            UploadStatus::Uploaded
        } else {
            UploadStatus::Failed
        };
        let uploaded_at = attempt.success.then_some(attempt.attempted_at);
        let error = if attempt.success {
            None
        } else {
            attempt.error.as_deref()
        };
        self.connection.execute(
            "INSERT INTO data_collection_progress
                (ticker, exchange, year, month, r2_key, upload_status, upload_attempts,
                 last_upload_attempt, last_upload_error, uploaded_at)
             VALUES (:ticker, :exchange, :year, :month, :r2_key, :status, 1,
                 :attempted_at, :error, :uploaded_at)
             ON CONFLICT(ticker, exchange, year, month) DO UPDATE SET
                r2_key = excluded.r2_key,
                upload_status = excluded.upload_status,
                upload_attempts = upload_attempts + 1,
                last_upload_attempt = excluded.last_upload_attempt,
                last_upload_error = excluded.last_upload_error,
                uploaded_at = COALESCE(excluded.uploaded_at, uploaded_at),
                updated_at = CURRENT_TIMESTAMP",
            named_params! {
                ":ticker": key.ticker,
                ":exchange": key.exchange,
                ":year": key.year,
                ":month": key.month,
                ":r2_key": attempt.remote_key,
                ":status": status.as_str(),
                ":attempted_at": attempt.attempted_at,
                ":error": error,
                ":uploaded_at": uploaded_at,
            },
        )?;
        Ok(())
    }

    fn files_needing_upload(&self) -> Result<Vec<ProgressEntry>, DataError> {
        let sql = format!(
            "SELECT {cols} FROM data_collection_progress p
             JOIN monitored_assets a ON a.ticker = p.ticker AND a.exchange = p.exchange
             WHERE a.status = 'active'
               AND p.upload_status != 'uploaded'
               AND p.upload_attempts < :max_attempts
               AND p.local_file_path IS NOT NULL
             ORDER BY p.ticker, p.exchange, p.year, p.month",
            cols = qualified_progress_columns("p")
        );
        let mut stmt = self.connection.prepare(&sql)?;
        let rows = stmt.query_map(
            named_params! { ":max_attempts": MAX_SWEEP_ATTEMPTS },
            progress_from_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn get_progress(&self, key: &MonthKey) -> Result<Option<ProgressEntry>, DataError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM data_collection_progress
             WHERE ticker = :ticker AND exchange = :exchange AND year = :year AND month = :month"
        );
        let entry = self
            .connection
            .query_row(
                &sql,
                named_params! {
                    ":ticker": key.ticker,
                    ":exchange": key.exchange,
                    ":year": key.year,
                    ":month": key.month,
                },
                progress_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    fn list_progress(&self) -> Result<Vec<ProgressEntry>, DataError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM data_collection_progress
             ORDER BY ticker, exchange, year, month"
        );
        let mut stmt = self.connection.prepare(&sql)?;
        let rows = stmt.query_map([], progress_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn qualified_progress_columns(alias: &str) -> String {
    PROGRESS_COLUMNS
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

impl AssetRegistry for SqliteCatalog {
    fn add(&self, ticker: &str, exchange: &str) -> Result<bool, DataError> {
        let changed = self.connection.execute(
            "INSERT OR IGNORE INTO monitored_assets (ticker, exchange) VALUES (:ticker, :exchange)",
            named_params! { ":ticker": ticker, ":exchange": exchange },
        )?;
        if changed > 0 {
            tracing::info!(ticker, exchange, "asset added to registry");
        }
        Ok(changed > 0)
    }

    fn deactivate(&self, ticker: &str, exchange: &str) -> Result<bool, DataError> {
        set_asset_status(&self.connection, ticker, exchange, AssetStatus::Inactive)
    }

    fn reactivate(&self, ticker: &str, exchange: &str) -> Result<bool, DataError> {
        set_asset_status(&self.connection, ticker, exchange, AssetStatus::Active)
    }

    fn list(&self, active_only: bool) -> Result<Vec<MonitoredAsset>, DataError> {
        let sql = if active_only {
            "SELECT id, ticker, exchange, status, fetch_frequency_hours, created_at
             FROM monitored_assets WHERE status = 'active' ORDER BY ticker, exchange"
        } else {
            "SELECT id, ticker, exchange, status, fetch_frequency_hours, created_at
             FROM monitored_assets ORDER BY ticker, exchange"
        };
        let mut stmt = self.connection.prepare(sql)?;
        let rows = stmt.query_map([], asset_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn get(&self, ticker: &str, exchange: &str) -> Result<Option<MonitoredAsset>, DataError> {
        let asset = self
            .connection
            .query_row(
                "SELECT id, ticker, exchange, status, fetch_frequency_hours, created_at
                 FROM monitored_assets WHERE ticker = :ticker AND exchange = :exchange",
                named_params! { ":ticker": ticker, ":exchange": exchange },
                asset_from_row,
            )
            .optional()?;
        Ok(asset)
    }
}

fn set_asset_status(
    connection: &Connection,
    ticker: &str,
    exchange: &str,
    status: AssetStatus,
) -> Result<bool, DataError> {
    let changed = connection.execute(
        "UPDATE monitored_assets SET status = :status
         WHERE ticker = :ticker AND exchange = :exchange",
        named_params! { ":status": status.as_str(), ":ticker": ticker, ":exchange": exchange },
    )?;
    if changed > 0 {
        tracing::info!(ticker, exchange, status = status.as_str(), "asset status changed");
    }
    Ok(changed > 0)
}

impl RunLog for SqliteCatalog {
    fn start_run(
        &self,
        ticker: &str,
        exchange: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        started_at: DateTime<Utc>,
    ) -> Result<i64, DataError> {
        self.connection.execute(
            "INSERT INTO collection_runs (ticker, exchange, start_date, end_date, status, started_at)
             VALUES (:ticker, :exchange, :start, :end, :status, :started_at)",
            named_params! {
                ":ticker": ticker,
                ":exchange": exchange,
                ":start": start,
                ":end": end,
                ":status": RunStatus::Running.as_str(),
                ":started_at": started_at,
            },
        )?;
        Ok(self.connection.last_insert_rowid())
    }

    fn finish_run(
        &self,
        id: i64,
        status: RunStatus,
        records_fetched: u64,
        error: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<(), DataError> {
        let changed = self.connection.execute(
            "UPDATE collection_runs
             SET status = :status, records_fetched = :fetched, error_message = :error,
                 completed_at = :completed_at
             WHERE id = :id",
            named_params! {
                ":status": status.as_str(),
                ":fetched": records_fetched as i64,
                ":error": error,
                ":completed_at": completed_at,
                ":id": id,
            },
        )?;
        if changed == 0 {
            return Err(DataError::Catalog(format!("collection run {id} does not exist")));
        }
        Ok(())
    }

    fn recent_runs(&self, limit: usize) -> Result<Vec<CollectionRun>, DataError> {
        let mut stmt = self.connection.prepare(
            "SELECT id, ticker, exchange, start_date, end_date, status, records_fetched,
                    error_message, started_at, completed_at
             FROM collection_runs ORDER BY id DESC LIMIT :limit",
        )?;
        let rows = stmt.query_map(named_params! { ":limit": limit as i64 }, run_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

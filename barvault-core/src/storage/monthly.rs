//! Monthly parquet store.
//!
//! Layout: `{root}/{ticker}/{exchange}/{year}/{MM}/{ticker}_{exchange}_{year}{MM}.parquet`
//!
//! - One file per `(ticker, exchange, year, month)`, created on first write
//! - Later writes read the file, union the new rows, dedupe on `timestamp`
//!   (newest write wins) and sort ascending
//! - Atomic writes (write to .tmp, rename into place)
//!
//! A key has at most one writer at a time. Concurrent ingestion into the
//! same month needs a lock per key around [`MonthlyStore::write_month`].

use super::frame::{
    canonicalize, merge_frames, read_parquet, records_to_frame, timestamp_nanos,
    write_parquet_atomic,
};
use crate::domain::{MonthKey, PriceRecord};
use crate::error::DataError;
use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What a successful monthly write left on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyFile {
    pub key: MonthKey,
    pub path: PathBuf,
    /// Rows in the file after the merge.
    pub row_count: usize,
    pub file_size: u64,
    pub last_timestamp: Option<DateTime<Utc>>,
    /// blake3 of the file bytes.
    pub content_hash: String,
}

pub struct MonthlyStore {
    root: PathBuf,
}

impl MonthlyStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &MonthKey) -> PathBuf {
        key.local_path(&self.root)
    }

    /// Create or merge the monthly file for `key` with `records`.
    ///
    /// Records are normalized before anything touches the disk, so a schema
    /// error leaves no directory or file behind.
    pub fn write_month(
        &self,
        records: &[PriceRecord],
        ticker: &str,
        exchange: &str,
        year: i32,
        month: u32,
    ) -> Result<MonthlyFile, DataError> {
        if records.is_empty() {
            return Err(DataError::EmptyBatch);
        }
        let key = MonthKey::new(ticker, exchange, year, month);
        let incoming = records_to_frame(records, ticker, exchange)?;
        let path = self.path_for(&key);

        let mut merged = if path.is_file() {
            let existing = read_parquet(&path)?;
            debug!(path = %path.display(), existing = existing.height(), "merging into monthly file");
            merge_frames(existing, incoming)?
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            canonicalize(incoming.lazy()).collect()?
        };

        write_parquet_atomic(&mut merged, &path)?;
        let file = self.describe(key, &path, &merged)?;

        info!(
            key = %file.key,
            rows = file.row_count,
            added = records.len(),
            bytes = file.file_size,
            "monthly file written"
        );
        Ok(file)
    }

    /// Load the monthly file for a key.
    pub fn read_month(&self, key: &MonthKey) -> Result<DataFrame, DataError> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Err(DataError::NotFound(path));
        }
        read_parquet(&path)
    }

    /// Every `*.parquet` file under the root, sorted.
    pub fn list_local_files(&self) -> Result<Vec<PathBuf>, DataError> {
        let mut files = Vec::new();
        if self.root.is_dir() {
            collect_parquet(&self.root, &mut files)?;
        }
        files.sort();
        Ok(files)
    }

    fn describe(
        &self,
        key: MonthKey,
        path: &Path,
        df: &DataFrame,
    ) -> Result<MonthlyFile, DataError> {
        let bytes = fs::read(path)?;
        let last_timestamp = timestamp_nanos(df)?
            .into_iter()
            .flatten()
            .max()
            .map(DateTime::<Utc>::from_timestamp_nanos);

        Ok(MonthlyFile {
            key,
            path: path.to_path_buf(),
            row_count: df.height(),
            file_size: bytes.len() as u64,
            last_timestamp,
            content_hash: blake3::hash(&bytes).to_hex().to_string(),
        })
    }
}

fn collect_parquet(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), DataError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_parquet(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("parquet") {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, MonthlyStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MonthlyStore::new(dir.path());
        (dir, store)
    }

    fn rec(v: serde_json::Value) -> PriceRecord {
        PriceRecord::from_value(v).unwrap()
    }

    fn closes(df: &DataFrame) -> Vec<Option<f64>> {
        df.column("close").unwrap().f64().unwrap().into_iter().collect()
    }

    #[test]
    fn new_file_is_created() {
        let (_dir, store) = store();
        let data = vec![
            rec(json!({"date": "2024-01-01T00:00:00.000Z", "open": 45000.5, "close": 45050.0})),
            rec(json!({"date": "2024-01-01T00:01:00.000Z", "open": 45050.0, "close": 45060.0})),
        ];

        let file = store.write_month(&data, "BTCUSD", "tiingo", 2024, 1).unwrap();

        assert!(file.path.exists());
        assert_eq!(
            file.path.file_name().unwrap().to_str(),
            Some("BTCUSD_tiingo_202401.parquet")
        );
        assert_eq!(file.row_count, 2);
        assert!(file.file_size > 0);
        assert_eq!(file.content_hash.len(), 64);

        let df = read_parquet(&file.path).unwrap();
        assert!(df.column("timestamp").is_ok());
        assert!(df.column("date").is_err());
        assert_eq!(df.column("exchange").unwrap().str().unwrap().get(0), Some("tiingo"));
    }

    #[test]
    fn empty_batch_rejected() {
        let (_dir, store) = store();
        let err = store.write_month(&[], "BTCUSD", "tiingo", 2024, 1).unwrap_err();
        assert!(matches!(err, DataError::EmptyBatch));
    }

    #[test]
    fn missing_timestamp_writes_nothing() {
        let (dir, store) = store();
        let err = store
            .write_month(&[rec(json!({"open": 1}))], "BTCUSD", "tiingo", 2024, 1)
            .unwrap_err();

        assert!(matches!(err, DataError::Schema(_)));
        assert!(!dir.path().join("BTCUSD").exists());
    }

    #[test]
    fn append_keeps_order() {
        let (_dir, store) = store();
        store
            .write_month(
                &[rec(json!({"date": "2024-01-01T00:00:00.000Z", "close": 45050.0}))],
                "BTCUSD",
                "tiingo",
                2024,
                1,
            )
            .unwrap();
        let file = store
            .write_month(
                &[rec(json!({"date": "2024-01-01T00:02:00.000Z", "close": 45070.0}))],
                "BTCUSD",
                "tiingo",
                2024,
                1,
            )
            .unwrap();

        let df = read_parquet(&file.path).unwrap();
        assert_eq!(closes(&df), vec![Some(45050.0), Some(45070.0)]);
        assert_eq!(
            file.last_timestamp.unwrap().to_rfc3339(),
            "2024-01-01T00:02:00+00:00"
        );
    }

    #[test]
    fn duplicate_timestamp_replaced_by_new_data() {
        let (_dir, store) = store();
        let key = MonthKey::new("BTCUSD", "tiingo", 2024, 1);
        store
            .write_month(
                &[rec(json!({"date": "2024-01-01T00:00:00.000Z", "close": 45050.0}))],
                "BTCUSD",
                "tiingo",
                2024,
                1,
            )
            .unwrap();
        store
            .write_month(
                &[rec(json!({"date": "2024-01-01T00:00:00.000Z", "close": 45055.0}))],
                "BTCUSD",
                "tiingo",
                2024,
                1,
            )
            .unwrap();

        let df = store.read_month(&key).unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(closes(&df), vec![Some(45055.0)]);
    }

    #[test]
    fn no_temp_file_left_behind() {
        let (_dir, store) = store();
        let file = store
            .write_month(&[rec(json!({"date": "2024-01-01", "v": 1}))], "X", "Y", 2024, 1)
            .unwrap();
        assert!(!file.path.with_extension("parquet.tmp").exists());
    }

    #[test]
    fn read_missing_month_is_not_found() {
        let (_dir, store) = store();
        let err = store
            .read_month(&MonthKey::new("NONEXISTENT", "tiingo", 2024, 1))
            .unwrap_err();
        assert!(matches!(err, DataError::NotFound(_)));
    }

    #[test]
    fn lists_written_files() {
        let (_dir, store) = store();
        store
            .write_month(&[rec(json!({"date": "2024-01-01"}))], "BTCUSD", "tiingo", 2024, 1)
            .unwrap();
        store
            .write_month(&[rec(json!({"date": "2024-02-01"}))], "BTCUSD", "tiingo", 2024, 2)
            .unwrap();

        let files = store.list_local_files().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("BTCUSD_tiingo_202401.parquet"));
    }
}

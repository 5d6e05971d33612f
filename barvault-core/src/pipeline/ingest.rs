//! Save a fetched batch: partition by month, merge each month to disk,
//! record progress, optionally upload.

use crate::catalog::{ProgressStore, ProgressUpdate};
use crate::clock::Clock;
use crate::domain::{MonthKey, PriceRecord};
use crate::error::DataError;
use crate::storage::{group_by_month, MonthlyFile, MonthlyStore};
use crate::upload::{UploadOrchestrator, UploadOutcome};
use chrono::Datelike;
use tracing::info;

/// What one `save_multi_month` call did.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveSummary {
    pub ticker: String,
    pub exchange: String,
    /// Records handed in.
    pub total_records: usize,
    /// One entry per month touched, ascending.
    pub files: Vec<MonthlyFile>,
    /// Empty when uploads are disabled.
    pub uploads: Vec<(MonthKey, UploadOutcome)>,
}

impl SaveSummary {
    pub fn months_written(&self) -> usize {
        self.files.len()
    }

    pub fn failed_uploads(&self) -> Vec<&MonthKey> {
        self.uploads
            .iter()
            .filter(|(_, outcome)| !outcome.is_uploaded())
            .map(|(key, _)| key)
            .collect()
    }
}

pub struct MonthlyIngest<'a> {
    files: &'a MonthlyStore,
    progress: &'a dyn ProgressStore,
    clock: &'a dyn Clock,
    uploader: Option<&'a UploadOrchestrator<'a>>,
    max_attempts: u32,
}

impl<'a> MonthlyIngest<'a> {
    pub fn new(
        files: &'a MonthlyStore,
        progress: &'a dyn ProgressStore,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            files,
            progress,
            clock,
            uploader: None,
            max_attempts: 3,
        }
    }

    /// Upload each written month with retry, up to `max_attempts` times.
    pub fn with_uploads(mut self, uploader: &'a UploadOrchestrator<'a>, max_attempts: u32) -> Self {
        self.uploader = Some(uploader);
        self.max_attempts = max_attempts;
        self
    }

    /// Partition `records` by month and merge each month into its file.
    ///
    /// The whole batch is validated by the partitioner first, so a missing
    /// timestamp anywhere means no month is written.
    pub fn save_multi_month(
        &self,
        records: &[PriceRecord],
        ticker: &str,
        exchange: &str,
    ) -> Result<SaveSummary, DataError> {
        if records.is_empty() {
            return Err(DataError::EmptyBatch);
        }
        let months = group_by_month(records)?;
        let now = self.clock.now();

        let mut files = Vec::with_capacity(months.len());
        let mut uploads = Vec::new();
        for ((year, month), batch) in months {
            let file = self.files.write_month(&batch, ticker, exchange, year, month)?;
            let complete = file.key.months_until(now.year(), now.month()) > 0;
            self.progress
                .upsert_progress(&file.key, &ProgressUpdate::from_file(&file, complete))?;

            if let Some(uploader) = self.uploader {
                let outcome = uploader.upload_with_retry(&file.key, self.max_attempts)?;
                uploads.push((file.key.clone(), outcome));
            }
            files.push(file);
        }

        info!(
            ticker,
            exchange,
            records = records.len(),
            months = files.len(),
            "batch saved"
        );
        Ok(SaveSummary {
            ticker: ticker.to_string(),
            exchange: exchange.to_string(),
            total_records: records.len(),
            files,
            uploads,
        })
    }
}

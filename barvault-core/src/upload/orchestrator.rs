//! Drives monthly files into the object store and keeps the upload side of
//! each progress entry current.
//!
//! Every attempt is persisted before the next one starts or the call returns,
//! so the catalog reflects what happened even if the process dies mid-retry.

use super::object_store::ObjectStore;
use super::retry::{BackoffSchedule, RetryMachine, RetryState};
use crate::catalog::{ProgressStore, UploadAttempt};
use crate::clock::{Clock, Sleeper};
use crate::domain::MonthKey;
use crate::error::{DataError, UploadFailure};
use crate::storage::MonthlyStore;
use chrono::Datelike;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { remote_key: String, attempts: u32 },
    Failed { attempts: u32, last_error: String },
}

impl UploadOutcome {
    pub fn is_uploaded(&self) -> bool {
        matches!(self, UploadOutcome::Uploaded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            UploadOutcome::Uploaded { attempts, .. } | UploadOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

pub struct UploadOrchestrator<'a> {
    files: &'a MonthlyStore,
    objects: &'a dyn ObjectStore,
    progress: &'a dyn ProgressStore,
    clock: &'a dyn Clock,
    sleeper: &'a dyn Sleeper,
    schedule: BackoffSchedule,
}

impl<'a> UploadOrchestrator<'a> {
    pub fn new(
        files: &'a MonthlyStore,
        objects: &'a dyn ObjectStore,
        progress: &'a dyn ProgressStore,
        clock: &'a dyn Clock,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            files,
            objects,
            progress,
            clock,
            sleeper,
            schedule: BackoffSchedule::default(),
        }
    }

    pub fn with_schedule(mut self, schedule: BackoffSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Upload the monthly file for `key`, retrying on the backoff schedule
    /// up to `max_attempts` times.
    ///
    /// A missing local file is recorded against the entry and returned as
    /// [`DataError::NotFound`] without retrying. A non-transient failure
    /// (rejected credentials, missing bucket) ends the retries early.
    /// Exhausting the attempts is not an error: it yields
    /// [`UploadOutcome::Failed`].
    pub fn upload_with_retry(
        &self,
        key: &MonthKey,
        max_attempts: u32,
    ) -> Result<UploadOutcome, DataError> {
        let path = self.resolve_path(key)?;
        self.require_file(key, &path)?;

        let mut machine = RetryMachine::new(self.schedule.clone(), max_attempts);
        while let Some(delay) = machine.begin_attempt() {
            if !delay.is_zero() {
                self.sleeper.sleep(delay);
            }
            match self.attempt(key, &path)? {
                Ok(()) => machine.succeed(),
                Err(error) if error.is_transient() => {
                    warn!(key = %key, attempt = machine.attempts(), error = %error, "upload attempt failed");
                    machine.fail(error.to_string());
                }
                Err(error) => {
                    warn!(key = %key, attempt = machine.attempts(), error = %error, "upload rejected, not retrying");
                    machine.give_up(error.to_string());
                }
            }
        }

        let outcome = match machine.state() {
            RetryState::Succeeded { attempts } => UploadOutcome::Uploaded {
                remote_key: key.remote_key(),
                attempts: *attempts,
            },
            RetryState::Exhausted {
                attempts,
                last_error,
            } => UploadOutcome::Failed {
                attempts: *attempts,
                last_error: last_error.clone(),
            },
            RetryState::Idle | RetryState::Attempting { .. } => {
                return Err(DataError::Other(format!(
                    "retry loop for {key} stopped before finishing"
                )))
            }
        };

        match &outcome {
            UploadOutcome::Uploaded {
                remote_key,
                attempts,
            } => info!(key = %key, remote_key = %remote_key, attempts, "uploaded"),
            UploadOutcome::Failed {
                attempts,
                last_error,
            } => warn!(key = %key, attempts, error = %last_error, "upload gave up"),
        }
        Ok(outcome)
    }

    /// One recorded attempt with no retry. Returns the remote key on success.
    pub fn upload_once(&self, key: &MonthKey) -> Result<String, DataError> {
        let path = self.resolve_path(key)?;
        self.require_file(key, &path)?;
        match self.attempt(key, &path)? {
            Ok(()) => {
                info!(key = %key, "uploaded");
                Ok(key.remote_key())
            }
            Err(error) => {
                warn!(key = %key, error = %error, "upload attempt failed");
                Err(error)
            }
        }
    }

    /// Sweep every entry that still needs uploading and is at least
    /// `months_old` calendar months behind the clock. One attempt each.
    ///
    /// Returns the number uploaded. If anything failed, every candidate has
    /// still been attempted and the error lists each failed file, including
    /// files whose attempt could not be recorded in the catalog.
    pub fn batch_upload(&self, months_old: u32) -> Result<usize, DataError> {
        let now = self.clock.now();
        let candidates: Vec<MonthKey> = self
            .progress
            .files_needing_upload()?
            .into_iter()
            .map(|entry| entry.key)
            .filter(|key| key.months_until(now.year(), now.month()) >= i64::from(months_old))
            .collect();
        info!(candidates = candidates.len(), months_old, "batch upload starting");

        let mut uploaded = 0;
        let mut failures = Vec::new();
        for key in &candidates {
            match self.upload_once(key) {
                Ok(_) => uploaded += 1,
                Err(err) => failures.push(UploadFailure {
                    file: key.file_name(),
                    error: err.to_string(),
                }),
            }
        }

        info!(uploaded, failed = failures.len(), "batch upload finished");
        if failures.is_empty() {
            Ok(uploaded)
        } else {
            Err(DataError::BatchUpload { uploaded, failures })
        }
    }

    fn resolve_path(&self, key: &MonthKey) -> Result<PathBuf, DataError> {
        let recorded = self
            .progress
            .get_progress(key)?
            .and_then(|entry| entry.local_path);
        Ok(recorded.unwrap_or_else(|| self.files.path_for(key)))
    }

    fn require_file(&self, key: &MonthKey, path: &Path) -> Result<(), DataError> {
        if path.is_file() {
            return Ok(());
        }
        let err = DataError::NotFound(path.to_path_buf());
        self.record(key, Err(err.to_string()))?;
        warn!(key = %key, path = %path.display(), "local file missing, upload skipped");
        Err(err)
    }

    /// Read the current bytes, put them, persist the attempt.
    ///
    /// The outer `Result` carries catalog failures, the inner one the
    /// attempt's own result.
    fn attempt(
        &self,
        key: &MonthKey,
        path: &Path,
    ) -> Result<Result<(), DataError>, DataError> {
        let result = fs::read(path)
            .map_err(DataError::from)
            .and_then(|bytes| self.objects.put_object(&key.remote_key(), bytes));
        let recorded = result.as_ref().map(|_| ()).map_err(|e| e.to_string());
        self.record(key, recorded)?;
        Ok(result)
    }

    fn record(&self, key: &MonthKey, result: Result<(), String>) -> Result<(), DataError> {
        let attempt = UploadAttempt {
            success: result.is_ok(),
            error: result.err(),
            attempted_at: self.clock.now(),
            remote_key: key.remote_key(),
        };
        self.progress.upsert_upload_status(key, &attempt)
    }
}

//! Fetch-and-save with a collection-run record for every invocation.

use super::ingest::{MonthlyIngest, SaveSummary};
use crate::catalog::{RunLog, RunStatus};
use crate::clock::Clock;
use crate::data::{FetchRequest, PriceProvider};
use crate::error::DataError;
use chrono::NaiveDate;
use tracing::{info, warn};

/// One completed fetch-and-save.
#[derive(Debug, Clone)]
pub struct CollectionReport {
    pub run_id: i64,
    pub records_fetched: usize,
    pub summary: SaveSummary,
}

/// A ticker to collect over a date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectJob {
    pub ticker: String,
    pub exchange: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Summary of a multi-ticker collection.
#[derive(Debug)]
pub struct CollectSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<(String, DataError)>,
}

impl CollectSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

pub struct Collector<'a> {
    provider: &'a dyn PriceProvider,
    ingest: &'a MonthlyIngest<'a>,
    runs: &'a dyn RunLog,
    clock: &'a dyn Clock,
}

impl<'a> Collector<'a> {
    pub fn new(
        provider: &'a dyn PriceProvider,
        ingest: &'a MonthlyIngest<'a>,
        runs: &'a dyn RunLog,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            provider,
            ingest,
            runs,
            clock,
        }
    }

    /// Fetch `request` and save it under `exchange`.
    ///
    /// A fetch error skips the save entirely. Either way the run is closed
    /// as `completed` or `failed` before returning.
    pub fn fetch_and_save(
        &self,
        request: &FetchRequest,
        exchange: &str,
    ) -> Result<CollectionReport, DataError> {
        let run_id = self.runs.start_run(
            &request.ticker,
            exchange,
            request.start_date(),
            request.specific_date.or(request.end),
            self.clock.now(),
        )?;

        let fetched = match self.provider.fetch(request) {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(ticker = %request.ticker, provider = self.provider.name(), error = %err, "fetch failed, save skipped");
                self.close(run_id, RunStatus::Failed, 0, Some(&err))?;
                return Err(err);
            }
        };

        let records_fetched = fetched.records.len();
        match self
            .ingest
            .save_multi_month(&fetched.records, &request.ticker, exchange)
        {
            Ok(summary) => {
                self.close(run_id, RunStatus::Completed, records_fetched, None)?;
                info!(ticker = %request.ticker, exchange, records_fetched, run_id, "collection run completed");
                Ok(CollectionReport {
                    run_id,
                    records_fetched,
                    summary,
                })
            }
            Err(err) => {
                self.close(run_id, RunStatus::Failed, records_fetched, Some(&err))?;
                Err(err)
            }
        }
    }

    /// Run every job in order. Failures are collected, not fatal.
    pub fn collect_many(&self, jobs: &[CollectJob]) -> CollectSummary {
        let mut succeeded = 0;
        let mut errors = Vec::new();

        for job in jobs {
            let result = FetchRequest::range(&job.ticker, Some(job.start), Some(job.end))
                .and_then(|request| self.fetch_and_save(&request, &job.exchange));
            match result {
                Ok(_) => succeeded += 1,
                Err(e) => errors.push((format!("{}/{}", job.ticker, job.exchange), e)),
            }
        }

        CollectSummary {
            total: jobs.len(),
            succeeded,
            failed: errors.len(),
            errors,
        }
    }

    fn close(
        &self,
        run_id: i64,
        status: RunStatus,
        records: usize,
        err: Option<&DataError>,
    ) -> Result<(), DataError> {
        let message = err.map(|e| e.to_string());
        self.runs.finish_run(
            run_id,
            status,
            records as u64,
            message.as_deref(),
            self.clock.now(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::clock::FixedClock;
    use crate::data::FetchResult;
    use crate::domain::PriceRecord;
    use crate::storage::MonthlyStore;

    struct StubProvider {
        records: Vec<PriceRecord>,
        fail: bool,
    }

    impl PriceProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, DataError> {
            if self.fail {
                return Err(DataError::NetworkUnreachable("offline".into()));
            }
            Ok(FetchResult {
                ticker: request.ticker.clone(),
                base_currency: None,
                quote_currency: None,
                records: self.records.clone(),
            })
        }
    }

    fn bars() -> Vec<PriceRecord> {
        vec![
            PriceRecord::new()
                .with("date", "2024-01-01T00:00:00+00:00")
                .with("close", 42000.0),
            PriceRecord::new()
                .with("date", "2024-01-01T00:01:00+00:00")
                .with("close", 42010.0),
        ]
    }

    #[test]
    fn successful_run_is_completed() {
        let dir = tempfile::tempdir().unwrap();
        let files = MonthlyStore::new(dir.path());
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let clock = FixedClock::at_month(2024, 2).unwrap();
        let ingest = MonthlyIngest::new(&files, &catalog, &clock);
        let provider = StubProvider {
            records: bars(),
            fail: false,
        };
        let collector = Collector::new(&provider, &ingest, &catalog, &clock);

        let request = FetchRequest::new("btcusd", None, None, Some("2024-01-01")).unwrap();
        let report = collector.fetch_and_save(&request, "tiingo").unwrap();
        assert_eq!(report.records_fetched, 2);
        assert_eq!(report.summary.months_written(), 1);

        let runs = catalog.recent_runs(1).unwrap();
        assert_eq!(runs[0].status, RunStatus::Completed);
        assert_eq!(runs[0].records_fetched, 2);
        assert_eq!(runs[0].end_date, NaiveDate::from_ymd_opt(2024, 1, 1));
    }

    #[test]
    fn fetch_failure_skips_save() {
        let dir = tempfile::tempdir().unwrap();
        let files = MonthlyStore::new(dir.path());
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let clock = FixedClock::at_month(2024, 2).unwrap();
        let ingest = MonthlyIngest::new(&files, &catalog, &clock);
        let provider = StubProvider {
            records: bars(),
            fail: true,
        };
        let collector = Collector::new(&provider, &ingest, &catalog, &clock);

        let request = FetchRequest::new("btcusd", Some("2024-01-01"), Some("2024-01-02"), None)
            .unwrap();
        let err = collector.fetch_and_save(&request, "tiingo").unwrap_err();
        assert!(matches!(err, DataError::NetworkUnreachable(_)));
        assert!(files.list_local_files().unwrap().is_empty());

        let runs = catalog.recent_runs(1).unwrap();
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0].error_message.as_deref().unwrap().contains("offline"));
    }

    #[test]
    fn collect_many_counts_failures() {
        let dir = tempfile::tempdir().unwrap();
        let files = MonthlyStore::new(dir.path());
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let clock = FixedClock::at_month(2024, 2).unwrap();
        let ingest = MonthlyIngest::new(&files, &catalog, &clock);
        let provider = StubProvider {
            records: bars(),
            fail: false,
        };
        let collector = Collector::new(&provider, &ingest, &catalog, &clock);
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();

        let summary = collector.collect_many(&[
            CollectJob {
                ticker: "btcusd".into(),
                exchange: "tiingo".into(),
                start: day(1),
                end: day(2),
            },
            CollectJob {
                ticker: "ethusd".into(),
                exchange: "tiingo".into(),
                start: day(5),
                end: day(1),
            },
        ]);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.all_succeeded());
        assert_eq!(summary.errors[0].0, "ethusd/tiingo");
    }
}

//! Collection pipeline: fetch, save by month, record, upload.

pub mod collector;
pub mod ingest;

pub use collector::{CollectJob, CollectSummary, CollectionReport, Collector};
pub use ingest::{MonthlyIngest, SaveSummary};

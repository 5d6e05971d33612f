//! Pushing monthly files to object storage with bounded, recorded retries.

pub mod object_store;
pub mod orchestrator;
pub mod retry;

pub use object_store::{MemoryObjectStore, ObjectStore, R2ObjectStore};
pub use orchestrator::{UploadOrchestrator, UploadOutcome};
pub use retry::{BackoffSchedule, RetryMachine, RetryState};

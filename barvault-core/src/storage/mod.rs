//! Monthly partitioning and the parquet merge store.

pub mod frame;
pub mod monthly;
pub mod partition;

pub use monthly::{MonthlyFile, MonthlyStore};
pub use partition::{group_by_month, YearMonth};

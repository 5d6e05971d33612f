//! Domain types: price records and monthly file keys.

pub mod key;
pub mod record;

pub use key::MonthKey;
pub use record::{parse_timestamp, PriceRecord, RecordTime, DATE_FIELD, TIMESTAMP_FIELD};

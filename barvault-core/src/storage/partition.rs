//! Month partitioner: split an arbitrary batch of records by calendar month.

use crate::domain::PriceRecord;
use crate::error::DataError;
use std::collections::BTreeMap;

/// `(year, month)` bucket key.
pub type YearMonth = (i32, u32);

/// Group records by the calendar month of their timestamp.
///
/// The month is taken from the timestamp as written (offset included), so a
/// bar stamped `2024-02-01T00:30:00+01:00` lands in February. Any record
/// without a usable timestamp aborts the whole call; no partial grouping is
/// returned. Input order is preserved inside each bucket.
pub fn group_by_month(
    records: &[PriceRecord],
) -> Result<BTreeMap<YearMonth, Vec<PriceRecord>>, DataError> {
    let mut grouped: BTreeMap<YearMonth, Vec<PriceRecord>> = BTreeMap::new();
    for record in records {
        let time = record.time()?;
        grouped
            .entry((time.year, time.month))
            .or_default()
            .push(record.clone());
    }
    Ok(grouped)
}

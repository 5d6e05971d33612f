//! Price records as delivered by a provider: an open key/value mapping that
//! must carry a timestamp under the canonical or the alternate field name.

use crate::error::DataError;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name every record's time value is stored under after normalization.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Name the Tiingo API uses for the same value.
pub const DATE_FIELD: &str = "date";

pub const TICKER_FIELD: &str = "ticker";
pub const EXCHANGE_FIELD: &str = "exchange";

/// One minute bar (or any timestamped row) with arbitrary extra fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceRecord {
    fields: Map<String, Value>,
}

/// A parsed record timestamp.
///
/// `year`/`month` are read from the value as stated, including its offset;
/// `instant` is the same moment in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordTime {
    pub instant: DateTime<Utc>,
    pub year: i32,
    pub month: u32,
}

impl RecordTime {
    /// Nanoseconds since the epoch. Instants outside the range an `i64`
    /// of nanoseconds can hold (roughly 1677 to 2262) are a schema error.
    pub fn epoch_nanos(&self) -> Result<i64, DataError> {
        self.instant.timestamp_nanos_opt().ok_or_else(|| {
            DataError::Schema(format!("timestamp out of range: {}", self.instant))
        })
    }
}

impl PriceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Build a record from a JSON value; anything but an object is rejected.
    pub fn from_value(value: Value) -> Result<Self, DataError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(DataError::Schema(format!(
                "price record must be a JSON object, got {other}"
            ))),
        }
    }

    /// Builder-style insert, mostly for tests and fixtures.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Name of the field holding the timestamp: canonical first, then alternate.
    pub fn timestamp_field(&self) -> Option<&'static str> {
        if self.fields.contains_key(TIMESTAMP_FIELD) {
            Some(TIMESTAMP_FIELD)
        } else if self.fields.contains_key(DATE_FIELD) {
            Some(DATE_FIELD)
        } else {
            None
        }
    }

    /// Parse the record's timestamp.
    pub fn time(&self) -> Result<RecordTime, DataError> {
        let field = self.timestamp_field().ok_or_else(|| {
            DataError::Schema(format!(
                "data record must contain either '{DATE_FIELD}' or '{TIMESTAMP_FIELD}' field"
            ))
        })?;
        let raw = &self.fields[field];
        let text = raw.as_str().ok_or_else(|| {
            DataError::Schema(format!("field '{field}' must be a string, got {raw}"))
        })?;
        parse_timestamp(text)
    }

    /// Non-timestamp payload fields, excluding the columns the merger attaches.
    pub fn payload(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter().filter(|(name, _)| {
            !matches!(
                name.as_str(),
                TIMESTAMP_FIELD | DATE_FIELD | TICKER_FIELD | EXCHANGE_FIELD
            )
        })
    }
}

impl From<Map<String, Value>> for PriceRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(text: &str) -> Result<RecordTime, DataError> {
    let text = text.trim();

    if let Ok(dt) = DateTime::<FixedOffset>::parse_from_rfc3339(text) {
        return Ok(RecordTime {
            instant: dt.with_timezone(&Utc),
            year: dt.year(),
            month: dt.month(),
        });
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(from_naive(naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(from_naive(naive));
        }
    }

    Err(DataError::Schema(format!("unparseable timestamp '{text}'")))
}

fn from_naive(naive: NaiveDateTime) -> RecordTime {
    RecordTime {
        instant: naive.and_utc(),
        year: naive.year(),
        month: naive.month(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_field_preferred_over_alternate() {
        let rec = PriceRecord::new()
            .with("date", "2024-01-31T23:00:00Z")
            .with("timestamp", "2024-02-01T00:00:00Z");
        assert_eq!(rec.timestamp_field(), Some(TIMESTAMP_FIELD));
        assert_eq!(rec.time().unwrap().month, 2);
    }

    #[test]
    fn missing_timestamp_is_schema_error() {
        let rec = PriceRecord::new().with("open", 1.0);
        assert!(matches!(rec.time(), Err(DataError::Schema(_))));
    }

    #[test]
    fn non_string_timestamp_is_schema_error() {
        let rec = PriceRecord::new().with("date", 1_704_067_200);
        assert!(matches!(rec.time(), Err(DataError::Schema(_))));
    }

    #[test]
    fn parses_tiingo_style_timestamp() {
        let t = parse_timestamp("2024-01-01T00:01:00.000Z").unwrap();
        assert_eq!((t.year, t.month), (2024, 1));
        assert_eq!(t.epoch_nanos().unwrap(), 1_704_067_260_000_000_000);
    }

    #[test]
    fn date_only_is_midnight_utc() {
        let t = parse_timestamp("2024-01-15").unwrap();
        assert_eq!(t.instant.to_rfc3339(), "2024-01-15T00:00:00+00:00");
    }

    #[test]
    fn month_taken_from_stated_offset() {
        // 00:30 on Feb 1st at +01:00 is still January 31st in UTC.
        let t = parse_timestamp("2024-02-01T00:30:00+01:00").unwrap();
        assert_eq!((t.year, t.month), (2024, 2));
        assert_eq!(t.instant.month(), 1);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_timestamp("01-01-2024").is_err());
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn payload_skips_reserved_columns() {
        let rec = PriceRecord::from_value(json!({
            "date": "2024-01-01",
            "ticker": "x",
            "exchange": "y",
            "open": 1.0,
        }))
        .unwrap();
        let names: Vec<_> = rec.payload().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["open"]);
    }

    #[test]
    fn from_value_rejects_non_objects() {
        assert!(PriceRecord::from_value(json!([1, 2])).is_err());
    }
}

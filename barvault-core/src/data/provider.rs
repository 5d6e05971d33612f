//! Price provider trait and fetch request validation.
//!
//! The PriceProvider trait abstracts over price sources so the collection
//! pipeline can be driven by Tiingo in production and by a stub in tests.

use crate::domain::PriceRecord;
use crate::error::DataError;
use chrono::NaiveDate;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A validated fetch: a ticker plus either a date range or a single day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub ticker: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// Overrides `start`/`end` when set.
    pub specific_date: Option<NaiveDate>,
}

impl FetchRequest {
    /// Validate raw `YYYY-MM-DD` inputs.
    ///
    /// With a specific date the range arguments are ignored entirely,
    /// including their format.
    pub fn new(
        ticker: &str,
        start: Option<&str>,
        end: Option<&str>,
        specific_date: Option<&str>,
    ) -> Result<Self, DataError> {
        let ticker = ticker.trim();
        if ticker.is_empty() {
            return Err(DataError::InvalidRequest("ticker symbol is required".into()));
        }

        if let Some(day) = specific_date {
            return Ok(Self {
                ticker: ticker.to_string(),
                start: None,
                end: None,
                specific_date: Some(parse_date(day)?),
            });
        }

        let start = start.map(parse_date).transpose()?;
        let end = end.map(parse_date).transpose()?;
        Self::range(ticker, start, end)
    }

    /// Build a request from already-parsed dates.
    pub fn range(
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Self, DataError> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(DataError::InvalidRequest(
                    "start date must be before or equal to end date".into(),
                ));
            }
        }
        Ok(Self {
            ticker: ticker.to_string(),
            start,
            end,
            specific_date: None,
        })
    }

    /// First day requested, if bounded.
    pub fn start_date(&self) -> Option<NaiveDate> {
        self.specific_date.or(self.start)
    }

    /// Last day requested. A single-day request has no explicit end.
    pub fn end_date(&self) -> Option<NaiveDate> {
        if self.specific_date.is_some() {
            None
        } else {
            self.end
        }
    }
}

fn parse_date(text: &str) -> Result<NaiveDate, DataError> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).map_err(|_| {
        DataError::InvalidRequest(format!(
            "invalid date format: {text}. Use YYYY-MM-DD format"
        ))
    })
}

/// Result of a successful fetch for one ticker.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub ticker: String,
    pub base_currency: Option<String>,
    pub quote_currency: Option<String>,
    pub records: Vec<PriceRecord>,
}

/// Anything that can produce price records for a request.
///
/// An error means there is nothing to save.
pub trait PriceProvider {
    fn name(&self) -> &str;

    fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, DataError>;
}

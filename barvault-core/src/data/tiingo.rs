//! Tiingo crypto prices provider.
//!
//! One blocking GET per request against the `/tiingo/crypto/prices` endpoint,
//! resampled to one-minute bars. No retries here: a failed fetch simply means
//! nothing is saved for that run.

use super::provider::{FetchRequest, FetchResult, PriceProvider};
use crate::config::TiingoConfig;
use crate::domain::PriceRecord;
use crate::error::DataError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerPrices {
    ticker: Option<String>,
    base_currency: Option<String>,
    quote_currency: Option<String>,
    #[serde(default)]
    price_data: Vec<Map<String, Value>>,
}

pub struct TiingoProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    token: String,
    resample_freq: String,
}

impl TiingoProvider {
    pub fn new(config: &TiingoConfig) -> Result<Self, DataError> {
        let token = config
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| DataError::Config("TIINGO_TOKEN is not set".into()))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            token,
            resample_freq: config.resample_freq.clone(),
        })
    }

    fn query(&self, request: &FetchRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("tickers", request.ticker.clone()),
            ("resampleFreq", self.resample_freq.clone()),
        ];
        if let Some(start) = request.start_date() {
            params.push(("startDate", start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = request.end_date() {
            params.push(("endDate", end.format("%Y-%m-%d").to_string()));
        }
        params
    }

    /// Map a Tiingo response body onto records.
    fn parse_response(ticker: &str, body: &str) -> Result<FetchResult, DataError> {
        let tickers: Vec<TickerPrices> = serde_json::from_str(body).map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse response for {ticker}: {e}"))
        })?;

        let first = tickers
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("response array is empty".into()))?;

        if first.price_data.is_empty() {
            return Err(DataError::NoPriceData {
                ticker: ticker.to_string(),
            });
        }

        Ok(FetchResult {
            ticker: first.ticker.unwrap_or_else(|| ticker.to_string()),
            base_currency: first.base_currency,
            quote_currency: first.quote_currency,
            records: first
                .price_data
                .into_iter()
                .map(PriceRecord::from_fields)
                .collect(),
        })
    }
}

fn status_error(status: reqwest::StatusCode, ticker: &str, retry_after: Option<u64>) -> DataError {
    match status {
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            DataError::AuthenticationRequired(format!("Tiingo rejected the token ({status})"))
        }
        reqwest::StatusCode::NOT_FOUND => DataError::SymbolNotFound {
            symbol: ticker.to_string(),
        },
        reqwest::StatusCode::TOO_MANY_REQUESTS => DataError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(60),
        },
        other => DataError::Http {
            status: other.as_u16(),
            message: format!("Tiingo request for {ticker} failed"),
        },
    }
}

impl PriceProvider for TiingoProvider {
    fn name(&self) -> &str {
        "tiingo"
    }

    fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, DataError> {
        tracing::debug!(ticker = %request.ticker, start = ?request.start_date(), end = ?request.end_date(), "fetching from Tiingo");
        let resp = self
            .client
            .get(&self.base_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Token {}", self.token))
            .query(&self.query(request))
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(status_error(status, &request.ticker, retry_after));
        }

        let body = resp
            .text()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;
        let result = Self::parse_response(&request.ticker, &body)?;
        tracing::info!(ticker = %result.ticker, records = result.records.len(), "fetched price data");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DATE_FIELD;

    const BODY: &str = r#"[{
        "ticker": "btcusd",
        "baseCurrency": "btc",
        "quoteCurrency": "usd",
        "priceData": [
            {"date": "2024-01-01T00:00:00+00:00", "open": 42000.0, "high": 42010.5,
             "low": 41990.0, "close": 42005.0, "volume": 1.5, "volumeNotional": 63007.5,
             "tradesDone": 12},
            {"date": "2024-01-01T00:01:00+00:00", "open": 42005.0, "high": 42020.0,
             "low": 42000.0, "close": 42015.0, "volume": 0.8, "volumeNotional": 33612.0,
             "tradesDone": 7}
        ]
    }]"#;

    fn config(token: Option<&str>) -> TiingoConfig {
        TiingoConfig {
            token: token.map(String::from),
            ..TiingoConfig::default()
        }
    }

    #[test]
    fn parses_price_data() {
        let result = TiingoProvider::parse_response("btcusd", BODY).unwrap();
        assert_eq!(result.ticker, "btcusd");
        assert_eq!(result.base_currency.as_deref(), Some("btc"));
        assert_eq!(result.records.len(), 2);
        assert!(result.records[0].get(DATE_FIELD).is_some());
        assert_eq!(result.records[1].get("tradesDone"), Some(&Value::from(7)));
    }

    #[test]
    fn empty_array_is_format_change() {
        let err = TiingoProvider::parse_response("btcusd", "[]").unwrap_err();
        assert!(matches!(err, DataError::ResponseFormatChanged(_)));
    }

    #[test]
    fn empty_price_data() {
        let body = r#"[{"ticker": "btcusd", "priceData": []}]"#;
        let err = TiingoProvider::parse_response("btcusd", body).unwrap_err();
        assert!(matches!(err, DataError::NoPriceData { .. }));
    }

    #[test]
    fn error_object_is_format_change() {
        let err = TiingoProvider::parse_response("btcusd", r#"{"detail": "nope"}"#).unwrap_err();
        assert!(matches!(err, DataError::ResponseFormatChanged(_)));
    }

    #[test]
    fn status_mapping() {
        use reqwest::StatusCode;
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "x", None),
            DataError::AuthenticationRequired(_)
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "x", None),
            DataError::SymbolNotFound { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "x", Some(5)),
            DataError::RateLimited { retry_after_secs: 5 }
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "x", None),
            DataError::Http { status: 502, .. }
        ));
    }

    #[test]
    fn token_required() {
        assert!(matches!(
            TiingoProvider::new(&config(None)),
            Err(DataError::Config(_))
        ));
        assert!(TiingoProvider::new(&config(Some("secret"))).is_ok());
    }

    #[test]
    fn query_uses_single_day() {
        let provider = TiingoProvider::new(&config(Some("secret"))).unwrap();
        let req = FetchRequest::new("btcusd", None, None, Some("2024-01-01")).unwrap();
        let params = provider.query(&req);
        assert!(params.contains(&("startDate", "2024-01-01".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "endDate"));
        assert!(params.contains(&("resampleFreq", "1Min".to_string())));
    }
}

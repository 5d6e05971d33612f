//! Identity of a monthly file and the paths derived from it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// `(ticker, exchange, year, month)`: the unit of storage, progress and upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthKey {
    pub ticker: String,
    pub exchange: String,
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(ticker: impl Into<String>, exchange: impl Into<String>, year: i32, month: u32) -> Self {
        Self {
            ticker: ticker.into(),
            exchange: exchange.into(),
            year,
            month,
        }
    }

    /// `{ticker}_{exchange}_{year}{MM}.parquet`
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}{:02}.parquet",
            self.ticker, self.exchange, self.year, self.month
        )
    }

    /// `{ticker}/{exchange}/{year}/{MM}` relative to a data root.
    pub fn relative_dir(&self) -> PathBuf {
        PathBuf::from(&self.ticker)
            .join(&self.exchange)
            .join(self.year.to_string())
            .join(format!("{:02}", self.month))
    }

    /// Full local path of the monthly file under `root`.
    pub fn local_path(&self, root: &Path) -> PathBuf {
        root.join(self.relative_dir()).join(self.file_name())
    }

    /// Object key in the bucket; always `/`-separated, no prefix.
    pub fn remote_key(&self) -> String {
        format!(
            "{}/{}/{}/{:02}/{}",
            self.ticker,
            self.exchange,
            self.year,
            self.month,
            self.file_name()
        )
    }

    /// Whole calendar months between this key and `(year, month)`.
    ///
    /// Negative when the key lies in the future.
    pub fn months_until(&self, year: i32, month: u32) -> i64 {
        (year as i64 - self.year as i64) * 12 + (month as i64 - self.month as i64)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} {}-{:02}",
            self.ticker, self.exchange, self.year, self.month
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monthly_file_path() {
        let key = MonthKey::new("BTCUSD", "tiingo", 2024, 1);
        let path = key.local_path(Path::new("/data"));
        assert_eq!(
            path,
            PathBuf::from("/data/BTCUSD/tiingo/2024/01/BTCUSD_tiingo_202401.parquet")
        );
    }

    #[test]
    fn remote_key_layout() {
        let key = MonthKey::new("BTCUSD", "tiingo", 2024, 1);
        assert_eq!(
            key.remote_key(),
            "BTCUSD/tiingo/2024/01/BTCUSD_tiingo_202401.parquet"
        );
    }

    #[test]
    fn month_distance_is_calendar_arithmetic() {
        let key = MonthKey::new("ETHUSD", "tiingo", 2023, 11);
        assert_eq!(key.months_until(2024, 3), 4);
        assert_eq!(key.months_until(2023, 11), 0);
        assert_eq!(key.months_until(2023, 10), -1);
    }
}

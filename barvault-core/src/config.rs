//! Vault configuration: a TOML file plus environment overrides.
//!
//! Every section has defaults, so a missing file or a partial file is fine.
//! Environment overrides are applied through an explicit lookup function,
//! which keeps tests away from the process environment.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "barvault.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoDataConfig {
    pub default_exchange: String,
    pub max_retries: u32,
}

impl Default for CryptoDataConfig {
    fn default() -> Self {
        Self {
            default_exchange: "tiingo".into(),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("crypto_data.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct R2Config {
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub bucket: String,
    pub region: String,
}

impl Default for R2Config {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            bucket: "crypto-data-tiingo".into(),
            region: "auto".into(),
        }
    }
}

impl R2Config {
    /// All three connection settings are present.
    pub fn is_configured(&self) -> bool {
        self.endpoint_url.is_some() && self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TiingoConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub resample_freq: String,
}

impl Default for TiingoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tiingo.com/tiingo/crypto/prices".into(),
            token: None,
            resample_freq: "1Min".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerConfig {
    pub ticker: String,
    pub exchange: String,
    pub start_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub default_start_date: String,
    pub crypto_data: CryptoDataConfig,
    pub storage: StorageConfig,
    pub catalog: CatalogConfig,
    pub r2: R2Config,
    pub tiingo: TiingoConfig,
    pub tickers: Vec<TickerConfig>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            default_start_date: "2012-01-01".into(),
            crypto_data: CryptoDataConfig::default(),
            storage: StorageConfig::default(),
            catalog: CatalogConfig::default(),
            r2: R2Config::default(),
            tiingo: TiingoConfig::default(),
            tickers: Vec::new(),
        }
    }
}

impl VaultConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise, then apply overrides
    /// from the process environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.is_file() {
            Self::from_file(path)?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Override settings from the environment. Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("LOCAL_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(db) = get("BARVAULT_DB") {
            self.catalog.path = PathBuf::from(db);
        }
        if let Some(token) = get("TIINGO_TOKEN") {
            self.tiingo.token = Some(token);
        }
        if let Some(url) = get("R2_ENDPOINT_URL") {
            self.r2.endpoint_url = Some(url);
        }
        if let Some(key) = get("R2_ACCESS_KEY_ID") {
            self.r2.access_key_id = Some(key);
        }
        if let Some(secret) = get("R2_SECRET_ACCESS_KEY") {
            self.r2.secret_access_key = Some(secret);
        }
        if let Some(bucket) = get("R2_BUCKET_NAME") {
            self.r2.bucket = bucket;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        parse_start_date(&self.default_start_date)?;
        for t in &self.tickers {
            if t.ticker.trim().is_empty() || t.exchange.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "every ticker entry needs a ticker and an exchange".into(),
                ));
            }
            if let Some(start) = &t.start_date {
                parse_start_date(start)?;
            }
        }
        Ok(())
    }

    /// Configured `(ticker, exchange)` pairs.
    pub fn ticker_pairs(&self) -> Vec<(String, String)> {
        self.tickers
            .iter()
            .map(|t| (t.ticker.clone(), t.exchange.clone()))
            .collect()
    }

    /// Start date for a ticker: its own, else the global default.
    pub fn start_date_for(&self, ticker: &str, exchange: &str) -> Result<NaiveDate, ConfigError> {
        let own = self
            .tickers
            .iter()
            .find(|t| t.ticker == ticker && t.exchange == exchange)
            .and_then(|t| t.start_date.as_deref());
        parse_start_date(own.unwrap_or(&self.default_start_date))
    }
}

fn parse_start_date(text: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| ConfigError::Invalid(format!("start date '{text}' is not YYYY-MM-DD")))
}

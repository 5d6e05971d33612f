//! barvault CLI: fetch, merge, upload, and asset registry commands.
//!
//! Commands:
//! - `fetch`: fetch one ticker from Tiingo and save it into monthly files
//! - `collect`: fetch every active monitored asset from its start date
//! - `read`: print a monthly file
//! - `upload` / `batch-upload`: push monthly files to R2
//! - `assets`: manage the monitored-asset registry
//! - `sync`: reconcile configured tickers into the registry
//! - `status`: progress and recent collection runs

use anyhow::{bail, Context, Result};
use barvault_core::catalog::{sync_registry, AssetRegistry, ProgressStore, RunLog, SqliteCatalog};
use barvault_core::clock::{Clock, SystemClock, ThreadSleeper};
use barvault_core::config::{VaultConfig, DEFAULT_CONFIG_FILE};
use barvault_core::data::{FetchRequest, TiingoProvider};
use barvault_core::domain::MonthKey;
use barvault_core::pipeline::{CollectJob, Collector, MonthlyIngest};
use barvault_core::storage::MonthlyStore;
use barvault_core::upload::{R2ObjectStore, UploadOrchestrator, UploadOutcome};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "barvault",
    about = "barvault: minute crypto bars into monthly parquet files on R2"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one ticker and save it into monthly parquet files.
    Fetch {
        /// Ticker symbol (e.g., btcusd).
        ticker: String,

        /// Exchange label. Defaults to the configured default exchange.
        #[arg(long)]
        exchange: Option<String>,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD).
        #[arg(long)]
        end: Option<String>,

        /// Single day (YYYY-MM-DD); overrides --start/--end.
        #[arg(long)]
        date: Option<String>,

        /// Skip uploading the written files.
        #[arg(long, default_value_t = false)]
        no_upload: bool,
    },
    /// Fetch every active monitored asset from its start date to today.
    Collect {
        /// Skip uploading the written files.
        #[arg(long, default_value_t = false)]
        no_upload: bool,
    },
    /// Print the contents of one monthly file.
    Read {
        ticker: String,
        exchange: String,
        year: i32,
        month: u32,
    },
    /// Upload one monthly file with retries.
    Upload {
        ticker: String,
        exchange: String,
        year: i32,
        month: u32,

        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Upload every pending file at least N months old.
    BatchUpload {
        #[arg(long, default_value_t = 1)]
        months_old: u32,
    },
    /// Monitored-asset registry.
    Assets {
        #[command(subcommand)]
        action: AssetAction,
    },
    /// Reconcile configured tickers into the registry.
    Sync {
        /// Hard-delete unconfigured assets (not supported; reported as errors).
        #[arg(long, default_value_t = false)]
        remove_orphans: bool,
    },
    /// Show progress entries and recent collection runs.
    Status {
        #[arg(long, default_value_t = 10)]
        runs: usize,
    },
}

#[derive(Subcommand)]
enum AssetAction {
    Add { ticker: String, exchange: String },
    Deactivate { ticker: String, exchange: String },
    Reactivate { ticker: String, exchange: String },
    List {
        /// Include inactive assets.
        #[arg(long, default_value_t = false)]
        all: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = VaultConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Fetch {
            ticker,
            exchange,
            start,
            end,
            date,
            no_upload,
        } => run_fetch(&config, &ticker, exchange, start, end, date, no_upload),
        Commands::Collect { no_upload } => run_collect(&config, no_upload),
        Commands::Read {
            ticker,
            exchange,
            year,
            month,
        } => run_read(&config, MonthKey::new(ticker, exchange, year, month)),
        Commands::Upload {
            ticker,
            exchange,
            year,
            month,
            max_attempts,
        } => run_upload(
            &config,
            MonthKey::new(ticker, exchange, year, month),
            max_attempts.unwrap_or(config.crypto_data.max_retries),
        ),
        Commands::BatchUpload { months_old } => run_batch_upload(&config, months_old),
        Commands::Assets { action } => run_assets(&config, action),
        Commands::Sync { remove_orphans } => run_sync(&config, remove_orphans),
        Commands::Status { runs } => run_status(&config, runs),
    }
}

fn open_catalog(config: &VaultConfig) -> Result<SqliteCatalog> {
    SqliteCatalog::open(&config.catalog.path)
        .with_context(|| format!("opening catalog {}", config.catalog.path.display()))
}

/// The R2 store when uploads are wanted and configured.
fn upload_store(config: &VaultConfig, no_upload: bool) -> Result<Option<R2ObjectStore>> {
    if no_upload {
        return Ok(None);
    }
    if !config.r2.is_configured() {
        tracing::warn!("R2 credentials not configured, files will not be uploaded");
        return Ok(None);
    }
    Ok(Some(R2ObjectStore::new(&config.r2)?))
}

fn require_upload_store(config: &VaultConfig) -> Result<R2ObjectStore> {
    if !config.r2.is_configured() {
        bail!("R2 is not configured: set R2_ENDPOINT_URL, R2_ACCESS_KEY_ID and R2_SECRET_ACCESS_KEY");
    }
    Ok(R2ObjectStore::new(&config.r2)?)
}

fn run_fetch(
    config: &VaultConfig,
    ticker: &str,
    exchange: Option<String>,
    start: Option<String>,
    end: Option<String>,
    date: Option<String>,
    no_upload: bool,
) -> Result<()> {
    let exchange = exchange.unwrap_or_else(|| config.crypto_data.default_exchange.clone());
    let request = FetchRequest::new(ticker, start.as_deref(), end.as_deref(), date.as_deref())?;

    let catalog = open_catalog(config)?;
    let files = MonthlyStore::new(&config.storage.data_dir);
    let provider = TiingoProvider::new(&config.tiingo)?;
    let clock = SystemClock;
    let sleeper = ThreadSleeper;
    let objects = upload_store(config, no_upload)?;

    let uploader = objects
        .as_ref()
        .map(|store| UploadOrchestrator::new(&files, store, &catalog, &clock, &sleeper));
    let mut ingest = MonthlyIngest::new(&files, &catalog, &clock);
    if let Some(uploader) = uploader.as_ref() {
        ingest = ingest.with_uploads(uploader, config.crypto_data.max_retries);
    }
    let collector = Collector::new(&provider, &ingest, &catalog, &clock);

    let report = collector.fetch_and_save(&request, &exchange)?;
    println!(
        "Fetched {} records for {}/{} (run {})",
        report.records_fetched, request.ticker, exchange, report.run_id
    );
    for file in &report.summary.files {
        println!(
            "  {}  {} rows  {} bytes  {}",
            file.key,
            file.row_count,
            file.file_size,
            file.path.display()
        );
    }
    print_uploads(&report.summary.uploads);
    Ok(())
}

fn run_collect(config: &VaultConfig, no_upload: bool) -> Result<()> {
    let catalog = open_catalog(config)?;
    let clock = SystemClock;
    let today = clock.now().date_naive();

    let mut jobs = Vec::new();
    for asset in catalog.list(true)? {
        let start = config.start_date_for(&asset.ticker, &asset.exchange)?;
        jobs.push(CollectJob {
            ticker: asset.ticker,
            exchange: asset.exchange,
            start,
            end: today,
        });
    }
    if jobs.is_empty() {
        println!("No active assets. Add some with `barvault assets add` or `barvault sync`.");
        return Ok(());
    }

    let files = MonthlyStore::new(&config.storage.data_dir);
    let provider = TiingoProvider::new(&config.tiingo)?;
    let sleeper = ThreadSleeper;
    let objects = upload_store(config, no_upload)?;
    let uploader = objects
        .as_ref()
        .map(|store| UploadOrchestrator::new(&files, store, &catalog, &clock, &sleeper));
    let mut ingest = MonthlyIngest::new(&files, &catalog, &clock);
    if let Some(uploader) = uploader.as_ref() {
        ingest = ingest.with_uploads(uploader, config.crypto_data.max_retries);
    }
    let collector = Collector::new(&provider, &ingest, &catalog, &clock);

    let summary = collector.collect_many(&jobs);
    println!(
        "\nCollection complete: {}/{} succeeded, {} failed",
        summary.succeeded, summary.total, summary.failed
    );
    if !summary.all_succeeded() {
        for (asset, err) in &summary.errors {
            eprintln!("Error for {asset}: {err}");
        }
        std::process::exit(1);
    }
    Ok(())
}

fn run_read(config: &VaultConfig, key: MonthKey) -> Result<()> {
    let files = MonthlyStore::new(&config.storage.data_dir);
    let df = files.read_month(&key)?;
    println!("{key}: {} rows", df.height());
    println!("{df}");
    Ok(())
}

fn run_upload(config: &VaultConfig, key: MonthKey, max_attempts: u32) -> Result<()> {
    let catalog = open_catalog(config)?;
    let files = MonthlyStore::new(&config.storage.data_dir);
    let objects = require_upload_store(config)?;
    let uploader =
        UploadOrchestrator::new(&files, &objects, &catalog, &SystemClock, &ThreadSleeper);

    match uploader.upload_with_retry(&key, max_attempts)? {
        UploadOutcome::Uploaded {
            remote_key,
            attempts,
        } => {
            println!("Uploaded {key} to {remote_key} after {attempts} attempt(s)");
            Ok(())
        }
        UploadOutcome::Failed {
            attempts,
            last_error,
        } => bail!("upload of {key} failed after {attempts} attempts: {last_error}"),
    }
}

fn run_batch_upload(config: &VaultConfig, months_old: u32) -> Result<()> {
    let catalog = open_catalog(config)?;
    let files = MonthlyStore::new(&config.storage.data_dir);
    let objects = require_upload_store(config)?;
    let uploader =
        UploadOrchestrator::new(&files, &objects, &catalog, &SystemClock, &ThreadSleeper);

    let uploaded = uploader.batch_upload(months_old)?;
    println!("Uploaded {uploaded} file(s)");
    Ok(())
}

fn run_assets(config: &VaultConfig, action: AssetAction) -> Result<()> {
    let catalog = open_catalog(config)?;
    match action {
        AssetAction::Add { ticker, exchange } => {
            if catalog.add(&ticker, &exchange)? {
                println!("Added {ticker}/{exchange}");
            } else {
                println!("{ticker}/{exchange} is already registered");
            }
        }
        AssetAction::Deactivate { ticker, exchange } => {
            if !catalog.deactivate(&ticker, &exchange)? {
                bail!("{ticker}/{exchange} is not registered");
            }
            println!("Deactivated {ticker}/{exchange}");
        }
        AssetAction::Reactivate { ticker, exchange } => {
            if !catalog.reactivate(&ticker, &exchange)? {
                bail!("{ticker}/{exchange} is not registered");
            }
            println!("Reactivated {ticker}/{exchange}");
        }
        AssetAction::List { all } => {
            let assets = catalog.list(!all)?;
            if assets.is_empty() {
                println!("No assets registered.");
            }
            for asset in assets {
                println!(
                    "{:<12} {:<12} {:<8} every {}h",
                    asset.ticker,
                    asset.exchange,
                    asset.status.as_str(),
                    asset.fetch_frequency_hours
                );
            }
        }
    }
    Ok(())
}

fn run_sync(config: &VaultConfig, remove_orphans: bool) -> Result<()> {
    let catalog = open_catalog(config)?;
    let report = sync_registry(&catalog, &config.ticker_pairs(), remove_orphans)?;

    for (t, e) in &report.added {
        println!("  added        {t}/{e}");
    }
    for (t, e) in &report.reactivated {
        println!("  reactivated  {t}/{e}");
    }
    for (t, e) in &report.deactivated {
        println!("  deactivated  {t}/{e}");
    }
    for err in &report.errors {
        eprintln!("  error        {err}");
    }
    println!(
        "Sync complete: {} added, {} reactivated, {} deactivated, {} errors",
        report.added.len(),
        report.reactivated.len(),
        report.deactivated.len(),
        report.errors.len()
    );
    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_status(config: &VaultConfig, runs: usize) -> Result<()> {
    let catalog = open_catalog(config)?;
    let entries = catalog.list_progress()?;

    println!("Data dir: {}", config.storage.data_dir.display());
    println!("Catalog:  {}", config.catalog.path.display());
    println!("Bucket:   {}", config.r2.bucket);
    println!();

    if entries.is_empty() {
        println!("No monthly files recorded.");
    } else {
        println!(
            "{:<28} {:>9} {:>12} {:>9} {:<14} {:>8}",
            "FILE", "RECORDS", "BYTES", "COMPLETE", "UPLOAD", "ATTEMPTS"
        );
        for entry in &entries {
            println!(
                "{:<28} {:>9} {:>12} {:>9} {:<14} {:>8}",
                entry.key.to_string(),
                entry.records_count,
                entry.file_size_bytes,
                if entry.is_month_complete { "yes" } else { "no" },
                entry.upload_status.as_str(),
                entry.upload_attempts
            );
            if let Some(err) = &entry.last_upload_error {
                println!("    last error: {err}");
            }
        }
    }

    let recent = catalog.recent_runs(runs)?;
    if !recent.is_empty() {
        println!("\nRecent runs:");
        for run in recent {
            println!(
                "  #{:<5} {}/{} {:<10} {} records{}",
                run.id,
                run.ticker,
                run.exchange,
                run.status.as_str(),
                run.records_fetched,
                run.error_message
                    .map(|e| format!(" ({e})"))
                    .unwrap_or_default()
            );
        }
    }
    Ok(())
}

fn print_uploads(uploads: &[(MonthKey, UploadOutcome)]) {
    for (key, outcome) in uploads {
        match outcome {
            UploadOutcome::Uploaded {
                remote_key,
                attempts,
            } => println!("  uploaded {key} -> {remote_key} ({attempts} attempt(s))"),
            UploadOutcome::Failed {
                attempts,
                last_error,
            } => eprintln!("  upload FAILED {key} after {attempts} attempts: {last_error}"),
        }
    }
}

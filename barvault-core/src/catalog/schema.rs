//! SQLite schema. Created idempotently on open; never migrated.

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS data_collection_progress (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ticker TEXT NOT NULL,
    exchange TEXT NOT NULL,
    year INTEGER NOT NULL,
    month INTEGER NOT NULL,
    last_date_collected TEXT,
    is_month_complete BOOLEAN NOT NULL DEFAULT FALSE,
    records_count INTEGER NOT NULL DEFAULT 0,
    file_size_bytes INTEGER NOT NULL DEFAULT 0,
    content_hash TEXT,
    local_file_path TEXT,
    r2_key TEXT,
    upload_status TEXT NOT NULL DEFAULT 'not_attempted'
        CHECK(upload_status IN ('not_attempted', 'uploaded', 'failed')),
    upload_attempts INTEGER NOT NULL DEFAULT 0,
    last_upload_attempt TEXT,
    last_upload_error TEXT,
    uploaded_at TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(ticker, exchange, year, month)
);

CREATE TABLE IF NOT EXISTS collection_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ticker TEXT NOT NULL,
    exchange TEXT NOT NULL,
    start_date TEXT,
    end_date TEXT,
    status TEXT CHECK(status IN ('pending', 'running', 'completed', 'failed')) DEFAULT 'pending',
    records_fetched INTEGER DEFAULT 0,
    error_message TEXT,
    started_at TEXT,
    completed_at TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS monitored_assets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ticker TEXT NOT NULL,
    exchange TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active', 'inactive')),
    fetch_frequency_hours INTEGER NOT NULL DEFAULT 24,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(ticker, exchange)
);
"#;

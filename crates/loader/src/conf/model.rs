//! Model — configuration structs and defaults.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::batch::DEFAULT_PAGE_SIZE;
use crate::sink::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directory whose files are ingested.
    pub input_dir: String,
    /// Parse and batch, but write pages to an in-memory sink.
    pub dry_run: bool,
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
}

/// Connection settings for the record store.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub table: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Records per bulk insert.
    pub page_size: usize,
    /// Attempts per page before the run is aborted.
    pub max_attempts: u32,
    /// Pause between attempts; 0 retries immediately.
    pub retry_backoff_ms: u64,
    /// Page writes allowed in flight at once.
    pub max_in_flight_writes: usize,
}

impl PipelineConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.retry_backoff_ms))
    }
}

impl StoreConfig {
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.username)
            .application_name("loader");
        if !self.password.is_empty() {
            pg.password(&self.password);
        }
        pg
    }
}

// Hand-written so the password never reaches the logs.
impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("table", &self.table)
            .finish()
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            input_dir: "logs".to_string(),
            dry_run: false,
            store: StoreConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            username: "postgres".to_string(),
            password: String::new(),
            table: "iis_logs".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff_ms: 0,
            max_in_flight_writes: 16,
        }
    }
}

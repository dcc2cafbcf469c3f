//! Load — config loading from file and environment variables.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use tracing::{info, warn};

use super::model::LoaderConfig;
use crate::sink::postgres::MAX_ROWS_PER_STATEMENT;

impl LoaderConfig {
    /// Load configuration from file or environment variables
    /// Priority: Environment Variables > Config File > Defaults
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path =
            std::env::var("LOADER_CONFIG_FILE").unwrap_or_else(|_| "loader.toml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            info!("Loading configuration from: {}", config_path);
            Self::from_file(&config_path)?
        } else {
            info!("Config file not found at {}, using environment variables", config_path);
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let config: LoaderConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Overlay values found through `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("LOADER_INPUT_DIR") {
            self.input_dir = dir;
        }
        if let Some(host) = lookup("DB_HOST") {
            self.store.host = host;
        }
        if let Some(name) = lookup("DB_NAME") {
            self.store.database = name;
        }
        if let Some(user) = lookup("DB_USERNAME") {
            self.store.username = user;
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            self.store.password = password;
        }
        if let Some(table) = lookup("DB_TABLE") {
            self.store.table = table;
        }

        parse_into(&lookup, "DB_PORT", &mut self.store.port);
        parse_into(&lookup, "LOADER_DRY_RUN", &mut self.dry_run);
        parse_into(&lookup, "LOADER_PAGE_SIZE", &mut self.pipeline.page_size);
        parse_into(&lookup, "LOADER_MAX_ATTEMPTS", &mut self.pipeline.max_attempts);
        parse_into(&lookup, "LOADER_RETRY_BACKOFF_MS", &mut self.pipeline.retry_backoff_ms);
        parse_into(&lookup, "LOADER_MAX_IN_FLIGHT", &mut self.pipeline.max_in_flight_writes);
    }

    /// Validate that configuration values are sane
    pub fn validate(&self) -> Result<(), String> {
        if self.input_dir.is_empty() {
            return Err("input_dir must not be empty".to_string());
        }
        if self.pipeline.page_size == 0 {
            return Err("pipeline.page_size must be > 0".to_string());
        }
        if self.pipeline.max_attempts == 0 {
            return Err("pipeline.max_attempts must be > 0".to_string());
        }
        if self.pipeline.max_in_flight_writes == 0 {
            return Err("pipeline.max_in_flight_writes must be > 0".to_string());
        }
        if self.dry_run {
            return Ok(());
        }

        if self.pipeline.page_size > MAX_ROWS_PER_STATEMENT {
            return Err(format!(
                "pipeline.page_size must be <= {} (statement parameter limit)",
                MAX_ROWS_PER_STATEMENT
            ));
        }
        if self.store.host.is_empty() {
            return Err("store.host must not be empty".to_string());
        }
        if self.store.port == 0 {
            return Err("store.port must be > 0".to_string());
        }
        if self.store.database.is_empty() {
            return Err("store.database must not be empty".to_string());
        }
        if self.store.table.is_empty() {
            return Err("store.table must not be empty".to_string());
        }
        Ok(())
    }
}

/// Parse `key` into `target`; unparsable values are logged and ignored.
fn parse_into<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => warn!("Ignoring {}={:?}: not a valid value", key, raw),
        }
    }
}

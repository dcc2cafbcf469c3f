//! Boot — logging init, config load, sink construction.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::conf::LoaderConfig;
use crate::sink::{MemorySink, PageSink, PostgresSink};

/// Initialise the tracing / logging subsystem.
///
/// `.env` is read first so a `RUST_LOG` set there takes effect.
pub fn init_logging() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loader=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Load and validate config, then connect the record store.
///
/// The first command-line argument, when present, overrides `input_dir`.
pub async fn boot() -> Result<(LoaderConfig, Arc<dyn PageSink>), Box<dyn std::error::Error>> {
    info!("Starting loader v{}", env!("CARGO_PKG_VERSION"));

    let mut config = LoaderConfig::load()?;
    if let Some(dir) = std::env::args().nth(1) {
        config.input_dir = dir;
    }
    config.validate()?;
    info!("Loaded configuration: input_dir={}", config.input_dir);
    info!(
        "Pipeline: page_size={}, max_attempts={}, retry_backoff={}ms, max_in_flight_writes={}",
        config.pipeline.page_size,
        config.pipeline.max_attempts,
        config.pipeline.retry_backoff_ms,
        config.pipeline.max_in_flight_writes
    );

    let sink: Arc<dyn PageSink> = if config.dry_run {
        info!("Dry run: pages are counted, not stored");
        Arc::new(MemorySink::discarding())
    } else {
        let store = PostgresSink::connect(config.store.clone()).await.map_err(|e| {
            error!("Failed to connect to the record store: {}", e);
            e
        })?;
        info!("Connected to {}", store.describe());
        Arc::new(store)
    };

    Ok((config, sink))
}

//! Run — one ingestion pass over the input directory.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::conf::LoaderConfig;
use crate::ingest::{read_dir, FileIngestor};
use crate::sink::{PageSink, Persister};

/// Ingest every file in `config.input_dir` into `sink`.
///
/// Read failures are logged and skipped. A page that can not be saved
/// within the retry budget aborts the run and is returned as the error.
pub async fn run(config: LoaderConfig, sink: Arc<dyn PageSink>) -> Result<(), Box<dyn std::error::Error>> {
    let persister = Arc::new(Persister::new(sink, config.pipeline.retry_policy()));
    let ingestor = FileIngestor::new(persister, &config.pipeline);

    info!("Ingesting files from {}", config.input_dir);
    let result = ingestor
        .ingest(
            read_dir(&config.input_dir),
            |err| error!(error = %err, "read failed"),
            |summary| {
                info!(
                    files = summary.files_enumerated,
                    processed = summary.files_processed,
                    failed = summary.files_failed,
                    listing_failed = summary.listing_failed,
                    "ingestion complete"
                )
            },
        )
        .await;

    match result {
        Ok(report) => {
            info!(
                lines = report.lines_seen,
                records = report.records_parsed,
                lines_dropped = report.lines_dropped,
                records_oversized = report.records_oversized,
                pages_saved = report.pages_saved,
                records_saved = report.records_saved,
                "all page writes settled"
            );
            if report.records_oversized > 0 {
                warn!(
                    records_oversized = report.records_oversized,
                    "records with values longer than their column were not stored"
                );
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "aborting run: a page could not be saved");
            Err(e.into())
        }
    }
}

//! Persist — page writes with bounded retry and save logging.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use super::retry::{RetryError, RetryPolicy};
use super::{PageSink, SinkError};
use crate::batch::LogPage;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("page of {records} records not saved after {attempts} attempts: {source}")]
    Exhausted {
        records: usize,
        attempts: u32,
        #[source]
        source: SinkError,
    },
}

/// A sink plus the retry policy applied to each page written through it.
///
/// Cheap to share behind an `Arc`; concurrent `write` calls each run their
/// own retry loop.
pub struct Persister {
    sink: Arc<dyn PageSink>,
    policy: RetryPolicy,
}

impl Persister {
    pub fn new(sink: Arc<dyn PageSink>, policy: RetryPolicy) -> Self {
        Self { sink, policy }
    }

    /// Store `page`, retrying failed attempts. Returns the stored row count.
    pub async fn write(&self, page: &LogPage) -> Result<u64, PersistError> {
        let requested = page.len();
        info!(records = requested, "saving page");

        match self.policy.run(|_| self.sink.write_page(page)).await {
            Ok(saved) => {
                info!(saved, "log entries saved");
                if saved != requested as u64 {
                    warn!(requested, saved, "store reported a different row count than requested");
                }
                Ok(saved)
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                error!(
                    records = requested,
                    attempts,
                    error = %last,
                    "retries exhausted, page not saved"
                );
                Err(PersistError::Exhausted {
                    records: requested,
                    attempts,
                    source: last,
                })
            }
        }
    }
}

//! Memory — in-process sink.
//!
//! Keeps written rows in memory. Used by dry runs (`LOADER_DRY_RUN`) and
//! as a deterministic stand-in for the database in tests, where it can be
//! scripted to fail a number of attempts first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::{PageSink, SinkError, SinkFuture};
use crate::batch::LogPage;
use crate::parser::LogRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureMode {
    Never,
    FirstN(u64),
    Always,
}

#[derive(Debug)]
pub struct MemorySink {
    rows: Mutex<Vec<LogRecord>>,
    attempts: AtomicU64,
    failure: FailureMode,
    keep_rows: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            attempts: AtomicU64::new(0),
            failure: FailureMode::Never,
            keep_rows: true,
        }
    }

    /// Count writes without retaining the rows.
    pub fn discarding() -> Self {
        Self { keep_rows: false, ..Self::new() }
    }

    /// Fail the first `n` write attempts (across all pages), then succeed.
    pub fn failing_first(n: u64) -> Self {
        Self { failure: FailureMode::FirstN(n), ..Self::new() }
    }

    /// Fail every write attempt.
    pub fn always_failing() -> Self {
        Self { failure: FailureMode::Always, ..Self::new() }
    }

    /// Total `write_page` calls, failed ones included.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Snapshot of the stored rows, in write order.
    pub fn rows(&self) -> Vec<LogRecord> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or_default()
    }

    fn store(&self, page: &LogPage) -> Result<u64, SinkError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let fail = match self.failure {
            FailureMode::Never => false,
            FailureMode::FirstN(n) => attempt <= n,
            FailureMode::Always => true,
        };
        if fail {
            return Err(SinkError::Write(format!("scripted failure on attempt {attempt}")));
        }

        if self.keep_rows {
            let mut rows = self
                .rows
                .lock()
                .map_err(|_| SinkError::Write("row store poisoned".to_string()))?;
            rows.extend_from_slice(page.records());
        }
        Ok(page.len() as u64)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSink for MemorySink {
    fn write_page<'a>(&'a self, page: &'a LogPage) -> SinkFuture<'a> {
        Box::pin(async move { self.store(page) })
    }

    fn describe(&self) -> String {
        if self.keep_rows {
            "memory".to_string()
        } else {
            "memory (discarding)".to_string()
        }
    }
}

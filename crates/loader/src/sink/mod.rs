//! Sink — persistence of log pages.
//!
//! Every write goes through the [`PageSink`] trait.
//! `postgres.rs` provides the real table-backed implementation.
//! `memory.rs` provides an in-process sink for dry runs and tests.
//! `persist.rs` wraps any sink with the bounded retry in `retry.rs`.

pub mod memory;
pub mod persist;
pub mod postgres;
pub mod retry;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::batch::LogPage;

pub use memory::MemorySink;
pub use persist::{PersistError, Persister};
pub use postgres::PostgresSink;
pub use retry::{RetryError, RetryPolicy};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Store connection failed: {0}")]
    Connect(String),
    #[error("Bulk insert failed: {0}")]
    Write(String),
    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<u64, SinkError>> + Send + 'a>>;

/// Bulk-insert capability of the record store.
///
/// One call is one attempt: the whole page is stored or none of it is.
/// Implementations must accept concurrent calls.
pub trait PageSink: Send + Sync {
    /// Store every record of `page`, returning the number of rows written.
    fn write_page<'a>(&'a self, page: &'a LogPage) -> SinkFuture<'a>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

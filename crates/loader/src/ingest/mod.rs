//! Ingest module — file source and the pipeline driver.

pub mod driver;
pub mod source;

pub use driver::{FileIngestor, IngestError, IngestReport, IngestSummary};
pub use source::{read_dir, ReadError, SourceFile};

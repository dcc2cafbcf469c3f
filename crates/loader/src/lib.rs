// Module structure for the access-log loader.

// Pipeline
pub mod parser;
pub mod batch;
pub mod sink;
pub mod ingest;

// Infrastructure
pub mod conf;
pub mod metrics;
pub mod runtime;

#[cfg(test)]
mod testing;

//! Access-log line parsing.
//!
//! - `model.rs`: the [`LogRecord`] produced per line and its store columns
//! - `line.rs`: the fixed-layout W3C line parser
//!
//! A line that does not match is not an error: the parser returns `None`
//! and the caller counts it as dropped.

pub mod line;
pub mod model;

pub use line::{parse_line, LineParser};
pub use model::{Column, LogRecord};

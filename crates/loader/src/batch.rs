//! Batch — groups parsed records into fixed-size pages.

use crate::parser::LogRecord;

pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// An ordered batch of records written to the store as one bulk insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogPage {
    records: Vec<LogRecord>,
}

impl LogPage {
    pub fn new(records: Vec<LogRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<LogRecord> {
        self.records
    }
}

/// Accumulates records and hands out a page each time `capacity` is reached.
///
/// The buffer is owned here; emitted pages are moved out to the caller so
/// in-flight writes never share state with the next page being filled.
#[derive(Debug)]
pub struct Batcher {
    capacity: usize,
    buffer: Vec<LogRecord>,
}

impl Batcher {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Buffer `record`; returns the full page once capacity is reached.
    pub fn add(&mut self, record: LogRecord) -> Option<LogPage> {
        self.buffer.push(record);
        if self.buffer.len() >= self.capacity {
            Some(self.take())
        } else {
            None
        }
    }

    /// Hand out whatever is buffered, or `None` if nothing is.
    pub fn flush(&mut self) -> Option<LogPage> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    fn take(&mut self) -> LogPage {
        let records = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity));
        LogPage::new(records)
    }
}

impl Default for Batcher {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

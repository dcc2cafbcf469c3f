use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one ingestion run.
///
/// Updated from the ingestion loop and from spawned write tasks, so every
/// counter is an atomic. All operations use `Ordering::Relaxed`; a snapshot
/// taken while writes are still running may be slightly torn, which is fine
/// for progress reporting.
#[derive(Debug, Default)]
pub struct IngestMetrics {
    pub files_enumerated: AtomicU64,
    pub files_processed: AtomicU64,
    pub files_failed: AtomicU64,
    pub listings_failed: AtomicU64,
    pub lines_seen: AtomicU64,
    pub records_parsed: AtomicU64,
    pub lines_dropped: AtomicU64,
    pub records_oversized: AtomicU64,
    pub pages_dispatched: AtomicU64,
    pub pages_saved: AtomicU64,
    pub pages_failed: AtomicU64,
    pub records_saved: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub files_enumerated: u64,
    pub files_processed: u64,
    pub files_failed: u64,
    pub listings_failed: u64,
    pub lines_seen: u64,
    pub records_parsed: u64,
    pub lines_dropped: u64,
    pub records_oversized: u64,
    pub pages_dispatched: u64,
    pub pages_saved: u64,
    pub pages_failed: u64,
    pub records_saved: u64,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Files that have been either ingested or reported as failed.
    pub fn files_submitted(&self) -> u64 {
        self.files_processed.load(Ordering::Relaxed) + self.files_failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_enumerated: self.files_enumerated.load(Ordering::Relaxed),
            files_processed: self.files_processed.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            listings_failed: self.listings_failed.load(Ordering::Relaxed),
            lines_seen: self.lines_seen.load(Ordering::Relaxed),
            records_parsed: self.records_parsed.load(Ordering::Relaxed),
            lines_dropped: self.lines_dropped.load(Ordering::Relaxed),
            records_oversized: self.records_oversized.load(Ordering::Relaxed),
            pages_dispatched: self.pages_dispatched.load(Ordering::Relaxed),
            pages_saved: self.pages_saved.load(Ordering::Relaxed),
            pages_failed: self.pages_failed.load(Ordering::Relaxed),
            records_saved: self.records_saved.load(Ordering::Relaxed),
        }
    }
}

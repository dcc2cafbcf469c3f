//! Driver — runs files through parse → batch → persist.
//!
//! Files are consumed one after another from the source stream. Pages are
//! written by spawned tasks that the loop does not wait for, so parsing
//! of later lines overlaps with earlier writes. A semaphore caps how many
//! page writes may be in flight; once the cap is reached dispatch waits.
//!
//! A page that exhausts its retries cancels the run: nothing else is
//! dispatched, in-flight writes are drained, and `ingest` returns the error.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::source::{ReadError, SourceFile};
use crate::batch::{Batcher, LogPage};
use crate::conf::PipelineConfig;
use crate::metrics::{IngestMetrics, MetricsSnapshot};
use crate::parser::LineParser;
use crate::sink::{PersistError, Persister};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("Page write task failed: {0}")]
    Task(#[from] JoinError),
}

/// Passed to the completion callback once every enumerated file has been
/// submitted. Writes may still be running at that point.
///
/// A directory that could not be listed contributes no files; it is
/// reported through `listing_failed` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub files_enumerated: u64,
    pub files_processed: u64,
    pub files_failed: u64,
    pub listing_failed: bool,
}

/// Counters of a finished run, returned by [`FileIngestor::ingest`].
pub type IngestReport = MetricsSnapshot;

type WriteSet = JoinSet<Result<u64, PersistError>>;

pub struct FileIngestor {
    parser: LineParser,
    persister: Arc<Persister>,
    page_size: usize,
    in_flight: Arc<Semaphore>,
    metrics: Arc<IngestMetrics>,
}

impl FileIngestor {
    pub fn new(persister: Arc<Persister>, pipeline: &PipelineConfig) -> Self {
        Self {
            parser: LineParser::new(),
            persister,
            page_size: pipeline.page_size.max(1),
            in_flight: Arc::new(Semaphore::new(pipeline.max_in_flight_writes.max(1))),
            metrics: Arc::new(IngestMetrics::new()),
        }
    }

    pub fn metrics(&self) -> &Arc<IngestMetrics> {
        &self.metrics
    }

    /// Ingest every file of `source`.
    ///
    /// Read failures go to `on_error` and do not stop the run. `on_complete`
    /// is called once, when the stream is exhausted and every enumerated
    /// file has been submitted; it is skipped if the run was aborted.
    /// Returns after all dispatched writes have settled.
    pub async fn ingest<S, E, C>(
        &self,
        source: S,
        mut on_error: E,
        on_complete: C,
    ) -> Result<IngestReport, IngestError>
    where
        S: Stream<Item = Result<SourceFile, ReadError>>,
        E: FnMut(ReadError),
        C: FnOnce(&IngestSummary),
    {
        let cancel = CancellationToken::new();
        let mut writes = WriteSet::new();
        let mut failure: Option<IngestError> = None;

        tokio::pin!(source);
        while !cancel.is_cancelled() {
            let Some(item) = source.next().await else {
                break;
            };
            match item {
                Ok(file) => {
                    IngestMetrics::incr(&self.metrics.files_enumerated);
                    if self.ingest_file(file, &cancel, &mut writes).await {
                        IngestMetrics::incr(&self.metrics.files_processed);
                    }
                }
                Err(err @ ReadError::ListDir { .. }) => {
                    IngestMetrics::incr(&self.metrics.listings_failed);
                    on_error(err);
                }
                Err(err @ ReadError::ReadFile { .. }) => {
                    IngestMetrics::incr(&self.metrics.files_enumerated);
                    IngestMetrics::incr(&self.metrics.files_failed);
                    on_error(err);
                }
            }

            while let Some(joined) = writes.try_join_next() {
                settle(joined, &cancel, &mut failure);
            }
        }

        let enumerated = self.metrics.files_enumerated.load(Ordering::Relaxed);
        if !cancel.is_cancelled() && self.metrics.files_submitted() == enumerated {
            let summary = IngestSummary {
                files_enumerated: enumerated,
                files_processed: self.metrics.files_processed.load(Ordering::Relaxed),
                files_failed: self.metrics.files_failed.load(Ordering::Relaxed),
                listing_failed: self.metrics.listings_failed.load(Ordering::Relaxed) > 0,
            };
            info!(files = enumerated, "all files submitted");
            on_complete(&summary);
        }

        if !writes.is_empty() {
            debug!(pending = writes.len(), "waiting for in-flight page writes");
        }
        while let Some(joined) = writes.join_next().await {
            settle(joined, &cancel, &mut failure);
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(self.metrics.snapshot()),
        }
    }

    /// Returns `false` if the run was cancelled before the file finished.
    async fn ingest_file(&self, file: SourceFile, cancel: &CancellationToken, writes: &mut WriteSet) -> bool {
        let SourceFile { name, content } = file;
        let name: Arc<str> = Arc::from(name);
        let mut batcher = Batcher::new(self.page_size);
        let mut pages: u64 = 0;
        let mut records: u64 = 0;

        for line in content.lines().filter(|l| !l.is_empty()) {
            IngestMetrics::incr(&self.metrics.lines_seen);
            let Some(record) = self.parser.parse(line) else {
                IngestMetrics::incr(&self.metrics.lines_dropped);
                continue;
            };
            if let Some(column) = record.oversized_column() {
                warn!(
                    file = %name,
                    column = column.name,
                    max_len = column.max_len,
                    "dropping record with oversized value"
                );
                IngestMetrics::incr(&self.metrics.records_oversized);
                continue;
            }
            IngestMetrics::incr(&self.metrics.records_parsed);
            records += 1;

            if let Some(page) = batcher.add(record) {
                pages += 1;
                if !self.dispatch(&name, pages, page, cancel, writes).await {
                    return false;
                }
            }
        }

        if let Some(page) = batcher.flush() {
            pages += 1;
            if !self.dispatch(&name, pages, page, cancel, writes).await {
                return false;
            }
        }

        info!(file = %name, records, pages, "file processed");
        true
    }

    /// Spawn the write of `page`. Waits only for an in-flight slot.
    async fn dispatch(
        &self,
        file: &Arc<str>,
        page_no: u64,
        page: LogPage,
        cancel: &CancellationToken,
        writes: &mut WriteSet,
    ) -> bool {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            permit = Arc::clone(&self.in_flight).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return false,
            },
        };

        IngestMetrics::incr(&self.metrics.pages_dispatched);
        let persister = Arc::clone(&self.persister);
        let metrics = Arc::clone(&self.metrics);
        let cancel = cancel.clone();
        let span = info_span!("page", file = %file, page = page_no);

        writes.spawn(
            async move {
                let _permit = permit;
                let result = persister.write(&page).await;
                match &result {
                    Ok(saved) => {
                        IngestMetrics::incr(&metrics.pages_saved);
                        IngestMetrics::add(&metrics.records_saved, *saved);
                    }
                    Err(_) => {
                        IngestMetrics::incr(&metrics.pages_failed);
                        cancel.cancel();
                    }
                }
                result
            }
            .instrument(span),
        );
        true
    }
}

/// Record the outcome of a finished write; the first failure is kept.
fn settle(
    joined: Result<Result<u64, PersistError>, JoinError>,
    cancel: &CancellationToken,
    failure: &mut Option<IngestError>,
) {
    let err = match joined {
        Ok(Ok(_)) => return,
        Ok(Err(err)) => IngestError::from(err),
        Err(join_err) => {
            error!(error = %join_err, "page write task failed");
            cancel.cancel();
            IngestError::from(join_err)
        }
    };
    if failure.is_none() {
        *failure = Some(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::source::read_dir;
    use crate::sink::{MemorySink, RetryPolicy};
    use crate::testing::capture_events;
    use std::io;
    use std::time::Duration;
    use tracing::Level;

    const SAMPLE: &str = "2023-01-01 00:00:00 10.0.0.1 GET /index.html - 80 - 192.168.1.5 Mozilla/5.0 - 200 0 0 15";

    fn numbered_lines(n: usize) -> String {
        (0..n)
            .map(|i| SAMPLE.replace(" 15", &format!(" {i}")))
            .collect::<Vec<_>>()
            .join("\r\n")
    }

    fn ingestor(sink: Arc<MemorySink>, page_size: usize, max_in_flight_writes: usize) -> FileIngestor {
        let persister = Arc::new(Persister::new(sink, RetryPolicy::new(10, Duration::ZERO)));
        let pipeline = PipelineConfig {
            page_size,
            max_in_flight_writes,
            ..PipelineConfig::default()
        };
        FileIngestor::new(persister, &pipeline)
    }

    fn files(items: Vec<Result<SourceFile, ReadError>>) -> impl Stream<Item = Result<SourceFile, ReadError>> {
        tokio_stream::iter(items)
    }

    #[tokio::test]
    async fn test_single_file_pages_and_remainder() {
        let sink = Arc::new(MemorySink::new());
        let ingestor = ingestor(sink.clone(), 1000, 4);

        let report = ingestor
            .ingest(files(vec![Ok(SourceFile::new("a.log", numbered_lines(2500)))]), |_| {}, |_| {})
            .await
            .unwrap();

        assert_eq!(report.pages_dispatched, 3);
        assert_eq!(report.pages_saved, 3);
        assert_eq!(report.records_saved, 2500);
        assert_eq!(sink.row_count(), 2500);
    }

    #[tokio::test]
    async fn test_thousand_lines_single_full_page() {
        let sink = Arc::new(MemorySink::new());
        let ingestor = ingestor(sink.clone(), 1000, 4);
        let content = vec![SAMPLE; 1000].join("\r\n");

        let report = ingestor
            .ingest(files(vec![Ok(SourceFile::new("a.log", content))]), |_| {}, |_| {})
            .await
            .unwrap();

        assert_eq!(report.pages_dispatched, 1);
        assert_eq!(report.records_saved, 1000);
    }

    #[tokio::test]
    async fn test_rows_keep_input_order() {
        let sink = Arc::new(MemorySink::new());
        let ingestor = ingestor(sink.clone(), 3, 1);

        ingestor
            .ingest(files(vec![Ok(SourceFile::new("a.log", numbered_lines(10)))]), |_| {}, |_| {})
            .await
            .unwrap();

        let taken: Vec<String> = sink.rows().into_iter().map(|r| r.time_taken_ms).collect();
        let expected: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        assert_eq!(taken, expected);
    }

    #[tokio::test]
    async fn test_malformed_and_blank_lines_dropped() {
        let sink = Arc::new(MemorySink::new());
        let ingestor = ingestor(sink.clone(), 10, 1);
        let content = format!(
            "#Software: Microsoft Internet Information Services 10.0\r\n#Fields: date time s-ip\r\n\r\n{SAMPLE}\r\ngarbage\r\n{SAMPLE}\r\n"
        );

        let report = ingestor
            .ingest(files(vec![Ok(SourceFile::new("a.log", content))]), |_| {}, |_| {})
            .await
            .unwrap();

        assert_eq!(report.lines_seen, 5);
        assert_eq!(report.lines_dropped, 3);
        assert_eq!(report.records_parsed, 2);
        assert_eq!(sink.row_count(), 2);
    }

    #[tokio::test]
    async fn test_oversized_records_dropped() {
        let sink = Arc::new(MemorySink::new());
        let ingestor = ingestor(sink.clone(), 10, 1);
        let long_path = format!("/{}", "a".repeat(300));
        let content = format!("{SAMPLE}\n{}", SAMPLE.replace("/index.html", &long_path));

        let report = ingestor
            .ingest(files(vec![Ok(SourceFile::new("a.log", content))]), |_| {}, |_| {})
            .await
            .unwrap();

        assert_eq!(report.records_oversized, 1);
        assert_eq!(sink.row_count(), 1);
    }

    #[tokio::test]
    async fn test_oversized_query_dropped_with_warning() {
        let (events, _guard) = capture_events();
        let sink = Arc::new(MemorySink::new());
        let ingestor = ingestor(sink.clone(), 10, 1);
        let long_query = format!("id={}", "7".repeat(300));
        let line = SAMPLE.replacen(" - 80 ", &format!(" {long_query} 80 "), 1);
        assert!(crate::parser::parse_line(&line).is_some());

        let report = ingestor
            .ingest(
                files(vec![Ok(SourceFile::new("a.log", format!("{SAMPLE}\r\n{line}")))]),
                |_| {},
                |_| {},
            )
            .await
            .unwrap();

        assert_eq!(report.records_parsed + report.records_oversized, 2);
        assert_eq!(report.records_oversized, 1);
        assert_eq!(sink.row_count(), 1);
        assert_eq!(events.count(Level::WARN, "dropping record with oversized value"), 1);
    }

    #[tokio::test]
    async fn test_read_error_reported_and_other_files_continue() {
        let sink = Arc::new(MemorySink::new());
        let ingestor = ingestor(sink.clone(), 2, 2);
        let mut errors = Vec::new();
        let mut completed = Vec::new();

        let report = ingestor
            .ingest(
                files(vec![
                    Ok(SourceFile::new("a.log", numbered_lines(3))),
                    Err(ReadError::ReadFile {
                        name: "locked.log".to_string(),
                        source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
                    }),
                    Ok(SourceFile::new("b.log", numbered_lines(4))),
                ]),
                |err| errors.push(err.to_string()),
                |summary| completed.push(*summary),
            )
            .await
            .unwrap();

        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("locked.log"));
        assert_eq!(
            completed,
            vec![IngestSummary {
                files_enumerated: 3,
                files_processed: 2,
                files_failed: 1,
                listing_failed: false,
            }]
        );
        assert_eq!(report.records_saved, 7);
        assert_eq!(sink.row_count(), 7);
    }

    #[tokio::test]
    async fn test_unlistable_directory_counts_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        let ingestor = ingestor(sink, 10, 1);
        let mut errors = 0;
        let mut completed = Vec::new();

        let report = ingestor
            .ingest(
                read_dir(dir.path().join("missing")),
                |err| {
                    assert!(matches!(err, ReadError::ListDir { .. }));
                    errors += 1;
                },
                |summary| completed.push(*summary),
            )
            .await
            .unwrap();

        assert_eq!(errors, 1);
        assert_eq!(
            completed,
            vec![IngestSummary {
                files_enumerated: 0,
                files_processed: 0,
                files_failed: 0,
                listing_failed: true,
            }]
        );
        assert_eq!(report.files_enumerated, 0);
        assert_eq!(report.files_failed, 0);
        assert_eq!(report.listings_failed, 1);
    }

    #[tokio::test]
    async fn test_completion_called_for_empty_source() {
        let sink = Arc::new(MemorySink::new());
        let ingestor = ingestor(sink, 10, 1);
        let mut completions = 0;

        ingestor
            .ingest(files(vec![]), |_| {}, |_| completions += 1)
            .await
            .unwrap();

        assert_eq!(completions, 1);
    }

    #[tokio::test]
    async fn test_retried_write_still_succeeds() {
        let sink = Arc::new(MemorySink::failing_first(9));
        let ingestor = ingestor(sink.clone(), 5, 1);

        let report = ingestor
            .ingest(files(vec![Ok(SourceFile::new("a.log", numbered_lines(5)))]), |_| {}, |_| {})
            .await
            .unwrap();

        assert_eq!(report.pages_saved, 1);
        assert_eq!(sink.attempts(), 10);
        assert_eq!(sink.row_count(), 5);
    }

    #[tokio::test]
    async fn test_exhausted_write_aborts_run() {
        let sink = Arc::new(MemorySink::always_failing());
        let ingestor = ingestor(sink.clone(), 1, 1);
        let mut completed = false;

        let err = ingestor
            .ingest(
                files(vec![
                    Ok(SourceFile::new("a.log", numbered_lines(5))),
                    Ok(SourceFile::new("b.log", numbered_lines(5))),
                ]),
                |_| {},
                |_| completed = true,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Persist(PersistError::Exhausted { attempts: 10, .. })));
        assert!(!completed);
        // the failing page held the only slot; nothing else was dispatched
        let metrics = ingestor.metrics().snapshot();
        assert_eq!(metrics.pages_dispatched, 1);
        assert_eq!(metrics.pages_failed, 1);
        assert_eq!(metrics.files_processed, 0);
        assert_eq!(sink.attempts(), 10);
    }

    #[tokio::test]
    async fn test_ingest_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("u_ex240101.log"), numbered_lines(1500)).unwrap();
        std::fs::write(dir.path().join("u_ex240102.log"), numbered_lines(20)).unwrap();

        let sink = Arc::new(MemorySink::new());
        let ingestor = ingestor(sink.clone(), 1000, 8);

        let report = ingestor
            .ingest(read_dir(dir.path()), |_| {}, |_| {})
            .await
            .unwrap();

        assert_eq!(report.files_processed, 2);
        assert_eq!(report.pages_dispatched, 3);
        assert_eq!(report.records_saved, 1520);
        assert_eq!(sink.row_count(), 1520);
    }
}

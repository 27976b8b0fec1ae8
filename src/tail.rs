//! Incremental ingestion of the audit log.
//!
//! A [`LogTailer`] owns a [`TailState`] and, once per poll interval, re-reads
//! the source file from the start, parses every line it has not ingested yet,
//! and appends the results to the [`LogStore`]. Lines are deduplicated by
//! their exact text for the lifetime of the process.
//!
//! A trailing line without its `\n` is still being written and is left for a
//! later tick. Lines that fail to parse are not recorded and are looked at
//! again on the next tick.
//! Lines whose append keeps failing are retried up to `max_attempts` ticks in
//! a row and then quarantined.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, TailerConfig};
use crate::db;
use crate::migrate;
use crate::parser::parse_line;
use crate::store::{LogStore, SqliteLogStore};

/// Which raw lines the tailer has already dealt with.
#[derive(Debug, Default)]
pub struct TailState {
    seen: HashSet<String>,
    failures: HashMap<String, u32>,
    quarantined: HashSet<String>,
}

impl TailState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the line needs no further work: ingested or quarantined.
    pub fn is_done(&self, line: &str) -> bool {
        self.seen.contains(line) || self.quarantined.contains(line)
    }

    pub fn record_ingested(&mut self, line: &str) {
        self.failures.remove(line);
        self.seen.insert(line.to_string());
    }

    /// Counts one failed append. Returns `true` when this failure pushed the
    /// line into quarantine.
    pub fn record_failure(&mut self, line: &str, max_attempts: u32) -> bool {
        let count = self.failures.entry(line.to_string()).or_insert(0);
        *count += 1;
        if *count >= max_attempts {
            self.failures.remove(line);
            self.quarantined.insert(line.to_string());
            true
        } else {
            false
        }
    }

    pub fn ingested_count(&self) -> usize {
        self.seen.len()
    }

    pub fn quarantined_count(&self) -> usize {
        self.quarantined.len()
    }
}

/// Outcome of a single polling pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Lines that were new this tick (not already ingested or quarantined).
    pub new_lines: usize,
    /// An unterminated last line was held back until its producer finishes it.
    pub partial: bool,
    pub ingested: usize,
    pub malformed: usize,
    pub failed: usize,
    pub quarantined: usize,
}

pub struct LogTailer {
    path: PathBuf,
    interval: Duration,
    max_attempts: u32,
    store: Arc<dyn LogStore>,
    state: TailState,
}

impl LogTailer {
    pub fn new(config: &TailerConfig, store: Arc<dyn LogStore>) -> Self {
        Self {
            path: config.path.clone(),
            interval: config.poll_interval(),
            max_attempts: config.max_attempts.max(1),
            store,
            state: TailState::new(),
        }
    }

    pub fn state(&self) -> &TailState {
        &self.state
    }

    /// Runs one polling pass over the whole file.
    ///
    /// A missing file yields an empty report. Only read failures return
    /// `Err`; per-line store failures are counted in the report.
    pub async fn tick(&mut self) -> Result<TickReport> {
        let mut report = TickReport::default();

        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "log file not present yet");
                return Ok(report);
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read log file: {}", self.path.display()))
            }
        };
        let content = String::from_utf8_lossy(&bytes);
        let complete = match content.rfind('\n') {
            Some(end) => &content[..=end],
            None => "",
        };
        report.partial = complete.len() < content.len();

        for line in complete.lines() {
            if line.is_empty() || self.state.is_done(line) {
                continue;
            }
            report.new_lines += 1;

            let Some(entry) = parse_line(line) else {
                report.malformed += 1;
                continue;
            };

            match self.store.append(&entry).await {
                Ok(_) => {
                    self.state.record_ingested(line);
                    report.ingested += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    if self.state.record_failure(line, self.max_attempts) {
                        report.quarantined += 1;
                        error!(
                            error = %e,
                            line,
                            attempts = self.max_attempts,
                            "giving up on log line after repeated store failures"
                        );
                    } else {
                        warn!(error = %e, line, "failed to store log line; will retry");
                    }
                }
            }
        }

        Ok(report)
    }

    /// Polls until `cancel` fires, then returns the accumulated state.
    ///
    /// Cancellation is checked between ticks; a tick in progress completes.
    pub async fn run(mut self, cancel: CancellationToken) -> TailState {
        info!(
            path = %self.path.display(),
            interval_ms = self.interval.as_millis() as u64,
            "log tailer started"
        );

        loop {
            match self.tick().await {
                Ok(report) if report.ingested > 0 || report.failed > 0 => info!(
                    ingested = report.ingested,
                    malformed = report.malformed,
                    failed = report.failed,
                    quarantined = report.quarantined,
                    "tick"
                ),
                Ok(report) => debug!(malformed = report.malformed, "tick"),
                Err(e) => warn!(error = %e, "tailer tick failed"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(
            ingested = self.state.ingested_count(),
            quarantined = self.state.quarantined_count(),
            "log tailer stopped"
        );
        self.state
    }

    /// Starts the polling loop on its own tokio task.
    pub fn spawn(self) -> TailerHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));
        TailerHandle { cancel, task }
    }
}

/// Lifecycle handle for a spawned [`LogTailer`].
pub struct TailerHandle {
    cancel: CancellationToken,
    task: JoinHandle<TailState>,
}

impl TailerHandle {
    /// Signals the tailer to stop after its current tick and waits for it.
    pub async fn shutdown(self) -> Result<TailState> {
        self.cancel.cancel();
        self.task.await.context("log tailer task panicked")
    }
}

/// CLI entry point: a single ingestion pass over the configured log file.
///
/// Dedup state lives only for this pass, so running it twice against the
/// same file stores every line twice.
pub async fn run_sync(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let store = Arc::new(SqliteLogStore::new(pool.clone()));
    let mut tailer = LogTailer::new(&config.tailer, store);
    let report = tailer.tick().await;
    pool.close().await;
    let report = report?;

    println!("sync {}", config.tailer.path.display());
    println!("  new lines: {}", report.new_lines);
    println!("  ingested: {}", report.ingested);
    println!("  malformed: {}", report.malformed);
    println!("  failed: {}", report.failed);
    if report.partial {
        println!("  unterminated last line left for the next pass");
    }
    println!("ok");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LogEntry, StoredLogEntry};
    use crate::query::Predicate;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory store that refuses any entry whose message is `poison`.
    #[derive(Default)]
    struct MemoryStore {
        entries: Mutex<Vec<LogEntry>>,
    }

    impl MemoryStore {
        fn messages(&self) -> Vec<String> {
            self.entries
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.message.clone())
                .collect()
        }
    }

    #[async_trait]
    impl LogStore for MemoryStore {
        async fn append(&self, entry: &LogEntry) -> Result<i64> {
            if entry.message == "poison" {
                anyhow::bail!("constraint violation");
            }
            let mut entries = self.entries.lock().unwrap();
            entries.push(entry.clone());
            Ok(entries.len() as i64)
        }

        async fn query(&self, _predicate: &Predicate) -> Result<Vec<StoredLogEntry>> {
            Ok(Vec::new())
        }
    }

    fn tailer(tmp: &TempDir, store: Arc<MemoryStore>, max_attempts: u32) -> LogTailer {
        let config = TailerConfig {
            path: tmp.path().join("audit.log"),
            poll_interval_ms: 20,
            max_attempts,
        };
        LogTailer::new(&config, store)
    }

    fn append(tmp: &TempDir, text: &str) {
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(tmp.path().join("audit.log"))
            .unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_noop() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let mut t = tailer(&tmp, store.clone(), 3);

        let report = t.tick().await.unwrap();
        assert_eq!(report, TickReport::default());
        assert!(store.messages().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_ticks_do_not_duplicate() {
        let tmp = TempDir::new().unwrap();
        append(
            &tmp,
            "2024-01-01 10:00:00 [INFO] a - one\n2024-01-01 10:00:01 [INFO] a - two\n",
        );
        let store = Arc::new(MemoryStore::default());
        let mut t = tailer(&tmp, store.clone(), 3);

        assert_eq!(t.tick().await.unwrap().ingested, 2);
        for _ in 0..3 {
            let report = t.tick().await.unwrap();
            assert_eq!(report.new_lines, 0);
            assert_eq!(report.ingested, 0);
        }
        assert_eq!(store.messages(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_appended_lines_picked_up_next_tick() {
        let tmp = TempDir::new().unwrap();
        append(&tmp, "2024-01-01 10:00:00 [INFO] a - one\n");
        let store = Arc::new(MemoryStore::default());
        let mut t = tailer(&tmp, store.clone(), 3);
        t.tick().await.unwrap();

        append(&tmp, "2024-01-01 10:00:05 [ERROR] b - two\nnot a log line\n");
        let report = t.tick().await.unwrap();
        assert_eq!(report.ingested, 1);
        assert_eq!(report.malformed, 1);
        assert_eq!(store.messages(), vec!["one", "two"]);

        // The malformed line is looked at again but never stored.
        let report = t.tick().await.unwrap();
        assert_eq!(report.malformed, 1);
        assert_eq!(report.ingested, 0);
    }

    #[tokio::test]
    async fn test_unterminated_line_waits_for_newline() {
        let tmp = TempDir::new().unwrap();
        append(&tmp, "2024-01-01 10:00:00 [ERROR] auth - login fa");
        let store = Arc::new(MemoryStore::default());
        let mut t = tailer(&tmp, store.clone(), 3);

        let report = t.tick().await.unwrap();
        assert!(report.partial);
        assert_eq!(report.new_lines, 0);
        assert_eq!(report.malformed, 0);
        assert!(store.messages().is_empty());

        append(&tmp, "iled\n");
        let report = t.tick().await.unwrap();
        assert!(!report.partial);
        assert_eq!(report.ingested, 1);

        t.tick().await.unwrap();
        assert_eq!(store.messages(), vec!["login failed"]);
    }

    #[tokio::test]
    async fn test_identical_lines_collapse() {
        let tmp = TempDir::new().unwrap();
        append(
            &tmp,
            "2024-01-01 10:00:00 [INFO] a - same\n2024-01-01 10:00:00 [INFO] a - same\n",
        );
        let store = Arc::new(MemoryStore::default());
        let mut t = tailer(&tmp, store.clone(), 3);

        t.tick().await.unwrap();
        assert_eq!(store.messages(), vec!["same"]);
    }

    #[tokio::test]
    async fn test_failing_line_does_not_block_others_and_is_quarantined() {
        let tmp = TempDir::new().unwrap();
        append(
            &tmp,
            "2024-01-01 10:00:00 [INFO] a - poison\n2024-01-01 10:00:01 [INFO] a - healthy\n",
        );
        let store = Arc::new(MemoryStore::default());
        let mut t = tailer(&tmp, store.clone(), 2);

        let first = t.tick().await.unwrap();
        assert_eq!(first.ingested, 1);
        assert_eq!(first.failed, 1);
        assert_eq!(first.quarantined, 0);
        assert_eq!(store.messages(), vec!["healthy"]);

        let second = t.tick().await.unwrap();
        assert_eq!(second.failed, 1);
        assert_eq!(second.quarantined, 1);
        assert_eq!(t.state().quarantined_count(), 1);

        append(&tmp, "2024-01-01 10:00:02 [INFO] a - later\n");
        let third = t.tick().await.unwrap();
        assert_eq!(third.new_lines, 1);
        assert_eq!(third.failed, 0);
        assert_eq!(store.messages(), vec!["healthy", "later"]);
    }

    #[tokio::test]
    async fn test_spawned_tailer_stops_on_shutdown() {
        let tmp = TempDir::new().unwrap();
        append(&tmp, "2024-01-01 10:00:00 [INFO] a - one\n");
        let store = Arc::new(MemoryStore::default());
        let handle = tailer(&tmp, store.clone(), 3).spawn();

        tokio::time::sleep(Duration::from_millis(100)).await;
        append(&tmp, "2024-01-01 10:00:01 [INFO] a - two\n");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let state = tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
            .await
            .expect("tailer did not stop")
            .unwrap();
        assert_eq!(state.ingested_count(), 2);
        assert_eq!(store.messages(), vec!["one", "two"]);
    }

    #[test]
    fn test_failure_counter_resets_on_success() {
        let mut state = TailState::new();
        assert!(!state.record_failure("x", 3));
        assert!(!state.record_failure("x", 3));
        state.record_ingested("x");
        assert!(state.is_done("x"));
        assert_eq!(state.quarantined_count(), 0);
    }
}

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::classifier::{classify, EventKind, LogEvent};
use crate::config::WatchConfig;
use crate::cursor::{FileCursor, FileIdentity, PendingLine};
use crate::filter::should_notify;
use crate::notifier::{NotifyError, Notifier};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to open log file {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("I/O error on log file {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Notification for line {line} failed: {source}")]
    Notify { line: u64, source: NotifyError },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("Watch cancelled")]
    Cancelled,
}

impl WatchError {
    /// Fatal errors stop the watcher; everything else is retried next poll.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WatchError::Open { .. } | WatchError::Checkpoint(_))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WatcherStats {
    pub lines_processed: u64,
    pub lines_skipped: u64,
    pub events_matched: u64,
    pub notifications_sent: u64,
    pub notification_failures: u64,
    pub rotations: u64,
}

/// What a single poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing new since the last poll.
    Idle,
    /// New bytes were drained; `lines` lines were processed in this pass.
    Drained { rotated: bool, lines: u64 },
    /// The file was replaced but the new one holds nothing yet.
    Rotated,
}

/// Follows one log file and forwards the login events it is told to watch.
///
/// Each poll compares the identity of the file at `path` with the open
/// handle. A different identity means the log was rotated: whatever is
/// left in the old file is drained, the checkpoint is cleared, then the path
/// is reopened and read from the start. When the file has grown, complete lines are classified,
/// filtered and notified in order, and the checkpoint is advanced after
/// every line. A failed notification stops the pass without advancing,
/// so the same line is retried on the next poll.
///
/// A file truncated in place keeps its identity and is not detected as a
/// rotation; lines written before it grows past its old size are missed.
pub struct LogWatcher<N, S> {
    path: PathBuf,
    host_machine: String,
    watch: WatchConfig,
    notifier: N,
    store: S,
    cursor: Option<FileCursor>,
    seen_size: u64,
    truncation_warned: bool,
    stats: WatcherStats,
}

impl<N: Notifier, S: CheckpointStore> LogWatcher<N, S> {
    pub fn new(
        path: impl Into<PathBuf>,
        host_machine: impl Into<String>,
        watch: WatchConfig,
        notifier: N,
        store: S,
    ) -> Self {
        Self {
            path: path.into(),
            host_machine: host_machine.into(),
            watch,
            notifier,
            store,
            cursor: None,
            seen_size: 0,
            truncation_warned: false,
            stats: WatcherStats::default(),
        }
    }

    pub fn stats(&self) -> &WatcherStats {
        &self.stats
    }

    /// Open the log file. The baseline size is zero so that any content not
    /// yet covered by the checkpoint is drained on the first poll.
    pub fn open(&mut self) -> Result<(), WatchError> {
        let cursor = FileCursor::open(&self.path).map_err(|source| WatchError::Open {
            path: self.path.clone(),
            source,
        })?;

        info!(path = %self.path.display(), "Opened log file");
        self.cursor = Some(cursor);
        self.seen_size = 0;
        self.truncation_warned = false;
        Ok(())
    }

    /// Poll until cancelled or a fatal error occurs.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), WatchError> {
        if self.cursor.is_none() {
            self.open()?;
        }

        info!(
            path = %self.path.display(),
            interval = ?self.watch.poll_interval,
            accepted = self.watch.watch_accepted,
            failed = self.watch.watch_failed,
            invalid_username = self.watch.watch_failed_invalid_username,
            "Watching log file"
        );

        loop {
            match self.poll_once(&cancel).await {
                Ok(outcome) => debug!(?outcome, "Poll complete"),
                Err(WatchError::Cancelled) => break,
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Stopping watcher");
                    self.log_summary();
                    return Err(e);
                }
                Err(e) => warn!(error = %e, "Poll failed, retrying after interval"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.watch.poll_interval) => {}
            }
        }

        info!("Watcher cancelled");
        self.log_summary();
        Ok(())
    }

    /// One poll: check for rotation, then drain new lines if the file grew.
    pub async fn poll_once(&mut self, cancel: &CancellationToken) -> Result<PollOutcome, WatchError> {
        if self.cursor.is_none() {
            self.open()?;
        }

        let current = std::fs::metadata(&self.path)
            .map(|m| FileIdentity::of(&m))
            .map_err(|e| self.io_err(e))?;

        let mut rotated = false;
        if self.cursor.as_ref().map(FileCursor::identity) != Some(current) {
            self.handle_file_rotation(cancel).await?;
            rotated = true;
        }

        let size = match &self.cursor {
            Some(cursor) => cursor.file_len().map_err(|e| self.io_err(e))?,
            None => return Ok(PollOutcome::Idle),
        };

        if size < self.seen_size && !self.truncation_warned {
            warn!(
                path = %self.path.display(),
                size,
                seen = self.seen_size,
                "Log file shrank without being replaced; truncate-in-place rotation is not followed"
            );
            self.truncation_warned = true;
        }

        if size > self.seen_size {
            let lines = self.drain(cancel).await?;
            self.seen_size = size;
            return Ok(PollOutcome::Drained { rotated, lines });
        }

        Ok(if rotated {
            PollOutcome::Rotated
        } else {
            PollOutcome::Idle
        })
    }

    async fn handle_file_rotation(&mut self, cancel: &CancellationToken) -> Result<(), WatchError> {
        info!(path = %self.path.display(), "Log rotation detected");

        // Events written to the old file just before it was moved away.
        let has_unread = match &self.cursor {
            Some(cursor) => cursor.has_unread().map_err(|e| self.io_err(e))?,
            None => false,
        };
        if has_unread {
            let lines = self.drain(cancel).await?;
            debug!(lines, "Drained remainder of rotated file");
        }

        // Line numbers restart with the new file.
        self.store.clear_last_processed_line()?;

        let cursor = FileCursor::open(&self.path).map_err(|e| self.io_err(e))?;
        self.cursor = Some(cursor);
        self.seen_size = 0;
        self.truncation_warned = false;
        self.stats.rotations += 1;

        info!(path = %self.path.display(), "Reopened log file");
        Ok(())
    }

    /// Process every complete unread line. The checkpoint is read once per pass.
    async fn drain(&mut self, cancel: &CancellationToken) -> Result<u64, WatchError> {
        let Some(mut cursor) = self.cursor.take() else {
            return Ok(0);
        };
        let result = self.drain_cursor(&mut cursor, cancel).await;
        self.cursor = Some(cursor);
        result
    }

    async fn drain_cursor(
        &mut self,
        cursor: &mut FileCursor,
        cancel: &CancellationToken,
    ) -> Result<u64, WatchError> {
        let checkpoint = self.store.last_processed_line()?;

        let mut processed = 0;
        while let Some(line) = cursor.read_pending().map_err(|e| self.io_err(e))? {
            if checkpoint.is_some_and(|done| line.index <= done) {
                self.stats.lines_skipped += 1;
                cursor.consume(&line);
                continue;
            }

            self.process_line(&line, cancel).await?;
            cursor.consume(&line);
            processed += 1;
        }

        Ok(processed)
    }

    async fn process_line(
        &mut self,
        line: &PendingLine,
        cancel: &CancellationToken,
    ) -> Result<(), WatchError> {
        self.stats.lines_processed += 1;

        if let Some(event) = classify(&line.text) {
            self.stats.events_matched += 1;

            if should_notify(Some(event.event_kind), &self.watch) {
                let event = event.with_host(&self.host_machine);

                let result = tokio::select! {
                    _ = cancel.cancelled() => return Err(WatchError::Cancelled),
                    result = self.notifier.notify(&event) => result,
                };

                if let Err(source) = result {
                    self.stats.notification_failures += 1;
                    return Err(WatchError::Notify {
                        line: line.index,
                        source,
                    });
                }

                self.stats.notifications_sent += 1;
                info!(line = line.index, kind = %event.event_kind, "Notification sent");
            } else {
                debug!(line = line.index, kind = %event.event_kind, "Event not watched");
            }
        }

        self.store.update_last_processed_line(line.index)?;
        Ok(())
    }

    fn io_err(&self, source: io::Error) -> WatchError {
        WatchError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn log_summary(&self) {
        info!(
            lines_processed = self.stats.lines_processed,
            lines_skipped = self.stats.lines_skipped,
            events_matched = self.stats.events_matched,
            notifications_sent = self.stats.notifications_sent,
            notification_failures = self.stats.notification_failures,
            rotations = self.stats.rotations,
            "Watcher summary"
        );
    }
}

/// Result of classifying an existing log without following it.
#[derive(Debug, Default)]
pub struct ScanSummary {
    pub lines: u64,
    pub counts: HashMap<EventKind, usize>,
    /// Events that would be notified, stamped with the host name.
    pub notifiable: Vec<LogEvent>,
}

/// Classify every complete line currently in `path`. Sends nothing and
/// leaves the checkpoint alone.
pub fn scan_existing(
    path: &Path,
    host_machine: &str,
    watch: &WatchConfig,
) -> Result<ScanSummary, WatchError> {
    let io_err = |source| WatchError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(|source| WatchError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let mut summary = ScanSummary::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).map_err(io_err)? == 0 {
            break;
        }
        summary.lines += 1;

        let line = String::from_utf8_lossy(&buf);
        if let Some(event) = classify(line.trim_end_matches(['\n', '\r'])) {
            *summary.counts.entry(event.event_kind).or_insert(0) += 1;
            if should_notify(Some(event.event_kind), watch) {
                summary.notifiable.push(event.with_host(host_machine));
            }
        }
    }

    Ok(summary)
}

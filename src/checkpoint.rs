//! Durable record of the last fully processed log line.
//!
//! The state file holds the zero-based index of that line as plain decimal
//! text. A missing (or empty) file means nothing has been processed yet.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Failed to read state file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("State file {path} does not hold a line number: {contents:?}")]
    Corrupt { path: PathBuf, contents: String },

    #[error("Failed to write state file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Where the tail engine keeps its progress.
///
/// Only the engine reads or writes it, one call at a time.
pub trait CheckpointStore: Send {
    /// Index of the last processed line, or `None` on a first run.
    fn last_processed_line(&self) -> Result<Option<u64>, CheckpointError>;

    /// Persist `line` as processed. Must be on stable storage when this returns `Ok`.
    fn update_last_processed_line(&mut self, line: u64) -> Result<(), CheckpointError>;

    /// Forget all progress, so the next read returns `None`. Same durability
    /// as an update.
    fn clear_last_processed_line(&mut self) -> Result<(), CheckpointError>;
}

#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_err(&self, source: io::Error) -> CheckpointError {
        CheckpointError::Write {
            path: self.path.clone(),
            source,
        }
    }

    /// Swap in new contents through a synced temp file and a rename.
    fn replace_contents(&self, contents: &str) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.write_err(e))?;
        }

        let tmp = self.tmp_path();
        let write_res = (|| -> io::Result<()> {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            f.write_all(contents.as_bytes())?;
            f.flush()?;
            f.sync_all()?;
            fs::rename(&tmp, &self.path)?;
            sync_parent_dir(&self.path);
            Ok(())
        })();

        if let Err(e) = write_res {
            let _ = fs::remove_file(&tmp);
            return Err(self.write_err(e));
        }
        Ok(())
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn last_processed_line(&self) -> Result<Option<u64>, CheckpointError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CheckpointError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let trimmed = contents.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        trimmed
            .parse::<u64>()
            .map(Some)
            .map_err(|_| CheckpointError::Corrupt {
                path: self.path.clone(),
                contents: trimmed.to_string(),
            })
    }

    fn update_last_processed_line(&mut self, line: u64) -> Result<(), CheckpointError> {
        self.replace_contents(&line.to_string())?;
        debug!(line, path = %self.path.display(), "Checkpoint updated");
        Ok(())
    }

    fn clear_last_processed_line(&mut self) -> Result<(), CheckpointError> {
        // an empty state file reads back as a first run
        self.replace_contents("")?;
        debug!(path = %self.path.display(), "Checkpoint cleared");
        Ok(())
    }
}

/// Make the rename itself durable. Best effort; not every platform lets a
/// directory be opened for syncing.
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

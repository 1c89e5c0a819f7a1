//! JSONL audit log writer with daily file rotation.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use tracing::debug;

use super::{AuditEntry, AuditLogger};
use crate::{AppError, Result};

/// File currently receiving entries.
struct OpenLog {
    date: NaiveDate,
    writer: BufWriter<File>,
}

/// A daily-rotating JSONL audit log writer.
///
/// Appends to `<log_dir>/audit-YYYY-MM-DD.jsonl`, switching files
/// when the UTC date changes between writes. Each entry is flushed before
/// `log_entry` returns.
pub struct JsonlAuditWriter {
    log_dir: PathBuf,
    current: Mutex<Option<OpenLog>>,
}

impl JsonlAuditWriter {
    /// Construct a writer that stores logs in `log_dir`, creating it if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the directory cannot be created.
    pub fn new(log_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&log_dir).map_err(|e| {
            AppError::Io(format!(
                "failed to create audit log directory {}: {e}",
                log_dir.display()
            ))
        })?;
        Ok(Self {
            log_dir,
            current: Mutex::new(None),
        })
    }

    /// Path of the file that receives entries written on `date`.
    #[must_use]
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        log_path(&self.log_dir, date)
    }
}

fn log_path(log_dir: &Path, date: NaiveDate) -> PathBuf {
    log_dir.join(format!("audit-{date}.jsonl"))
}

fn open_log(log_dir: &Path, date: NaiveDate) -> Result<OpenLog> {
    let path = log_path(log_dir, date);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| AppError::Io(format!("failed to open audit log {}: {e}", path.display())))?;
    debug!(path = %path.display(), "audit log opened");
    Ok(OpenLog {
        date,
        writer: BufWriter::new(file),
    })
}

impl AuditLogger for JsonlAuditWriter {
    fn log_entry(&self, entry: AuditEntry) -> Result<()> {
        let line = serde_json::to_string(&entry)
            .map_err(|e| AppError::Io(format!("failed to serialize audit entry: {e}")))?;
        let today = Utc::now().date_naive();

        let mut current = self
            .current
            .lock()
            .map_err(|_| AppError::Io("audit writer mutex poisoned".into()))?;

        let log = match current.take() {
            Some(log) if log.date == today => log,
            _ => open_log(&self.log_dir, today)?,
        };
        let log = current.insert(log);

        writeln!(log.writer, "{line}")
            .and_then(|()| log.writer.flush())
            .map_err(|e| AppError::Io(format!("audit write failed: {e}")))
    }
}

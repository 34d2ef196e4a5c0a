//! Persisted event log.
//!
//! Every non-heartbeat event ends up here as one line (see
//! [`atm_protocol::format_log_line`]). Lines are appended and flushed one
//! at a time; concurrent writers never interleave within a line because the
//! file handle sits behind its own mutex.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::error;

use atm_core::Event;
use atm_protocol::format_log_line;

use crate::error::LockPoisoned;

/// Sink for persisted events.
pub trait LogWriter: Send + Sync {
    /// Appends one event. Returns once the line has been flushed.
    fn append(&self, event: &Event) -> Result<(), LogError>;
}

/// Appends events to a file opened in append mode.
#[derive(Debug)]
pub struct FileLogWriter {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLogWriter {
    /// Opens (or creates) the log file, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LogError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| LogError::Open {
                    path: path.clone(),
                    error: e.to_string(),
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LogError::Open {
                path: path.clone(),
                error: e.to_string(),
            })?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogWriter for FileLogWriter {
    fn append(&self, event: &Event) -> Result<(), LogError> {
        let line = format_log_line(event);
        let mut file = self
            .file
            .lock()
            .map_err(|_| LockPoisoned::new("event log"))?;

        writeln!(file, "{line}")
            .and_then(|()| file.flush())
            .map_err(|e| LogError::Write {
                path: self.path.clone(),
                error: e.to_string(),
            })
    }
}

/// Errors from the event log.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Failed to open event log {path}: {error}")]
    Open { path: PathBuf, error: String },

    #[error("Failed to write event log {path}: {error}")]
    Write { path: PathBuf, error: String },

    #[error(transparent)]
    Poisoned(#[from] LockPoisoned),
}

/// Appends `event`, absorbing I/O failures.
///
/// Write failures are reported and swallowed so a full disk does not stop
/// health tracking. Only a poisoned lock propagates. Returns whether the
/// line was written.
pub(crate) fn persist(log: &dyn LogWriter, event: &Event) -> Result<bool, LockPoisoned> {
    match log.append(event) {
        Ok(()) => Ok(true),
        Err(LogError::Poisoned(e)) => Err(e),
        Err(e) => {
            error!(
                origin = %event.origin(),
                code = event.event_type().code(),
                serial = event.serial(),
                error = %e,
                "Failed to persist event"
            );
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atm_core::{EventType, OriginId};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn event(origin: u32, event_type: EventType, serial: u64) -> Event {
        let timestamp = Utc.with_ymd_and_hms(2026, 10, 14, 8, 0, 0).unwrap();
        Event::new(OriginId::new(origin), timestamp, event_type, serial)
    }

    #[test]
    fn test_append_writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let log = FileLogWriter::open(&path).unwrap();

        log.append(&event(17, EventType::ServiceModeEntered, 1)).unwrap();
        log.append(&event(17, EventType::ServiceModeLeft, 2)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines,
            vec![
                "1 | 2026-10-14 08:00:00 | 17 | 6 | Service mode entered",
                "2 | 2026-10-14 08:00:00 | 17 | 7 | Service mode left",
            ]
        );
    }

    #[test]
    fn test_reopen_appends_instead_of_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");

        FileLogWriter::open(&path)
            .unwrap()
            .append(&event(1, EventType::LowCash, 1))
            .unwrap();
        FileLogWriter::open(&path)
            .unwrap()
            .append(&event(2, EventType::LowPaper, 1))
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("var").join("atm").join("events.log");

        let log = FileLogWriter::open(&path).unwrap();
        assert_eq!(log.path(), path.as_path());
        assert!(path.exists());
    }

    #[test]
    fn test_open_failure_names_path() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending
        let err = FileLogWriter::open(dir.path()).unwrap_err();
        assert!(matches!(err, LogError::Open { .. }));
        assert!(err.to_string().contains(&dir.path().display().to_string()));
    }

    #[test]
    fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let log = Arc::new(FileLogWriter::open(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|origin| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for serial in 0..50 {
                        log.append(&event(origin, EventType::PrinterError, serial))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 400);
        assert!(contents
            .lines()
            .all(|line| line.ends_with("| 11 | Printer error")));
    }

    struct FailingLog;

    impl LogWriter for FailingLog {
        fn append(&self, _event: &Event) -> Result<(), LogError> {
            Err(LogError::Write {
                path: PathBuf::from("/full/disk.log"),
                error: "No space left on device".to_string(),
            })
        }
    }

    struct PoisonedLog;

    impl LogWriter for PoisonedLog {
        fn append(&self, _event: &Event) -> Result<(), LogError> {
            Err(LockPoisoned::new("event log").into())
        }
    }

    #[test]
    fn test_persist_absorbs_write_errors() {
        let written = persist(&FailingLog, &event(1, EventType::PaperOut, 1)).unwrap();
        assert!(!written);
    }

    #[test]
    fn test_persist_propagates_poison() {
        let err = persist(&PoisonedLog, &event(1, EventType::PaperOut, 1)).unwrap_err();
        assert_eq!(err.resource, "event log");
    }
}

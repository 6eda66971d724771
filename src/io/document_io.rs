use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::io::config_io::{CONFIG_FILE, read_config};
use crate::io::lock::{DocumentLock, LockError};
use crate::io::recovery::{RecoveryCategory, RecoveryEntry, atomic_write, log_recovery};
use crate::model::document::ScheduleDocument;
use crate::model::schedule::Schedule;

/// Name of the directory holding a schedule's files
pub const SCHEDULE_DIR: &str = "schedule";

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("not a schedule: no schedule/schedule.toml found")]
    NotASchedule,
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("could not parse schedule.toml: {0}")]
    ConfigParseError(#[from] toml::de::Error),
    #[error("could not serialize schedule.toml: {0}")]
    ConfigSerializeError(#[from] toml::ser::Error),
    #[error("could not serialize document: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("save worker stopped; document not written")]
    WorkerStopped,
}

/// Where the cell store loads its document from and saves it to
pub trait DocumentStore {
    /// The stored document, or `None` when nothing has been saved yet.
    fn load(&mut self) -> Result<Option<ScheduleDocument>, DocumentError>;
    fn save(&mut self, doc: &ScheduleDocument) -> Result<(), DocumentError>;
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Walk up from `start` looking for a directory containing
/// `schedule/schedule.toml`.
pub fn discover_schedule(start: &Path) -> Result<PathBuf, DocumentError> {
    let mut current = start.to_path_buf();
    loop {
        let schedule_dir = current.join(SCHEDULE_DIR);
        if schedule_dir.join(CONFIG_FILE).is_file() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(DocumentError::NotASchedule);
        }
    }
}

pub fn load_schedule(root: &Path) -> Result<Schedule, DocumentError> {
    let schedule_dir = root.join(SCHEDULE_DIR);
    if !schedule_dir.is_dir() {
        return Err(DocumentError::NotASchedule);
    }
    let config = read_config(&schedule_dir)?;
    Ok(Schedule {
        root: root.to_path_buf(),
        schedule_dir,
        config,
    })
}

/// The persisted document as raw JSON, before any cell decoding.
/// Used to validate what is actually on disk.
pub fn load_raw_document(path: &Path) -> Result<Option<serde_json::Value>, DocumentError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).map_err(|e| DocumentError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let value = serde_json::from_str(&text).map_err(|e| DocumentError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(Some(value))
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// Stores the document as `<schedule_dir>/<document_id>.json`.
///
/// Writes hold the directory lock and go through a temp file. If the file
/// changed on disk since this store last read or wrote it, the replaced
/// version is kept in the recovery log before being overwritten.
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    schedule_dir: PathBuf,
    path: PathBuf,
    last_seen: Option<DateTime<Utc>>,
}

impl FileDocumentStore {
    pub fn new(schedule: &Schedule) -> Self {
        FileDocumentStore {
            schedule_dir: schedule.schedule_dir.clone(),
            path: schedule.document_path(),
            last_seen: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<(ScheduleDocument, String)>, DocumentError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path).map_err(|e| DocumentError::ReadError {
            path: self.path.clone(),
            source: e,
        })?;
        let doc = serde_json::from_str(&text).map_err(|e| DocumentError::ParseError {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(Some((doc, text)))
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl DocumentStore for FileDocumentStore {
    fn load(&mut self) -> Result<Option<ScheduleDocument>, DocumentError> {
        let doc = self.read()?.map(|(doc, _)| doc);
        self.last_seen = doc.as_ref().and_then(|d| d.last_updated);
        Ok(doc)
    }

    fn save(&mut self, doc: &ScheduleDocument) -> Result<(), DocumentError> {
        let _lock = DocumentLock::acquire_default(&self.schedule_dir)?;

        // An unreadable file is replaced rather than blocking the save
        if let Ok(Some((on_disk, text))) = self.read()
            && on_disk.is_newer_than(self.last_seen)
        {
            log_recovery(
                &self.schedule_dir,
                RecoveryEntry {
                    timestamp: Utc::now(),
                    category: RecoveryCategory::Conflict,
                    description: "document changed by another writer".to_string(),
                    fields: vec![("Target".to_string(), self.file_name())],
                    body: text,
                },
            );
        }

        let mut body = serde_json::to_string_pretty(doc)?;
        body.push('\n');
        if let Err(e) = atomic_write(&self.path, body.as_bytes()) {
            log_recovery(
                &self.schedule_dir,
                RecoveryEntry {
                    timestamp: Utc::now(),
                    category: RecoveryCategory::Write,
                    description: "document write failed".to_string(),
                    fields: vec![
                        ("Target".to_string(), self.file_name()),
                        ("Error".to_string(), e.to_string()),
                    ],
                    body,
                },
            );
            return Err(DocumentError::WriteError {
                path: self.path.clone(),
                source: e,
            });
        }
        self.last_seen = doc.last_updated;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Keeps every saved document in memory. Clones share state, so a test can
/// hold one handle while the store owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    initial: Option<ScheduleDocument>,
    saves: Arc<Mutex<Vec<ScheduleDocument>>>,
    fail: Arc<AtomicBool>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(doc: ScheduleDocument) -> Self {
        MemoryDocumentStore {
            initial: Some(doc),
            ..Self::default()
        }
    }

    /// Make subsequent saves fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn saves(&self) -> Vec<ScheduleDocument> {
        self.saves.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn last_saved(&self) -> Option<ScheduleDocument> {
        self.saves.lock().ok().and_then(|s| s.last().cloned())
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn load(&mut self) -> Result<Option<ScheduleDocument>, DocumentError> {
        Ok(self.last_saved().or_else(|| self.initial.clone()))
    }

    fn save(&mut self, doc: &ScheduleDocument) -> Result<(), DocumentError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DocumentError::IoError(std::io::Error::other(
                "simulated write failure",
            )));
        }
        if let Ok(mut saves) = self.saves.lock() {
            saves.push(doc.clone());
        }
        Ok(())
    }
}

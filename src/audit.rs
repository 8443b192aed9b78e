//! Append-only audit trail of triage decisions.
//!
//! The store is a single JSON array, rewritten in full on every append via
//! a temp file in the same directory followed by an atomic rename. A reader
//! sees either the previous committed array or the new one, never a torn
//! write. An unparseable store is reset to empty (its history is lost) so
//! that corruption never blocks future appends.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::error::AuditError;
use crate::pipeline::types::{Category, Verdict};

/// One durable line of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// ISO-8601 (RFC 3339, UTC).
    pub timestamp: String,
    pub subject: String,
    pub classification: Category,
    pub critique: Verdict,
    /// Side effects that failed during dispatch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_errors: Vec<String>,
}

impl AuditRecord {
    pub fn new(subject: impl Into<String>, classification: Category, critique: Verdict) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            subject: subject.into(),
            classification,
            critique,
            action_errors: Vec::new(),
        }
    }

    pub fn with_action_errors(mut self, errors: Vec<String>) -> Self {
        self.action_errors = errors;
        self
    }
}

/// Audit storage medium.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Durably append `record` after every previously appended record.
    async fn append(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// Uncommitted records kept across failed writes before the oldest are dropped.
pub const MAX_PENDING_RECORDS: usize = 1000;

/// JSON file audit log.
///
/// Single writer: appends are serialized by an internal lock. Records whose
/// write failed stay queued and are committed, in order, ahead of the next
/// append. The queue holds at most `max_pending` records; beyond that the
/// oldest are dropped.
pub struct JsonFileAuditLog {
    path: PathBuf,
    pending: Mutex<Vec<AuditRecord>>,
    max_pending: usize,
}

impl JsonFileAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pending: Mutex::new(Vec::new()),
            max_pending: MAX_PENDING_RECORDS,
        }
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back the committed records. A corrupt store reads as empty.
    pub async fn load(&self) -> Result<Vec<AuditRecord>, AuditError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_records(&path)).await?
    }

    /// Records queued after a failed write, not yet committed.
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[async_trait]
impl AuditStore for JsonFileAuditLog {
    async fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        let mut pending = self.pending.lock().await;
        pending.push(record);

        if pending.len() > self.max_pending {
            let dropped = pending.len() - self.max_pending;
            pending.drain(..dropped);
            error!(
                path = %self.path.display(),
                dropped,
                "Audit queue full, dropping oldest uncommitted records"
            );
        }

        let batch = pending.clone();
        let path = self.path.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || commit(&path, &batch)).await? {
            warn!(
                path = %self.path.display(),
                pending = pending.len(),
                error = %e,
                "Audit write failed, records kept for retry"
            );
            return Err(e);
        }

        debug!(path = %self.path.display(), appended = pending.len(), "Audit store updated");
        pending.clear();
        Ok(())
    }
}

/// Load the existing sequence, add `batch`, and atomically replace the store.
fn commit(path: &Path, batch: &[AuditRecord]) -> Result<(), AuditError> {
    let mut records = read_records(path)?;
    records.extend_from_slice(batch);
    let staged = stage(path, &records)?;
    staged.persist(path)?;
    Ok(())
}

/// Missing or corrupt store → empty sequence. Other IO failures propagate so
/// an unreadable store is never overwritten.
fn read_records(path: &Path) -> Result<Vec<AuditRecord>, AuditError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    match serde_json::from_slice(&bytes) {
        Ok(records) => Ok(records),
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Audit store corrupted, resetting to empty"
            );
            Ok(Vec::new())
        }
    }
}

/// Write `records` to a synced temp file beside `path`. Dropping the result
/// without persisting removes the temp file and leaves `path` untouched.
fn stage(path: &Path, records: &[AuditRecord]) -> Result<NamedTempFile, AuditError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, records)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

//! Session records, heartbeats, and reaping.
//!
//! A session record is written once when the session opens. Its modification
//! time is the heartbeat: the owning client bumps it by opening the existing
//! file (never creating it) and touching it. A record whose heartbeat is older
//! than its declared timeout belongs to a dead session. Any client may reap it:
//! the record is first renamed to `<id>.reaping` (only one reaper wins the
//! rename), then the session's ephemeral nodes are removed, then the record.

use super::atomic::atomic_write;
use super::layout::{EphemeralRecord, Layout};
use crate::error::{Result, TurnstileError};
use crate::locks::owner_string;
use crate::namespace::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Session record stored in `sessions/<id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session identifier.
    pub id: SessionId,

    /// Owner of the session (e.g., `user@HOST`).
    pub owner: String,

    /// Process ID of the session's client.
    pub pid: u32,

    /// When the session was opened.
    pub created_at: DateTime<Utc>,

    /// Heartbeat timeout declared by the client.
    pub timeout_ms: u64,

    /// Time of the last heartbeat (file modification time). Not stored.
    #[serde(skip)]
    pub heartbeat_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    fn new(id: SessionId, timeout: Duration) -> Self {
        Self {
            id,
            owner: owner_string(),
            pid: std::process::id(),
            created_at: Utc::now(),
            timeout_ms: timeout.as_millis() as u64,
            heartbeat_at: None,
        }
    }

    /// Whether the heartbeat is older than the declared timeout.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.heartbeat_at {
            Some(beat) => (now - beat).num_milliseconds() > self.timeout_ms as i64,
            None => true,
        }
    }
}

/// Outcome of a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Heartbeat {
    Alive,
    /// The record is gone: the session was reaped.
    Reaped,
    /// The directory could not be reached.
    Unreachable,
}

pub(super) fn write_record(layout: &Layout, id: &SessionId, timeout: Duration) -> Result<()> {
    let record = SessionRecord::new(id.clone(), timeout);
    let json = serde_json::to_string_pretty(&record).map_err(|e| {
        TurnstileError::Storage(format!("failed to serialize session record: {}", e))
    })?;
    atomic_write(layout.session_record(id), json.as_bytes())
}

pub(super) fn heartbeat(layout: &Layout, id: &SessionId) -> Heartbeat {
    let path = layout.session_record(id);
    let file = match OpenOptions::new().append(true).open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Heartbeat::Reaped,
        Err(e) => {
            tracing::warn!(session = %id, error = %e, "heartbeat failed");
            return Heartbeat::Unreachable;
        }
    };
    match file.set_modified(SystemTime::now()) {
        Ok(()) => Heartbeat::Alive,
        Err(e) => {
            tracing::warn!(session = %id, error = %e, "heartbeat failed");
            Heartbeat::Unreachable
        }
    }
}

fn read_record(path: &Path) -> Option<SessionRecord> {
    let content = fs::read_to_string(path).ok()?;
    let mut record: SessionRecord = serde_json::from_str(&content).ok()?;
    record.heartbeat_at = fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from);
    Some(record)
}

/// List all session records in a service directory, oldest first.
pub fn list_sessions(dir: &Path) -> Result<Vec<SessionRecord>> {
    let layout = Layout::new(dir);
    let sessions_dir = layout.sessions_dir();
    if !sessions_dir.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(&sessions_dir).map_err(|e| {
        TurnstileError::Storage(format!(
            "failed to read sessions directory '{}': {}",
            sessions_dir.display(),
            e
        ))
    })?;

    let mut records: Vec<SessionRecord> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
        .filter_map(|path| read_record(&path))
        .collect();
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(records)
}

/// Reap every expired session in a service directory.
///
/// Returns the ids of the sessions this call reaped.
pub fn reap_expired(dir: &Path) -> Result<Vec<SessionId>> {
    let layout = Layout::new(dir);
    reap_with(&layout, None)
}

/// Reap expired sessions, never touching `keep` (the caller's own session).
pub(super) fn reap_with(layout: &Layout, keep: Option<&SessionId>) -> Result<Vec<SessionId>> {
    let now = Utc::now();
    let mut reaped = Vec::new();
    for record in list_sessions(layout.root())? {
        if Some(&record.id) == keep || !record.is_expired(now) {
            continue;
        }
        let claimed = layout.reaping_record(&record.id);
        if fs::rename(layout.session_record(&record.id), &claimed).is_err() {
            // Another reaper won, or the owner closed it.
            continue;
        }
        tracing::info!(session = %record.id, owner = %record.owner, "reaping expired session");
        remove_ephemerals(layout, &record.id)?;
        let _ = fs::remove_file(&claimed);
        reaped.push(record.id);
    }

    // Finish reaps that a crashed reaper left behind.
    if let Ok(entries) = fs::read_dir(layout.sessions_dir()) {
        for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
            if path.extension().and_then(|e| e.to_str()) != Some("reaping") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                let id = SessionId::new(stem);
                remove_ephemerals(layout, &id)?;
                let _ = fs::remove_file(&path);
            }
        }
    }

    Ok(reaped)
}

/// Remove every ephemeral node owned by `id`.
pub(super) fn remove_ephemerals(layout: &Layout, id: &SessionId) -> Result<usize> {
    let mut removed = 0;
    let mut pending = vec![layout.tree_dir()];
    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(TurnstileError::Storage(format!(
                    "failed to scan '{}': {}",
                    dir.display(),
                    e
                )));
            }
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            match entry.file_type() {
                Ok(t) if t.is_dir() => pending.push(path),
                Ok(t) if t.is_file() => {
                    let owned = fs::read_to_string(&path)
                        .ok()
                        .and_then(|c| serde_json::from_str::<EphemeralRecord>(&c).ok())
                        .is_some_and(|r| &r.session == id);
                    if owned && fs::remove_file(&path).is_ok() {
                        removed += 1;
                    }
                }
                _ => {}
            }
        }
    }
    Ok(removed)
}

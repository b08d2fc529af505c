//! On-disk layout of a shared-directory coordination service.
//!
//! ```text
//! <dir>/
//!   tree/                       namespace root `/`
//!     turnstile/                persistent node (directory)
//!       .seq                    sequence counter for children
//!       .seq.lock               held while the counter is bumped
//!       job-42/
//!         job-42_lock_0000000003    ephemeral node (JSON file)
//!   sessions/
//!     <session-id>.json         session record; mtime is the heartbeat
//! ```
//!
//! Names starting with `.` are reserved for bookkeeping and never appear as
//! nodes.

use crate::error::{Result, TurnstileError};
use crate::namespace::{SessionId, path};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Data file stored inside a persistent node's directory.
pub(super) const DATA_FILE: &str = ".data";

/// Contents of an ephemeral node file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct EphemeralRecord {
    pub session: SessionId,
    pub created_at: DateTime<Utc>,
    pub data: String,
}

#[derive(Debug, Clone)]
pub(super) struct Layout {
    root: PathBuf,
}

impl Layout {
    pub(super) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub(super) fn root(&self) -> &Path {
        &self.root
    }

    pub(super) fn tree_dir(&self) -> PathBuf {
        self.root.join("tree")
    }

    pub(super) fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    pub(super) fn session_record(&self, id: &SessionId) -> PathBuf {
        self.sessions_dir().join(format!("{}.json", id))
    }

    /// Claimed-for-reaping name of a session record.
    pub(super) fn reaping_record(&self, id: &SessionId) -> PathBuf {
        self.sessions_dir().join(format!("{}.reaping", id))
    }

    /// Filesystem location of a namespace node.
    pub(super) fn node(&self, node_path: &str) -> Result<PathBuf> {
        path::validate(node_path)?;
        let mut out = self.tree_dir();
        for component in node_path.split('/').filter(|c| !c.is_empty()) {
            if component.starts_with('.') {
                return Err(TurnstileError::InvalidPath(format!(
                    "'{}' uses a reserved name",
                    node_path
                )));
            }
            out.push(component);
        }
        Ok(out)
    }
}

/// Map an I/O error on `node_path` to the namespace error taxonomy.
pub(super) fn io_error(node_path: &str, err: std::io::Error) -> TurnstileError {
    match err.kind() {
        std::io::ErrorKind::NotFound => TurnstileError::NoSuchNode(node_path.to_string()),
        std::io::ErrorKind::AlreadyExists => TurnstileError::NodeExists(node_path.to_string()),
        _ => TurnstileError::Storage(format!("'{}': {}", node_path, err)),
    }
}

//! Shared-directory coordination service.
//!
//! Processes that can see the same directory (one host, or a shared
//! filesystem with reliable exclusive create and rename) coordinate through it
//! directly, without a server. The endpoint of a session is the directory path.
//!
//! Persistent nodes are directories and ephemeral nodes are JSON files created
//! with create-new semantics. Sessions prove liveness by heartbeating their
//! record; a session that stops heartbeating for longer than its timeout is
//! reaped by whichever client notices first, which deletes its ephemeral nodes.
//! Watches are detected by polling.

pub mod atomic;
mod client;
mod layout;
mod sequence;
mod session;


pub use client::FsClient;
pub use session::{SessionRecord, list_sessions, reap_expired};

use crate::error::{Result, TurnstileError};
use crate::namespace::{Ensemble, NamespaceClient};
use layout::Layout;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Default interval between watch polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Opens sessions against service directories.
#[derive(Debug, Clone)]
pub struct FsService {
    poll_interval: Duration,
}

impl Default for FsService {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl FsService {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Open a session against the service rooted at `dir`.
    pub fn connect(&self, dir: &Path, session_timeout: Duration) -> Result<FsClient> {
        if !dir.is_dir() {
            return Err(TurnstileError::Connect(format!(
                "service directory '{}' does not exist",
                dir.display()
            )));
        }
        let layout = Layout::new(dir);
        for sub in [layout.tree_dir(), layout.sessions_dir()] {
            fs::create_dir_all(&sub).map_err(|e| {
                TurnstileError::Connect(format!("failed to prepare '{}': {}", sub.display(), e))
            })?;
        }
        FsClient::open(layout, session_timeout, self.poll_interval)
    }
}

impl Ensemble for FsService {
    fn dial(&self, endpoint: &str, session_timeout: Duration) -> Result<Arc<dyn NamespaceClient>> {
        let client: Arc<dyn NamespaceClient> =
            Arc::new(self.connect(Path::new(endpoint), session_timeout)?);
        Ok(client)
    }
}

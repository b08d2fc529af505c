//! In-process coordination service.
//!
//! A complete implementation of the namespace contract held in memory: a node
//! tree with per-parent sequence counters, sessions that own ephemeral nodes,
//! and one-shot watches delivered on a dispatch thread per session.
//!
//! Sessions never time out on their own. Tests and embedders drive failures
//! through the administrative controls on [`MemoryService`]:
//! [`MemoryService::expire_session`], [`MemoryService::disconnect_session`]
//! and [`MemoryService::set_available`].

mod client;
mod tree;

#[cfg(test)]
mod tests;

pub use client::MemoryClient;

use crate::error::{Result, TurnstileError};
use crate::namespace::{Ensemble, NamespaceClient, SessionId, SessionState};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tree::Tree;

pub(crate) struct Shared {
    tree: Mutex<Tree>,
    available: AtomicBool,
    next_session: AtomicU64,
}

impl Shared {
    fn tree(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

/// Handle to an in-memory coordination service. Clones share the same service.
#[derive(Clone)]
pub struct MemoryService {
    shared: Arc<Shared>,
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryService {
    /// Create an empty service containing only the root node.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tree: Mutex::new(Tree::new()),
                available: AtomicBool::new(true),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// Open a session directly, bypassing availability checks.
    pub fn connect(&self) -> Result<Arc<MemoryClient>> {
        let id = self.shared.next_session.fetch_add(1, Ordering::Relaxed);
        let session = SessionId::new(format!("mem-{:016x}", id));
        Ok(Arc::new(MemoryClient::open(
            Arc::clone(&self.shared),
            session,
        )?))
    }

    /// Make future dials fail (`false`) or succeed (`true`).
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// End a session as the service would on timeout.
    ///
    /// Returns `false` if the session was not live.
    pub fn expire_session(&self, id: &SessionId) -> bool {
        let ended = self.shared.tree().end_session(id, SessionState::Expired);
        if ended {
            tracing::info!(session = %id, "memory session expired");
        }
        ended
    }

    /// Report a dropped link to a session's client without removing its nodes.
    pub fn disconnect_session(&self, id: &SessionId) -> bool {
        self.shared.tree().disconnect(id)
    }

    /// Live session ids, sorted.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.shared.tree().session_ids()
    }

    /// Number of watches currently armed on `path`.
    pub fn watch_count(&self, path: &str) -> usize {
        self.shared.tree().watch_count(path)
    }
}

impl Ensemble for MemoryService {
    fn dial(&self, endpoint: &str, _session_timeout: Duration) -> Result<Arc<dyn NamespaceClient>> {
        if !self.shared.available.load(Ordering::SeqCst) {
            return Err(TurnstileError::Connect(format!(
                "memory service '{}' is unavailable",
                endpoint
            )));
        }
        let client: Arc<dyn NamespaceClient> = self.connect()?;
        Ok(client)
    }
}

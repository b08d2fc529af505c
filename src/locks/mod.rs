//! Queued distributed locks.
//!
//! This module implements mutual exclusion over a coordination service
//! namespace:
//! - One persistent directory per resource (`<root>/<resource>`), created lazily
//! - One ephemeral sequential candidate node per acquisition attempt
//! - The lowest sequence holds the lock; everyone else watches their predecessor
//!
//! # Candidate Nodes
//!
//! Candidates are named `<resource>_lock_<sequence>`. They belong to the
//! session that created them, so a crashed or expired holder releases the lock
//! without any lease or TTL.
//!
//! # Candidate Metadata
//!
//! Each candidate node contains JSON metadata:
//! - `owner`: The owner of the attempt (e.g., `user@HOST`)
//! - `pid`: The process ID (optional)
//! - `created_at`: RFC3339 timestamp
//! - `note`: Free-form caller note (optional)
//!
//! # RAII Guards
//!
//! Held locks are returned as guard objects that release the lock when
//! dropped. If deletion fails during drop, a warning is logged but the
//! program does not crash.

mod attempt;
mod guard;
mod manager;
mod metadata;
mod name;
mod queue;
pub(crate) mod wakeup;

#[cfg(test)]
mod tests;

// Re-export public API
pub use attempt::AttemptState;
pub use guard::LockGuard;
pub use manager::{DistributedLock, LockManager};
pub use metadata::CandidateMetadata;
pub use name::{ResourceName, SEPARATOR};
pub use queue::Candidate;

pub(crate) use metadata::owner_string;

use crate::error::{Result, TurnstileError};
use crate::namespace::path;
use crate::session::Session;
use attempt::Attempt;
use queue::Queue;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Entry point for locking resources under one namespace root.
#[derive(Debug, Clone)]
pub struct Locks {
    session: Arc<Session>,
    root: String,
}

impl Locks {
    /// Create a provider for locks under `root`, which must be a valid
    /// absolute path.
    pub fn new(session: Arc<Session>, root: &str) -> Result<Self> {
        path::validate(root)?;
        Ok(Self {
            session,
            root: root.to_string(),
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// A lock manager for `resource`.
    pub fn manager(&self, resource: &str) -> Result<LockManager> {
        let resource = ResourceName::parse(resource)?;
        Ok(LockManager::new(
            Arc::clone(&self.session),
            resource,
            &self.root,
        ))
    }

    /// Wait as long as it takes to hold `resource`.
    pub fn acquire_blocking(&self, resource: &str) -> Result<LockGuard> {
        let guard = self.acquire(resource, None, None)?;
        // Without a deadline an attempt ends held or in error.
        guard.ok_or_else(|| {
            TurnstileError::InvalidState(format!(
                "blocking acquire of '{}' ended without the lock",
                resource
            ))
        })
    }

    /// Wait up to `timeout` to hold `resource`. `None` means it timed out.
    pub fn acquire_with_timeout(
        &self,
        resource: &str,
        timeout: Duration,
    ) -> Result<Option<LockGuard>> {
        self.acquire(resource, Some(timeout), None)
    }

    /// Acquire with an optional timeout and a note stored in the candidate.
    pub fn acquire(
        &self,
        resource: &str,
        timeout: Option<Duration>,
        note: Option<&str>,
    ) -> Result<Option<LockGuard>> {
        let resource = ResourceName::parse(resource)?;
        let deadline = timeout.map(|t| Instant::now() + t);
        let attempt = Attempt::new(Arc::clone(&self.session), resource, &self.root);
        let metadata = CandidateMetadata::new(note);
        if attempt.run(deadline, &metadata)? {
            Ok(Some(LockGuard::new(attempt)))
        } else {
            Ok(None)
        }
    }

    /// Release a held lock. Idempotent for locks whose session already ended.
    pub fn release(&self, guard: LockGuard) -> Result<()> {
        guard.release()
    }

    /// Ordered snapshot of the candidates queued on `resource`.
    pub fn queue(&self, resource: &str) -> Result<Vec<Candidate>> {
        let resource = ResourceName::parse(resource)?;
        self.session.check_live()?;
        Queue::new(&self.session, &resource, &self.root).snapshot()
    }

    /// Resources that have a directory under the root, sorted.
    pub fn resources(&self) -> Result<Vec<ResourceName>> {
        self.session.check_live()?;
        let names = match self.session.client().children(&self.root) {
            Ok(names) => names,
            Err(TurnstileError::NoSuchNode(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into_session_lost()),
        };
        let mut resources: Vec<ResourceName> = names
            .iter()
            .filter_map(|name| ResourceName::parse(name).ok())
            .collect();
        resources.sort();
        Ok(resources)
    }
}

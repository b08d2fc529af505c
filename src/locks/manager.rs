//! Lock manager facade over the queue protocol.

use super::attempt::{Attempt, AttemptState};
use super::metadata::CandidateMetadata;
use super::name::ResourceName;
use crate::error::{Result, TurnstileError};
use crate::session::Session;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Lock capability shared by every lock backend.
pub trait DistributedLock {
    /// Block until the lock is held.
    fn lock(&self) -> Result<()>;

    /// Wait up to `timeout`. `Ok(false)` means the lock was not acquired and
    /// the attempt has left the queue.
    fn try_lock(&self, timeout: Duration) -> Result<bool>;

    /// Release a held lock. Fails with `InvalidState` unless held.
    fn unlock(&self) -> Result<()>;

    fn state(&self) -> AttemptState;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// Queued lock on one resource, bound to one session.
///
/// Each `lock` or `try_lock` is a new attempt with its own candidate node.
/// The manager is not reentrant: locking again while holding queues a second
/// candidate behind the first, so `lock` would wait forever and `try_lock`
/// times out.
#[derive(Debug)]
pub struct LockManager {
    session: Arc<Session>,
    resource: ResourceName,
    root: String,
    note: Option<String>,
    current: Mutex<Option<Arc<Attempt>>>,
    held: Mutex<Vec<Arc<Attempt>>>,
}

impl LockManager {
    pub(super) fn new(session: Arc<Session>, resource: ResourceName, root: &str) -> Self {
        Self {
            session,
            resource,
            root: root.to_string(),
            note: None,
            current: Mutex::new(None),
            held: Mutex::new(Vec::new()),
        }
    }

    /// Attach a note recorded in every candidate this manager creates.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn resource(&self) -> &ResourceName {
        &self.resource
    }

    /// Predecessor watched by the in-flight attempt, if it is waiting.
    pub fn watching(&self) -> Option<String> {
        lock(&self.current).as_ref().and_then(|a| a.watching())
    }

    /// Candidate node of the most recent attempt.
    pub fn candidate(&self) -> Option<String> {
        lock(&self.current).as_ref().and_then(|a| a.candidate())
    }

    fn attempt(&self, deadline: Option<Instant>) -> Result<bool> {
        let attempt = Arc::new(Attempt::new(
            Arc::clone(&self.session),
            self.resource.clone(),
            &self.root,
        ));
        *lock(&self.current) = Some(Arc::clone(&attempt));

        let metadata = CandidateMetadata::new(self.note.as_deref());
        let acquired = attempt.run(deadline, &metadata)?;
        if acquired {
            lock(&self.held).push(attempt);
        }
        Ok(acquired)
    }
}

impl DistributedLock for LockManager {
    fn lock(&self) -> Result<()> {
        self.attempt(None).map(|_| ())
    }

    fn try_lock(&self, timeout: Duration) -> Result<bool> {
        self.attempt(Some(Instant::now() + timeout))
    }

    fn unlock(&self) -> Result<()> {
        let popped = lock(&self.held).pop();
        match popped {
            Some(attempt) => attempt.release(),
            None => Err(TurnstileError::InvalidState(format!(
                "unlock of '{}' while {}",
                self.resource,
                self.state()
            ))),
        }
    }

    /// `Held` while any attempt is held, otherwise the latest attempt's state.
    fn state(&self) -> AttemptState {
        if !lock(&self.held).is_empty() {
            return AttemptState::Held;
        }
        lock(&self.current)
            .as_ref()
            .map_or(AttemptState::Idle, |a| a.state())
    }
}

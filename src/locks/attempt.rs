//! One acquisition attempt and its lifecycle.

use super::metadata::CandidateMetadata;
use super::name::ResourceName;
use super::queue::{Queue, Turn};
use crate::error::{Result, TurnstileError};
use crate::session::Session;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Lifecycle of an attempt.
///
/// `Idle -> Attempting -> Held -> Released`, or `Attempting -> Abandoned` on
/// timeout or session loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    Attempting,
    Held,
    Released,
    Abandoned,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptState::Released | AttemptState::Abandoned)
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptState::Idle => "idle",
            AttemptState::Attempting => "attempting",
            AttemptState::Held => "held",
            AttemptState::Released => "released",
            AttemptState::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// A single pass through the queue: one candidate node, from creation to
/// release or abandonment. Attempts are never restarted.
pub(crate) struct Attempt {
    session: Arc<Session>,
    resource: ResourceName,
    root: String,
    state: Mutex<AttemptState>,
    candidate: Mutex<Option<String>>,
    watching: Mutex<Option<String>>,
}

impl Attempt {
    pub(crate) fn new(session: Arc<Session>, resource: ResourceName, root: &str) -> Self {
        Self {
            session,
            resource,
            root: root.to_string(),
            state: Mutex::new(AttemptState::Idle),
            candidate: Mutex::new(None),
            watching: Mutex::new(None),
        }
    }

    fn queue(&self) -> Queue<'_> {
        Queue::new(&self.session, &self.resource, &self.root)
    }

    fn set_state(&self, state: AttemptState) {
        *lock(&self.state) = state;
    }

    pub(crate) fn state(&self) -> AttemptState {
        *lock(&self.state)
    }

    pub(crate) fn resource(&self) -> &ResourceName {
        &self.resource
    }

    pub(crate) fn candidate(&self) -> Option<String> {
        lock(&self.candidate).clone()
    }

    /// Predecessor currently being watched, while waiting.
    pub(crate) fn watching(&self) -> Option<String> {
        lock(&self.watching).clone()
    }

    /// Queue up and wait for the lock.
    ///
    /// Returns `Ok(true)` once held and `Ok(false)` if `deadline` passed first,
    /// in which case the candidate has been withdrawn. A lost session abandons
    /// the attempt and is returned as `SessionLost`.
    pub(crate) fn run(&self, deadline: Option<Instant>, metadata: &CandidateMetadata) -> Result<bool> {
        {
            let mut state = lock(&self.state);
            if *state != AttemptState::Idle {
                return Err(TurnstileError::InvalidState(format!(
                    "attempt on '{}' already {}",
                    self.resource, *state
                )));
            }
            *state = AttemptState::Attempting;
        }

        let result = self.enter_queue(deadline, metadata);
        *lock(&self.watching) = None;

        match result {
            Ok(Turn::Acquired) => {
                self.set_state(AttemptState::Held);
                tracing::info!(
                    resource = %self.resource,
                    candidate = ?self.candidate(),
                    "lock acquired"
                );
                Ok(true)
            }
            Ok(Turn::TimedOut) => {
                self.abandon(true);
                tracing::info!(resource = %self.resource, "lock attempt timed out");
                Ok(false)
            }
            Err(e) => {
                // Nodes of a lost session are the service's to remove.
                self.abandon(!e.is_session_fault());
                Err(e)
            }
        }
    }

    fn enter_queue(&self, deadline: Option<Instant>, metadata: &CandidateMetadata) -> Result<Turn> {
        let queue = self.queue();
        self.session.check_live()?;
        queue.ensure_directory()?;
        let candidate = queue.enqueue(metadata)?;
        *lock(&self.candidate) = Some(candidate.clone());
        queue.await_turn(&candidate, deadline, |watched| {
            *lock(&self.watching) = watched.map(str::to_string);
        })
    }

    fn abandon(&self, withdraw: bool) {
        if withdraw
            && let Some(candidate) = self.candidate()
            && let Err(e) = self.queue().withdraw(&candidate)
        {
            tracing::warn!(candidate = %candidate, error = %e, "failed to withdraw candidate");
        }
        self.set_state(AttemptState::Abandoned);
    }

    /// Release a held lock.
    ///
    /// Releasing twice, or releasing an abandoned attempt, is a no-op. If the
    /// session is already gone, so is the candidate, and the release succeeds.
    pub(crate) fn release(&self) -> Result<()> {
        let mut state = lock(&self.state);
        match *state {
            AttemptState::Held => {}
            AttemptState::Released | AttemptState::Abandoned => return Ok(()),
            other => {
                return Err(TurnstileError::InvalidState(format!(
                    "cannot release '{}' while {}",
                    self.resource, other
                )));
            }
        }

        let Some(candidate) = self.candidate() else {
            *state = AttemptState::Released;
            return Ok(());
        };
        if !self.session.is_lost() {
            match self.queue().withdraw(&candidate) {
                Ok(()) => {}
                Err(e) if e.is_session_fault() => {
                    tracing::debug!(candidate = %candidate, "session gone before release");
                }
                Err(e) => return Err(e),
            }
        }
        *state = AttemptState::Released;
        tracing::info!(resource = %self.resource, candidate = %candidate, "lock released");
        Ok(())
    }

    /// Re-derive from a fresh listing whether this attempt still holds the lock.
    pub(crate) fn still_held(&self) -> Result<bool> {
        if self.state() != AttemptState::Held {
            return Ok(false);
        }
        let Some(candidate) = self.candidate() else {
            return Ok(false);
        };
        match self.queue().heads(&candidate) {
            Ok(held) => Ok(held),
            Err(e) if e.is_session_fault() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl fmt::Debug for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attempt")
            .field("resource", &self.resource)
            .field("candidate", &self.candidate())
            .field("state", &self.state())
            .finish()
    }
}

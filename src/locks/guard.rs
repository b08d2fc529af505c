//! RAII lock guard implementation.

use super::attempt::Attempt;
use super::name::ResourceName;
use crate::error::Result;

/// RAII guard for a held lock.
///
/// When dropped, the candidate node is deleted and the next waiter is woken.
/// If deletion fails, a warning is logged but no panic occurs.
#[derive(Debug)]
pub struct LockGuard {
    attempt: Attempt,
}

impl LockGuard {
    pub(super) fn new(attempt: Attempt) -> Self {
        Self { attempt }
    }

    /// Resource this guard holds.
    pub fn resource(&self) -> &ResourceName {
        self.attempt.resource()
    }

    /// Full path of the candidate node backing this guard.
    pub fn candidate(&self) -> String {
        self.attempt.candidate().unwrap_or_default()
    }

    /// Check, from a fresh listing, that the lock is still held.
    ///
    /// Returns `false` once the session has been lost.
    pub fn still_held(&self) -> Result<bool> {
        self.attempt.still_held()
    }

    /// Manually release the lock.
    ///
    /// This is useful when you want to release the lock before the guard
    /// goes out of scope, and want to handle errors explicitly.
    pub fn release(self) -> Result<()> {
        self.attempt.release()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.attempt.release() {
            tracing::warn!(
                resource = %self.attempt.resource(),
                error = %e,
                "failed to release lock"
            );
        }
    }
}

//! One-shot wakeup used to park a lock attempt until its watch fires.
//!
//! A `Wakeup` is created for every watch registration. The first `fire` wins
//! and later ones are ignored, so a waiter is woken at most once per
//! registration no matter how many sources (the watch itself, a session state
//! change) race to wake it.

use crate::namespace::SessionState;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

/// Why a parked attempt was woken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The watched predecessor changed; re-evaluate the queue.
    PredecessorGone,
    /// The session ended; the attempt must be abandoned.
    SessionLost(SessionState),
}

/// Result of waiting on a [`Wakeup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled(Signal),
    TimedOut,
}

#[derive(Debug, Default)]
pub struct Wakeup {
    slot: Mutex<Option<Signal>>,
    ready: Condvar,
}

impl Wakeup {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver a signal. Returns `false` if one was already delivered.
    pub fn fire(&self, signal: Signal) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(|poison| poison.into_inner());
        if slot.is_some() {
            return false;
        }
        *slot = Some(signal);
        self.ready.notify_all();
        true
    }

    /// Block until fired or until `deadline` passes. `None` waits forever.
    pub fn wait(&self, deadline: Option<Instant>) -> WaitOutcome {
        let mut slot = self.slot.lock().unwrap_or_else(|poison| poison.into_inner());
        loop {
            if let Some(signal) = *slot {
                return WaitOutcome::Signaled(signal);
            }
            slot = match deadline {
                None => self
                    .ready
                    .wait(slot)
                    .unwrap_or_else(|poison| poison.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitOutcome::TimedOut;
                    }
                    self.ready
                        .wait_timeout(slot, deadline - now)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|poison| poison.into_inner().0)
                }
            };
        }
    }
}

//! Sessions with a coordination service.
//!
//! A [`Session`] owns one namespace client and tracks its liveness. Lock
//! attempts that park on a watch register their wakeup with the session, so
//! when the session is lost every parked attempt on it is woken and abandons.
//!
//! A lost session stays lost. A session lost to `Disconnected` is also closed
//! at the service, so its candidate nodes are removed even if the client later
//! recovers. Reconnecting means opening a new `Session`; attempts never carry
//! over, because a new session's candidates queue behind everything already
//! waiting.

mod connect;


pub use connect::SessionSettings;

use crate::error::{Result, TurnstileError};
use crate::locks::wakeup::{Signal, Wakeup};
use crate::namespace::{Ensemble, ListenerId, NamespaceClient, SessionId, SessionState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;

#[derive(Default)]
struct Liveness {
    lost: Mutex<Option<SessionState>>,
    waiters: Mutex<HashMap<u64, Arc<Wakeup>>>,
    next_waiter: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

impl Liveness {
    /// Returns `false` if the session was already lost.
    fn mark_lost(&self, state: SessionState) -> bool {
        {
            let mut lost = lock(&self.lost);
            if lost.is_some() {
                return false;
            }
            *lost = Some(state);
        }
        let waiters: Vec<Arc<Wakeup>> = lock(&self.waiters).drain().map(|(_, w)| w).collect();
        tracing::warn!(state = %state, parked = waiters.len(), "session lost");
        for waiter in waiters {
            waiter.fire(Signal::SessionLost(state));
        }
        true
    }
}

/// End a disconnected session at the service from a separate thread, so the
/// client's own dispatch thread is never blocked on its close.
fn close_abandoned(client: Weak<dyn NamespaceClient>) {
    let spawned = thread::Builder::new()
        .name("turnstile-session-close".to_string())
        .spawn(move || {
            let Some(client) = client.upgrade() else {
                return;
            };
            match client.close() {
                Ok(()) => tracing::debug!(session = %client.session_id(), "closed disconnected session"),
                Err(e) => {
                    tracing::warn!(session = %client.session_id(), error = %e, "failed to close disconnected session")
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "failed to start session close thread");
    }
}

/// Registration of a parked attempt. Unregisters on drop.
pub(crate) struct Parked<'a> {
    liveness: &'a Liveness,
    id: u64,
}

impl Drop for Parked<'_> {
    fn drop(&mut self) {
        lock(&self.liveness.waiters).remove(&self.id);
    }
}

/// A live session with a coordination service.
pub struct Session {
    client: Arc<dyn NamespaceClient>,
    liveness: Arc<Liveness>,
    listener: ListenerId,
}

impl Session {
    /// Connect through `ensemble`, retrying per `settings`.
    ///
    /// Blocks until a session reports `Connected`. Fails with
    /// [`TurnstileError::Connect`] if none does within the connect timeout.
    pub fn connect(ensemble: &dyn Ensemble, settings: &SessionSettings) -> Result<Self> {
        let client = connect::dial_connected(ensemble, settings)?;
        Ok(Self::attach(client))
    }

    /// Wrap an already connected client.
    pub fn attach(client: Arc<dyn NamespaceClient>) -> Self {
        let liveness = Arc::new(Liveness::default());
        let observer = Arc::clone(&liveness);
        let handle = Arc::downgrade(&client);
        let listener = client.add_state_listener(Arc::new(move |state: SessionState| {
            if state.is_lost()
                && observer.mark_lost(state)
                && state == SessionState::Disconnected
            {
                close_abandoned(handle.clone());
            }
        }));

        // The client may have been lost before the listener was in place.
        let state = client.state();
        if state.is_lost()
            && liveness.mark_lost(state)
            && state == SessionState::Disconnected
        {
            close_abandoned(Arc::downgrade(&client));
        }

        Self {
            client,
            liveness,
            listener,
        }
    }

    pub fn id(&self) -> SessionId {
        self.client.session_id()
    }

    /// Current state. Once lost, reports the state that ended it.
    pub fn state(&self) -> SessionState {
        match *lock(&self.liveness.lost) {
            Some(state) => state,
            None => self.client.state(),
        }
    }

    pub fn is_lost(&self) -> bool {
        lock(&self.liveness.lost).is_some()
    }

    /// Fail with `SessionLost` if the session can no longer be used.
    pub fn check_live(&self) -> Result<()> {
        match *lock(&self.liveness.lost) {
            Some(state) => Err(TurnstileError::SessionLost(format!(
                "session {} is {}",
                self.client.session_id(),
                state
            ))),
            None => Ok(()),
        }
    }

    pub(crate) fn client(&self) -> &dyn NamespaceClient {
        self.client.as_ref()
    }

    /// Register a wakeup to fire if the session is lost.
    ///
    /// Fires immediately if it already is.
    pub(crate) fn park(&self, wakeup: &Arc<Wakeup>) -> Parked<'_> {
        let id = self.liveness.next_waiter.fetch_add(1, Ordering::Relaxed);
        lock(&self.liveness.waiters).insert(id, Arc::clone(wakeup));
        if let Some(state) = *lock(&self.liveness.lost) {
            wakeup.fire(Signal::SessionLost(state));
        }
        Parked {
            liveness: &self.liveness,
            id,
        }
    }

    /// Close the session. All its candidate nodes are removed by the service
    /// and any parked attempts are woken with `SessionLost`.
    pub fn close(&self) -> Result<()> {
        let result = self.client.close();
        self.liveness.mark_lost(SessionState::Closed);
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.client.remove_state_listener(self.listener);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.client.session_id())
            .field("state", &self.state())
            .finish()
    }
}

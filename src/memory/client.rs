//! Session client for the in-memory coordination service.

use super::Shared;
use super::tree::Dispatch;
use crate::error::{Result, TurnstileError};
use crate::namespace::{
    ListenerId, NamespaceClient, SessionId, SessionState, StateListener, Watcher,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

type Listeners = Arc<Mutex<Vec<(ListenerId, StateListener)>>>;

/// One session against a [`super::MemoryService`].
pub struct MemoryClient {
    shared: Arc<Shared>,
    session: SessionId,
    listeners: Listeners,
    next_listener: AtomicU64,
}

impl MemoryClient {
    pub(super) fn open(shared: Arc<Shared>, session: SessionId) -> Result<Self> {
        let (outbox, inbox) = mpsc::channel();
        let listeners: Listeners = Arc::new(Mutex::new(Vec::new()));

        let dispatch_listeners = Arc::clone(&listeners);
        thread::Builder::new()
            .name(format!("turnstile-dispatch-{}", session))
            .spawn(move || run_dispatcher(inbox, dispatch_listeners))
            .map_err(|e| TurnstileError::Connect(format!("failed to start dispatcher: {}", e)))?;

        shared.tree().open_session(session.clone(), outbox);
        tracing::debug!(session = %session, "memory session opened");

        Ok(Self {
            shared,
            session,
            listeners,
            next_listener: AtomicU64::new(0),
        })
    }

    /// Lock the tree and verify the session may issue node operations.
    fn live_tree(&self) -> Result<MutexGuard<'_, super::tree::Tree>> {
        let tree = self.shared.tree();
        tree.check_session(&self.session)?;
        Ok(tree)
    }
}

/// Deliver watches and state changes in arrival order until the session ends.
fn run_dispatcher(inbox: Receiver<Dispatch>, listeners: Listeners) {
    for item in inbox {
        match item {
            Dispatch::Watch(watcher, event) => watcher(event),
            Dispatch::State(state) => {
                let current: Vec<StateListener> = listeners
                    .lock()
                    .unwrap_or_else(|poison| poison.into_inner())
                    .iter()
                    .map(|(_, l)| Arc::clone(l))
                    .collect();
                for listener in current {
                    listener(state);
                }
            }
        }
    }
}

impl NamespaceClient for MemoryClient {
    fn session_id(&self) -> SessionId {
        self.session.clone()
    }

    fn state(&self) -> SessionState {
        self.shared.tree().session_state(&self.session)
    }

    fn create_persistent(&self, path: &str, data: &[u8]) -> Result<()> {
        self.live_tree()?.create(path, data, None)
    }

    fn create_ephemeral_sequential(
        &self,
        parent: &str,
        prefix: &str,
        data: &[u8],
    ) -> Result<String> {
        self.live_tree()?
            .create_sequential(parent, prefix, data, self.session.clone())
    }

    fn children(&self, path: &str) -> Result<Vec<String>> {
        self.live_tree()?.children(path)
    }

    fn exists(&self, path: &str, watcher: Option<Watcher>) -> Result<bool> {
        Ok(self.live_tree()?.exists(path, watcher, &self.session))
    }

    fn get_data(&self, path: &str) -> Result<Vec<u8>> {
        self.live_tree()?.get_data(path)
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.live_tree()?.delete(path)
    }

    fn add_state_listener(&self, listener: StateListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push((id, listener));
        id
    }

    fn remove_state_listener(&self, id: ListenerId) {
        self.listeners
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .retain(|(existing, _)| *existing != id);
    }

    fn close(&self) -> Result<()> {
        if self
            .shared
            .tree()
            .end_session(&self.session, SessionState::Closed)
        {
            tracing::debug!(session = %self.session, "memory session closed");
        }
        Ok(())
    }
}

impl Drop for MemoryClient {
    fn drop(&mut self) {
        let _ = self.close();
        self.shared.tree().forget_session(&self.session);
    }
}

//! Contract between the lock protocol and a coordination service.
//!
//! A coordination service exposes a hierarchical namespace of nodes. Nodes are
//! either persistent (they outlive the session that made them) or ephemeral
//! (deleted by the service when their session ends). Ephemeral nodes may be
//! created sequential, in which case the service appends a per-parent counter
//! that is strictly increasing and never reused.
//!
//! # Watches
//!
//! [`NamespaceClient::exists`] can arm a one-shot [`Watcher`] on a node. The
//! check and the arming happen as one step: if the node is present when the
//! call returns `true`, its deletion is guaranteed to fire the watcher. If the
//! node is absent nothing is armed. A watcher fires at most once, either with
//! the node change or with a session event if the session ends first.
//!
//! Watchers and state listeners run on a dispatch thread owned by the client,
//! in FIFO order per session. They must not block.

mod event;
pub mod path;


pub use event::{ListenerId, SessionId, SessionState, StateListener, WatchEvent, Watcher};

use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Client side of one session with a coordination service.
pub trait NamespaceClient: Send + Sync {
    /// Identifier of the session this client speaks for.
    fn session_id(&self) -> SessionId;

    /// Current session state.
    fn state(&self) -> SessionState;

    /// Create a persistent node. Fails with `NodeExists` if present and
    /// `NoSuchNode` if the parent is missing.
    fn create_persistent(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Create an ephemeral sequential node under `parent` and return its full path.
    fn create_ephemeral_sequential(&self, parent: &str, prefix: &str, data: &[u8])
    -> Result<String>;

    /// Names of the children of `path`, in no particular order.
    fn children(&self, path: &str) -> Result<Vec<String>>;

    /// Whether `path` exists, optionally arming a one-shot watch when it does.
    fn exists(&self, path: &str, watcher: Option<Watcher>) -> Result<bool>;

    /// Data stored on a node.
    fn get_data(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete a node. Fails with `NoSuchNode` if absent.
    fn delete(&self, path: &str) -> Result<()>;

    /// Register a listener for session state transitions.
    fn add_state_listener(&self, listener: StateListener) -> ListenerId;

    /// Remove a previously registered listener. Unknown ids are ignored.
    fn remove_state_listener(&self, id: ListenerId);

    /// End the session. Its ephemeral nodes are deleted by the service.
    fn close(&self) -> Result<()>;
}

/// A coordination service that sessions can be opened against.
pub trait Ensemble: Send + Sync {
    /// Make one connection attempt against `endpoint`.
    ///
    /// The returned client may still be `Connecting`; callers wait for the
    /// `Connected` transition before issuing node operations.
    fn dial(&self, endpoint: &str, session_timeout: Duration) -> Result<Arc<dyn NamespaceClient>>;
}

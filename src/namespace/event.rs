//! Session states, watch events, and the callback types that carry them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier assigned to a session by the coordination service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Liveness of a session as reported by its client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Dialed but the handshake has not completed.
    Connecting,
    /// Handshake complete; node operations are allowed.
    Connected,
    /// The link dropped. Ephemeral nodes may still exist until expiry.
    Disconnected,
    /// The service ended the session and deleted its ephemeral nodes.
    Expired,
    /// The session was closed by its owner.
    Closed,
}

impl SessionState {
    /// Whether this state is final for the session.
    ///
    /// `Disconnected` counts: a lock attempt cannot tell whether its node
    /// survives, so it is treated the same as expiry.
    pub fn is_lost(self) -> bool {
        matches!(
            self,
            SessionState::Disconnected | SessionState::Expired | SessionState::Closed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Disconnected => "disconnected",
            SessionState::Expired => "expired",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Event delivered to a one-shot watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The watched node was deleted.
    NodeDeleted { path: String },
    /// The session ended before the node changed.
    Session(SessionState),
}

/// One-shot watch callback. Invoked at most once, on the dispatch thread.
pub type Watcher = Box<dyn FnOnce(WatchEvent) + Send + 'static>;

/// Session state listener. Invoked on every state transition, on the dispatch thread.
pub type StateListener = Arc<dyn Fn(SessionState) + Send + Sync + 'static>;

/// Handle for removing a registered state listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

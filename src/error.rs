//! Error types for turnstile.
//!
//! Uses thiserror for derive macros. The variants split into three groups:
//! benign namespace races (`NodeExists`, `NoSuchNode`) that the lock protocol
//! absorbs, session and connectivity faults that are always surfaced, and
//! caller mistakes (bad names, bad config, unlocking something not held).

use crate::exit_codes;
use thiserror::Error;

/// Main error type for turnstile operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TurnstileError {
    /// No endpoint produced a connected session within the dial timeout.
    #[error("failed to connect to coordination service: {0}")]
    Connect(String),

    /// The connection to the coordination service dropped mid-request.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The service ended the session; its ephemeral nodes are gone.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// An in-flight or held lock attempt lost its session.
    #[error("session lost: {0}")]
    SessionLost(String),

    /// A create raced with another create of the same node.
    #[error("node already exists: {0}")]
    NodeExists(String),

    /// The node named by an operation is not present.
    #[error("no such node: {0}")]
    NoSuchNode(String),

    /// A namespace path is malformed or not permitted for the operation.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A resource name failed validation.
    #[error("invalid resource name: {0}")]
    InvalidResource(String),

    /// An operation was called from a lock state that does not allow it.
    #[error("invalid lock state: {0}")]
    InvalidState(String),

    /// The lock was not acquired before the deadline.
    #[error("timed out waiting for lock: {0}")]
    TimedOut(String),

    /// Bad command-line usage.
    #[error("{0}")]
    UserError(String),

    /// Configuration could not be loaded or failed validation.
    #[error("{0}")]
    Config(String),

    /// The backing store of a coordination backend failed.
    #[error("storage failure: {0}")]
    Storage(String),

    /// A command run under the lock exited unsuccessfully.
    #[error("command failed with exit code {0}")]
    CommandFailed(i32),
}

impl TurnstileError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            TurnstileError::Connect(_) => exit_codes::CONNECT_FAILURE,
            TurnstileError::ConnectionLost(_)
            | TurnstileError::SessionExpired(_)
            | TurnstileError::SessionLost(_) => exit_codes::SESSION_LOST,
            TurnstileError::TimedOut(_) => exit_codes::LOCK_TIMEOUT,
            TurnstileError::Storage(_)
            | TurnstileError::NodeExists(_)
            | TurnstileError::NoSuchNode(_) => exit_codes::STORAGE_FAILURE,
            TurnstileError::InvalidPath(_)
            | TurnstileError::InvalidResource(_)
            | TurnstileError::InvalidState(_)
            | TurnstileError::UserError(_)
            | TurnstileError::Config(_) => exit_codes::USER_ERROR,
            // A wrapped command's own code passes through.
            TurnstileError::CommandFailed(code) if (1..=255).contains(code) => *code,
            TurnstileError::CommandFailed(_) => exit_codes::COMMAND_FAILURE,
        }
    }

    /// Whether this error means the session can no longer be trusted.
    ///
    /// Such faults are never retried inside the lock protocol: a new session
    /// would put the caller at the back of the queue.
    pub fn is_session_fault(&self) -> bool {
        matches!(
            self,
            TurnstileError::ConnectionLost(_)
                | TurnstileError::SessionExpired(_)
                | TurnstileError::SessionLost(_)
        )
    }

    /// Convert a session fault raised by the namespace into `SessionLost`.
    pub(crate) fn into_session_lost(self) -> Self {
        match self {
            TurnstileError::ConnectionLost(msg) | TurnstileError::SessionExpired(msg) => {
                TurnstileError::SessionLost(msg)
            }
            other => other,
        }
    }
}

/// Result type alias for turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;

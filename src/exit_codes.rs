//! Exit code constants for the turnstile CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid resource name, bad config)
//! - 2: Lock not acquired before the timeout
//! - 3: Could not connect to the coordination service
//! - 4: Session lost while waiting or holding
//! - 5: Coordination storage failure
//! - 6: The wrapped command failed without an exit code of its own
//!
//! When `run` wraps a command that exits non-zero, that code is used instead.

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid names, or invalid configuration.
pub const USER_ERROR: i32 = 1;

/// The lock was still held by someone else when the timeout elapsed.
pub const LOCK_TIMEOUT: i32 = 2;

/// No endpoint accepted a session within the connect timeout.
pub const CONNECT_FAILURE: i32 = 3;

/// The session ended (expired, disconnected, or closed) mid-operation.
pub const SESSION_LOST: i32 = 4;

/// Reading or writing coordination state failed.
pub const STORAGE_FAILURE: i32 = 5;

/// The command run under the lock could not be started or was killed.
pub const COMMAND_FAILURE: i32 = 6;

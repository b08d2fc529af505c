//! Config struct definition and default implementation.

use serde::{Deserialize, Serialize};

/// Which coordination service a session is opened against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Shared directory; each endpoint is a directory path (default).
    #[default]
    Filesystem,
    /// In-process service, private to one process.
    Memory,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Filesystem => write!(f, "filesystem"),
            Backend::Memory => write!(f, "memory"),
        }
    }
}

/// Configuration for turnstile clients.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Service settings
    // =========================================================================
    /// Coordination backend.
    pub backend: Backend,

    /// Endpoints tried in order when connecting.
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Namespace root under which resource directories are created.
    #[serde(default = "default_root")]
    pub root: String,

    // =========================================================================
    // Session settings
    // =========================================================================
    /// How long a silent session stays alive.
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Upper bound on establishing a session, retries included.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Dial attempts after the first one.
    #[serde(default = "default_connect_max_retries")]
    pub connect_max_retries: u32,

    /// First retry delay; doubles on every further retry.
    #[serde(default = "default_connect_base_delay_ms")]
    pub connect_base_delay_ms: u64,

    /// Retry delay ceiling.
    #[serde(default = "default_connect_max_delay_ms")]
    pub connect_max_delay_ms: u64,

    /// Watch polling interval of the filesystem backend.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

pub(super) fn default_endpoints() -> Vec<String> {
    vec![
        std::env::temp_dir()
            .join("turnstile")
            .to_string_lossy()
            .to_string(),
    ]
}

pub(super) fn default_root() -> String {
    "/turnstile".to_string()
}

fn default_session_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_connect_max_retries() -> u32 {
    5
}

fn default_connect_base_delay_ms() -> u64 {
    50
}

fn default_connect_max_delay_ms() -> u64 {
    2_000
}

fn default_poll_interval_ms() -> u64 {
    50
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            endpoints: default_endpoints(),
            root: default_root(),
            session_timeout_ms: default_session_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            connect_max_retries: default_connect_max_retries(),
            connect_base_delay_ms: default_connect_base_delay_ms(),
            connect_max_delay_ms: default_connect_max_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

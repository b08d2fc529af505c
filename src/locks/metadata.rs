//! Metadata stored on candidate nodes.
//!
//! The lock protocol never reads it; ownership is decided by sequence order
//! alone. It exists so that operators inspecting a queue can tell who is
//! holding and who is waiting.

use crate::error::{Result, TurnstileError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Metadata written into each candidate node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateMetadata {
    /// Owner of the attempt (e.g., `user@HOST`).
    pub owner: String,

    /// Process ID of the attempt's client (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Timestamp when the candidate was created (RFC3339).
    pub created_at: DateTime<Utc>,

    /// Free-form note supplied by the caller (e.g., the command being run).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CandidateMetadata {
    /// Create new metadata with the current timestamp.
    pub fn new(note: Option<&str>) -> Self {
        Self {
            owner: owner_string(),
            pid: Some(std::process::id()),
            created_at: Utc::now(),
            note: note.map(str::to_string),
        }
    }

    /// Parse metadata from node data.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| {
            TurnstileError::Storage(format!("failed to parse candidate metadata: {}", e))
        })
    }

    /// Serialize metadata to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            TurnstileError::Storage(format!("failed to serialize candidate metadata: {}", e))
        })
    }

    /// Calculate the age of the candidate.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.created_at)
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        let age = self.age();
        let seconds = age.num_seconds();
        let minutes = age.num_minutes();
        let hours = age.num_hours();

        if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds % 60)
        } else {
            format!("{}s", seconds.max(0))
        }
    }
}

/// Owner string recorded in candidates and session records.
pub(crate) fn owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

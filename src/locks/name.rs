//! Resource names and the candidate naming scheme derived from them.

use crate::error::{Result, TurnstileError};
use crate::namespace::path;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Separator between the resource name and the sequence in candidate names.
pub const SEPARATOR: &str = "_lock_";

/// Longest accepted resource name, in bytes.
pub const MAX_LEN: usize = 128;

static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-][A-Za-z0-9._-]*$").expect("Invalid resource name regex")
});

/// Validated name of a lockable resource.
///
/// A resource `job-42` lives at `<root>/job-42` and its candidates are named
/// `job-42_lock_<sequence>`. Names containing the separator are rejected so
/// that prefix filtering can never confuse two resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceName(String);

impl ResourceName {
    pub fn parse(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(TurnstileError::InvalidResource(
                "name is empty".to_string(),
            ));
        }
        if name.len() > MAX_LEN {
            return Err(TurnstileError::InvalidResource(format!(
                "'{}...' is longer than {} bytes",
                name.chars().take(16).collect::<String>(),
                MAX_LEN
            )));
        }
        if name.contains(SEPARATOR) {
            return Err(TurnstileError::InvalidResource(format!(
                "'{}' contains the reserved separator '{}'",
                name, SEPARATOR
            )));
        }
        if !NAME_REGEX.is_match(name) {
            return Err(TurnstileError::InvalidResource(format!(
                "'{}' may only contain letters, digits, '.', '_' and '-', and must not start with '.'",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix shared by every candidate node of this resource.
    pub fn candidate_prefix(&self) -> String {
        format!("{}{}", self.0, SEPARATOR)
    }

    /// Namespace path of this resource's directory under `root`.
    pub fn directory(&self, root: &str) -> String {
        path::join(root, &self.0)
    }
}

impl FromStr for ResourceName {
    type Err = TurnstileError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

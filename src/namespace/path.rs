//! Namespace path validation and manipulation.
//!
//! Paths are absolute and `/`-separated: `/turnstile/job-42`. The root is `/`.
//! Empty components, `.`/`..`, and trailing slashes are rejected.

use crate::error::{Result, TurnstileError};

/// Width of the zero-padded sequence suffix on sequential nodes.
pub const SEQUENCE_WIDTH: usize = 10;

/// Validate a namespace path.
pub fn validate(path: &str) -> Result<()> {
    if path == "/" {
        return Ok(());
    }
    if !path.starts_with('/') {
        return Err(TurnstileError::InvalidPath(format!(
            "'{}' must start with '/'",
            path
        )));
    }
    if path.ends_with('/') {
        return Err(TurnstileError::InvalidPath(format!(
            "'{}' must not end with '/'",
            path
        )));
    }
    for component in path[1..].split('/') {
        validate_name(component).map_err(|_| {
            TurnstileError::InvalidPath(format!("'{}' has an invalid component", path))
        })?;
    }
    Ok(())
}

/// Validate a single node name (one path component).
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0')
    {
        return Err(TurnstileError::InvalidPath(format!(
            "'{}' is not a valid node name",
            name
        )));
    }
    Ok(())
}

/// Join a parent path and a child name.
pub fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Parent of a path, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last component of a path (the node name). The root has an empty name.
pub fn name(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// Every ancestor-or-self of `path` from the top down, excluding the root.
///
/// `/a/b/c` yields `/a`, `/a/b`, `/a/b/c`.
pub fn ancestors_top_down(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for component in path.split('/').filter(|c| !c.is_empty()) {
        current.push('/');
        current.push_str(component);
        out.push(current.clone());
    }
    out
}

/// Format a sequential node name from its prefix and sequence number.
pub fn sequential_name(prefix: &str, sequence: u64) -> String {
    format!("{}{:0width$}", prefix, sequence, width = SEQUENCE_WIDTH)
}

/// Parse the sequence suffix of a sequential node name with the given prefix.
///
/// Parsing is numeric, so ordering holds even for suffixes that are not
/// zero-padded.
pub fn parse_sequence(name: &str, prefix: &str) -> Option<u64> {
    let suffix = name.strip_prefix(prefix)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

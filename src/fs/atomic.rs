//! Atomic file replacement for coordination state.
//!
//! Session records and sequence counters are rewritten while other processes
//! may be reading them. Writes go to a temporary file in the same directory,
//! are synced, and then renamed over the target so readers see either the old
//! or the new content, never a torn write.
//!
//! The temporary name carries the writer's pid so two processes refreshing
//! different records in one directory never share a temp file.

use crate::error::{Result, TurnstileError};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Atomically write bytes to a file, creating parent directories as needed.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            TurnstileError::Storage(format!(
                "failed to create parent directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp_path = generate_temp_path(path)?;
    write_and_sync(&temp_path, content)?;
    atomic_replace(&temp_path, path)
}

fn generate_temp_path(target: &Path) -> Result<PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TurnstileError::Storage("invalid file path".to_string()))?;

    Ok(parent.join(format!(".{}.{}.tmp", filename, std::process::id())))
}

fn write_and_sync(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| {
        TurnstileError::Storage(format!(
            "failed to create temporary file '{}': {}",
            path.display(),
            e
        ))
    })?;

    file.write_all(content).map_err(|e| {
        let _ = fs::remove_file(path);
        TurnstileError::Storage(format!("failed to write to temporary file: {}", e))
    })?;

    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(path);
        TurnstileError::Storage(format!("failed to sync temporary file to disk: {}", e))
    })
}

#[cfg(unix)]
fn atomic_replace(source: &Path, target: &Path) -> Result<()> {
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        TurnstileError::Storage(format!(
            "failed to atomically replace '{}': {}",
            target.display(),
            e
        ))
    })
}

/// Windows refuses to rename over an existing file, so the target is removed
/// first. Readers can observe a brief gap where the file is missing.
#[cfg(windows)]
fn atomic_replace(source: &Path, target: &Path) -> Result<()> {
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists || target.exists() => {
            let _ = fs::remove_file(target);
            fs::rename(source, target).map_err(|e| {
                let _ = fs::remove_file(source);
                TurnstileError::Storage(format!(
                    "failed to replace '{}': {}",
                    target.display(),
                    e
                ))
            })
        }
        Err(e) => {
            let _ = fs::remove_file(source);
            Err(TurnstileError::Storage(format!(
                "failed to replace '{}': {}",
                target.display(),
                e
            )))
        }
    }
}

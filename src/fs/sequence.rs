//! Per-directory sequence counters.
//!
//! A counter lives in `<dir>/.seq`. It is only read and bumped, and the
//! numbered child created, while holding `<dir>/.seq.lock`, which is taken with create-new semantics so exactly one
//! process at a time can hold it. The lock file records who holds it; a lock
//! older than [`STALE_AFTER`] belongs to a process that died mid-bump and is
//! broken.

use super::atomic::atomic_write;
use crate::error::{Result, TurnstileError};
use crate::locks::owner_string;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

const COUNTER_FILE: &str = ".seq";
const COUNTER_LOCK: &str = ".seq.lock";

/// Age after which an abandoned counter lock is broken.
const STALE_AFTER: Duration = Duration::from_secs(5);

const BASE_DELAY_MS: u64 = 1;
const MAX_DELAY_MS: u64 = 20;
const MAX_ATTEMPTS: u32 = 2_000;

/// Exclusive hold on a directory's counter. Removes the lock file on drop.
struct CounterLock {
    path: PathBuf,
}

impl CounterLock {
    fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(COUNTER_LOCK);
        let mut attempt: u32 = 0;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "{} pid={}", owner_string(), std::process::id());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    break_if_stale(&path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(TurnstileError::NoSuchNode(dir.display().to_string()));
                }
                Err(e) => {
                    return Err(TurnstileError::Storage(format!(
                        "failed to lock counter '{}': {}",
                        path.display(),
                        e
                    )));
                }
            }

            attempt += 1;
            if attempt >= MAX_ATTEMPTS {
                return Err(TurnstileError::Storage(format!(
                    "counter lock '{}' is still held after {} attempts",
                    path.display(),
                    attempt
                )));
            }
            let delay = (BASE_DELAY_MS << attempt.min(5)).min(MAX_DELAY_MS);
            thread::sleep(Duration::from_millis(delay));
        }
    }
}

impl Drop for CounterLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release counter lock");
        }
    }
}

fn break_if_stale(path: &Path) {
    let age = fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok());
    if let Some(age) = age
        && age > STALE_AFTER
    {
        tracing::warn!(path = %path.display(), age_ms = age.as_millis() as u64, "breaking stale counter lock");
        let _ = fs::remove_file(path);
    }
}

/// Create the next sequentially numbered child of `dir`.
///
/// `create` is called with candidate sequence numbers while the counter lock
/// is held, so numbering and creation are one step: no other process can
/// create a lower-numbered sibling afterwards. `create` returns `Ok(None)` when
/// the number is already taken (a counter reset left an old node behind) and
/// the next number is tried.
pub(super) fn allocate<T>(
    dir: &Path,
    mut create: impl FnMut(u64) -> Result<Option<T>>,
) -> Result<T> {
    let _lock = CounterLock::acquire(dir)?;
    let counter = dir.join(COUNTER_FILE);

    let mut sequence = match fs::read_to_string(&counter) {
        Ok(content) => content.trim().parse::<u64>().map_err(|e| {
            TurnstileError::Storage(format!(
                "corrupt sequence counter '{}': {}",
                counter.display(),
                e
            ))
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
        Err(e) => {
            return Err(TurnstileError::Storage(format!(
                "failed to read sequence counter '{}': {}",
                counter.display(),
                e
            )));
        }
    };

    loop {
        let created = create(sequence)?;
        sequence += 1;
        if let Some(created) = created {
            atomic_write(&counter, sequence.to_string().as_bytes())?;
            return Ok(created);
        }
    }
}

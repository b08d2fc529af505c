//! Implementation of the `turnstile queue` command.

use super::{close, open_locks};
use crate::cli::QueueArgs;
use globset::{Glob, GlobMatcher};
use turnstile::config::Config;
use turnstile::error::{Result, TurnstileError};
use turnstile::locks::{Candidate, Locks, ResourceName};

/// Execute the `turnstile queue` command.
pub fn cmd_queue(config: &Config, args: QueueArgs) -> Result<()> {
    let matcher = Glob::new(&args.pattern)
        .map_err(|e| {
            TurnstileError::UserError(format!("invalid pattern '{}': {}", args.pattern, e))
        })?
        .compile_matcher();

    let locks = open_locks(config)?;
    let result = matching_queues(&locks, &matcher);
    close(&locks);
    let queues = result?;

    if queues.is_empty() {
        println!("No queued locks matching '{}'.", args.pattern);
        return Ok(());
    }
    for (resource, queue) in &queues {
        print!("{}", render_queue(resource, queue));
    }
    Ok(())
}

/// Non-empty queues of the resources whose names match.
fn matching_queues(
    locks: &Locks,
    matcher: &GlobMatcher,
) -> Result<Vec<(ResourceName, Vec<Candidate>)>> {
    let mut queues = Vec::new();
    for resource in locks.resources()? {
        if !matcher.is_match(resource.as_str()) {
            continue;
        }
        let queue = locks.queue(resource.as_str())?;
        if !queue.is_empty() {
            queues.push((resource, queue));
        }
    }
    Ok(queues)
}

/// Render one resource's queue, holder first.
pub(super) fn render_queue(resource: &ResourceName, queue: &[Candidate]) -> String {
    let mut out = format!("{} ({} queued):\n", resource, queue.len());
    for (position, candidate) in queue.iter().enumerate() {
        let status = if candidate.holder { "HOLDING" } else { "waiting" };
        out.push_str(&format!(
            "  #{} {} seq {}\n",
            position + 1,
            status,
            candidate.sequence
        ));
        if let Some(meta) = &candidate.metadata {
            out.push_str(&format!("    Owner:      {}\n", meta.owner));
            if let Some(pid) = meta.pid {
                out.push_str(&format!("    PID:        {}\n", pid));
            }
            out.push_str(&format!("    Age:        {}\n", meta.age_string()));
            if let Some(note) = &meta.note {
                out.push_str(&format!("    Note:       {}\n", note));
            }
        }
        out.push_str(&format!("    Node:       {}\n", candidate.path));
    }
    out.push('\n');
    out
}

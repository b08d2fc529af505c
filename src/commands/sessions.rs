//! Implementation of the `turnstile sessions` and `turnstile reap` commands.
//!
//! Both only make sense for the filesystem backend, whose sessions are visible
//! to every process sharing the service directory.

use chrono::Utc;
use std::path::Path;
use turnstile::config::{Backend, Config};
use turnstile::error::{Result, TurnstileError};
use turnstile::fs::{SessionRecord, list_sessions, reap_expired};

fn require_filesystem(config: &Config, command: &str) -> Result<()> {
    if config.backend != Backend::Filesystem {
        return Err(TurnstileError::UserError(format!(
            "`turnstile {}` needs the filesystem backend (configured: {})",
            command, config.backend
        )));
    }
    Ok(())
}

/// Execute the `turnstile sessions` command.
pub fn cmd_sessions(config: &Config) -> Result<()> {
    require_filesystem(config, "sessions")?;

    for endpoint in &config.endpoints {
        let records = list_sessions(Path::new(endpoint))?;
        if records.is_empty() {
            println!("{}: no sessions.", endpoint);
            continue;
        }
        println!("{} ({} session(s)):", endpoint, records.len());
        println!();
        for record in &records {
            print!("{}", render_session(record));
        }
    }
    Ok(())
}

/// Execute the `turnstile reap` command.
pub fn cmd_reap(config: &Config) -> Result<()> {
    require_filesystem(config, "reap")?;

    let mut total = 0;
    for endpoint in &config.endpoints {
        let reaped = reap_expired(Path::new(endpoint))?;
        for id in &reaped {
            println!("Reaped session {} in {}", id, endpoint);
        }
        total += reaped.len();
    }
    if total == 0 {
        println!("No expired sessions.");
    }
    Ok(())
}

pub(super) fn render_session(record: &SessionRecord) -> String {
    let now = Utc::now();
    let mut out = format!("  {}:\n", record.id);
    out.push_str(&format!("    Owner:      {}\n", record.owner));
    out.push_str(&format!("    PID:        {}\n", record.pid));
    out.push_str(&format!(
        "    Created:    {}\n",
        record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if let Some(beat) = record.heartbeat_at {
        out.push_str(&format!(
            "    Heartbeat:  {}s ago\n",
            (now - beat).num_seconds().max(0)
        ));
    }
    out.push_str(&format!("    Timeout:    {} ms\n", record.timeout_ms));
    if record.is_expired(now) {
        out.push_str("    Status:     EXPIRED (run `turnstile reap` to release its locks)\n");
    }
    out.push('\n');
    out
}

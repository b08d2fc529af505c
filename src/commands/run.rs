//! Implementation of the `turnstile run` command.
//!
//! Joins the resource's queue, runs the command once the lock is granted, and
//! releases the lock when the command exits, whatever its status.

use super::{close, open_locks};
use crate::cli::RunArgs;
use std::process::Command;
use std::time::Duration;
use turnstile::config::Config;
use turnstile::error::{Result, TurnstileError};

/// Conventional exit code for a command that could not be started.
const NOT_STARTED: i32 = 127;

/// Execute the `turnstile run` command.
pub fn cmd_run(config: &Config, args: RunArgs) -> Result<()> {
    let argv = command_line(&args)?;
    let note = args.note.clone().unwrap_or_else(|| argv.join(" "));
    let timeout = args.timeout_ms.map(Duration::from_millis);

    let locks = open_locks(config)?;
    let guard = match locks.acquire(&args.resource, timeout, Some(&note)) {
        Ok(Some(guard)) => guard,
        Ok(None) => {
            close(&locks);
            return Err(TurnstileError::TimedOut(format!(
                "'{}' was not granted within {} ms",
                args.resource,
                args.timeout_ms.unwrap_or_default()
            )));
        }
        Err(e) => {
            close(&locks);
            return Err(e);
        }
    };
    tracing::debug!(resource = %args.resource, command = %note, "running under lock");

    let status = Command::new(&argv[0]).args(&argv[1..]).status();

    let still_held = guard.still_held();
    let released = guard.release();
    close(&locks);

    let status = status.map_err(|e| {
        eprintln!("Error: failed to start '{}': {}", argv[0], e);
        TurnstileError::CommandFailed(NOT_STARTED)
    })?;
    released?;

    if !status.success() {
        return Err(TurnstileError::CommandFailed(status.code().unwrap_or(-1)));
    }
    match still_held {
        Ok(true) => Ok(()),
        Ok(false) => Err(TurnstileError::SessionLost(format!(
            "the lock on '{}' was lost while the command ran",
            args.resource
        ))),
        Err(e) => Err(e),
    }
}

/// The argv to run: `--shell` split with shell quoting, or the trailing args.
pub(super) fn command_line(args: &RunArgs) -> Result<Vec<String>> {
    let argv = match &args.shell {
        Some(line) => shell_words::split(line).map_err(|e| {
            TurnstileError::UserError(format!("invalid --shell command '{}': {}", line, e))
        })?,
        None => args.command.clone(),
    };
    if argv.is_empty() {
        return Err(TurnstileError::UserError(
            "no command given; pass it after `--` or with --shell".to_string(),
        ));
    }
    Ok(argv)
}

//! Command implementations for turnstile.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations, plus the config and session plumbing they share.

mod queue;
mod run;
mod sessions;
mod simulate;


use crate::cli::{Cli, Command};
use std::path::Path;
use std::sync::Arc;
use turnstile::config::Config;
use turnstile::error::Result;
use turnstile::locks::Locks;
use turnstile::session::Session;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "turnstile.yaml";

/// Dispatch a command to its implementation.
///
/// This is the main entry point for command execution. Each command
/// is routed to its handler function.
pub fn dispatch(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Run(args) => run::cmd_run(&config, args),
        Command::Queue(args) => queue::cmd_queue(&config, args),
        Command::Sessions => sessions::cmd_sessions(&config),
        Command::Reap => sessions::cmd_reap(&config),
        Command::Config => cmd_config(&config),
        Command::Simulate(args) => simulate::cmd_simulate(args),
    }
}

/// Load the explicit config file, else `./turnstile.yaml`, else defaults.
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Config::load(DEFAULT_CONFIG_FILE),
        None => Ok(Config::default()),
    }
}

/// Connect per `config` and return a lock provider for its root.
fn open_locks(config: &Config) -> Result<Locks> {
    config.prepare_endpoints()?;
    let ensemble = config.ensemble();
    let session = Session::connect(ensemble.as_ref(), &config.session_settings())?;
    Locks::new(Arc::new(session), &config.root)
}

/// Close the session behind `locks`, logging rather than failing.
fn close(locks: &Locks) {
    if let Err(e) = locks.session().close() {
        tracing::warn!(error = %e, "failed to close session");
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    print!("{}", config.to_yaml()?);
    Ok(())
}

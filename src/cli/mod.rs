//! CLI argument parsing for turnstile.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Turnstile: run commands under queued distributed locks.
///
/// Every process that wants a resource joins its queue; the lock is granted in
/// arrival order and released automatically if the holder dies.
#[derive(Parser, Debug)]
#[command(name = "turnstile")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: ./turnstile.yaml if present).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log protocol steps to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for turnstile.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command while holding a lock.
    ///
    /// Waits in the resource's queue, runs the command, then releases.
    /// Exits with the command's exit code.
    Run(RunArgs),

    /// Show the queue of every resource matching a pattern.
    Queue(QueueArgs),

    /// List sessions registered with the filesystem service.
    Sessions,

    /// Expire sessions that stopped heartbeating, releasing their locks.
    Reap,

    /// Print the effective configuration as YAML.
    Config,

    /// Contend for a lock in-process and check exclusion and FIFO order.
    Simulate(SimulateArgs),
}

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Resource to lock (e.g., job-42).
    pub resource: String,

    /// Give up if the lock is not granted within this many milliseconds.
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Note recorded in the candidate node, shown by `queue`.
    #[arg(long)]
    pub note: Option<String>,

    /// Command line to run, split with shell quoting rules.
    #[arg(long, conflicts_with = "command")]
    pub shell: Option<String>,

    /// Command and arguments to run.
    #[arg(last = true)]
    pub command: Vec<String>,
}

/// Arguments for the `queue` command.
#[derive(Args, Debug)]
pub struct QueueArgs {
    /// Glob over resource names.
    #[arg(default_value = "*")]
    pub pattern: String,
}

/// Arguments for the `simulate` command.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Concurrent workers, each with its own session.
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Lock acquisitions per worker.
    #[arg(long, default_value_t = 5)]
    pub rounds: usize,

    /// How long each grant is held.
    #[arg(long, default_value_t = 2)]
    pub hold_ms: u64,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

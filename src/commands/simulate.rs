//! Implementation of the `turnstile simulate` command.
//!
//! Runs workers against an in-memory service, each on its own session, and
//! checks the two properties a queued lock promises: never more than one
//! holder, and grants in the order candidates were created.

use crate::cli::SimulateArgs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use turnstile::error::{Result, TurnstileError};
use turnstile::locks::{Locks, ResourceName};
use turnstile::memory::MemoryService;
use turnstile::namespace::path;
use turnstile::session::{Session, SessionSettings};

const RESOURCE: &str = "simulate";
const ROOT: &str = "/turnstile";

/// What a simulation observed.
#[derive(Debug)]
pub(super) struct Summary {
    pub grants: usize,
    pub max_holders: usize,
    /// Candidate sequences in the order their locks were granted.
    pub grant_order: Vec<u64>,
    pub elapsed: Duration,
}

impl Summary {
    pub fn is_fifo(&self) -> bool {
        self.grant_order.windows(2).all(|w| w[0] < w[1])
    }
}

/// Execute the `turnstile simulate` command.
pub fn cmd_simulate(args: SimulateArgs) -> Result<()> {
    let summary = simulate(&args)?;

    println!("Workers:        {}", args.workers);
    println!("Rounds:         {}", args.rounds);
    println!("Grants:         {}", summary.grants);
    println!("Max holders:    {}", summary.max_holders);
    println!(
        "Grant order:    {}",
        if summary.is_fifo() { "FIFO" } else { "OUT OF ORDER" }
    );
    println!("Elapsed:        {} ms", summary.elapsed.as_millis());

    if summary.max_holders > 1 {
        return Err(TurnstileError::InvalidState(format!(
            "mutual exclusion violated: {} concurrent holders",
            summary.max_holders
        )));
    }
    if !summary.is_fifo() {
        return Err(TurnstileError::InvalidState(
            "grants did not follow arrival order".to_string(),
        ));
    }
    Ok(())
}

pub(super) fn simulate(args: &SimulateArgs) -> Result<Summary> {
    if args.workers == 0 || args.rounds == 0 {
        return Err(TurnstileError::UserError(
            "--workers and --rounds must be greater than 0".to_string(),
        ));
    }

    let service = MemoryService::new();
    let settings = SessionSettings::new(vec!["memory".to_string()]);
    let prefix = ResourceName::parse(RESOURCE)?.candidate_prefix();
    let hold = Duration::from_millis(args.hold_ms);

    let holders = Arc::new(AtomicUsize::new(0));
    let max_holders = Arc::new(AtomicUsize::new(0));
    let grant_order = Arc::new(Mutex::new(Vec::new()));

    let start = Instant::now();
    let mut workers = Vec::with_capacity(args.workers);
    for _ in 0..args.workers {
        let session = Session::connect(&service, &settings)?;
        let locks = Locks::new(Arc::new(session), ROOT)?;
        let holders = Arc::clone(&holders);
        let max_holders = Arc::clone(&max_holders);
        let grant_order = Arc::clone(&grant_order);
        let prefix = prefix.clone();
        let rounds = args.rounds;

        workers.push(thread::spawn(move || -> Result<()> {
            for _ in 0..rounds {
                let guard = locks.acquire_blocking(RESOURCE)?;
                let now_holding = holders.fetch_add(1, Ordering::SeqCst) + 1;
                max_holders.fetch_max(now_holding, Ordering::SeqCst);

                let candidate = guard.candidate();
                if let Some(sequence) = path::parse_sequence(path::name(&candidate), &prefix) {
                    grant_order
                        .lock()
                        .unwrap_or_else(|poison| poison.into_inner())
                        .push(sequence);
                }
                thread::sleep(hold);

                holders.fetch_sub(1, Ordering::SeqCst);
                guard.release()?;
            }
            locks.session().close()
        }));
    }

    for worker in workers {
        worker
            .join()
            .map_err(|_| TurnstileError::InvalidState("simulation worker panicked".to_string()))??;
    }
    let elapsed = start.elapsed();

    let grant_order = std::mem::take(
        &mut *grant_order
            .lock()
            .unwrap_or_else(|poison| poison.into_inner()),
    );
    Ok(Summary {
        grants: grant_order.len(),
        max_holders: max_holders.load(Ordering::SeqCst),
        grant_order,
        elapsed,
    })
}

//! The queued lock protocol.
//!
//! Every attempt on a resource creates an ephemeral sequential candidate in
//! the resource's directory. The candidate with the lowest sequence holds the
//! lock. Every other candidate watches exactly one node, its immediate
//! predecessor, and re-evaluates the whole queue when that node goes away.
//!
//! Ownership is always re-derived from a fresh listing. Nothing here caches
//! who holds the lock, so concurrent unsynchronized callers stay safe: the
//! service assigns sequences atomically, and at most one candidate can observe
//! itself as the minimum.

use super::metadata::CandidateMetadata;
use super::name::ResourceName;
use super::wakeup::{Signal, WaitOutcome, Wakeup};
use crate::error::{Result, TurnstileError};
use crate::namespace::{WatchEvent, Watcher, path};
use crate::session::Session;
use std::sync::Arc;
use std::time::Instant;

/// Where a candidate stands in its queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Position {
    /// Lowest sequence: the lock is held.
    Head,
    /// Waiting behind the named sibling.
    Behind { predecessor: String },
}

/// How a wait for the lock ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Turn {
    Acquired,
    TimedOut,
}

/// One entry of a queue snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Full namespace path of the candidate node.
    pub path: String,

    /// Sequence assigned by the service.
    pub sequence: u64,

    /// Whether this candidate currently holds the lock.
    pub holder: bool,

    /// Metadata written by the attempt, if readable.
    pub metadata: Option<CandidateMetadata>,
}

/// Candidates among `names` that belong to `prefix`, in sequence order.
///
/// Names are compared by their parsed sequence, not as strings, so ordering
/// holds even without zero padding.
pub(crate) fn ordered(names: &[String], prefix: &str) -> Vec<(u64, String)> {
    let mut out: Vec<(u64, String)> = names
        .iter()
        .filter_map(|name| path::parse_sequence(name, prefix).map(|seq| (seq, name.clone())))
        .collect();
    out.sort();
    out
}

/// Decide the position of `own` among the current siblings.
pub(crate) fn position(names: &[String], prefix: &str, own: &str) -> Result<Position> {
    let own_sequence = path::parse_sequence(own, prefix).ok_or_else(|| {
        TurnstileError::InvalidState(format!("'{}' is not a candidate of '{}'", own, prefix))
    })?;
    let queue = ordered(names, prefix);
    if !queue.iter().any(|(seq, _)| *seq == own_sequence) {
        // Candidates only disappear with their session.
        return Err(TurnstileError::SessionLost(format!(
            "candidate '{}' is no longer queued",
            own
        )));
    }
    Ok(
        match queue.into_iter().take_while(|(seq, _)| *seq < own_sequence).last() {
            None => Position::Head,
            Some((_, predecessor)) => Position::Behind { predecessor },
        },
    )
}

/// Queue protocol operations for one resource on one session.
pub(crate) struct Queue<'a> {
    session: &'a Session,
    directory: String,
    prefix: String,
}

impl<'a> Queue<'a> {
    pub(crate) fn new(session: &'a Session, resource: &ResourceName, root: &str) -> Self {
        Self {
            session,
            directory: resource.directory(root),
            prefix: resource.candidate_prefix(),
        }
    }

    pub(crate) fn directory(&self) -> &str {
        &self.directory
    }

    /// Create the resource directory and its ancestors if absent.
    pub(crate) fn ensure_directory(&self) -> Result<()> {
        let client = self.session.client();
        for node in path::ancestors_top_down(&self.directory) {
            match client.create_persistent(&node, &[]) {
                Ok(()) | Err(TurnstileError::NodeExists(_)) => {}
                Err(e) => return Err(e.into_session_lost()),
            }
        }
        Ok(())
    }

    /// Create this attempt's candidate node and return its path.
    pub(crate) fn enqueue(&self, metadata: &CandidateMetadata) -> Result<String> {
        let data = metadata.to_bytes()?;
        let candidate = self
            .session
            .client()
            .create_ephemeral_sequential(&self.directory, &self.prefix, &data)
            .map_err(TurnstileError::into_session_lost)?;
        tracing::debug!(candidate = %candidate, "candidate enqueued");
        Ok(candidate)
    }

    fn siblings(&self) -> Result<Vec<String>> {
        self.session
            .client()
            .children(&self.directory)
            .map_err(TurnstileError::into_session_lost)
    }

    /// Wait until `candidate` heads the queue or `deadline` passes.
    ///
    /// `observe` is told which predecessor is being watched (or `None` once
    /// the lock is held).
    pub(crate) fn await_turn(
        &self,
        candidate: &str,
        deadline: Option<Instant>,
        observe: impl Fn(Option<&str>),
    ) -> Result<Turn> {
        let own = path::name(candidate);
        loop {
            self.session.check_live()?;
            let predecessor = match position(&self.siblings()?, &self.prefix, own)? {
                Position::Head => {
                    observe(None);
                    return Ok(Turn::Acquired);
                }
                Position::Behind { predecessor } => path::join(&self.directory, &predecessor),
            };

            let wakeup = Wakeup::new();
            let _parked = self.session.park(&wakeup);
            let remote = Arc::clone(&wakeup);
            let watcher: Watcher = Box::new(move |event| {
                let signal = match event {
                    WatchEvent::Session(state) if state.is_lost() => Signal::SessionLost(state),
                    _ => Signal::PredecessorGone,
                };
                remote.fire(signal);
            });

            // Check and arm in one call; a predecessor that left between the
            // listing and now will never fire, so re-list instead of waiting.
            let armed = self
                .session
                .client()
                .exists(&predecessor, Some(watcher))
                .map_err(TurnstileError::into_session_lost)?;
            if !armed {
                tracing::debug!(candidate = %candidate, predecessor = %predecessor, "predecessor already gone");
                continue;
            }

            observe(Some(&predecessor));
            tracing::debug!(candidate = %candidate, predecessor = %predecessor, "waiting on predecessor");

            match wakeup.wait(deadline) {
                WaitOutcome::Signaled(Signal::PredecessorGone) => continue,
                WaitOutcome::Signaled(Signal::SessionLost(state)) => {
                    return Err(TurnstileError::SessionLost(format!(
                        "session {} while waiting on '{}'",
                        state, predecessor
                    )));
                }
                WaitOutcome::TimedOut => return Ok(Turn::TimedOut),
            }
        }
    }

    /// Delete a candidate. A missing node is already withdrawn.
    pub(crate) fn withdraw(&self, candidate: &str) -> Result<()> {
        match self.session.client().delete(candidate) {
            Ok(()) | Err(TurnstileError::NoSuchNode(_)) => Ok(()),
            Err(e) => Err(e.into_session_lost()),
        }
    }

    /// Whether `candidate` currently heads the queue.
    pub(crate) fn heads(&self, candidate: &str) -> Result<bool> {
        self.session.check_live()?;
        Ok(position(&self.siblings()?, &self.prefix, path::name(candidate))? == Position::Head)
    }

    /// Ordered view of the queue with decoded metadata.
    pub(crate) fn snapshot(&self) -> Result<Vec<Candidate>> {
        let names = match self.siblings() {
            Ok(names) => names,
            Err(TurnstileError::NoSuchNode(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let client = self.session.client();
        Ok(ordered(&names, &self.prefix)
            .into_iter()
            .enumerate()
            .map(|(index, (sequence, name))| {
                let node = path::join(&self.directory, &name);
                let metadata = client
                    .get_data(&node)
                    .ok()
                    .and_then(|data| CandidateMetadata::from_bytes(&data).ok());
                Candidate {
                    path: node,
                    sequence,
                    holder: index == 0,
                    metadata,
                }
            })
            .collect())
    }
}

//! Tests for the locks subsystem.

use super::queue::{Position, ordered, position};
use super::*;
use crate::error::TurnstileError;
use crate::fs::FsService;
use crate::memory::MemoryService;
use crate::namespace::{
    ListenerId, NamespaceClient, SessionId, SessionState, StateListener, Watcher,
};
use crate::session::Session;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const ROOT: &str = "/turnstile";

fn session(service: &MemoryService) -> Arc<Session> {
    let client: Arc<dyn NamespaceClient> = service.connect().unwrap();
    Arc::new(Session::attach(client))
}

fn locks(service: &MemoryService) -> Locks {
    Locks::new(session(service), ROOT).unwrap()
}

/// Poll `condition` until it holds, failing the test after five seconds.
fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(2));
    }
}

/// Start `manager.lock()` on another thread and wait until it is watching.
fn lock_in_background(
    manager: &Arc<LockManager>,
) -> thread::JoinHandle<crate::error::Result<()>> {
    let remote = Arc::clone(manager);
    let handle = thread::spawn(move || remote.lock());
    wait_until("waiter to watch", || manager.watching().is_some());
    handle
}

// ============================================================================
// Queue ordering
// ============================================================================

#[test]
fn test_ordering_is_numeric_and_prefix_filtered() {
    let names: Vec<String> = [
        "job_lock_10",
        "job_lock_9",
        "other_lock_1",
        "job_lock_x",
        "job_lock_0000000011",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let sequences: Vec<u64> = ordered(&names, "job_lock_").iter().map(|(s, _)| *s).collect();
    assert_eq!(sequences, vec![9, 10, 11]);
}

#[test]
fn test_position_finds_immediate_predecessor() {
    let names: Vec<String> = ["r_lock_0000000003", "r_lock_0000000001", "r_lock_0000000007"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    assert_eq!(
        position(&names, "r_lock_", "r_lock_0000000001").unwrap(),
        Position::Head
    );
    assert_eq!(
        position(&names, "r_lock_", "r_lock_0000000007").unwrap(),
        Position::Behind {
            predecessor: "r_lock_0000000003".to_string()
        }
    );
}

#[test]
fn test_position_of_vanished_candidate_is_session_lost() {
    let names = vec!["r_lock_0000000001".to_string()];
    assert!(matches!(
        position(&names, "r_lock_", "r_lock_0000000002"),
        Err(TurnstileError::SessionLost(_))
    ));
}

// ============================================================================
// Basic acquire / release
// ============================================================================

#[test]
fn test_acquire_uncontended_creates_directory_and_candidate() {
    let service = MemoryService::new();
    let locks = locks(&service);

    let guard = locks.acquire_blocking("job-42").unwrap();
    assert!(guard.candidate().starts_with("/turnstile/job-42/job-42_lock_"));
    assert!(guard.still_held().unwrap());

    let queue = locks.queue("job-42").unwrap();
    assert_eq!(queue.len(), 1);
    assert!(queue[0].holder);
    let metadata = queue[0].metadata.as_ref().unwrap();
    assert_eq!(metadata.pid, Some(std::process::id()));

    locks.release(guard).unwrap();
    assert!(locks.queue("job-42").unwrap().is_empty());
    assert_eq!(
        locks.resources().unwrap(),
        vec![ResourceName::parse("job-42").unwrap()]
    );
}

#[test]
fn test_acquire_rejects_invalid_resource() {
    let service = MemoryService::new();
    let locks = locks(&service);
    assert!(matches!(
        locks.acquire_blocking("job_lock_1"),
        Err(TurnstileError::InvalidResource(_))
    ));
    assert!(Locks::new(session(&service), "relative/root").is_err());
}

#[test]
fn test_note_is_recorded_in_metadata() {
    let service = MemoryService::new();
    let locks = locks(&service);
    let _guard = locks
        .acquire("build", None, Some("cargo build"))
        .unwrap()
        .unwrap();
    let queue = locks.queue("build").unwrap();
    assert_eq!(
        queue[0].metadata.as_ref().unwrap().note.as_deref(),
        Some("cargo build")
    );
}

#[test]
fn test_drop_releases_lock() {
    let service = MemoryService::new();
    let locks = locks(&service);
    {
        let _guard = locks.acquire_blocking("dropped").unwrap();
        assert_eq!(locks.queue("dropped").unwrap().len(), 1);
    }
    assert!(locks.queue("dropped").unwrap().is_empty());
}

// ============================================================================
// Three-attempt scenario
// ============================================================================

#[test]
fn test_three_attempts_each_watch_their_predecessor() {
    let service = MemoryService::new();
    let a = locks(&service);
    let b = Arc::new(locks(&service).manager("job-42").unwrap());
    let c = Arc::new(locks(&service).manager("job-42").unwrap());

    let guard_a = a.acquire_blocking("job-42").unwrap();
    let a_node = guard_a.candidate();

    let b_thread = lock_in_background(&b);
    assert_eq!(b.watching().as_deref(), Some(a_node.as_str()));
    let b_node = b.candidate().unwrap();

    let c_thread = lock_in_background(&c);
    assert_eq!(c.watching().as_deref(), Some(b_node.as_str()));
    let c_node = c.candidate().unwrap();

    assert_eq!(service.watch_count(&a_node), 1);
    assert_eq!(service.watch_count(&b_node), 1);
    assert_eq!(service.watch_count(&c_node), 0);
    assert_eq!(b.state(), AttemptState::Attempting);
    assert_eq!(c.state(), AttemptState::Attempting);

    guard_a.release().unwrap();
    b_thread.join().unwrap().unwrap();
    assert_eq!(b.state(), AttemptState::Held);
    assert_eq!(b.watching(), None);

    // C never re-targets while B holds.
    assert_eq!(c.watching().as_deref(), Some(b_node.as_str()));
    assert_eq!(c.state(), AttemptState::Attempting);
    assert_eq!(service.watch_count(&b_node), 1);

    b.unlock().unwrap();
    c_thread.join().unwrap().unwrap();
    assert_eq!(c.state(), AttemptState::Held);
    c.unlock().unwrap();
    assert_eq!(c.state(), AttemptState::Released);
}

// ============================================================================
// Safety and fairness
// ============================================================================

#[test]
fn test_mutual_exclusion_under_contention() {
    let service = MemoryService::new();
    let inside = Arc::new(AtomicUsize::new(0));
    let grants = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..6)
        .map(|_| {
            let locks = locks(&service);
            let inside = Arc::clone(&inside);
            let grants = Arc::clone(&grants);
            thread::spawn(move || {
                for _ in 0..10 {
                    let guard = locks.acquire_blocking("counter").unwrap();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    grants.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_micros(200));
                    inside.fetch_sub(1, Ordering::SeqCst);
                    guard.release().unwrap();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(grants.load(Ordering::SeqCst), 60);
    assert!(locks(&service).queue("counter").unwrap().is_empty());
}

#[test]
fn test_grants_follow_arrival_order() {
    let service = MemoryService::new();
    let holder = locks(&service);
    let guard = holder.acquire_blocking("fifo").unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut threads = Vec::new();
    for id in 0..5 {
        let locks = locks(&service);
        let order = Arc::clone(&order);
        threads.push(thread::spawn(move || {
            let guard = locks.acquire_blocking("fifo").unwrap();
            order.lock().unwrap().push(id);
            guard.release().unwrap();
        }));
        // Each waiter is queued before the next one starts.
        let queued = id + 2;
        wait_until("waiter to enqueue", || {
            holder.queue("fifo").unwrap().len() == queued
        });
    }

    guard.release().unwrap();
    for t in threads {
        t.join().unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_lock_is_not_reentrant() {
    let service = MemoryService::new();
    let manager = locks(&service).manager("solo").unwrap();

    manager.lock().unwrap();
    assert!(!manager.try_lock(Duration::from_millis(30)).unwrap());
    assert_eq!(manager.state(), AttemptState::Held);

    manager.unlock().unwrap();
    assert!(matches!(
        manager.unlock(),
        Err(TurnstileError::InvalidState(_))
    ));
}

#[test]
fn test_unlock_without_lock_is_invalid_state() {
    let service = MemoryService::new();
    let manager = locks(&service).manager("idle").unwrap();
    assert_eq!(manager.state(), AttemptState::Idle);
    assert!(matches!(
        manager.unlock(),
        Err(TurnstileError::InvalidState(_))
    ));
}

// ============================================================================
// Timeouts
// ============================================================================

#[test]
fn test_try_lock_times_out_no_earlier_than_deadline() {
    let service = MemoryService::new();
    let holder = locks(&service);
    let guard = holder.acquire_blocking("busy").unwrap();

    let waiter = locks(&service);
    let timeout = Duration::from_millis(80);
    let start = Instant::now();
    let outcome = waiter.acquire_with_timeout("busy", timeout).unwrap();
    assert!(outcome.is_none());
    assert!(start.elapsed() >= timeout);

    // The abandoned candidate no longer affects ordering.
    let queue = holder.queue("busy").unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].path, guard.candidate());

    guard.release().unwrap();
    let next = locks(&service)
        .acquire_with_timeout("busy", Duration::ZERO)
        .unwrap();
    assert!(next.is_some());
}

#[test]
fn test_manager_try_lock_timeout_is_abandoned() {
    let service = MemoryService::new();
    let _guard = locks(&service).acquire_blocking("busy").unwrap();

    let manager = locks(&service).manager("busy").unwrap();
    assert!(!manager.try_lock(Duration::from_millis(20)).unwrap());
    assert_eq!(manager.state(), AttemptState::Abandoned);
    assert_eq!(manager.watching(), None);
    assert!(matches!(
        manager.unlock(),
        Err(TurnstileError::InvalidState(_))
    ));
}

// ============================================================================
// Session loss and liveness
// ============================================================================

#[test]
fn test_holder_expiry_grants_next_waiter() {
    let service = MemoryService::new();
    let holder = locks(&service);
    let guard = holder.acquire_blocking("crashy").unwrap();

    let waiter = Arc::new(locks(&service).manager("crashy").unwrap());
    let (tx, rx) = mpsc::channel();
    let remote = Arc::clone(&waiter);
    thread::spawn(move || {
        let _ = tx.send(remote.lock());
    });
    wait_until("waiter to watch", || waiter.watching().is_some());

    assert!(service.expire_session(&holder.session().id()));
    rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
    assert_eq!(waiter.state(), AttemptState::Held);

    // Releasing the expired holder is harmless to the new one.
    assert!(!guard.still_held().unwrap());
    holder.release(guard).unwrap();
    assert_eq!(waiter.state(), AttemptState::Held);
    assert_eq!(locks(&service).queue("crashy").unwrap().len(), 1);
}

#[test]
fn test_waiter_expiry_surfaces_session_lost() {
    let service = MemoryService::new();
    let _guard = locks(&service).acquire_blocking("held").unwrap();

    let waiter_locks = locks(&service);
    let waiter = Arc::new(waiter_locks.manager("held").unwrap());
    let handle = lock_in_background(&waiter);

    service.expire_session(&waiter_locks.session().id());
    let result = handle.join().unwrap();
    assert!(matches!(result, Err(TurnstileError::SessionLost(_))));
    assert_eq!(waiter.state(), AttemptState::Abandoned);
}

#[test]
fn test_waiter_disconnect_surfaces_session_lost() {
    let service = MemoryService::new();
    let _guard = locks(&service).acquire_blocking("held").unwrap();

    let waiter_locks = locks(&service);
    let waiter = Arc::new(waiter_locks.manager("held").unwrap());
    let handle = lock_in_background(&waiter);

    service.disconnect_session(&waiter_locks.session().id());
    assert!(matches!(
        handle.join().unwrap(),
        Err(TurnstileError::SessionLost(_))
    ));

    // No resume on a lost session, and its candidate is gone from the queue.
    assert!(matches!(
        waiter.lock(),
        Err(TurnstileError::SessionLost(_))
    ));
    let observer = locks(&service);
    wait_until("abandoned candidate to be removed", || {
        observer.queue("held").unwrap().len() == 1
    });
}

#[test]
fn test_disconnected_holder_frees_the_queue() {
    let service = MemoryService::new();
    let holder = locks(&service);
    let guard = holder.acquire_blocking("flaky").unwrap();

    let waiter = Arc::new(locks(&service).manager("flaky").unwrap());
    let handle = lock_in_background(&waiter);

    assert!(service.disconnect_session(&holder.session().id()));
    handle.join().unwrap().unwrap();
    assert_eq!(waiter.state(), AttemptState::Held);

    holder.release(guard).unwrap();
    assert_eq!(locks(&service).queue("flaky").unwrap().len(), 1);
    assert!(!service.session_ids().contains(&holder.session().id()));
}

#[test]
fn test_closed_session_cannot_acquire() {
    let service = MemoryService::new();
    let locks = locks(&service);
    locks.session().close().unwrap();
    assert!(matches!(
        locks.acquire_blocking("after-close"),
        Err(TurnstileError::SessionLost(_))
    ));
}

#[test]
fn test_release_after_own_expiry_is_ok() {
    let service = MemoryService::new();
    let locks = locks(&service);
    let guard = locks.acquire_blocking("expiring").unwrap();
    service.expire_session(&locks.session().id());
    wait_until("session to be lost", || locks.session().is_lost());
    locks.release(guard).unwrap();
}

// ============================================================================
// Predecessor gone before the watch is armed
// ============================================================================

/// Client that releases a held guard right before the first `exists` call,
/// so the predecessor is gone by the time the watch is armed.
struct VanishingPredecessor {
    inner: Arc<dyn NamespaceClient>,
    victim: Mutex<Option<LockGuard>>,
    exists_calls: AtomicUsize,
}

impl NamespaceClient for VanishingPredecessor {
    fn session_id(&self) -> SessionId {
        self.inner.session_id()
    }

    fn state(&self) -> SessionState {
        self.inner.state()
    }

    fn create_persistent(&self, path: &str, data: &[u8]) -> crate::error::Result<()> {
        self.inner.create_persistent(path, data)
    }

    fn create_ephemeral_sequential(
        &self,
        parent: &str,
        prefix: &str,
        data: &[u8],
    ) -> crate::error::Result<String> {
        self.inner.create_ephemeral_sequential(parent, prefix, data)
    }

    fn children(&self, path: &str) -> crate::error::Result<Vec<String>> {
        self.inner.children(path)
    }

    fn exists(&self, path: &str, watcher: Option<Watcher>) -> crate::error::Result<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(guard) = self.victim.lock().unwrap().take() {
            guard.release().unwrap();
        }
        self.inner.exists(path, watcher)
    }

    fn get_data(&self, path: &str) -> crate::error::Result<Vec<u8>> {
        self.inner.get_data(path)
    }

    fn delete(&self, path: &str) -> crate::error::Result<()> {
        self.inner.delete(path)
    }

    fn add_state_listener(&self, listener: StateListener) -> ListenerId {
        self.inner.add_state_listener(listener)
    }

    fn remove_state_listener(&self, id: ListenerId) {
        self.inner.remove_state_listener(id)
    }

    fn close(&self) -> crate::error::Result<()> {
        self.inner.close()
    }
}

#[test]
fn test_vanished_predecessor_is_relisted_not_waited_on() {
    let service = MemoryService::new();
    let holder = locks(&service);
    let guard = holder.acquire_blocking("racy").unwrap();
    let holder_node = guard.candidate();

    let client = Arc::new(VanishingPredecessor {
        inner: service.connect().unwrap(),
        victim: Mutex::new(Some(guard)),
        exists_calls: AtomicUsize::new(0),
    });
    let shared: Arc<dyn NamespaceClient> = client.clone();
    let racer = Locks::new(Arc::new(Session::attach(shared)), ROOT).unwrap();

    // A watch that never fires would run into the deadline.
    let start = Instant::now();
    let acquired = racer
        .acquire_with_timeout("racy", Duration::from_secs(5))
        .unwrap();
    assert!(acquired.is_some());
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(client.exists_calls.load(Ordering::SeqCst), 1);
    assert_eq!(service.watch_count(&holder_node), 0);
}

// ============================================================================
// Shared-directory backend
// ============================================================================

#[test]
fn test_locks_over_shared_directory() {
    let dir = TempDir::new().unwrap();
    let service = FsService::new(Duration::from_millis(5));
    let open = || -> Locks {
        let client: Arc<dyn NamespaceClient> =
            Arc::new(service.connect(dir.path(), Duration::from_secs(5)).unwrap());
        Locks::new(Arc::new(Session::attach(client)), ROOT).unwrap()
    };

    let holder = open();
    let guard = holder.acquire_blocking("deploy").unwrap();

    let waiter = open();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = waiter
            .acquire_with_timeout("deploy", Duration::from_secs(5))
            .map(|g| g.map(|g| g.candidate()));
        let _ = tx.send(result);
    });

    wait_until("waiter to enqueue", || {
        holder.queue("deploy").unwrap().len() == 2
    });
    let queue = holder.queue("deploy").unwrap();
    assert!(queue[0].holder);
    assert!(!queue[1].holder);
    assert!(queue[0].sequence < queue[1].sequence);

    guard.release().unwrap();
    let granted = rx.recv_timeout(Duration::from_secs(10)).unwrap().unwrap();
    assert_eq!(granted.as_deref(), Some(queue[1].path.as_str()));
}

#[test]
fn test_shared_directory_contention_is_exclusive() {
    let dir = TempDir::new().unwrap();
    let service = FsService::new(Duration::from_millis(2));
    let holders = Arc::new(AtomicUsize::new(0));
    let max_holders = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let client: Arc<dyn NamespaceClient> =
                Arc::new(service.connect(dir.path(), Duration::from_secs(30)).unwrap());
            let locks = Locks::new(Arc::new(Session::attach(client)), ROOT).unwrap();
            let holders = Arc::clone(&holders);
            let max_holders = Arc::clone(&max_holders);
            thread::spawn(move || {
                for _ in 0..5 {
                    let guard = locks.acquire_blocking("shared").unwrap();
                    let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                    max_holders.fetch_max(now, Ordering::SeqCst);
                    assert!(guard.still_held().unwrap());
                    thread::sleep(Duration::from_millis(1));
                    holders.fetch_sub(1, Ordering::SeqCst);
                    guard.release().unwrap();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(max_holders.load(Ordering::SeqCst), 1);
}

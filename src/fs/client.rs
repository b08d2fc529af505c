//! Session client for a shared-directory coordination service.
//!
//! Each client runs one background thread. It polls armed watches, heartbeats
//! the session record, reaps other sessions that stopped heartbeating, and
//! delivers every callback (watches and state changes) in order.

use super::layout::{DATA_FILE, EphemeralRecord, Layout, io_error};
use super::sequence::allocate;
use super::session::{self, Heartbeat};
use crate::error::{Result, TurnstileError};
use crate::namespace::{
    ListenerId, NamespaceClient, SessionId, SessionState, StateListener, WatchEvent, Watcher, path,
};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

struct ArmedWatch {
    node_path: String,
    file: PathBuf,
    watcher: Watcher,
}

struct Inner {
    layout: Layout,
    session: SessionId,
    state: Mutex<SessionState>,
    watches: Mutex<Vec<ArmedWatch>>,
    listeners: Mutex<Vec<(ListenerId, StateListener)>>,
    next_listener: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

impl Inner {
    fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Record a state change. Returns `false` if the state was already final
    /// or unchanged.
    fn transition(&self, next: SessionState) -> bool {
        let mut state = lock(&self.state);
        if *state == next || matches!(*state, SessionState::Expired | SessionState::Closed) {
            return false;
        }
        *state = next;
        true
    }

    fn check_live(&self) -> Result<()> {
        match self.state() {
            SessionState::Connected => Ok(()),
            SessionState::Connecting | SessionState::Disconnected => {
                Err(TurnstileError::ConnectionLost(format!(
                    "session {} cannot reach '{}'",
                    self.session,
                    self.layout.root().display()
                )))
            }
            SessionState::Expired | SessionState::Closed => Err(TurnstileError::SessionExpired(
                format!("session {} has ended", self.session),
            )),
        }
    }

    fn notify(&self, state: SessionState) {
        let current: Vec<StateListener> = lock(&self.listeners)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in current {
            listener(state);
        }
    }

    fn poll_watches(&self) {
        let fired: Vec<ArmedWatch> = {
            let mut watches = lock(&self.watches);
            let (gone, armed): (Vec<_>, Vec<_>) =
                watches.drain(..).partition(|w| !w.file.exists());
            *watches = armed;
            gone
        };
        for w in fired {
            (w.watcher)(WatchEvent::NodeDeleted { path: w.node_path });
        }
    }

    /// Fire all pending watches with a session event, then notify listeners.
    fn finish(&self, state: SessionState) {
        let pending: Vec<ArmedWatch> = lock(&self.watches).drain(..).collect();
        for w in pending {
            (w.watcher)(WatchEvent::Session(state));
        }
        self.notify(state);
    }
}

enum Control {
    Closed,
}

/// One session against a shared-directory coordination service.
pub struct FsClient {
    inner: Arc<Inner>,
    control: Sender<Control>,
}

impl FsClient {
    pub(super) fn open(
        layout: Layout,
        session_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self> {
        let session = SessionId::new(uuid::Uuid::new_v4().simple().to_string());
        session::write_record(&layout, &session, session_timeout)?;

        let inner = Arc::new(Inner {
            layout,
            session,
            state: Mutex::new(SessionState::Connected),
            watches: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        });

        let (control, inbox) = mpsc::channel();
        let worker = Arc::clone(&inner);
        let heartbeat_every = (session_timeout / 3).max(Duration::from_millis(1));
        thread::Builder::new()
            .name(format!("turnstile-session-{}", inner.session))
            .spawn(move || run_session(worker, inbox, poll_interval, heartbeat_every))
            .map_err(|e| {
                TurnstileError::Connect(format!("failed to start session thread: {}", e))
            })?;

        tracing::debug!(session = %inner.session, root = %inner.layout.root().display(), "directory session opened");
        Ok(Self { inner, control })
    }
}

fn run_session(
    inner: Arc<Inner>,
    inbox: Receiver<Control>,
    poll_interval: Duration,
    heartbeat_every: Duration,
) {
    let mut last_beat = Instant::now();
    loop {
        match inbox.recv_timeout(poll_interval) {
            Ok(Control::Closed) | Err(RecvTimeoutError::Disconnected) => {
                inner.finish(SessionState::Closed);
                return;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        inner.poll_watches();

        if last_beat.elapsed() < heartbeat_every {
            continue;
        }
        last_beat = Instant::now();

        match session::heartbeat(&inner.layout, &inner.session) {
            Heartbeat::Alive => {
                if inner.transition(SessionState::Connected) {
                    inner.notify(SessionState::Connected);
                }
                if let Err(e) = session::reap_with(&inner.layout, Some(&inner.session)) {
                    tracing::warn!(error = %e, "failed to reap expired sessions");
                }
            }
            Heartbeat::Unreachable => {
                if inner.transition(SessionState::Disconnected) {
                    inner.notify(SessionState::Disconnected);
                }
            }
            Heartbeat::Reaped => {
                if inner.transition(SessionState::Expired) {
                    tracing::warn!(session = %inner.session, "session expired");
                    let _ = session::remove_ephemerals(&inner.layout, &inner.session);
                    inner.finish(SessionState::Expired);
                }
                return;
            }
        }
    }
}

impl NamespaceClient for FsClient {
    fn session_id(&self) -> SessionId {
        self.inner.session.clone()
    }

    fn state(&self) -> SessionState {
        self.inner.state()
    }

    fn create_persistent(&self, node_path: &str, data: &[u8]) -> Result<()> {
        self.inner.check_live()?;
        let dir = self.inner.layout.node(node_path)?;
        if let Some(parent) = dir.parent()
            && parent.is_file()
        {
            return Err(TurnstileError::InvalidPath(format!(
                "ephemeral node '{}' cannot have children",
                path::parent(node_path).unwrap_or("/")
            )));
        }
        fs::create_dir(&dir).map_err(|e| io_error(node_path, e))?;
        if !data.is_empty() {
            super::atomic::atomic_write(dir.join(DATA_FILE), data)?;
        }
        Ok(())
    }

    fn create_ephemeral_sequential(
        &self,
        parent: &str,
        prefix: &str,
        data: &[u8],
    ) -> Result<String> {
        self.inner.check_live()?;
        path::validate_name(prefix)?;
        let dir = self.inner.layout.node(parent)?;
        if !dir.is_dir() {
            return Err(TurnstileError::NoSuchNode(parent.to_string()));
        }

        let record = EphemeralRecord {
            session: self.inner.session.clone(),
            created_at: Utc::now(),
            data: String::from_utf8_lossy(data).into_owned(),
        };
        let json = serde_json::to_string(&record).map_err(|e| {
            TurnstileError::Storage(format!("failed to serialize node record: {}", e))
        })?;

        allocate(&dir, |sequence| {
            let name = path::sequential_name(prefix, sequence);
            let full = path::join(parent, &name);
            let file_path = dir.join(&name);
            let mut file = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&file_path)
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
                Err(e) => return Err(io_error(&full, e)),
            };
            file.write_all(json.as_bytes())
                .and_then(|()| file.sync_all())
                .map_err(|e| {
                    let _ = fs::remove_file(&file_path);
                    io_error(&full, e)
                })?;
            Ok(Some(full))
        })
    }

    fn children(&self, node_path: &str) -> Result<Vec<String>> {
        self.inner.check_live()?;
        let dir = self.inner.layout.node(node_path)?;
        let entries = fs::read_dir(&dir).map_err(|e| io_error(node_path, e))?;
        Ok(entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| !name.starts_with('.'))
            .collect())
    }

    fn exists(&self, node_path: &str, watcher: Option<Watcher>) -> Result<bool> {
        self.inner.check_live()?;
        let file = self.inner.layout.node(node_path)?;
        let mut watches = lock(&self.inner.watches);
        let present = file.exists();
        if present && let Some(watcher) = watcher {
            watches.push(ArmedWatch {
                node_path: node_path.to_string(),
                file,
                watcher,
            });
        }
        Ok(present)
    }

    fn get_data(&self, node_path: &str) -> Result<Vec<u8>> {
        self.inner.check_live()?;
        let file = self.inner.layout.node(node_path)?;
        if file.is_dir() {
            return match fs::read(file.join(DATA_FILE)) {
                Ok(data) => Ok(data),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
                Err(e) => Err(io_error(node_path, e)),
            };
        }
        let content = fs::read_to_string(&file).map_err(|e| io_error(node_path, e))?;
        let record: EphemeralRecord = serde_json::from_str(&content).map_err(|e| {
            TurnstileError::Storage(format!("corrupt node '{}': {}", node_path, e))
        })?;
        Ok(record.data.into_bytes())
    }

    fn delete(&self, node_path: &str) -> Result<()> {
        self.inner.check_live()?;
        if node_path == "/" {
            return Err(TurnstileError::InvalidPath(
                "the root node cannot be deleted".to_string(),
            ));
        }
        let file = self.inner.layout.node(node_path)?;
        if file.is_dir() {
            if fs::read_dir(&file)
                .map_err(|e| io_error(node_path, e))?
                .filter_map(|e| e.ok())
                .any(|e| !e.file_name().to_string_lossy().starts_with('.'))
            {
                return Err(TurnstileError::InvalidPath(format!(
                    "node '{}' has children",
                    node_path
                )));
            }
            fs::remove_dir_all(&file).map_err(|e| io_error(node_path, e))
        } else {
            fs::remove_file(&file).map_err(|e| io_error(node_path, e))
        }
    }

    fn add_state_listener(&self, listener: StateListener) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.listeners).push((id, listener));
        id
    }

    fn remove_state_listener(&self, id: ListenerId) {
        lock(&self.inner.listeners).retain(|(existing, _)| *existing != id);
    }

    fn close(&self) -> Result<()> {
        if !self.inner.transition(SessionState::Closed) {
            return Ok(());
        }
        let removed = session::remove_ephemerals(&self.inner.layout, &self.inner.session);
        let _ = fs::remove_file(self.inner.layout.session_record(&self.inner.session));
        let _ = self.control.send(Control::Closed);
        let removed = removed?;
        tracing::debug!(session = %self.inner.session, removed, "directory session closed");
        Ok(())
    }
}

impl Drop for FsClient {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(session = %self.inner.session, error = %e, "failed to close session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FsService;
    use crate::locks::Locks;
    use crate::session::Session;
    use tempfile::TempDir;

    /// Report an outage the way the heartbeat does, then recover.
    fn flap(client: &FsClient) {
        for state in [SessionState::Disconnected, SessionState::Connected] {
            if client.inner.transition(state) {
                client.inner.notify(state);
            }
        }
    }

    fn open(service: &FsService, dir: &TempDir) -> (Arc<FsClient>, Locks) {
        let client = Arc::new(service.connect(dir.path(), Duration::from_secs(30)).unwrap());
        let shared: Arc<dyn NamespaceClient> = client.clone();
        let locks = Locks::new(Arc::new(Session::attach(shared)), "/turnstile").unwrap();
        (client, locks)
    }

    #[test]
    fn test_transient_disconnect_does_not_strand_the_queue() {
        let dir = TempDir::new().unwrap();
        let service = FsService::new(Duration::from_millis(5));
        let (holder_client, holder) = open(&service, &dir);
        let guard = holder.acquire_blocking("wedge").unwrap();

        flap(&holder_client);
        assert!(holder.session().is_lost());
        guard.release().unwrap();

        let (_waiter_client, waiter) = open(&service, &dir);
        let granted = waiter
            .acquire_with_timeout("wedge", Duration::from_secs(5))
            .unwrap();
        assert!(granted.is_some());
        assert_eq!(waiter.queue("wedge").unwrap().len(), 1);
        assert_eq!(holder_client.state(), SessionState::Closed);
    }
}

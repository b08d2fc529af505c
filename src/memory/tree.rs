//! Node tree and session table of the in-memory coordination service.
//!
//! Everything here runs under the service mutex. Notifications are queued onto
//! each session's dispatch channel, never invoked inline.

use crate::error::{Result, TurnstileError};
use crate::namespace::path;
use crate::namespace::{SessionId, SessionState, WatchEvent, Watcher};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::mpsc::Sender;

/// Work item for a session's dispatch thread.
pub(super) enum Dispatch {
    Watch(Watcher, WatchEvent),
    State(SessionState),
}

struct Node {
    data: Vec<u8>,
    ephemeral_owner: Option<SessionId>,
    next_sequence: u64,
    children: BTreeSet<String>,
}

impl Node {
    fn new(data: &[u8], ephemeral_owner: Option<SessionId>) -> Self {
        Self {
            data: data.to_vec(),
            ephemeral_owner,
            next_sequence: 0,
            children: BTreeSet::new(),
        }
    }
}

struct SessionEntry {
    state: SessionState,
    outbox: Sender<Dispatch>,
}

struct WatchEntry {
    session: SessionId,
    watcher: Watcher,
}

pub(super) struct Tree {
    nodes: BTreeMap<String, Node>,
    sessions: HashMap<SessionId, SessionEntry>,
    ended: HashMap<SessionId, SessionState>,
    watches: HashMap<String, Vec<WatchEntry>>,
}

impl Tree {
    pub(super) fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::new(&[], None));
        Self {
            nodes,
            sessions: HashMap::new(),
            ended: HashMap::new(),
            watches: HashMap::new(),
        }
    }

    pub(super) fn open_session(&mut self, id: SessionId, outbox: Sender<Dispatch>) {
        let _ = outbox.send(Dispatch::State(SessionState::Connected));
        self.sessions.insert(
            id,
            SessionEntry {
                state: SessionState::Connected,
                outbox,
            },
        );
    }

    pub(super) fn session_state(&self, id: &SessionId) -> SessionState {
        if let Some(entry) = self.sessions.get(id) {
            return entry.state;
        }
        self.ended
            .get(id)
            .copied()
            .unwrap_or(SessionState::Expired)
    }

    pub(super) fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Fail unless the session may issue node operations.
    pub(super) fn check_session(&self, id: &SessionId) -> Result<()> {
        match self.session_state(id) {
            SessionState::Connected => Ok(()),
            SessionState::Connecting | SessionState::Disconnected => Err(
                TurnstileError::ConnectionLost(format!("session {} is not connected", id)),
            ),
            SessionState::Expired | SessionState::Closed => Err(TurnstileError::SessionExpired(
                format!("session {} has ended", id),
            )),
        }
    }

    pub(super) fn create(
        &mut self,
        node_path: &str,
        data: &[u8],
        owner: Option<SessionId>,
    ) -> Result<()> {
        path::validate(node_path)?;
        if self.nodes.contains_key(node_path) {
            return Err(TurnstileError::NodeExists(node_path.to_string()));
        }
        let parent_path = path::parent(node_path)
            .ok_or_else(|| TurnstileError::NodeExists(node_path.to_string()))?;
        let parent = self
            .nodes
            .get_mut(parent_path)
            .ok_or_else(|| TurnstileError::NoSuchNode(parent_path.to_string()))?;
        if parent.ephemeral_owner.is_some() {
            return Err(TurnstileError::InvalidPath(format!(
                "ephemeral node '{}' cannot have children",
                parent_path
            )));
        }
        parent.children.insert(path::name(node_path).to_string());
        self.nodes
            .insert(node_path.to_string(), Node::new(data, owner));
        Ok(())
    }

    pub(super) fn create_sequential(
        &mut self,
        parent_path: &str,
        prefix: &str,
        data: &[u8],
        owner: SessionId,
    ) -> Result<String> {
        path::validate(parent_path)?;
        path::validate_name(prefix)?;
        let parent = self
            .nodes
            .get_mut(parent_path)
            .ok_or_else(|| TurnstileError::NoSuchNode(parent_path.to_string()))?;
        let sequence = parent.next_sequence;
        parent.next_sequence += 1;
        let full = path::join(parent_path, &path::sequential_name(prefix, sequence));
        self.create(&full, data, Some(owner))?;
        Ok(full)
    }

    pub(super) fn children(&self, node_path: &str) -> Result<Vec<String>> {
        self.nodes
            .get(node_path)
            .map(|node| node.children.iter().cloned().collect())
            .ok_or_else(|| TurnstileError::NoSuchNode(node_path.to_string()))
    }

    pub(super) fn exists(
        &mut self,
        node_path: &str,
        watcher: Option<Watcher>,
        session: &SessionId,
    ) -> bool {
        let present = self.nodes.contains_key(node_path);
        if present && let Some(watcher) = watcher {
            self.watches
                .entry(node_path.to_string())
                .or_default()
                .push(WatchEntry {
                    session: session.clone(),
                    watcher,
                });
        }
        present
    }

    pub(super) fn get_data(&self, node_path: &str) -> Result<Vec<u8>> {
        self.nodes
            .get(node_path)
            .map(|node| node.data.clone())
            .ok_or_else(|| TurnstileError::NoSuchNode(node_path.to_string()))
    }

    pub(super) fn delete(&mut self, node_path: &str) -> Result<()> {
        path::validate(node_path)?;
        if node_path == "/" {
            return Err(TurnstileError::InvalidPath(
                "the root node cannot be deleted".to_string(),
            ));
        }
        let node = self
            .nodes
            .get(node_path)
            .ok_or_else(|| TurnstileError::NoSuchNode(node_path.to_string()))?;
        if !node.children.is_empty() {
            return Err(TurnstileError::InvalidPath(format!(
                "node '{}' has children",
                node_path
            )));
        }
        self.nodes.remove(node_path);
        if let Some(parent_path) = path::parent(node_path)
            && let Some(parent) = self.nodes.get_mut(parent_path)
        {
            parent.children.remove(path::name(node_path));
        }
        self.fire_watches(node_path);
        Ok(())
    }

    fn fire_watches(&mut self, node_path: &str) {
        let Some(entries) = self.watches.remove(node_path) else {
            return;
        };
        for entry in entries {
            if let Some(session) = self.sessions.get(&entry.session) {
                let event = WatchEvent::NodeDeleted {
                    path: node_path.to_string(),
                };
                let _ = session.outbox.send(Dispatch::Watch(entry.watcher, event));
            }
        }
    }

    /// Move a live session to `Disconnected` without touching its nodes.
    pub(super) fn disconnect(&mut self, id: &SessionId) -> bool {
        match self.sessions.get_mut(id) {
            Some(entry) if entry.state == SessionState::Connected => {
                entry.state = SessionState::Disconnected;
                let _ = entry.outbox.send(Dispatch::State(SessionState::Disconnected));
                true
            }
            _ => false,
        }
    }

    /// End a session: release its watches, delete its ephemeral nodes, and
    /// deliver the final state.
    pub(super) fn end_session(&mut self, id: &SessionId, final_state: SessionState) -> bool {
        let Some(entry) = self.sessions.get(id) else {
            return false;
        };
        let outbox = entry.outbox.clone();

        // The ending session's own pending watches learn about the session first.
        for entries in self.watches.values_mut() {
            let (own, others): (Vec<_>, Vec<_>) =
                entries.drain(..).partition(|w| &w.session == id);
            *entries = others;
            for w in own {
                let _ = outbox.send(Dispatch::Watch(w.watcher, WatchEvent::Session(final_state)));
            }
        }
        self.watches.retain(|_, entries| !entries.is_empty());

        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner.as_ref() == Some(id))
            .map(|(p, _)| p.clone())
            .collect();
        for node_path in owned {
            let _ = self.delete(&node_path);
        }

        let _ = outbox.send(Dispatch::State(final_state));
        self.sessions.remove(id);
        self.ended.insert(id.clone(), final_state);
        true
    }

    /// Drop the final state kept for a session whose client is gone.
    pub(super) fn forget_session(&mut self, id: &SessionId) {
        self.ended.remove(id);
    }

    #[cfg(test)]
    pub(super) fn ended_count(&self) -> usize {
        self.ended.len()
    }

    pub(super) fn watch_count(&self, node_path: &str) -> usize {
        self.watches.get(node_path).map(Vec::len).unwrap_or(0)
    }
}

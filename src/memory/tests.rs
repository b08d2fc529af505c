//! Tests for the in-memory coordination service.

use super::*;
use crate::namespace::WatchEvent;
use std::sync::mpsc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn watch_channel() -> (crate::namespace::Watcher, mpsc::Receiver<WatchEvent>) {
    let (tx, rx) = mpsc::channel();
    let watcher = Box::new(move |event: WatchEvent| {
        let _ = tx.send(event);
    });
    (watcher, rx)
}

#[test]
fn test_create_persistent_requires_parent() {
    let service = MemoryService::new();
    let client = service.connect().unwrap();

    let err = client.create_persistent("/a/b", b"").unwrap_err();
    assert!(matches!(err, TurnstileError::NoSuchNode(_)));

    client.create_persistent("/a", b"").unwrap();
    client.create_persistent("/a/b", b"").unwrap();
    assert!(matches!(
        client.create_persistent("/a", b"").unwrap_err(),
        TurnstileError::NodeExists(_)
    ));
}

#[test]
fn test_sequential_nodes_are_strictly_increasing_per_parent() {
    let service = MemoryService::new();
    let client = service.connect().unwrap();
    client.create_persistent("/x", b"").unwrap();
    client.create_persistent("/y", b"").unwrap();

    let first = client.create_ephemeral_sequential("/x", "r_lock_", b"").unwrap();
    let second = client.create_ephemeral_sequential("/x", "r_lock_", b"").unwrap();
    let other = client.create_ephemeral_sequential("/y", "r_lock_", b"").unwrap();

    assert_eq!(first, "/x/r_lock_0000000000");
    assert_eq!(second, "/x/r_lock_0000000001");
    // Counters are per parent.
    assert_eq!(other, "/y/r_lock_0000000000");

    // Deleting does not recycle sequence numbers.
    client.delete(&second).unwrap();
    let third = client.create_ephemeral_sequential("/x", "r_lock_", b"").unwrap();
    assert_eq!(third, "/x/r_lock_0000000002");
}

#[test]
fn test_children_lists_names() {
    let service = MemoryService::new();
    let client = service.connect().unwrap();
    client.create_persistent("/r", b"").unwrap();
    client.create_ephemeral_sequential("/r", "a_", b"").unwrap();
    client.create_ephemeral_sequential("/r", "b_", b"").unwrap();

    let mut names = client.children("/r").unwrap();
    names.sort();
    assert_eq!(names, vec!["a_0000000000", "b_0000000001"]);
    assert!(matches!(
        client.children("/missing").unwrap_err(),
        TurnstileError::NoSuchNode(_)
    ));
}

#[test]
fn test_ephemeral_nodes_cannot_have_children() {
    let service = MemoryService::new();
    let client = service.connect().unwrap();
    let node = client.create_ephemeral_sequential("/", "e_", b"").unwrap();
    let err = client.create_persistent(&format!("{}/child", node), b"").unwrap_err();
    assert!(matches!(err, TurnstileError::InvalidPath(_)));
}

#[test]
fn test_watch_fires_once_on_delete() {
    let service = MemoryService::new();
    let owner = service.connect().unwrap();
    let observer = service.connect().unwrap();
    let node = owner.create_ephemeral_sequential("/", "n_", b"").unwrap();

    let (watcher, rx) = watch_channel();
    assert!(observer.exists(&node, Some(watcher)).unwrap());
    assert_eq!(service.watch_count(&node), 1);

    owner.delete(&node).unwrap();
    let event = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(event, WatchEvent::NodeDeleted { path: node.clone() });
    assert_eq!(service.watch_count(&node), 0);
    // The sender was consumed with the watcher; nothing else can arrive.
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn test_exists_on_missing_node_arms_nothing() {
    let service = MemoryService::new();
    let client = service.connect().unwrap();
    let (watcher, _rx) = watch_channel();
    assert!(!client.exists("/nothing", Some(watcher)).unwrap());
    assert_eq!(service.watch_count("/nothing"), 0);
}

#[test]
fn test_expiry_deletes_ephemerals_and_notifies_watchers() {
    let service = MemoryService::new();
    let doomed = service.connect().unwrap();
    let survivor = service.connect().unwrap();
    survivor.create_persistent("/r", b"").unwrap();

    let node = doomed.create_ephemeral_sequential("/r", "n_", b"").unwrap();
    let (watcher, rx) = watch_channel();
    assert!(survivor.exists(&node, Some(watcher)).unwrap());

    let (state_tx, state_rx) = mpsc::channel();
    doomed.add_state_listener(Arc::new(move |state| {
        let _ = state_tx.send(state);
    }));

    assert!(service.expire_session(&doomed.session_id()));
    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        WatchEvent::NodeDeleted { path: node.clone() }
    );
    assert_eq!(state_rx.recv_timeout(WAIT).unwrap(), SessionState::Expired);
    assert_eq!(doomed.state(), SessionState::Expired);
    assert!(!survivor.exists(&node, None).unwrap());

    let err = doomed.children("/r").unwrap_err();
    assert!(matches!(err, TurnstileError::SessionExpired(_)));
}

#[test]
fn test_expiry_fires_own_pending_watches_with_session_event() {
    let service = MemoryService::new();
    let holder = service.connect().unwrap();
    let waiter = service.connect().unwrap();
    let node = holder.create_ephemeral_sequential("/", "n_", b"").unwrap();

    let (watcher, rx) = watch_channel();
    assert!(waiter.exists(&node, Some(watcher)).unwrap());
    service.expire_session(&waiter.session_id());

    assert_eq!(
        rx.recv_timeout(WAIT).unwrap(),
        WatchEvent::Session(SessionState::Expired)
    );
    // The holder's node is untouched.
    assert!(holder.exists(&node, None).unwrap());
}

#[test]
fn test_disconnect_keeps_nodes_but_blocks_operations() {
    let service = MemoryService::new();
    let client = service.connect().unwrap();
    let observer = service.connect().unwrap();
    let node = client.create_ephemeral_sequential("/", "n_", b"").unwrap();

    assert!(service.disconnect_session(&client.session_id()));
    assert_eq!(client.state(), SessionState::Disconnected);
    assert!(matches!(
        client.children("/").unwrap_err(),
        TurnstileError::ConnectionLost(_)
    ));
    assert!(observer.exists(&node, None).unwrap());

    client.close().unwrap();
    assert!(!observer.exists(&node, None).unwrap());
}

#[test]
fn test_close_is_idempotent_and_removes_session() {
    let service = MemoryService::new();
    let client = service.connect().unwrap();
    let id = client.session_id();
    assert_eq!(service.session_ids(), vec![id.clone()]);

    client.close().unwrap();
    client.close().unwrap();
    assert!(service.session_ids().is_empty());
    assert_eq!(client.state(), SessionState::Closed);
}

#[test]
fn test_dial_respects_availability() {
    let service = MemoryService::new();
    service.set_available(false);
    assert!(matches!(
        service.dial("mem", Duration::from_secs(1)),
        Err(TurnstileError::Connect(_))
    ));

    service.set_available(true);
    let client = service.dial("mem", Duration::from_secs(1)).unwrap();
    assert_eq!(client.state(), SessionState::Connected);
}

#[test]
fn test_get_data_returns_stored_bytes() {
    let service = MemoryService::new();
    let client = service.connect().unwrap();
    let node = client
        .create_ephemeral_sequential("/", "n_", b"{\"owner\":\"me\"}")
        .unwrap();
    assert_eq!(client.get_data(&node).unwrap(), b"{\"owner\":\"me\"}".to_vec());
}

#[test]
fn test_dropped_clients_leave_no_session_state_behind() {
    let service = MemoryService::new();
    for _ in 0..20 {
        let client = service.connect().unwrap();
        client.close().unwrap();
        assert_eq!(client.state(), SessionState::Closed);
    }
    let expired = service.connect().unwrap();
    assert!(service.expire_session(&expired.session_id()));
    assert_eq!(expired.state(), SessionState::Expired);
    assert_eq!(service.shared.tree().ended_count(), 1);

    drop(expired);
    assert_eq!(service.shared.tree().ended_count(), 0);
    assert!(service.session_ids().is_empty());
}

#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! End-to-end multiplexing tests.
//!
//! Drives the root connection, registry and launcher from the far side of an
//! in-memory transport, the way a debug front end would.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use dapmux_core::config::MuxConfig;
use dapmux_core::protocol::AttachedChildSession;
use dapmux_core::{Message, SessionConfig, SessionId};
use dapmux_daemon::mux::{MuxError, MuxTasks, RootConnection};
use dapmux_daemon::session::{
    AttachedChildLauncher, ChildDescriptor, Session, SessionError, SessionLauncher,
    SessionRegistry,
};
use dapmux_daemon::testing::{FrontEnd, RECV_TIMEOUT, duplex_transport};

struct Harness {
    registry: SessionRegistry,
    root_session: Arc<Session>,
    tasks: MuxTasks,
    fe: FrontEnd,
}

async fn harness() -> Harness {
    harness_with(Arc::new(AttachedChildLauncher)).await
}

async fn harness_with(launcher: Arc<dyn SessionLauncher>) -> Harness {
    let (transport, fe) = duplex_transport();
    let (root, tasks) = RootConnection::init(transport, &MuxConfig::default());
    let registry = SessionRegistry::new(root, launcher);
    let root_session = registry
        .create_root_session(SessionConfig::default())
        .await
        .unwrap();
    Harness {
        registry,
        root_session,
        tasks,
        fe,
    }
}

impl Harness {
    /// Request a child of `parent` and consume its announcement.
    async fn child(&mut self, parent: &SessionId, id: &str) -> Arc<Session> {
        let child = self
            .registry
            .request_child_session(parent, ChildDescriptor::new(id, id))
            .await
            .unwrap();
        let announcement = self.fe.next_frame().await.unwrap();
        assert_eq!(&announcement.session_id(), parent);
        assert!(AttachedChildSession::from_message(&announcement.message).is_some());
        child
    }

    /// Send a marker from the root session and wait for it on the wire.
    async fn sync_outbound(&mut self) {
        self.root_session
            .send(Message::event(-1, "marker", Value::Null))
            .await
            .unwrap();
        let frame = self.fe.next_frame().await.unwrap();
        assert_eq!(frame.message.event_name(), Some("marker"));
    }
}

/// Collect a session's inbound messages on a channel.
async fn inbox(session: &Session) -> mpsc::UnboundedReceiver<Message> {
    let (tx, rx) = mpsc::unbounded_channel();
    session
        .on_message(move |message| {
            let _ = tx.send(message);
        })
        .await
        .unwrap();
    rx
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<Message>) -> Message {
    tokio::time::timeout(RECV_TIMEOUT, rx.recv())
        .await
        .unwrap()
        .unwrap()
}

// =========================================================================
// Outbound tagging
// =========================================================================

#[tokio::test]
async fn root_frames_are_untagged_and_child_frames_are_tagged() {
    let mut h = harness().await;

    h.root_session
        .send(Message::request(1, "launch", Value::Null))
        .await
        .unwrap();
    let launch = h.fe.next_value().await.unwrap();
    assert!(launch.get("sessionId").is_none());
    assert_eq!(launch["command"], "launch");

    let child = h
        .registry
        .request_child_session(
            h.root_session.id(),
            ChildDescriptor::new("child-1", "worker"),
        )
        .await
        .unwrap();

    let announcement = h.fe.next_value().await.unwrap();
    assert!(announcement.get("sessionId").is_none());
    assert_eq!(announcement["seq"], 0);
    assert_eq!(announcement["type"], "request");
    assert_eq!(announcement["command"], "attachedChildSession");
    assert_eq!(announcement["arguments"]["config"]["sessionId"], "child-1");

    child
        .send(Message::request(1, "threads", Value::Null))
        .await
        .unwrap();
    let threads = h.fe.next_value().await.unwrap();
    assert_eq!(threads["sessionId"], "child-1");
    assert_eq!(threads["command"], "threads");
}

#[tokio::test]
async fn nested_child_is_announced_on_its_parent() {
    let mut h = harness().await;
    let root_id = h.root_session.id().clone();
    let parent = h.child(&root_id, "child-1").await;

    h.registry
        .request_child_session(parent.id(), ChildDescriptor::new("grandchild", "gc"))
        .await
        .unwrap();

    let announcement = h.fe.next_frame().await.unwrap();
    assert_eq!(announcement.session_id(), SessionId::new("child-1"));
    let config = AttachedChildSession::from_message(&announcement.message)
        .unwrap()
        .config;
    assert_eq!(config.session_id.as_deref(), Some("grandchild"));
    assert_eq!(
        h.registry.parent_of(&SessionId::new("grandchild")).await,
        Some(SessionId::new("child-1"))
    );
}

#[tokio::test]
async fn concurrent_senders_keep_per_session_order() {
    const PER_SESSION: i64 = 50;
    let mut h = harness().await;
    let root_id = h.root_session.id().clone();

    let mut senders = Vec::new();
    for id in ["a", "b", "c"] {
        let child = h.child(&root_id, id).await;
        senders.push(tokio::spawn(async move {
            for seq in 1..=PER_SESSION {
                child
                    .send(Message::event(seq, "output", Value::Null))
                    .await
                    .unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }

    let mut seen: HashMap<SessionId, Vec<i64>> = HashMap::new();
    for _ in 0..3 * PER_SESSION {
        let frame = h.fe.next_frame().await.unwrap();
        seen.entry(frame.session_id())
            .or_default()
            .push(frame.message.seq);
    }
    for sender in senders {
        sender.await.unwrap();
    }

    let expected: Vec<i64> = (1..=PER_SESSION).collect();
    for id in ["a", "b", "c"] {
        assert_eq!(seen[&SessionId::new(id)], expected, "session {id}");
    }
}

#[tokio::test]
async fn rename_emits_process_event_on_the_session() {
    let mut h = harness().await;
    let root_id = h.root_session.id().clone();
    let child = h.child(&root_id, "child-1").await;

    child.set_name("worker #1");

    let frame = h.fe.next_value().await.unwrap();
    assert_eq!(frame["sessionId"], "child-1");
    assert_eq!(frame["event"], "process");
    assert_eq!(frame["body"]["name"], "worker #1");
    assert_eq!(frame["body"]["systemProcessId"], child.surrogate_id());
}

// =========================================================================
// Inbound routing
// =========================================================================

#[tokio::test]
async fn inbound_frames_reach_only_their_session() {
    let mut h = harness().await;
    let root_id = h.root_session.id().clone();
    let child_1 = h.child(&root_id, "child-1").await;
    let child_2 = h.child(&root_id, "child-2").await;
    let mut inbox_1 = inbox(&child_1).await;
    let mut inbox_2 = inbox(&child_2).await;

    h.fe.send(&SessionId::new("child-2"), Message::event(7, "stopped", Value::Null))
        .await
        .unwrap();
    h.fe.send(&SessionId::new("ghost"), Message::event(8, "stopped", Value::Null))
        .await
        .unwrap();
    h.fe.send(&SessionId::new("child-1"), Message::event(9, "marker", Value::Null))
        .await
        .unwrap();

    let for_2 = recv(&mut inbox_2).await;
    assert_eq!(for_2.seq, 7);

    // child-1's first delivery is its own marker, not child-2's or ghost's frame.
    let for_1 = recv(&mut inbox_1).await;
    assert_eq!(for_1.seq, 9);
    assert!(inbox_2.try_recv().is_err());

    let stats = h.registry.root().stats().await;
    assert_eq!(stats.frames_dropped, 1);
    assert_eq!(stats.session_count, 3);
}

#[tokio::test]
async fn inbound_arrival_order_is_preserved() {
    let mut h = harness().await;
    let root_id = h.root_session.id().clone();
    let child_1 = h.child(&root_id, "child-1").await;
    let child_2 = h.child(&root_id, "child-2").await;
    let mut inbox_1 = inbox(&child_1).await;
    let mut inbox_2 = inbox(&child_2).await;

    for seq in 1..=20 {
        let target = if seq % 3 == 0 { "child-2" } else { "child-1" };
        h.fe.send(
            &SessionId::new(target),
            Message::event(seq, "output", Value::Null),
        )
        .await
        .unwrap();
    }

    let mut got_1 = Vec::new();
    let mut got_2 = Vec::new();
    for seq in 1..=20 {
        if seq % 3 == 0 {
            got_2.push(recv(&mut inbox_2).await.seq);
        } else {
            got_1.push(recv(&mut inbox_1).await.seq);
        }
    }

    let expected_1: Vec<i64> = (1..=20).filter(|s| s % 3 != 0).collect();
    let expected_2: Vec<i64> = (1..=20).filter(|s| s % 3 == 0).collect();
    assert_eq!(got_1, expected_1);
    assert_eq!(got_2, expected_2);
}

#[tokio::test]
async fn root_session_receives_untagged_frames() {
    let mut h = harness().await;
    let root_session = Arc::clone(&h.root_session);
    let mut root_inbox = inbox(&root_session).await;

    h.fe.send_value(json!({"seq": 1, "type": "request", "command": "initialize"}))
        .await
        .unwrap();
    h.fe.send_value(json!({"sessionId": "", "seq": 2, "type": "request", "command": "launch"}))
        .await
        .unwrap();

    assert_eq!(recv(&mut root_inbox).await.command(), Some("initialize"));
    assert_eq!(recv(&mut root_inbox).await.command(), Some("launch"));
}

// =========================================================================
// Registration and teardown
// =========================================================================

#[tokio::test]
async fn duplicate_child_fails_and_first_stays_routable() {
    let mut h = harness().await;
    let root_id = h.root_session.id().clone();
    let first = h.child(&root_id, "child-1").await;
    let mut first_inbox = inbox(&first).await;

    let err = h
        .registry
        .request_child_session(&root_id, ChildDescriptor::new("child-1", "again"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::DuplicateSession { .. }));

    // No second announcement went out.
    h.sync_outbound().await;

    h.fe.send(&SessionId::new("child-1"), Message::event(3, "stopped", Value::Null))
        .await
        .unwrap();
    assert_eq!(recv(&mut first_inbox).await.seq, 3);
    assert_eq!(first.name(), "child-1");
}

#[tokio::test]
async fn ended_session_rejects_sends_and_drops_inbound() {
    let mut h = harness().await;
    let root_id = h.root_session.id().clone();
    let child = h.child(&root_id, "child-1").await;
    let connection = child.connection().await.unwrap();

    h.registry.end_session(child.id()).await.unwrap();

    assert!(!connection.dispose().await);
    assert!(!h.registry.root().is_registered(child.id()).await);
    let err = child
        .send(Message::request(2, "next", Value::Null))
        .await
        .unwrap_err();
    assert!(matches!(err, MuxError::ConnectionClosed { .. }));

    h.fe.send(&SessionId::new("child-1"), Message::event(4, "late", Value::Null))
        .await
        .unwrap();
    let root_session = Arc::clone(&h.root_session);
    let mut root_inbox = inbox(&root_session).await;
    h.fe.send(&SessionId::root(), Message::event(5, "marker", Value::Null))
        .await
        .unwrap();
    assert_eq!(recv(&mut root_inbox).await.seq, 5);
    assert_eq!(h.registry.root().stats().await.frames_dropped, 1);
}

#[tokio::test]
async fn children_outlive_their_parent() {
    let mut h = harness().await;
    let root_id = h.root_session.id().clone();
    let parent = h.child(&root_id, "parent").await;
    let child = {
        let child = h
            .registry
            .request_child_session(parent.id(), ChildDescriptor::new("child", "child"))
            .await
            .unwrap();
        h.fe.next_frame().await.unwrap();
        child
    };
    let mut child_inbox = inbox(&child).await;

    h.registry.end_session(parent.id()).await.unwrap();

    h.fe.send(&SessionId::new("child"), Message::event(1, "stopped", Value::Null))
        .await
        .unwrap();
    assert_eq!(recv(&mut child_inbox).await.seq, 1);

    child
        .send(Message::request(2, "continue", Value::Null))
        .await
        .unwrap();
    let frame = h.fe.next_frame().await.unwrap();
    assert_eq!(frame.session_id(), SessionId::new("child"));
    assert_eq!(h.registry.stats().await.orphan_count, 1);
}

#[tokio::test]
async fn transport_eof_ends_session_handlers() {
    let mut h = harness().await;
    let root_id = h.root_session.id().clone();
    let child = h.child(&root_id, "child-1").await;
    let handler = child.on_message(|_| {}).await.unwrap();

    drop(h.fe);
    assert!(h.tasks.closed().await);

    tokio::time::timeout(RECV_TIMEOUT, handler)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(h.registry.root().stats().await.session_count, 0);
}

// =========================================================================
// Pluggable launcher
// =========================================================================

/// Creates children without announcing them and remembers what it saw.
#[derive(Default)]
struct SilentLauncher {
    requests: Mutex<Vec<(SessionId, SessionConfig)>>,
}

#[async_trait]
impl SessionLauncher for SilentLauncher {
    async fn on_child_session_requested(
        &self,
        registry: &SessionRegistry,
        parent: &Arc<Session>,
        child: ChildDescriptor,
        config: SessionConfig,
    ) -> Result<Arc<Session>, SessionError> {
        self.requests
            .lock()
            .unwrap()
            .push((parent.id().clone(), config.clone()));
        registry
            .create_session(Some(parent.id()), child.session_id, &child.name, config)
            .await
    }
}

#[tokio::test]
async fn launcher_decides_how_children_are_announced() {
    let launcher = Arc::new(SilentLauncher::default());
    let mut h = harness_with(launcher.clone()).await;
    let root_id = h.root_session.id().clone();

    let mut overrides = serde_json::Map::new();
    overrides.insert("request".into(), json!("attach"));
    let child = h
        .registry
        .request_child_session(
            &root_id,
            ChildDescriptor::new("child-1", "worker").with_overrides(overrides),
        )
        .await
        .unwrap();

    h.sync_outbound().await;

    let requests = launcher.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, root_id);
    assert_eq!(requests[0].1.session_id.as_deref(), Some("child-1"));
    assert_eq!(requests[0].1.request.as_deref(), Some("attach"));
    assert_eq!(child.config(), &requests[0].1);
}

//! Session-scoped connection view.
//!
//! Looks like a dedicated connection to the session's domain logic; all I/O
//! goes through the root connection under this view's session id.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

use dapmux_core::{Message, SessionId};

use super::root::RootConnection;
use super::types::MuxError;

/// Logical connection for exactly one session id.
///
/// Frames dispatched before a consumer attaches are buffered in an unbounded
/// queue and delivered, in order, once one does. The root counts them as
/// routed at dispatch time. A view that never attaches a consumer should be
/// disposed, or its queue grows with every frame the peer sends it.
pub struct ChildConnection {
    session_id: SessionId,
    root: Arc<RootConnection>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    disposed: AtomicBool,
}

impl ChildConnection {
    /// Create the view and register it with the root in one step. Fails if
    /// the session id is already registered.
    pub async fn open(
        root: Arc<RootConnection>,
        session_id: SessionId,
    ) -> Result<Arc<Self>, MuxError> {
        let (tx, rx) = mpsc::unbounded_channel();
        root.register_child(session_id.clone(), tx).await?;
        Ok(Arc::new(Self {
            session_id,
            root,
            inbound: Mutex::new(Some(rx)),
            disposed: AtomicBool::new(false),
        }))
    }

    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Send a message on this session.
    pub async fn send(&self, message: Message) -> Result<(), MuxError> {
        if self.is_disposed() {
            return Err(MuxError::ConnectionClosed {
                session_id: self.session_id.clone(),
            });
        }
        self.root.send_raw(&self.session_id, message).await
    }

    /// Run `handler` for every message dispatched to this session, in arrival
    /// order. Only one consumer may attach.
    pub async fn on_message<F>(&self, mut handler: F) -> Result<JoinHandle<()>, MuxError>
    where
        F: FnMut(Message) + Send + 'static,
    {
        let mut inbound = self.take_receiver().await?;
        let session_id = self.session_id.clone();
        Ok(tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                handler(message);
            }
            debug!(session_id = %session_id, "Session inbound stream ended");
        }))
    }

    /// Take the raw inbound channel, for consumers that prefer to pull.
    pub async fn take_receiver(&self) -> Result<mpsc::UnboundedReceiver<Message>, MuxError> {
        self.inbound
            .lock()
            .await
            .take()
            .ok_or_else(|| MuxError::HandlerAttached {
                session_id: self.session_id.clone(),
            })
    }

    /// Unregister from the root. Later sends fail; a second call is a no-op
    /// and returns `false`.
    pub async fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.root.unregister_child(&self.session_id).await;
        true
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ChildConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildConnection")
            .field("session_id", &self.session_id)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

//! Deferred connection handle.
//!
//! A session is constructed before its connection is wired. The session
//! holds a [`DeferredConnection`]; whoever finishes the wiring holds the
//! matching [`ConnectionResolver`] and settles it exactly once. A resolver
//! dropped without settling fails every waiter.

use std::sync::Arc;

use tokio::sync::watch;

use dapmux_core::SessionId;

use crate::mux::{ChildConnection, MuxError};

#[derive(Debug, Clone)]
enum Slot {
    Pending,
    Ready(Arc<ChildConnection>),
    Failed(MuxError),
}

/// Create a linked resolver / handle pair for `session_id`.
pub fn deferred(session_id: SessionId) -> (ConnectionResolver, DeferredConnection) {
    let (tx, rx) = watch::channel(Slot::Pending);
    (
        ConnectionResolver {
            session_id: session_id.clone(),
            tx,
            settled: false,
        },
        DeferredConnection { session_id, rx },
    )
}

/// Write side of a deferred connection.
#[derive(Debug)]
pub struct ConnectionResolver {
    session_id: SessionId,
    tx: watch::Sender<Slot>,
    settled: bool,
}

impl ConnectionResolver {
    pub fn resolve(mut self, connection: Arc<ChildConnection>) {
        self.settle(Slot::Ready(connection));
    }

    pub fn fail(mut self, error: MuxError) {
        self.settle(Slot::Failed(error));
    }

    fn settle(&mut self, slot: Slot) {
        self.settled = true;
        self.tx.send_replace(slot);
    }
}

impl Drop for ConnectionResolver {
    fn drop(&mut self) {
        if !self.settled {
            self.tx.send_replace(Slot::Failed(MuxError::ConnectionUnavailable {
                session_id: self.session_id.clone(),
                reason: "connection wiring abandoned".into(),
            }));
        }
    }
}

/// Read side of a deferred connection; cheap to clone.
#[derive(Debug, Clone)]
pub struct DeferredConnection {
    session_id: SessionId,
    rx: watch::Receiver<Slot>,
}

impl DeferredConnection {
    /// Wait until the connection is resolved or wiring failed.
    pub async fn wait(&self) -> Result<Arc<ChildConnection>, MuxError> {
        let mut rx = self.rx.clone();
        let slot = rx
            .wait_for(|slot| !matches!(slot, Slot::Pending))
            .await
            .map_err(|_| self.unavailable("resolver dropped"))?
            .clone();

        match slot {
            Slot::Ready(connection) => Ok(connection),
            Slot::Failed(error) => Err(error),
            Slot::Pending => Err(self.unavailable("still pending")),
        }
    }

    /// The connection, if already resolved.
    pub fn get(&self) -> Option<Arc<ChildConnection>> {
        match &*self.rx.borrow() {
            Slot::Ready(connection) => Some(Arc::clone(connection)),
            Slot::Pending | Slot::Failed(_) => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(&*self.rx.borrow(), Slot::Pending)
    }

    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    fn unavailable(&self, reason: &str) -> MuxError {
        MuxError::ConnectionUnavailable {
            session_id: self.session_id.clone(),
            reason: reason.to_string(),
        }
    }
}

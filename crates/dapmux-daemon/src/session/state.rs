//! Live session state.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, warn};

use dapmux_core::protocol::process_event;
use dapmux_core::{Message, SessionConfig, SessionId};

use super::reporter::SessionReporter;
use crate::mux::{ChildConnection, MuxError};
use crate::strategy::DeferredConnection;

/// One logical protocol endpoint on the shared transport.
///
/// The session exists before its connection does; everything that needs the
/// connection goes through the deferred handle.
pub struct Session {
    id: SessionId,
    parent: Option<SessionId>,
    /// Synthetic process id used in `process` notifications.
    surrogate_id: u32,
    config: SessionConfig,
    name: watch::Sender<String>,
    connection: DeferredConnection,
    reporter: SessionReporter,
    span: Span,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: SessionId,
        parent: Option<SessionId>,
        surrogate_id: u32,
        name: String,
        config: SessionConfig,
        connection: DeferredConnection,
        reporter: SessionReporter,
        span: Span,
    ) -> Self {
        let (name_tx, _) = watch::channel(name);
        tokio::spawn(
            notify_name_changes(connection.clone(), name_tx.subscribe(), surrogate_id)
                .instrument(span.clone()),
        );

        Self {
            id,
            parent,
            surrogate_id,
            config,
            name: name_tx,
            connection,
            reporter,
            span,
        }
    }

    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    pub const fn parent(&self) -> Option<&SessionId> {
        self.parent.as_ref()
    }

    pub const fn surrogate_id(&self) -> u32 {
        self.surrogate_id
    }

    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub const fn reporter(&self) -> &SessionReporter {
        &self.reporter
    }

    pub const fn span(&self) -> &Span {
        &self.span
    }

    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    /// Rename the session. Once the connection is available the front end
    /// receives a `process` event carrying the latest name; renames made
    /// before that collapse into a single event.
    ///
    /// The event is sent by a background task, so it is not ordered against
    /// messages sent on this session after the rename: a `send` issued right
    /// after `set_name` may reach the wire first. Callers that need the event
    /// first should wait for it before sending.
    pub fn set_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.name.send_if_modified(|current| {
            if *current == name {
                return false;
            }
            *current = name;
            true
        });
    }

    /// Wait for the session's connection.
    pub async fn connection(&self) -> Result<Arc<ChildConnection>, MuxError> {
        self.connection.wait().await
    }

    pub const fn deferred_connection(&self) -> &DeferredConnection {
        &self.connection
    }

    /// Send on the session's connection, waiting for it if necessary.
    pub async fn send(&self, message: Message) -> Result<(), MuxError> {
        self.connection().await?.send(message).await
    }

    /// Attach the session's inbound handler, waiting for the connection if
    /// necessary.
    pub async fn on_message<F>(&self, handler: F) -> Result<JoinHandle<()>, MuxError>
    where
        F: FnMut(Message) + Send + 'static,
    {
        self.connection().await?.on_message(handler).await
    }

    /// Dispose the connection if it was ever resolved. Returns whether a
    /// live connection was disposed.
    pub(crate) async fn close(&self) -> bool {
        match self.connection.get() {
            Some(connection) => connection.dispose().await,
            None => false,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("surrogate_id", &self.surrogate_id)
            .field("name", &*self.name.borrow())
            .finish_non_exhaustive()
    }
}

/// Emit a `process` event for every observed rename, starting once the
/// connection resolves. Ends when the session is dropped, the connection
/// fails, or a send fails.
async fn notify_name_changes(
    connection: DeferredConnection,
    mut names: watch::Receiver<String>,
    surrogate_id: u32,
) {
    let connection = match connection.wait().await {
        Ok(connection) => connection,
        Err(e) => {
            debug!(error = %e, "No connection, name notifications disabled");
            return;
        }
    };

    while names.changed().await.is_ok() {
        let name = names.borrow_and_update().clone();
        if let Err(e) = connection.send(process_event(surrogate_id, &name)).await {
            warn!(error = %e, "Failed to send process notification");
            break;
        }
        debug!(name = %name, "Process notification sent");
    }
}

//! Connection strategies.
//!
//! A strategy decides how a session's connection is produced. It receives
//! the session's reporting and logging handles only when the registry is
//! already constructing the session, never at strategy construction time.

mod deferred;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{Instrument, Span};

use dapmux_core::SessionId;

use crate::mux::{ChildConnection, MuxError, RootConnection};
use crate::session::SessionReporter;

pub use deferred::{ConnectionResolver, DeferredConnection, deferred};

/// Produces the connection view for one session.
#[async_trait]
pub trait ConnectionStrategy: Send + Sync {
    async fn get_connection(
        &self,
        reporter: SessionReporter,
        span: Span,
    ) -> Result<Arc<ChildConnection>, MuxError>;
}

/// Routes a session through the shared root connection, keyed only by its
/// session id. Used for the root session and every child alike.
pub struct MultiplexedStrategy {
    root: Arc<RootConnection>,
    session_id: SessionId,
}

impl MultiplexedStrategy {
    pub const fn new(root: Arc<RootConnection>, session_id: SessionId) -> Self {
        Self { root, session_id }
    }
}

#[async_trait]
impl ConnectionStrategy for MultiplexedStrategy {
    async fn get_connection(
        &self,
        reporter: SessionReporter,
        span: Span,
    ) -> Result<Arc<ChildConnection>, MuxError> {
        let result = ChildConnection::open(Arc::clone(&self.root), self.session_id.clone())
            .instrument(span)
            .await;

        match &result {
            Ok(_) => reporter.report("connection.opened", &json!({ "multiplexed": true })),
            Err(e) => reporter.report("connection.failed", &json!({ "error": e.to_string() })),
        }
        result
    }
}

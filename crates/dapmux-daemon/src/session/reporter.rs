//! Session-scoped reporting handle.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use dapmux_core::SessionId;

/// Destination for session lifecycle reports.
pub trait ReportSink: Send + Sync {
    fn record(&self, session_id: &SessionId, event: &str, detail: &Value);
}

/// Sink that emits reports as structured log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn record(&self, session_id: &SessionId, event: &str, detail: &Value) {
        info!(session_id = %session_id, event, detail = %detail, "Session report");
    }
}

/// Reporting handle bound to one session.
#[derive(Clone)]
pub struct SessionReporter {
    session_id: SessionId,
    sink: Arc<dyn ReportSink>,
}

impl SessionReporter {
    pub fn new(session_id: SessionId, sink: Arc<dyn ReportSink>) -> Self {
        Self { session_id, sink }
    }

    pub fn report(&self, event: &str, detail: &Value) {
        self.sink.record(&self.session_id, event, detail);
    }

    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}

impl std::fmt::Debug for SessionReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionReporter")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

//! Multiplexer types.

use serde::Serialize;

use dapmux_core::SessionId;

/// Multiplexer statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MuxStats {
    /// Number of registered session views.
    pub session_count: usize,
    /// Inbound frames delivered to a session view.
    pub frames_routed: u64,
    /// Inbound frames discarded (unknown session or unparseable body).
    pub frames_dropped: u64,
}

/// Multiplexer errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MuxError {
    #[error("Session already registered: {session_id}")]
    DuplicateSession { session_id: SessionId },

    #[error("Connection closed for session: {session_id}")]
    ConnectionClosed { session_id: SessionId },

    #[error("Message handler already attached for session: {session_id}")]
    HandlerAttached { session_id: SessionId },

    #[error("Connection unavailable for session {session_id}: {reason}")]
    ConnectionUnavailable { session_id: SessionId, reason: String },

    #[error("Frame for session {session_id} rejected: {reason}")]
    FrameRejected { session_id: SessionId, reason: String },

    #[error("Transport closed")]
    TransportClosed,
}

//! Session registry types.

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use dapmux_core::SessionId;

use crate::mux::MuxError;

/// Name given to the session created at startup.
pub const ROOT_SESSION_NAME: &str = "rootSession";

/// Description of a child target a parent session wants exposed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildDescriptor {
    /// Desired identifier of the child session.
    pub session_id: SessionId,
    /// Display name of the child session.
    pub name: String,
    /// Configuration keys the child overrides on top of its parent's.
    pub config_overrides: Map<String, Value>,
}

impl ChildDescriptor {
    pub fn new(session_id: impl Into<SessionId>, name: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            name: name.into(),
            config_overrides: Map::new(),
        }
    }

    /// Child with a freshly generated identifier.
    pub fn generated(name: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), name)
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: Map<String, Value>) -> Self {
        self.config_overrides = overrides;
        self
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    /// Live sessions, root included.
    pub session_count: usize,
    /// Live sessions whose parent has already ended.
    pub orphan_count: usize,
}

/// Session registry errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session already exists: {session_id}")]
    DuplicateSession { session_id: SessionId },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: SessionId },

    #[error("Cannot create a child session without an identifier")]
    MissingChildId,

    #[error("Session {session_id} needs a parent; only the root session has none")]
    MissingParent { session_id: SessionId },

    #[error(transparent)]
    Connection(#[from] MuxError),

    #[error(transparent)]
    Protocol(#[from] dapmux_core::Error),
}

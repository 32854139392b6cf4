//! Session registry.
//!
//! Sole authority for which sessions exist and how they relate. Creates the
//! root session at startup and child sessions on request, wiring each one
//! through the shared root connection.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::json;
use tokio::sync::RwLock;
use tracing::{info, info_span, warn};

use dapmux_core::{SessionConfig, SessionId};

use super::launcher::SessionLauncher;
use super::reporter::{ReportSink, SessionReporter, TracingSink};
use super::state::Session;
use super::types::{ChildDescriptor, ROOT_SESSION_NAME, RegistryStats, SessionError};
use crate::mux::RootConnection;
use crate::strategy::{ConnectionStrategy, MultiplexedStrategy, deferred};

/// Tracks live sessions and their parent/child structure.
pub struct SessionRegistry {
    root: Arc<RootConnection>,
    launcher: Arc<dyn SessionLauncher>,
    sink: Arc<dyn ReportSink>,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    next_surrogate_id: AtomicU32,
}

impl SessionRegistry {
    pub fn new(root: Arc<RootConnection>, launcher: Arc<dyn SessionLauncher>) -> Self {
        Self {
            root,
            launcher,
            sink: Arc::new(TracingSink),
            sessions: RwLock::new(HashMap::new()),
            next_surrogate_id: AtomicU32::new(1),
        }
    }

    /// Replace the destination of session reports.
    #[must_use]
    pub fn with_report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = sink;
        self
    }

    pub const fn root(&self) -> &Arc<RootConnection> {
        &self.root
    }

    /// Create the root session, bound to the transport's unaddressed frames.
    pub async fn create_root_session(
        &self,
        config: SessionConfig,
    ) -> Result<Arc<Session>, SessionError> {
        self.create_session(None, SessionId::root(), ROOT_SESSION_NAME, config)
            .await
    }

    /// Create and register a session.
    ///
    /// Only the root session may be created without a parent. The session
    /// is constructed around an unresolved connection handle, then the
    /// connection strategy runs and settles it. A strategy failure is
    /// propagated and nothing is registered.
    pub async fn create_session(
        &self,
        parent: Option<&SessionId>,
        session_id: SessionId,
        name: &str,
        config: SessionConfig,
    ) -> Result<Arc<Session>, SessionError> {
        match parent {
            Some(_) if session_id.is_root() => return Err(SessionError::MissingChildId),
            Some(parent) if !self.contains(parent).await => {
                return Err(SessionError::SessionNotFound {
                    session_id: parent.clone(),
                });
            }
            None if !session_id.is_root() => {
                return Err(SessionError::MissingParent { session_id });
            }
            _ => {}
        }
        if self.contains(&session_id).await {
            return Err(SessionError::DuplicateSession { session_id });
        }

        let span = info_span!("session", session_id = %session_id, name);
        let reporter = SessionReporter::new(session_id.clone(), Arc::clone(&self.sink));
        let strategy = MultiplexedStrategy::new(Arc::clone(&self.root), session_id.clone());
        let (resolver, handle) = deferred(session_id.clone());

        let session = Arc::new(Session::new(
            session_id.clone(),
            parent.cloned(),
            self.next_surrogate_id.fetch_add(1, Ordering::Relaxed),
            name.to_string(),
            config,
            handle,
            reporter.clone(),
            span.clone(),
        ));

        let connection = match strategy.get_connection(reporter.clone(), span).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Session connection failed");
                resolver.fail(e.clone());
                return Err(e.into());
            }
        };
        resolver.resolve(Arc::clone(&connection));

        let mut sessions = self.sessions.write().await;
        let inserted = match sessions.entry(session_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&session));
                true
            }
        };
        drop(sessions);

        if !inserted {
            connection.dispose().await;
            return Err(SessionError::DuplicateSession { session_id });
        }

        reporter.report(
            "session.created",
            &json!({
                "name": name,
                "parent": parent.map(SessionId::as_str),
                "surrogateId": session.surrogate_id(),
            }),
        );
        info!(
            session_id = %session_id,
            parent = ?parent.map(SessionId::as_str),
            name,
            "Session created"
        );
        Ok(session)
    }

    /// Ask for a child of `parent_id` described by `child`. The child's
    /// configuration is the parent's, overlaid with the descriptor's
    /// overrides and the child's identifier; the launcher does the rest.
    pub async fn request_child_session(
        &self,
        parent_id: &SessionId,
        child: ChildDescriptor,
    ) -> Result<Arc<Session>, SessionError> {
        let parent = self
            .get(parent_id)
            .await
            .ok_or_else(|| SessionError::SessionNotFound {
                session_id: parent_id.clone(),
            })?;
        if child.session_id.is_root() {
            return Err(SessionError::MissingChildId);
        }

        let config = parent.config().for_child(
            child.session_id.as_str(),
            Some(&child.name),
            &child.config_overrides,
        )?;

        info!(
            parent = %parent_id,
            child = %child.session_id,
            name = %child.name,
            "Child session requested"
        );
        self.launcher
            .on_child_session_requested(self, &parent, child, config)
            .await
    }

    /// End a session: remove it and dispose its connection. Its children
    /// stay registered and keep routing.
    pub async fn end_session(&self, session_id: &SessionId) -> Result<Arc<Session>, SessionError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| SessionError::SessionNotFound {
                session_id: session_id.clone(),
            })?;

        session.close().await;

        let orphans = self.children_of(session_id).await.len();
        session.reporter().report("session.ended", &json!({ "orphans": orphans }));
        info!(session_id = %session_id, orphans, "Session ended");
        Ok(session)
    }

    /// End every session.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain().collect();
        let count = sessions.len();
        for (_, session) in sessions {
            session.close().await;
        }
        info!(sessions = count, "Session registry shut down");
    }

    pub async fn get(&self, session_id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    pub async fn parent_of(&self, session_id: &SessionId) -> Option<SessionId> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .and_then(|session| session.parent().cloned())
    }

    /// Live sessions whose parent is `session_id`, sorted by id.
    pub async fn children_of(&self, session_id: &SessionId) -> Vec<SessionId> {
        let mut children: Vec<_> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|session| session.parent() == Some(session_id))
            .map(|session| session.id().clone())
            .collect();
        children.sort();
        children
    }

    /// All live session ids, sorted.
    pub async fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn stats(&self) -> RegistryStats {
        let sessions = self.sessions.read().await;
        let orphan_count = sessions
            .values()
            .filter(|session| {
                session
                    .parent()
                    .is_some_and(|parent| !sessions.contains_key(parent))
            })
            .count();
        RegistryStats {
            session_count: sessions.len(),
            orphan_count,
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("next_surrogate_id", &self.next_surrogate_id)
            .finish_non_exhaustive()
    }
}

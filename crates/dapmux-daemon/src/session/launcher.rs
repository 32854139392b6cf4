//! Child session launch callback.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use dapmux_core::SessionConfig;
use dapmux_core::protocol::AttachedChildSession;

use super::registry::SessionRegistry;
use super::state::Session;
use super::types::{ChildDescriptor, SessionError};

/// Reacts to a session asking for a nested child session.
///
/// An implementation is expected to create the child through `registry` and
/// tell the parent's front end about it. Different front ends plug in
/// different launchers over the same multiplexing.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn on_child_session_requested(
        &self,
        registry: &SessionRegistry,
        parent: &Arc<Session>,
        child: ChildDescriptor,
        config: SessionConfig,
    ) -> Result<Arc<Session>, SessionError>;
}

/// Creates the child and announces it to the parent with an
/// `attachedChildSession` request.
#[derive(Debug, Default, Clone, Copy)]
pub struct AttachedChildLauncher;

#[async_trait]
impl SessionLauncher for AttachedChildLauncher {
    async fn on_child_session_requested(
        &self,
        registry: &SessionRegistry,
        parent: &Arc<Session>,
        child: ChildDescriptor,
        config: SessionConfig,
    ) -> Result<Arc<Session>, SessionError> {
        let announcement = AttachedChildSession::new(config.clone()).to_message()?;

        let session = registry
            .create_session(Some(parent.id()), child.session_id, &child.name, config)
            .await?;

        if let Err(e) = parent.send(announcement).await {
            warn!(
                parent = %parent.id(),
                child = %session.id(),
                error = %e,
                "Failed to announce child session, ending it"
            );
            // Already gone if the parent's teardown raced us.
            let _ = registry.end_session(session.id()).await;
            return Err(e.into());
        }

        parent.reporter().report(
            "child.announced",
            &json!({ "child": session.id().as_str(), "name": child.name }),
        );
        info!(parent = %parent.id(), child = %session.id(), "Child session announced");
        Ok(session)
    }
}

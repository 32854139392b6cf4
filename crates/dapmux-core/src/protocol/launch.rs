//! Session lifecycle control messages.
//!
//! These messages sit outside the debug protocol's own schema. They are
//! synthesised by the multiplexer and always use [`CONTROL_SEQ`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::types::{Message, MessageKind};
use crate::error::Result;

/// Command announcing a new child session on its parent's connection.
pub const ATTACHED_CHILD_SESSION: &str = "attachedChildSession";

/// Event labelling a session with a process id and name.
pub const PROCESS_EVENT: &str = "process";

/// Reserved sequence number for multiplexer-generated messages.
pub const CONTROL_SEQ: i64 = 0;

/// Launch configuration of a session.
///
/// The fields the multiplexer cares about are typed; everything else the
/// front end sent is kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionConfig {
    /// Overlay `fields` on top of this configuration. Keys present in both
    /// take the overlay's value; typed fields are updated too.
    pub fn merge(&self, fields: &Map<String, Value>) -> Result<Self> {
        let Value::Object(mut merged) = serde_json::to_value(self)? else {
            return Ok(self.clone());
        };
        merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(serde_json::from_value(Value::Object(merged))?)
    }

    /// Configuration for a child of this session: the parent's configuration,
    /// then the child's own overrides, then the injected `sessionId` (which
    /// always wins) and name.
    pub fn for_child(
        &self,
        session_id: &str,
        name: Option<&str>,
        overrides: &Map<String, Value>,
    ) -> Result<Self> {
        let mut child = self.merge(overrides)?;
        child.session_id = Some(session_id.to_string());
        if let Some(name) = name {
            child.name = Some(name.to_string());
        }
        Ok(child)
    }
}

/// `attachedChildSession` control request.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachedChildSession {
    pub config: SessionConfig,
}

impl AttachedChildSession {
    pub const fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Build the wire message.
    pub fn to_message(&self) -> Result<Message> {
        let config = serde_json::to_value(&self.config)?;
        Ok(Message::request(
            CONTROL_SEQ,
            ATTACHED_CHILD_SESSION,
            json!({ "config": config }),
        ))
    }

    /// Recognise an `attachedChildSession` request. Returns `None` for any
    /// other message or a config that does not deserialize.
    pub fn from_message(message: &Message) -> Option<Self> {
        if message.kind != MessageKind::Request
            || message.command() != Some(ATTACHED_CHILD_SESSION)
        {
            return None;
        }
        let config = message.field("arguments")?.get("config")?.clone();
        serde_json::from_value(config).ok().map(Self::new)
    }
}

/// `process` event carrying a synthetic process id and display name.
pub fn process_event(system_process_id: u32, name: &str) -> Message {
    Message::event(
        CONTROL_SEQ,
        PROCESS_EVENT,
        json!({
            "name": name,
            "systemProcessId": system_process_id,
            "isLocalProcess": true,
            "startMethod": "attach",
        }),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parent_config() -> SessionConfig {
        serde_json::from_value(json!({
            "type": "node",
            "request": "launch",
            "name": "Launch Program",
            "program": "/app/index.js",
            "env": {"DEBUG": "1"}
        }))
        .unwrap()
    }

    #[test]
    fn unknown_fields_round_trip_through_extra() {
        let config = parent_config();
        assert_eq!(config.kind.as_deref(), Some("node"));
        assert_eq!(config.extra["program"], "/app/index.js");

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["env"]["DEBUG"], "1");
        assert!(value.get("sessionId").is_none());
    }

    #[test]
    fn merge_overrides_typed_and_extra_fields() {
        let mut overlay = Map::new();
        overlay.insert("request".into(), json!("attach"));
        overlay.insert("port".into(), json!(9229));
        overlay.insert("program".into(), json!("/app/worker.js"));

        let merged = parent_config().merge(&overlay).unwrap();
        assert_eq!(merged.request.as_deref(), Some("attach"));
        assert_eq!(merged.extra["port"], 9229);
        assert_eq!(merged.extra["program"], "/app/worker.js");
        assert_eq!(merged.extra["env"]["DEBUG"], "1");
        assert_eq!(merged.name.as_deref(), Some("Launch Program"));
    }

    #[test]
    fn child_config_injects_session_id_last() {
        let mut overlay = Map::new();
        overlay.insert("sessionId".into(), json!("spoofed"));

        let child = parent_config()
            .for_child("child-1", Some("worker"), &overlay)
            .unwrap();
        assert_eq!(child.session_id.as_deref(), Some("child-1"));
        assert_eq!(child.name.as_deref(), Some("worker"));
        assert_eq!(child.kind.as_deref(), Some("node"));
    }

    #[test]
    fn child_config_keeps_parent_name_without_override() {
        let child = parent_config()
            .for_child("child-1", None, &Map::new())
            .unwrap();
        assert_eq!(child.name.as_deref(), Some("Launch Program"));
    }

    #[test]
    fn attached_child_session_message_shape() {
        let config = parent_config()
            .for_child("child-1", None, &Map::new())
            .unwrap();
        let message = AttachedChildSession::new(config.clone())
            .to_message()
            .unwrap();

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["seq"], 0);
        assert_eq!(value["type"], "request");
        assert_eq!(value["command"], "attachedChildSession");
        assert_eq!(value["arguments"]["config"]["sessionId"], "child-1");
        assert_eq!(value["arguments"]["config"]["program"], "/app/index.js");

        let parsed = AttachedChildSession::from_message(&message).unwrap();
        assert_eq!(parsed.config, config);
    }

    #[test]
    fn other_requests_are_not_launch_messages() {
        let message = Message::request(3, "launch", json!({"config": {}}));
        assert!(AttachedChildSession::from_message(&message).is_none());
    }

    #[test]
    fn process_event_shape() {
        let message = process_event(7, "worker #1");
        assert_eq!(message.event_name(), Some(PROCESS_EVENT));
        assert_eq!(message.seq, CONTROL_SEQ);
        let body = message.field("body").unwrap();
        assert_eq!(body["name"], "worker #1");
        assert_eq!(body["systemProcessId"], 7);
    }
}

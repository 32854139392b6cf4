//! Wire message types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the field that carries the session identifier on the wire.
pub const SESSION_ID_FIELD: &str = "sessionId";

/// Opaque session identifier. The empty identifier is the root session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Create an identifier for a child session.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The root session identifier.
    pub const fn root() -> Self {
        Self(String::new())
    }

    /// Build an identifier from the optional wire field; absent and empty both
    /// address the root session.
    pub fn from_wire(value: Option<&str>) -> Self {
        value.map_or_else(Self::root, Self::new)
    }

    /// Value stamped into outbound frames; `None` for the root session.
    pub fn to_wire(&self) -> Option<String> {
        if self.is_root() {
            None
        } else {
            Some(self.0.clone())
        }
    }

    pub const fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Protocol message category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Event,
}

/// A protocol message as seen by a session: everything except the session
/// identifier. Domain fields are carried untouched in `body`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub seq: i64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Message {
    /// Build a request message.
    pub fn request(seq: i64, command: &str, arguments: Value) -> Self {
        let mut body = Map::new();
        body.insert("command".into(), Value::String(command.to_string()));
        if !arguments.is_null() {
            body.insert("arguments".into(), arguments);
        }
        Self {
            seq,
            kind: MessageKind::Request,
            body,
        }
    }

    /// Build an event message.
    pub fn event(seq: i64, event: &str, payload: Value) -> Self {
        let mut body = Map::new();
        body.insert("event".into(), Value::String(event.to_string()));
        if !payload.is_null() {
            body.insert("body".into(), payload);
        }
        Self {
            seq,
            kind: MessageKind::Event,
            body,
        }
    }

    /// Request command name, if this is a request.
    pub fn command(&self) -> Option<&str> {
        match self.kind {
            MessageKind::Request | MessageKind::Response => {
                self.body.get("command").and_then(Value::as_str)
            }
            MessageKind::Event => None,
        }
    }

    /// Event name, if this is an event.
    pub fn event_name(&self) -> Option<&str> {
        match self.kind {
            MessageKind::Event => self.body.get("event").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Look up a domain field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }
}

/// A message as it travels over the shared transport, tagged with the session
/// it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(
        rename = "sessionId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    session_id: Option<String>,
    #[serde(flatten)]
    pub message: Message,
}

impl Frame {
    /// Tag a message for the given session. Any `sessionId` the caller left in
    /// the body is discarded so the frame carries exactly one tag.
    pub fn tagged(session_id: &SessionId, mut message: Message) -> Self {
        message.body.remove(SESSION_ID_FIELD);
        Self {
            session_id: session_id.to_wire(),
            message,
        }
    }

    /// Session this frame is addressed to.
    pub fn session_id(&self) -> SessionId {
        SessionId::from_wire(self.session_id.as_deref())
    }

    /// Strip the tag, returning the destination and the session-level message.
    pub fn untag(self) -> (SessionId, Message) {
        (self.session_id(), self.message)
    }
}

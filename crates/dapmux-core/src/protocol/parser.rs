//! Frame body parser.
//!
//! Tolerant reader: unknown fields are kept in the message body, a body that
//! is not a protocol message is reported as an error for the caller to log.

use serde_json::Value;

use super::types::Frame;
use crate::error::{Error, Result};

/// Parse one frame body as received from the transport.
pub fn parse_frame(body: &[u8]) -> Result<Frame> {
    let raw: Value = serde_json::from_slice(body)?;
    parse_value(raw)
}

/// Parse a JSON value into a frame.
pub fn parse_value(raw: Value) -> Result<Frame> {
    let msg_type = raw
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Protocol("Missing 'type' field".into()))?;

    match msg_type {
        "request" | "response" | "event" => Ok(serde_json::from_value(raw)?),
        other => Err(Error::Protocol(format!("Unknown message type: {other}"))),
    }
}

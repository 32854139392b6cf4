//! Debug-adapter wire protocol as seen by the multiplexer.
//!
//! Only the envelope is typed: the session tag, sequence number and message
//! kind. Domain fields pass through untouched, except for the handful of
//! session-lifecycle control messages such as
//! [`AttachedChildSession`].

mod codec;
mod launch;
mod parser;
mod types;

pub use codec::{DEFAULT_MAX_FRAME_BYTES, FrameCodec};
pub use launch::{
    ATTACHED_CHILD_SESSION, AttachedChildSession, CONTROL_SEQ, PROCESS_EVENT, SessionConfig,
    process_event,
};
pub use parser::{parse_frame, parse_value};
pub use types::{Frame, Message, MessageKind, SESSION_ID_FIELD, SessionId};

//! dapmux Core Library
//!
//! Shared functionality for dapmux components:
//! - Content-Length framing and protocol envelope types
//! - Session lifecycle control messages
//! - Configuration resolution and hierarchy
//! - Common error types and tracing setup

pub mod config;
pub mod error;
pub mod protocol;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use protocol::{Frame, Message, MessageKind, SessionConfig, SessionId};

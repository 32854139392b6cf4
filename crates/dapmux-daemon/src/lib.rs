//! dapmux Daemon Library
//!
//! Multiplexes many debug sessions over one duplex transport:
//! - Shared transport with Content-Length framing
//! - Root connection that tags outbound and routes inbound frames by session id
//! - Per-session connection views and deferred connection wiring
//! - Session registry with parent/child tracking and child launch callbacks

pub mod mux;
pub mod session;
pub mod strategy;
pub mod testing;
pub mod transport;

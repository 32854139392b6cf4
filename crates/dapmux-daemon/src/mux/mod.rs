//! Session multiplexing over the shared transport.
//!
//! The root connection owns the transport and the session id -> view map;
//! each child connection is a view bound to one session id.

mod child;
mod root;
mod types;

pub use child::ChildConnection;
pub use root::{MuxTasks, RootConnection};
pub use types::{MuxError, MuxStats};

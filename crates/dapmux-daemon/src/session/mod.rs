//! Session management.
//!
//! The registry owns every live session and the parent/child structure
//! between them; sessions reach the transport through their deferred
//! connection handle.

mod launcher;
mod registry;
mod reporter;
mod state;
mod types;

pub use launcher::{AttachedChildLauncher, SessionLauncher};
pub use registry::SessionRegistry;
pub use reporter::{ReportSink, SessionReporter, TracingSink};
pub use state::Session;
pub use types::{ChildDescriptor, ROOT_SESSION_NAME, RegistryStats, SessionError};

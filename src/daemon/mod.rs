//! Daemon registry and the dispatch helper built on it

pub mod dispatch;
pub mod registry;

pub use dispatch::{send_sync, send_sync_framed};
pub use registry::{DaemonDescriptor, DaemonRegistry, Protocol};

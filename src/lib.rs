//! Framesock - length-prefixed JSON messaging over Unix domain sockets
//!
//! Frames are a length header followed by the payload. A blocking client and
//! an event-driven client share the framing; a JSON envelope layer sits on top
//! of either, and `send_sync` does one request/response with a named daemon.

pub mod config;
pub mod daemon;
pub mod error;
pub mod ipc;

pub use config::Config;
pub use daemon::{send_sync, send_sync_framed, DaemonDescriptor, DaemonRegistry, Protocol};
pub use error::{ErrorCode, FramesockError, Origin, Result};
pub use ipc::{
    AsyncJsonSocket, AsyncSocket, FrameCodec, FramedServer, HeaderFormat, Payload, SocketClient,
    SyncJsonSocket,
};

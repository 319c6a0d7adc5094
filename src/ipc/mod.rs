//! IPC Layer - length-prefixed frames over Unix domain sockets
//!
//! This module provides:
//! - Header formats and the frame codec
//! - Blocking and event-driven socket clients
//! - JSON envelope layer over either client
//! - Framed server for the daemon side

pub mod async_socket;
pub mod codec;
pub mod envelope;
pub mod server;
pub mod sync_socket;

pub use async_socket::AsyncSocket;
pub use codec::{encode_frame, Endian, FrameCodec, HeaderFormat, Payload, DEFAULT_MAX_FRAME_LEN};
pub use envelope::{AsyncJsonSocket, Envelope, JsonSocket, SyncJsonSocket};
pub use server::{CallbackHandler, FramedServer, ReplyHandler, RequestHandler, ServerConfig, ShutdownHandle};
pub use sync_socket::{read_frame, write_frame, SocketClient};

//! Blocking client over a Unix domain stream socket.
//!
//! Every call occupies the calling thread until the OS read or write
//! completes. The header is fixed at 4 bytes, little-endian unsigned.

use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use log::{debug, trace, warn};

use crate::error::{FramesockError, Result};
use crate::ipc::codec::{
    encode_frame, ensure_not_empty, HeaderFormat, Payload, DEFAULT_MAX_FRAME_LEN,
};

/// Write one frame. Returns the number of bytes written, header included.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<usize> {
    ensure_not_empty(payload)?;

    let frame = encode_frame(&HeaderFormat::LE_U32, payload)?;
    writer.write_all(&frame).map_err(|e| match e.kind() {
        ErrorKind::WriteZero => FramesockError::transport("Number of sent bytes is 0"),
        _ => FramesockError::transport(e),
    })?;
    writer.flush().map_err(FramesockError::transport)?;

    Ok(frame.len())
}

/// Read one frame and return its payload.
///
/// Both the header and the payload are read in full; a connection that
/// closes early is a transport error, never a partial result.
pub fn read_frame<R: Read>(reader: &mut R, max_len: usize) -> Result<Vec<u8>> {
    let format = HeaderFormat::LE_U32;
    let mut header = [0u8; 4];
    read_exact(reader, &mut header, "header")?;

    let length = format.unpack(&header)?;
    if length > max_len {
        return Err(FramesockError::transport(format!(
            "Message too large: {} > {}",
            length, max_len
        )));
    }

    let mut payload = vec![0u8; length];
    read_exact(reader, &mut payload, "payload")?;
    Ok(payload)
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => FramesockError::transport(format!(
            "connection closed before {} ({} bytes) was received",
            what,
            buf.len()
        )),
        _ => FramesockError::transport(e),
    })
}

/// Connected blocking socket. Closing consumes the client.
#[derive(Debug)]
pub struct SocketClient {
    stream: UnixStream,
    path: PathBuf,
    max_frame_len: usize,
}

impl SocketClient {
    /// Connect to the socket at `path`.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let stream = UnixStream::connect(&path).map_err(|e| {
            warn!("Failed to connect to {}: {}", path.display(), e);
            FramesockError::connection(&path, e)
        })?;

        debug!("Connected to {}", path.display());
        Ok(Self {
            stream,
            path,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        })
    }

    /// Set the largest frame `receive` will accept.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Send one frame. Text payloads and empty payloads are rejected before
    /// anything is written.
    pub fn send<'a>(&mut self, payload: impl Into<Payload<'a>>) -> Result<usize> {
        let bytes = payload.into().into_bytes()?;
        let sent = write_frame(&mut self.stream, &bytes)?;
        trace!("Sent {} bytes to {}", sent, self.path.display());
        Ok(sent)
    }

    /// Block until one full frame arrives and return its payload.
    pub fn receive(&mut self) -> Result<Vec<u8>> {
        let payload = read_frame(&mut self.stream, self.max_frame_len)?;
        trace!("Received {} bytes from {}", payload.len(), self.path.display());
        Ok(payload)
    }

    /// Release the socket.
    pub fn close(self) {
        debug!("Closing {}", self.path.display());
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

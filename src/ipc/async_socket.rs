//! Event-driven client over a Unix domain stream socket.
//!
//! A background reader task plays the role of the data-arrival callback: it
//! appends whatever the socket delivers to a shared inbox and fires the
//! current one-shot arrival signal. `receive` awaits that signal, takes the
//! buffered bytes, and arms a fresh signal for the next call.
//!
//! `receive` takes `&mut self`, so a second receive on the same connection
//! cannot start while one is pending. Sharing a client between tasks needs a
//! lock, which serializes them.

use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Decoder;
use tracing::{debug, trace, warn};

use crate::error::{FramesockError, Result};
use crate::ipc::codec::{encode_frame, FrameCodec, HeaderFormat, Payload, DEFAULT_MAX_FRAME_LEN};

/// Bytes requested from the socket per read.
const READ_CHUNK: usize = 65536;

/// Data delivered by the reader task and not yet consumed.
#[derive(Debug, Default)]
struct Inbox {
    buffer: BytesMut,
    arrival: Option<oneshot::Sender<()>>,
    closed: Option<String>,
}

impl Inbox {
    fn deliver(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        if let Some(signal) = self.arrival.take() {
            let _ = signal.send(());
        }
    }

    /// Dropping the pending signal wakes a waiting receiver with an error.
    fn close(&mut self, reason: impl Into<String>) {
        self.closed.get_or_insert_with(|| reason.into());
        self.arrival = None;
    }
}

/// Connected non-blocking socket bound to the tokio reactor.
#[derive(Debug)]
pub struct AsyncSocket {
    path: PathBuf,
    writer: OwnedWriteHalf,
    inbox: Arc<Mutex<Inbox>>,
    arrival: Option<oneshot::Receiver<()>>,
    carry: BytesMut,
    reader: JoinHandle<()>,
    max_frame_len: usize,
}

impl AsyncSocket {
    /// Connect to `path` and register the socket with the running runtime.
    ///
    /// The connect itself is a plain blocking call; for local sockets it
    /// returns immediately.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let raw = StdUnixStream::connect(&path).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Socket connect failed");
            FramesockError::connection(&path, e)
        })?;

        // On failure `raw` is dropped inside `register`, closing the descriptor.
        let stream = register(raw).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Event loop registration failed");
            FramesockError::connection(&path, e)
        })?;

        let (read_half, writer) = stream.into_split();
        let (signal, arrival) = oneshot::channel();
        let inbox = Arc::new(Mutex::new(Inbox {
            arrival: Some(signal),
            ..Default::default()
        }));
        let reader = tokio::spawn(read_loop(read_half, Arc::clone(&inbox)));

        debug!(path = %path.display(), "Connected");
        Ok(Self {
            path,
            writer,
            inbox,
            arrival: Some(arrival),
            carry: BytesMut::new(),
            reader,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        })
    }

    /// Set the largest frame `receive_frame` will accept.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn peer_path(&self) -> &Path {
        &self.path
    }

    /// Write `payload`, framed with `header_format` if one is given.
    ///
    /// Returns the bytes put on the wire. An empty payload is still written
    /// (header included) before being reported as a transport error.
    pub async fn send<'a>(
        &mut self,
        payload: impl Into<Payload<'a>>,
        header_format: Option<&HeaderFormat>,
    ) -> Result<Bytes> {
        let bytes = payload.into().into_bytes()?;
        let data = match header_format {
            Some(format) => encode_frame(format, &bytes)?,
            None => bytes.to_vec(),
        };

        self.writer
            .write_all(&data)
            .await
            .map_err(FramesockError::transport)?;
        self.writer.flush().await.map_err(FramesockError::transport)?;
        trace!(path = %self.path.display(), bytes = data.len(), "Sent");

        if bytes.is_empty() {
            return Err(FramesockError::transport("Number of sent bytes is 0"));
        }
        Ok(Bytes::from(data))
    }

    /// Wait for the next delivery and return it, minus the first
    /// `header_size` bytes when given. A delivery shorter than the header is
    /// a transport error.
    ///
    /// On failure the connection is shut down before the error is returned.
    pub async fn receive(&mut self, header_size: Option<usize>) -> Result<Bytes> {
        let mut data = if self.carry.is_empty() {
            match self.next_arrival().await {
                Ok(data) => data,
                Err(e) => {
                    self.shutdown_transport().await;
                    return Err(e);
                }
            }
        } else {
            self.carry.split()
        };

        if let Some(size) = header_size {
            if data.len() < size {
                warn!(path = %self.path.display(), expected = size, got = data.len(), "Short header");
                self.shutdown_transport().await;
                return Err(FramesockError::transport(format!(
                    "connection delivered {} bytes, shorter than the {} byte header",
                    data.len(),
                    size
                )));
            }
            data.advance(size);
        }
        Ok(data.freeze())
    }

    /// Wait until one complete frame described by `format` is buffered and
    /// return its payload. Bytes past the frame are kept for the next call.
    pub async fn receive_frame(&mut self, format: &HeaderFormat) -> Result<Bytes> {
        let mut codec = FrameCodec::with_max_length(*format, self.max_frame_len);
        let mut pending = self.carry.split();

        loop {
            let decoded = codec.decode(&mut pending);
            match decoded {
                Ok(Some(frame)) => {
                    self.carry = pending;
                    return Ok(frame.freeze());
                }
                Ok(None) => {}
                Err(e) => {
                    self.shutdown_transport().await;
                    return Err(e);
                }
            }

            match self.next_arrival().await {
                Ok(data) => pending.extend_from_slice(&data),
                Err(e) => {
                    self.shutdown_transport().await;
                    return Err(e);
                }
            }
        }
    }

    /// Shut down the write side and stop the reader task.
    pub async fn close(mut self) {
        debug!(path = %self.path.display(), "Closing");
        self.shutdown_transport().await;
    }

    async fn next_arrival(&mut self) -> Result<BytesMut> {
        // A receive cancelled mid-wait drops the taken receiver, leaving the
        // slot empty for good.
        let arrival = self.arrival.take().ok_or_else(|| {
            FramesockError::transport("receive slot abandoned by a cancelled receive")
        })?;
        let arrived = arrival.await;

        let mut inbox = self.inbox.lock().await;
        let data = inbox.buffer.split();
        let (signal, next) = oneshot::channel();
        if inbox.closed.is_none() {
            inbox.arrival = Some(signal);
        }
        self.arrival = Some(next);

        match arrived {
            Ok(()) => {
                trace!(path = %self.path.display(), bytes = data.len(), "Received");
                Ok(data)
            }
            Err(_) => {
                let reason = inbox
                    .closed
                    .clone()
                    .unwrap_or_else(|| "connection closed".to_string());
                warn!(path = %self.path.display(), reason = %reason, "Receive failed");
                Err(FramesockError::Transport(reason))
            }
        }
    }

    async fn shutdown_transport(&mut self) {
        self.reader.abort();
        self.inbox.lock().await.close("connection closed locally");
        if let Err(e) = self.writer.shutdown().await {
            debug!(path = %self.path.display(), error = %e, "Shutdown after close");
        }
    }
}

impl Drop for AsyncSocket {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn register(raw: StdUnixStream) -> std::io::Result<UnixStream> {
    raw.set_nonblocking(true)?;
    UnixStream::from_std(raw)
}

async fn read_loop(mut reader: OwnedReadHalf, inbox: Arc<Mutex<Inbox>>) {
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let outcome = reader.read(&mut chunk).await;
        let mut inbox = inbox.lock().await;
        match outcome {
            Ok(0) => {
                inbox.close("connection closed by peer");
                break;
            }
            Ok(n) => inbox.deliver(&chunk[..n]),
            Err(e) => {
                inbox.close(e.to_string());
                break;
            }
        }
    }
}

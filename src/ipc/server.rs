//! Framed Unix socket server - the daemon side of the protocol
//!
//! Provides:
//! - Unix stream socket listener
//! - Per-connection frame decoding with [`FrameCodec`]
//! - Request routing to a [`RequestHandler`] and framed JSON replies
//!
//! Used as a stand-in daemon in tests and by the `serve` command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use crate::error::{ErrorCode, FramesockError, Result};
use crate::ipc::codec::{FrameCodec, HeaderFormat, DEFAULT_MAX_FRAME_LEN};
use crate::ipc::envelope::{encode_message, Envelope};

/// Configuration for the framed server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the Unix socket
    pub socket_path: PathBuf,
    /// Header format expected on requests and used on replies
    pub header_format: HeaderFormat,
    /// Largest request frame accepted
    pub max_frame_len: usize,
}

impl ServerConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            header_format: HeaderFormat::default(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn with_header_format(mut self, format: HeaderFormat) -> Self {
        self.header_format = format;
        self
    }

    pub fn with_max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = max;
        self
    }
}

/// Handler trait for processing requests
pub trait RequestHandler: Send + Sync {
    /// Handle a decoded request and return the JSON reply
    fn handle(&self, request: Value) -> impl std::future::Future<Output = Value> + Send;
}

/// Simple handler that routes to a callback
pub struct CallbackHandler<F>
where
    F: Fn(Value) -> Value + Send + Sync,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(Value) -> Value + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> RequestHandler for CallbackHandler<F>
where
    F: Fn(Value) -> Value + Send + Sync,
{
    fn handle(&self, request: Value) -> impl std::future::Future<Output = Value> + Send {
        let result = (self.callback)(request);
        async move { result }
    }
}

/// Replies with the same value to every request
#[derive(Debug, Clone)]
pub struct ReplyHandler {
    reply: Value,
}

impl ReplyHandler {
    pub fn new(reply: Value) -> Self {
        Self { reply }
    }
}

impl RequestHandler for ReplyHandler {
    fn handle(&self, _request: Value) -> impl std::future::Future<Output = Value> + Send {
        let reply = self.reply.clone();
        async move { reply }
    }
}

/// Stops a running server
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::Sender<()>,
}

impl ShutdownHandle {
    pub async fn shutdown(&self) {
        let _ = self.tx.send(()).await;
    }
}

/// Framed server bound to a Unix socket
pub struct FramedServer {
    config: ServerConfig,
    listener: UnixListener,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl FramedServer {
    /// Bind the socket, replacing a stale socket file if present
    pub fn bind(config: ServerConfig) -> Result<Self> {
        if config.socket_path.exists() {
            std::fs::remove_file(&config.socket_path)?;
        }

        if let Some(parent) = config.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&config.socket_path)
            .map_err(|e| FramesockError::connection(&config.socket_path, e))?;

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        tracing::info!(path = %config.socket_path.display(), "Listening");

        Ok(Self {
            config,
            listener,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Accept connections until shut down
    pub async fn run<H: RequestHandler + 'static>(mut self, handler: Arc<H>) -> Result<()> {
        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            let handler = Arc::clone(&handler);
                            let codec = FrameCodec::with_max_length(
                                self.config.header_format,
                                self.config.max_frame_len,
                            );
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, handler, codec).await {
                                    tracing::warn!(error = %e, "Connection ended with error");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept error");
                        }
                    }
                }
                _ = self.shutdown_rx.recv() => {
                    break;
                }
            }
        }

        let _ = std::fs::remove_file(&self.config.socket_path);
        tracing::info!(path = %self.config.socket_path.display(), "Stopped");
        Ok(())
    }
}

/// Serve frames on one connection until the peer hangs up
async fn handle_connection<H: RequestHandler>(
    stream: UnixStream,
    handler: Arc<H>,
    codec: FrameCodec,
) -> Result<()> {
    let mut framed = Framed::new(stream, codec);

    while let Some(frame) = framed.next().await {
        let frame = frame?;
        let reply = match serde_json::from_slice::<Value>(&frame) {
            Ok(request) => {
                tracing::debug!(bytes = frame.len(), "Request");
                handler.handle(request).await
            }
            Err(e) => serde_json::to_value(Envelope::failure(
                ErrorCode::PARSE_ERROR,
                format!("invalid request: {}", e),
            ))?,
        };

        framed.send(Bytes::from(encode_message(&reply)?)).await?;
    }

    Ok(())
}

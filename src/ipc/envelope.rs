//! JSON envelope layer over either socket client.
//!
//! Daemons answer with `{"error": 0, "data": ...}` on success or
//! `{"error": <code>, "message": "..."}` on failure. Responses without an
//! `error` key are passed through untouched.

use std::path::Path;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FramesockError, Result};
use crate::ipc::async_socket::AsyncSocket;
use crate::ipc::codec::HeaderFormat;
use crate::ipc::sync_socket::SocketClient;

/// Success or failure wrapper exchanged with daemons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub error: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    pub fn success(data: Value) -> Self {
        Self {
            error: 0,
            data: Some(data),
            message: None,
        }
    }

    pub fn failure(code: i64, message: impl Into<String>) -> Self {
        Self {
            error: code,
            data: None,
            message: Some(message.into()),
        }
    }
}

/// Serialize an outgoing message to JSON bytes.
pub fn encode_message<T: Serialize + ?Sized>(message: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

/// Decode a response payload and unwrap its envelope.
pub fn decode_response(payload: &[u8]) -> Result<Value> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| FramesockError::transport(format!("response is not valid UTF-8: {}", e)))?;
    let response: Value = serde_json::from_str(text)?;
    unwrap_envelope(response)
}

/// Interpret a parsed response.
///
/// - `error == 0`: the `data` field (null when absent)
/// - `error != 0`: an application error with the daemon's code and message
/// - no `error` key, or not an object: the value itself
pub fn unwrap_envelope(response: Value) -> Result<Value> {
    let Value::Object(mut fields) = response else {
        return Ok(response);
    };
    let Some(error) = fields.get("error") else {
        return Ok(Value::Object(fields));
    };

    match error_code(error)? {
        0 => Ok(fields.remove("data").unwrap_or(Value::Null)),
        code => Err(FramesockError::remote(code, error_message(&fields))),
    }
}

fn error_code(error: &Value) -> Result<i64> {
    if let Some(code) = error.as_i64() {
        return Ok(code);
    }
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
    match error.as_f64() {
        Some(code) if code.fract() == 0.0 && code >= i64::MIN as f64 && code < i64::MAX as f64 => {
            Ok(code as i64)
        }
        _ => Err(FramesockError::transport(format!(
            "malformed envelope: error code {} is not a 64-bit integer",
            error
        ))),
    }
}

fn error_message(fields: &Map<String, Value>) -> String {
    match fields.get("message") {
        Some(Value::String(message)) => message.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Socket client that speaks JSON envelopes.
#[derive(Debug)]
pub struct JsonSocket<S> {
    inner: S,
}

/// Blocking JSON client.
pub type SyncJsonSocket = JsonSocket<SocketClient>;
/// Event-driven JSON client.
pub type AsyncJsonSocket = JsonSocket<AsyncSocket>;

impl<S> JsonSocket<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl JsonSocket<SocketClient> {
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(SocketClient::connect(path)?))
    }

    pub fn send<T: Serialize + ?Sized>(&mut self, message: &T) -> Result<usize> {
        let payload = encode_message(message)?;
        self.inner.send(payload)
    }

    pub fn receive(&mut self) -> Result<Value> {
        let payload = self.inner.receive()?;
        decode_response(&payload)
    }

    pub fn close(self) {
        self.inner.close();
    }
}

impl JsonSocket<AsyncSocket> {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(AsyncSocket::connect(path).await?))
    }

    pub async fn send<T: Serialize + ?Sized>(
        &mut self,
        message: &T,
        header_format: Option<&HeaderFormat>,
    ) -> Result<Bytes> {
        let payload = encode_message(message)?;
        self.inner.send(payload, header_format).await
    }

    pub async fn receive(&mut self, header_size: Option<usize>) -> Result<Value> {
        let payload = self.inner.receive(header_size).await?;
        decode_response(&payload)
    }

    pub async fn receive_frame(&mut self, format: &HeaderFormat) -> Result<Value> {
        let payload = self.inner.receive_frame(format).await?;
        decode_response(&payload)
    }

    pub async fn close(self) {
        self.inner.close().await;
    }
}

//! One-shot request to a named daemon

use serde_json::Value;
use tracing::debug;

use crate::daemon::registry::DaemonRegistry;
use crate::error::Result;
use crate::ipc::envelope::AsyncJsonSocket;

/// Send `message` to `daemon_name` and return the unwrapped `data` of its reply.
///
/// Opens a fresh connection for the call and closes it afterwards. A missing
/// message is sent as JSON `null`. Failures after connecting drop the socket,
/// which tears the connection down.
///
/// The reply is taken from a single delivery with the descriptor's `size`
/// header bytes stripped, so a daemon that writes its header and body in
/// separate writes fails to decode. Use [`send_sync_framed`] for those.
pub async fn send_sync(
    registry: &DaemonRegistry,
    daemon_name: &str,
    message: Option<&Value>,
) -> Result<Value> {
    let daemon = registry.get(daemon_name)?;
    debug!(daemon = daemon_name, path = %daemon.path.display(), "Dispatching");

    let mut socket = AsyncJsonSocket::connect(&daemon.path).await?;
    socket
        .send(message.unwrap_or(&Value::Null), Some(&daemon.header_format))
        .await?;
    let data = socket.receive(Some(daemon.size)).await?;
    socket.close().await;

    debug!(daemon = daemon_name, "Dispatch complete");
    Ok(data)
}

/// Like [`send_sync`], but reads the reply by decoding the header and waiting
/// for the whole frame, however many deliveries it spans.
pub async fn send_sync_framed(
    registry: &DaemonRegistry,
    daemon_name: &str,
    message: Option<&Value>,
) -> Result<Value> {
    let daemon = registry.get(daemon_name)?;
    debug!(daemon = daemon_name, path = %daemon.path.display(), "Dispatching framed");

    let mut socket = AsyncJsonSocket::connect(&daemon.path).await?;
    socket
        .send(message.unwrap_or(&Value::Null), Some(&daemon.header_format))
        .await?;
    let data = socket.receive_frame(&daemon.header_format).await?;
    socket.close().await;

    Ok(data)
}

//! End-to-end tests against a framed mock daemon
//!
//! Each test binds a `FramedServer` on a socket inside a temp directory and
//! talks to it through the public client API.

use std::path::Path;
use std::sync::Arc;

use framesock::config::{Config, DaemonEntry};
use framesock::ipc::server::{CallbackHandler, ReplyHandler, RequestHandler, ServerConfig, ShutdownHandle};
use framesock::{
    send_sync, send_sync_framed, AsyncJsonSocket, AsyncSocket, DaemonRegistry, FramedServer, FramesockError,
    HeaderFormat, Origin, Protocol, SyncJsonSocket,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

fn start_daemon<H: RequestHandler + 'static>(
    path: &Path,
    format: HeaderFormat,
    handler: H,
) -> (ShutdownHandle, JoinHandle<framesock::Result<()>>) {
    let server = FramedServer::bind(ServerConfig::new(path).with_header_format(format)).unwrap();
    let shutdown = server.shutdown_handle();
    let running = tokio::spawn(server.run(Arc::new(handler)));
    (shutdown, running)
}

fn config_with_authd(path: &Path) -> Config {
    let mut config = Config::default();
    config.daemons.insert(
        "authd".to_string(),
        DaemonEntry {
            protocol: Protocol::Tcp,
            path: path.to_path_buf(),
            header_format: HeaderFormat::LE_U32,
            size: Some(4),
        },
    );
    config
}

/// The mock daemon answers pong to anything; dispatch returns the data field.
#[tokio::test]
async fn test_send_sync_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("auth");
    let (shutdown, running) = start_daemon(
        &path,
        HeaderFormat::LE_U32,
        ReplyHandler::new(json!({"error": 0, "data": "pong"})),
    );

    let registry = DaemonRegistry::from_config(&config_with_authd(&path)).unwrap();
    let data = send_sync(&registry, "authd", Some(&json!({"ping": 1}))).await.unwrap();
    assert_eq!(data, json!("pong"));

    // Each call opens its own connection
    let again = send_sync(&registry, "authd", Some(&json!({"ping": 2}))).await.unwrap();
    assert_eq!(again, json!("pong"));

    shutdown.shutdown().await;
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_send_sync_big_endian_short_header() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("stats");
    let format: HeaderFormat = ">H".parse().unwrap();
    let (shutdown, running) = start_daemon(
        &path,
        format,
        CallbackHandler::new(|request: Value| json!({"error": 0, "data": request["value"]})),
    );

    let mut config = Config::default();
    config.daemons.insert(
        "statsd".to_string(),
        DaemonEntry {
            protocol: Protocol::Udp,
            path: path.clone(),
            header_format: format,
            size: None,
        },
    );
    let registry = DaemonRegistry::from_config(&config).unwrap();
    assert_eq!(registry.get("statsd").unwrap().size, 2);

    let data = send_sync(&registry, "statsd", Some(&json!({"value": [1, 2, 3]}))).await.unwrap();
    assert_eq!(data, json!([1, 2, 3]));

    shutdown.shutdown().await;
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_application_error_is_remote() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("auth");
    let (shutdown, running) = start_daemon(
        &path,
        HeaderFormat::LE_U32,
        ReplyHandler::new(json!({"error": 9006, "message": "bad request"})),
    );

    let registry = DaemonRegistry::from_config(&config_with_authd(&path)).unwrap();
    let err = send_sync(&registry, "authd", Some(&json!({"ping": 1}))).await.unwrap_err();
    match err {
        FramesockError::Application {
            code,
            ref message,
            origin,
        } => {
            assert_eq!(code, 9006);
            assert_eq!(message, "bad request");
            assert_eq!(origin, Origin::Remote);
        }
        other => panic!("expected application error, got {:?}", other),
    }

    shutdown.shutdown().await;
    running.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_client_against_mock_daemon() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("auth");
    let (shutdown, running) = start_daemon(
        &path,
        HeaderFormat::LE_U32,
        CallbackHandler::new(|request: Value| json!({"error": 0, "data": {"x": request["x"]}})),
    );

    let client_path = path.clone();
    let data = tokio::task::spawn_blocking(move || {
        let mut socket = SyncJsonSocket::connect(&client_path).unwrap();
        socket.send(&json!({"x": 1})).unwrap();
        let data = socket.receive().unwrap();
        socket.close();
        data
    })
    .await
    .unwrap();
    assert_eq!(data, json!({"x": 1}));

    shutdown.shutdown().await;
    running.await.unwrap().unwrap();
}

/// Peer sends half a header and hangs up.
#[tokio::test]
async fn test_short_header_is_transport_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("short.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let peer = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(&[4, 0]).await.unwrap();
        stream.shutdown().await.unwrap();
    });

    let mut socket = AsyncSocket::connect(&path).await.unwrap();
    peer.await.unwrap();

    let err = socket.receive_frame(&HeaderFormat::LE_U32).await.unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_short_header_is_transport_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("short.sock");
    let listener = std::os::unix::net::UnixListener::bind(&path).unwrap();

    let err = tokio::task::spawn_blocking(move || {
        let peer = std::thread::spawn(move || {
            use std::io::Write;
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(&[4, 0]).unwrap();
        });
        let mut socket = SyncJsonSocket::connect(&path).unwrap();
        peer.join().unwrap();
        socket.receive().unwrap_err()
    })
    .await
    .unwrap();
    assert!(err.is_transport());
}

/// Two tasks share one connection behind a lock; each gets its own reply.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shared_connection_serializes_receives() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("auth");
    let (shutdown, running) = start_daemon(
        &path,
        HeaderFormat::LE_U32,
        CallbackHandler::new(|request: Value| json!({"error": 0, "data": request["id"]})),
    );

    let socket = Arc::new(Mutex::new(AsyncJsonSocket::connect(&path).await.unwrap()));
    let mut tasks = Vec::new();
    for id in 0..8 {
        let socket = Arc::clone(&socket);
        tasks.push(tokio::spawn(async move {
            let mut socket = socket.lock().await;
            socket
                .send(&json!({"id": id}), Some(&HeaderFormat::LE_U32))
                .await
                .unwrap();
            let reply = socket.receive_frame(&HeaderFormat::LE_U32).await.unwrap();
            (id, reply)
        }));
    }

    for task in tasks {
        let (id, reply) = task.await.unwrap();
        assert_eq!(reply, json!(id));
    }

    let socket = Arc::try_unwrap(socket).unwrap().into_inner();
    socket.close().await;

    shutdown.shutdown().await;
    running.await.unwrap().unwrap();
}

/// Same as above through the header-stripping receive that dispatch uses.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shared_connection_serializes_header_stripping_receives() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("auth");
    let (shutdown, running) = start_daemon(
        &path,
        HeaderFormat::LE_U32,
        CallbackHandler::new(|request: Value| json!({"error": 0, "data": request["id"]})),
    );

    let socket = Arc::new(Mutex::new(AsyncJsonSocket::connect(&path).await.unwrap()));
    let mut tasks = Vec::new();
    for id in 0..8 {
        let socket = Arc::clone(&socket);
        tasks.push(tokio::spawn(async move {
            let mut socket = socket.lock().await;
            socket
                .send(&json!({"id": id}), Some(&HeaderFormat::LE_U32))
                .await
                .unwrap();
            let reply = socket.receive(Some(4)).await.unwrap();
            (id, reply)
        }));
    }

    for task in tasks {
        let (id, reply) = task.await.unwrap();
        assert_eq!(reply, json!(id));
    }

    let socket = Arc::try_unwrap(socket).unwrap().into_inner();
    socket.close().await;

    shutdown.shutdown().await;
    running.await.unwrap().unwrap();
}

/// Daemon writes the header and the body separately.
#[tokio::test]
async fn test_framed_dispatch_handles_split_reply() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("slow.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let peer = tokio::spawn(async move {
        use tokio::io::AsyncReadExt;
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut header = [0u8; 4];
        stream.read_exact(&mut header).await.unwrap();
        let mut request = vec![0u8; u32::from_le_bytes(header) as usize];
        stream.read_exact(&mut request).await.unwrap();

        let body = serde_json::to_vec(&json!({"error": 0, "data": "pong"})).unwrap();
        stream.write_all(&(body.len() as u32).to_le_bytes()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        stream.write_all(&body).await.unwrap();
    });

    let registry = DaemonRegistry::from_config(&config_with_authd(&path)).unwrap();
    let data = send_sync_framed(&registry, "authd", Some(&json!({"ping": 1}))).await.unwrap();
    assert_eq!(data, json!("pong"));
    peer.await.unwrap();
}

#[tokio::test]
async fn test_unknown_daemon_is_lookup_error() {
    let registry = DaemonRegistry::from_config(&Config::default()).unwrap();
    assert!(registry.contains("authd"));

    let err = send_sync(&registry, "missingd", None).await.unwrap_err();
    assert!(matches!(err, FramesockError::UnknownDaemon(_)));
    assert_eq!(err.code(), framesock::ErrorCode::UNKNOWN_DAEMON);
}

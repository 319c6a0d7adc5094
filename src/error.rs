//! Error types for framesock
//!
//! Centralized error handling using thiserror. Every failure a caller can see
//! falls into one of four kinds: connection-time, transport-time, remote
//! application, or a local usage error (type constraint, unknown daemon).

use std::path::PathBuf;

use thiserror::Error;

/// Where an error originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Raised by this process (socket, framing, configuration).
    Local,
    /// Reported by the daemon in its response envelope.
    Remote,
}

/// Numeric error codes carried alongside local errors.
pub struct ErrorCode;

impl ErrorCode {
    /// Socket could not be created or connected.
    pub const CONNECTION: i64 = 1013;
    /// Send or receive failed at the transport level.
    pub const TRANSPORT: i64 = 1014;
    /// Named daemon is not in the registry.
    pub const UNKNOWN_DAEMON: i64 = 1017;
    /// Header format descriptor could not be parsed.
    pub const HEADER_FORMAT: i64 = 1018;
    /// Configuration could not be loaded.
    pub const CONFIG: i64 = 1019;
    /// Payload handed to a send operation was not raw bytes.
    pub const TYPE_CONSTRAINT: i64 = 1105;
    /// Request frame did not hold valid JSON (reported by the daemon side).
    pub const PARSE_ERROR: i64 = -32700;
}

/// All error types that can occur in framesock
#[derive(Debug, Error)]
pub enum FramesockError {
    /// Payload passed to a send operation is not a raw byte sequence
    #[error("Type error: {0}")]
    TypeConstraint(String),

    /// Socket creation, connect, or event loop registration failed
    #[error("Connection error ({}): {source}", .path.display())]
    Connection {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Zero-length send, short read, or any I/O failure mid-exchange
    #[error("Transport error: {0}")]
    Transport(String),

    /// Daemon answered with a non-zero `error` envelope
    #[error("Daemon error {code}: {message}")]
    Application {
        code: i64,
        message: String,
        origin: Origin,
    },

    /// Daemon name missing from the registry
    #[error("Unknown daemon: {0}")]
    UnknownDaemon(String),

    /// Header format descriptor is not understood
    #[error("Invalid header format: {0}")]
    InvalidHeaderFormat(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FramesockError {
    /// Build a connection error for `path`.
    pub fn connection(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Connection {
            path: path.into(),
            source,
        }
    }

    /// Build a transport error from anything displayable.
    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::Transport(message.to_string())
    }

    /// Build an application error reported by the daemon.
    pub fn remote(code: i64, message: impl Into<String>) -> Self {
        Self::Application {
            code,
            message: message.into(),
            origin: Origin::Remote,
        }
    }

    /// Numeric code for this error. Application errors carry the daemon's code verbatim.
    pub fn code(&self) -> i64 {
        match self {
            Self::TypeConstraint(_) => ErrorCode::TYPE_CONSTRAINT,
            Self::Connection { .. } => ErrorCode::CONNECTION,
            Self::Transport(_) | Self::Io(_) | Self::Json(_) => ErrorCode::TRANSPORT,
            Self::Application { code, .. } => *code,
            Self::UnknownDaemon(_) => ErrorCode::UNKNOWN_DAEMON,
            Self::InvalidHeaderFormat(_) => ErrorCode::HEADER_FORMAT,
            Self::Config(_) => ErrorCode::CONFIG,
        }
    }

    pub fn origin(&self) -> Origin {
        match self {
            Self::Application { origin, .. } => *origin,
            _ => Origin::Local,
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Io(_) | Self::Json(_))
    }

    pub fn is_application(&self) -> bool {
        matches!(self, Self::Application { .. })
    }
}

/// Result type alias for framesock operations
pub type Result<T> = std::result::Result<T, FramesockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_constraint_error() {
        let err = FramesockError::TypeConstraint("Type must be bytes".to_string());
        assert_eq!(err.to_string(), "Type error: Type must be bytes");
        assert_eq!(err.code(), 1105);
    }

    #[test]
    fn test_connection_error_includes_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory");
        let err = FramesockError::connection("/tmp/missing.sock", io_err);
        assert!(err.is_connection());
        assert_eq!(err.code(), 1013);
        let msg = err.to_string();
        assert!(msg.contains("/tmp/missing.sock"));
        assert!(msg.contains("No such file or directory"));
    }

    #[test]
    fn test_transport_error() {
        let err = FramesockError::transport("Number of sent bytes is 0");
        assert_eq!(err.to_string(), "Transport error: Number of sent bytes is 0");
        assert!(err.is_transport());
        assert_eq!(err.origin(), Origin::Local);
    }

    #[test]
    fn test_application_error_is_remote() {
        let err = FramesockError::remote(9006, "bad request");
        assert!(err.is_application());
        assert_eq!(err.code(), 9006);
        assert_eq!(err.origin(), Origin::Remote);
        assert_eq!(err.to_string(), "Daemon error 9006: bad request");
    }

    #[test]
    fn test_unknown_daemon_error() {
        let err = FramesockError::UnknownDaemon("nope".to_string());
        assert_eq!(err.to_string(), "Unknown daemon: nope");
        assert_eq!(err.code(), 1017);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: FramesockError = io_err.into();
        assert!(matches!(err, FramesockError::Io(_)));
        assert!(err.is_transport());
        assert!(err.to_string().contains("pipe closed"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: FramesockError = json_err.into();
        assert!(matches!(err, FramesockError::Json(_)));
        assert_eq!(err.code(), ErrorCode::TRANSPORT);
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(FramesockError::Config("test".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}

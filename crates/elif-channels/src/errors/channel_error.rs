//! Channel error types
//!
//! Error handling for the channel subsystem: transport failures, queue
//! closure, payload decoding and registration problems.

use crate::config::ConfigError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::error::{CapacityError, ProtocolError};

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Close codes that mark a graceful or otherwise expected teardown.
pub const EXPECTED_CLOSE_CODES: [u16; 4] = [
    1000, // normal closure
    1001, // going away
    1005, // no status received
    1006, // abnormal closure
];

/// Channel subsystem errors
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection closed by peer with code {code}: {reason}")]
    ClosedByPeer { code: u16, reason: String },

    #[error("Client outbound queue is closed")]
    ClientClosed,

    #[error("Channel event loop is not running")]
    ChannelClosed,

    #[error("Frame too large: {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("No value at path '{path}'")]
    PathNotFound { path: String },

    #[error("Upgrade failed: {message}")]
    UpgradeFailed { message: String },

    #[error("Origin rejected: {origin}")]
    OriginRejected { origin: String },

    #[error("Channel already registered: {name}")]
    DuplicateChannel { name: String },

    #[error("Invalid channel path: {path}")]
    InvalidPath { path: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ChannelError {
    /// Create a transport error
    pub fn transport<T: Into<String>>(message: T) -> Self {
        ChannelError::Transport {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol<T: Into<String>>(message: T) -> Self {
        ChannelError::Protocol {
            message: message.into(),
        }
    }

    /// Create an upgrade error
    pub fn upgrade_failed<T: Into<String>>(message: T) -> Self {
        ChannelError::UpgradeFailed {
            message: message.into(),
        }
    }

    /// Create a path lookup error
    pub fn path_not_found<T: Into<String>>(path: T) -> Self {
        ChannelError::PathNotFound { path: path.into() }
    }

    /// Whether this error represents an expected teardown that should not
    /// be reported as a failure.
    pub fn is_expected_close(&self) -> bool {
        match self {
            ChannelError::ConnectionClosed => true,
            ChannelError::ClosedByPeer { code, .. } => EXPECTED_CLOSE_CODES.contains(code),
            _ => false,
        }
    }

    /// Get error code for logs and diagnostics
    pub fn error_code(&self) -> &'static str {
        match self {
            ChannelError::Transport { .. } => "TRANSPORT_ERROR",
            ChannelError::Protocol { .. } => "PROTOCOL_ERROR",
            ChannelError::Io(_) => "IO_ERROR",
            ChannelError::Serialization(_) => "SERIALIZATION_ERROR",
            ChannelError::ConnectionClosed => "CONNECTION_CLOSED",
            ChannelError::ClosedByPeer { .. } => "CLOSED_BY_PEER",
            ChannelError::ClientClosed => "CLIENT_CLOSED",
            ChannelError::ChannelClosed => "CHANNEL_CLOSED",
            ChannelError::FrameTooLarge { .. } => "FRAME_TOO_LARGE",
            ChannelError::PathNotFound { .. } => "PATH_NOT_FOUND",
            ChannelError::UpgradeFailed { .. } => "UPGRADE_FAILED",
            ChannelError::OriginRejected { .. } => "ORIGIN_REJECTED",
            ChannelError::DuplicateChannel { .. } => "DUPLICATE_CHANNEL",
            ChannelError::InvalidPath { .. } => "INVALID_PATH",
            ChannelError::Config(_) => "CONFIGURATION_ERROR",
        }
    }
}

impl From<tungstenite::Error> for ChannelError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::ConnectionClosed
            }
            tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                Self::ConnectionClosed
            }
            tungstenite::Error::Protocol(msg) => Self::protocol(msg.to_string()),
            tungstenite::Error::Capacity(CapacityError::MessageTooLong { size, max_size }) => {
                Self::FrameTooLarge {
                    size,
                    limit: max_size,
                }
            }
            tungstenite::Error::Io(io_err) => Self::Io(io_err),
            other => Self::transport(other.to_string()),
        }
    }
}

/// axum wraps the underlying tungstenite error, so unwrap it to keep the
/// close classification intact
impl From<axum::Error> for ChannelError {
    fn from(err: axum::Error) -> Self {
        match err.into_inner().downcast::<tungstenite::Error>() {
            Ok(ws_err) => (*ws_err).into(),
            Err(other) => Self::transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_close_codes() {
        assert!(ChannelError::ConnectionClosed.is_expected_close());
        for code in EXPECTED_CLOSE_CODES {
            let err = ChannelError::ClosedByPeer {
                code,
                reason: String::new(),
            };
            assert!(err.is_expected_close(), "code {} should be expected", code);
        }

        let policy_violation = ChannelError::ClosedByPeer {
            code: 1008,
            reason: "policy".to_string(),
        };
        assert!(!policy_violation.is_expected_close());
        assert!(!ChannelError::transport("reset").is_expected_close());
    }

    #[test]
    fn test_tungstenite_conversion() {
        let closed: ChannelError = tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(closed, ChannelError::ConnectionClosed));

        let reset: ChannelError =
            tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake).into();
        assert!(reset.is_expected_close());

        let too_long: ChannelError = tungstenite::Error::Capacity(CapacityError::MessageTooLong {
            size: 1024,
            max_size: 512,
        })
        .into();
        assert!(matches!(
            too_long,
            ChannelError::FrameTooLarge {
                size: 1024,
                limit: 512
            }
        ));
    }

    #[test]
    fn test_axum_error_keeps_close_classification() {
        let reset: ChannelError = axum::Error::new(tungstenite::Error::Protocol(
            ProtocolError::ResetWithoutClosingHandshake,
        ))
        .into();
        assert!(matches!(reset, ChannelError::ConnectionClosed));
        assert!(reset.is_expected_close());

        let closed: ChannelError = axum::Error::new(tungstenite::Error::ConnectionClosed).into();
        assert!(closed.is_expected_close());

        let too_long: ChannelError = axum::Error::new(tungstenite::Error::Capacity(
            CapacityError::MessageTooLong {
                size: 2048,
                max_size: 512,
            },
        ))
        .into();
        assert!(matches!(too_long, ChannelError::FrameTooLarge { .. }));

        let other: ChannelError =
            axum::Error::new(std::io::Error::new(std::io::ErrorKind::Other, "boom")).into();
        assert!(matches!(other, ChannelError::Transport { .. }));
        assert!(!other.is_expected_close());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ChannelError::ClientClosed.error_code(), "CLIENT_CLOSED");
        assert_eq!(
            ChannelError::path_not_found("user.name").error_code(),
            "PATH_NOT_FOUND"
        );
        assert_eq!(
            ChannelError::path_not_found("user.name").to_string(),
            "No value at path 'user.name'"
        );
    }
}

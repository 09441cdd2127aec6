//! Frame and identity types for channel connections
//!
//! `Frame` is the crate's own view of a WebSocket message. It converts to and
//! from both axum's and tungstenite's message types so the client tasks do not
//! care which transport performed the upgrade.

use axum::extract::ws;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_tungstenite::tungstenite;

/// Unique identifier for a socket client
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(pub u64);

impl ClientId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One discrete unit of data exchanged over an upgraded connection
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Text frame
    Text(String),
    /// Binary frame
    Binary(Vec<u8>),
    /// Ping frame
    Ping(Vec<u8>),
    /// Pong frame
    Pong(Vec<u8>),
    /// Close frame
    Close(Option<CloseFrame>),
}

/// Close frame information
#[derive(Debug, Clone, PartialEq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl Frame {
    pub fn text<T: Into<String>>(content: T) -> Self {
        Self::Text(content.into())
    }

    pub fn binary<T: Into<Vec<u8>>>(data: T) -> Self {
        Self::Binary(data.into())
    }

    pub fn close() -> Self {
        Self::Close(None)
    }

    pub fn close_with_reason<T: Into<String>>(code: u16, reason: T) -> Self {
        Self::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        }))
    }

    /// Wrap an outbound payload, as text when it is valid UTF-8
    pub fn from_payload(payload: Vec<u8>) -> Self {
        match String::from_utf8(payload) {
            Ok(text) => Self::Text(text),
            Err(err) => Self::Binary(err.into_bytes()),
        }
    }

    /// Data carried by a text or binary frame
    pub fn into_payload(self) -> Option<Vec<u8>> {
        match self {
            Self::Text(text) => Some(text.into_bytes()),
            Self::Binary(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Self::Text(_) | Self::Binary(_))
    }

    pub fn is_control(&self) -> bool {
        matches!(self, Self::Ping(_) | Self::Pong(_) | Self::Close(_))
    }

    /// Size of the application payload in bytes
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) | Self::Ping(data) | Self::Pong(data) => data.len(),
            Self::Close(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<tungstenite::Message> for Frame {
    fn from(msg: tungstenite::Message) -> Self {
        match msg {
            tungstenite::Message::Text(text) => Self::Text(text),
            tungstenite::Message::Binary(data) => Self::Binary(data),
            tungstenite::Message::Ping(data) => Self::Ping(data),
            tungstenite::Message::Pong(data) => Self::Pong(data),
            tungstenite::Message::Close(frame) => Self::Close(frame.map(|f| CloseFrame {
                code: f.code.into(),
                reason: f.reason.into_owned(),
            })),
            // Raw frames only surface when reading at the frame level
            tungstenite::Message::Frame(frame) => Self::Binary(frame.into_data()),
        }
    }
}

impl From<Frame> for tungstenite::Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => tungstenite::Message::Text(text),
            Frame::Binary(data) => tungstenite::Message::Binary(data),
            Frame::Ping(data) => tungstenite::Message::Ping(data),
            Frame::Pong(data) => tungstenite::Message::Pong(data),
            Frame::Close(close) => {
                tungstenite::Message::Close(close.map(|f| tungstenite::protocol::CloseFrame {
                    code: tungstenite::protocol::frame::coding::CloseCode::from(f.code),
                    reason: f.reason.into(),
                }))
            }
        }
    }
}

impl From<ws::Message> for Frame {
    fn from(msg: ws::Message) -> Self {
        match msg {
            ws::Message::Text(text) => Self::Text(text),
            ws::Message::Binary(data) => Self::Binary(data),
            ws::Message::Ping(data) => Self::Ping(data),
            ws::Message::Pong(data) => Self::Pong(data),
            ws::Message::Close(frame) => Self::Close(frame.map(|f| CloseFrame {
                code: f.code,
                reason: f.reason.into_owned(),
            })),
        }
    }
}

impl From<Frame> for ws::Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => ws::Message::Text(text),
            Frame::Binary(data) => ws::Message::Binary(data),
            Frame::Ping(data) => ws::Message::Ping(data),
            Frame::Pong(data) => ws::Message::Pong(data),
            Frame::Close(close) => ws::Message::Close(close.map(|f| ws::CloseFrame {
                code: f.code,
                reason: f.reason.into(),
            })),
        }
    }
}

/// Socket client lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientState {
    /// Upgraded, waiting for the channel to register it
    Connecting,
    /// Registered and exchanging frames
    Open,
    /// Teardown started by a read error, write failure or queue closure
    Closing,
    /// Both connection tasks have exited
    Closed,
}

impl ClientState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_frames() {
        assert_eq!(
            Frame::from_payload(b"hello".to_vec()),
            Frame::Text("hello".to_string())
        );
        assert_eq!(
            Frame::from_payload(vec![0xff, 0xfe]),
            Frame::Binary(vec![0xff, 0xfe])
        );
        assert_eq!(Frame::text("abc").into_payload(), Some(b"abc".to_vec()));
        assert_eq!(Frame::Ping(vec![1]).into_payload(), None);
    }

    #[test]
    fn test_close_frame_conversion() {
        let frame = Frame::close_with_reason(1008, "policy");
        let msg: tungstenite::Message = frame.clone().into();
        assert_eq!(Frame::from(msg), frame);

        let msg: ws::Message = frame.clone().into();
        assert_eq!(Frame::from(msg), frame);
    }

    #[test]
    fn test_frame_kinds() {
        assert!(Frame::text("x").is_data());
        assert!(Frame::Pong(vec![]).is_control());
        assert!(Frame::close().is_empty());
        assert_eq!(Frame::binary(vec![1, 2, 3]).len(), 3);
    }

    #[test]
    fn test_client_state() {
        assert!(ClientState::Open.is_open());
        assert!(ClientState::Closed.is_closed());
        assert_eq!(ClientState::Closing.to_string(), "closing");
        assert_eq!(ClientId(42).to_string(), "42");
    }
}

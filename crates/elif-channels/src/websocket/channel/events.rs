//! Channel events delivered to handlers
//!
//! Message payloads are usually JSON, so events carry helpers to read a
//! single field by path or decode the payload into a typed value.

use crate::errors::{ChannelError, ChannelResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What happened on the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelEventType {
    /// A client was registered with the channel
    Connect,
    /// A client is being removed from the channel
    Disconnect,
    /// A client sent a frame
    Message,
}

impl ChannelEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Message => "message",
        }
    }
}

impl fmt::Display for ChannelEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One occurrence on a channel and its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    kind: ChannelEventType,
    data: Vec<u8>,
}

impl ChannelEvent {
    pub fn connect() -> Self {
        Self {
            kind: ChannelEventType::Connect,
            data: Vec::new(),
        }
    }

    pub fn disconnect() -> Self {
        Self {
            kind: ChannelEventType::Disconnect,
            data: Vec::new(),
        }
    }

    pub fn message<T: Into<Vec<u8>>>(data: T) -> Self {
        Self {
            kind: ChannelEventType::Message,
            data: data.into(),
        }
    }

    pub fn kind(&self) -> ChannelEventType {
        self.kind
    }

    pub fn is_connect(&self) -> bool {
        self.kind == ChannelEventType::Connect
    }

    pub fn is_disconnect(&self) -> bool {
        self.kind == ChannelEventType::Disconnect
    }

    pub fn is_message(&self) -> bool {
        self.kind == ChannelEventType::Message
    }

    /// Raw payload bytes; empty for connect and disconnect events
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Payload as UTF-8 text, if it is valid UTF-8
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    /// Look up the JSON value at a dot-separated path.
    ///
    /// Numeric segments index into arrays, `#` yields an array's length and
    /// `\.` matches a literal dot inside a key. Returns `None` when the
    /// payload is not JSON or nothing lives at `path`.
    pub fn get(&self, path: &str) -> Option<Value> {
        let root: Value = serde_json::from_slice(&self.data).ok()?;
        lookup_path(&root, path).cloned().or_else(|| array_length(&root, path))
    }

    /// Decode the whole payload
    pub fn extract<T: DeserializeOwned>(&self) -> ChannelResult<T> {
        Ok(serde_json::from_slice(&self.data)?)
    }

    /// Decode the value found at `path`
    pub fn extract_at<T: DeserializeOwned>(&self, path: &str) -> ChannelResult<T> {
        let value = self
            .get(path)
            .ok_or_else(|| ChannelError::path_not_found(path))?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Split a path on unescaped dots
fn path_segments(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => current.push('\\'),
            },
            '.' => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}

fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }

    path_segments(path)
        .iter()
        .try_fold(root, |value, segment| match value {
            Value::Object(map) => map.get(segment.as_str()),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        })
}

/// `items.#` counts the elements of the array at `items`
fn array_length(root: &Value, path: &str) -> Option<Value> {
    let parent = if path == "#" {
        Some(root)
    } else {
        path.strip_suffix(".#")
            .and_then(|prefix| lookup_path(root, prefix))
    }?;

    parent.as_array().map(|items| Value::from(items.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        name: String,
    }

    #[derive(Debug, Deserialize)]
    struct Envelope {
        user: User,
    }

    #[test]
    fn test_get_nested_field() {
        let event = ChannelEvent::message(r#"{"user":{"name":"Alice"}}"#);

        assert_eq!(event.get("user.name"), Some(json!("Alice")));
        assert_eq!(
            event.get("user.name").as_ref().and_then(Value::as_str),
            Some("Alice")
        );
        assert_eq!(event.get("user.email"), None);
        assert_eq!(event.get(""), None);
    }

    #[test]
    fn test_extract_and_extract_at_agree() {
        let event = ChannelEvent::message(r#"{"user":{"name":"Alice"}}"#);

        let whole: Envelope = event.extract().unwrap();
        let partial: User = event.extract_at("user").unwrap();

        assert_eq!(whole.user.name, "Alice");
        assert_eq!(partial, whole.user);
    }

    #[test]
    fn test_extract_at_missing_path() {
        let event = ChannelEvent::message(r#"{"user":{"name":"Alice"}}"#);
        let err = event.extract_at::<User>("account").unwrap_err();
        assert!(matches!(err, ChannelError::PathNotFound { ref path } if path == "account"));
    }

    #[test]
    fn test_extract_invalid_json() {
        let event = ChannelEvent::message("not json");
        assert!(matches!(
            event.extract::<Envelope>(),
            Err(ChannelError::Serialization(_))
        ));
        assert_eq!(event.get("anything"), None);
    }

    #[test]
    fn test_array_paths() {
        let event = ChannelEvent::message(r#"{"rooms":[{"id":1},{"id":2},{"id":3}]}"#);

        assert_eq!(event.get("rooms.1.id"), Some(json!(2)));
        assert_eq!(event.get("rooms.#"), Some(json!(3)));
        assert_eq!(event.get("rooms.9.id"), None);
        assert_eq!(event.get("rooms.first"), None);

        let list = ChannelEvent::message("[10,20]");
        assert_eq!(list.get("#"), Some(json!(2)));
        assert_eq!(list.get("0"), Some(json!(10)));
    }

    #[test]
    fn test_escaped_dot_in_key() {
        let event = ChannelEvent::message(r#"{"file.name":"report.pdf","file":{"name":"x"}}"#);
        assert_eq!(event.get(r"file\.name"), Some(json!("report.pdf")));
        assert_eq!(event.get("file.name"), Some(json!("x")));
    }

    #[test]
    fn test_event_kinds() {
        let connect = ChannelEvent::connect();
        assert!(connect.is_connect());
        assert!(connect.data().is_empty());
        assert_eq!(connect.kind().to_string(), "connect");

        assert!(ChannelEvent::disconnect().is_disconnect());

        let message = ChannelEvent::message("hi");
        assert!(message.is_message());
        assert_eq!(message.text(), Some("hi"));
        assert_eq!(message.into_data(), b"hi".to_vec());
    }
}

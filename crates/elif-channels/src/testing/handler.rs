//! Handler that records every event for later assertions

use crate::websocket::channel::{ChannelEvent, ChannelEventType};
use crate::websocket::client::SocketClient;
use crate::websocket::handler::ChannelHandler;
use crate::websocket::types::ClientId;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};

/// Records `(client, event)` pairs in arrival order. Clones share the log.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    events: Arc<Mutex<Vec<(ClientId, ChannelEvent)>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(ClientId, ChannelEvent)> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<ChannelEventType> {
        self.events.lock().iter().map(|(_, event)| event.kind()).collect()
    }

    pub fn count(&self, kind: ChannelEventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|(_, event)| event.kind() == kind)
            .count()
    }

    /// Payloads of message events as text
    pub fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|(_, event)| event.is_message())
            .map(|(_, event)| String::from_utf8_lossy(event.data()).into_owned())
            .collect()
    }

    /// Wait until at least `count` events of `kind` were recorded
    pub async fn wait_for(&self, kind: ChannelEventType, count: usize, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        loop {
            if self.count(kind) >= count {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl ChannelHandler for RecordingHandler {
    fn handle(&self, client: &SocketClient, event: ChannelEvent) {
        self.events.lock().push((client.id(), event));
    }
}

//! Named client groups inside a channel

use crate::errors::ChannelResult;
use crate::websocket::client::SocketClient;
use crate::websocket::types::ClientId;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// Outcome of a room broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastResult {
    pub delivered: usize,
    pub failed: Vec<ClientId>,
}

impl BroadcastResult {
    pub fn total_attempted(&self) -> usize {
        self.delivered + self.failed.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// A named subset of a channel's clients.
///
/// Membership is kept on both sides: the room lists its clients and every
/// client lists the rooms it is in. Both lists are updated together under
/// the room lock, which is always taken before a client's room lock.
#[derive(Clone)]
pub struct ChannelRoom {
    inner: Arc<RoomInner>,
}

struct RoomInner {
    name: String,
    clients: Mutex<Vec<SocketClient>>,
}

impl ChannelRoom {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RoomInner {
                name: name.into(),
                clients: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create a room that already holds `clients`
    pub fn with_clients<I>(name: impl Into<String>, clients: I) -> Self
    where
        I: IntoIterator<Item = SocketClient>,
    {
        let room = Self::new(name);
        for client in clients {
            room.add(&client);
        }
        room
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Add a client. Returns `false` if it was already a member or has
    /// already been disconnected from its channel.
    pub fn add(&self, client: &SocketClient) -> bool {
        let mut clients = self.inner.clients.lock();
        if clients.iter().any(|member| member == client) {
            return false;
        }

        if !client.joined_room(self.clone()) {
            debug!(room = %self.inner.name, client = %client.id(), "Disconnected client not added to room");
            return false;
        }
        clients.push(client.clone());
        debug!(room = %self.inner.name, client = %client.id(), "Client joined room");
        true
    }

    /// Remove a client. Returns `false` if it was not a member.
    pub fn remove(&self, client: &SocketClient) -> bool {
        let mut clients = self.inner.clients.lock();
        let Some(index) = clients.iter().position(|member| member == client) else {
            return false;
        };

        clients.swap_remove(index);
        client.left_room(self);
        debug!(room = %self.inner.name, client = %client.id(), "Client left room");
        true
    }

    /// Whether anything besides the channel's room map holds this room
    pub(crate) fn is_held_elsewhere(&self) -> bool {
        Arc::strong_count(&self.inner) > 1
    }

    pub fn contains(&self, client: &SocketClient) -> bool {
        self.inner.clients.lock().iter().any(|member| member == client)
    }

    pub fn len(&self) -> usize {
        self.inner.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.clients.lock().is_empty()
    }

    /// Snapshot of the current members
    pub fn clients(&self) -> Vec<SocketClient> {
        self.inner.clients.lock().clone()
    }

    /// Serialize `value` once and queue it to every member
    pub fn broadcast<T: Serialize + ?Sized>(&self, value: &T) -> ChannelResult<BroadcastResult> {
        let payload = serde_json::to_vec(value).map_err(|err| {
            error!(room = %self.inner.name, error = %err, "Failed to serialize room broadcast");
            err
        })?;
        Ok(self.broadcast_raw(payload))
    }

    /// Queue raw bytes to every member
    pub fn broadcast_raw(&self, payload: impl Into<Vec<u8>>) -> BroadcastResult {
        let payload = payload.into();
        let members = self.clients();
        let mut result = BroadcastResult::default();

        for client in members {
            match client.send_raw(payload.clone()) {
                Ok(()) => result.delivered += 1,
                Err(_) => result.failed.push(client.id()),
            }
        }

        if result.has_failures() {
            debug!(
                room = %self.inner.name,
                delivered = result.delivered,
                failed = result.failed.len(),
                "Room broadcast skipped closed clients"
            );
        }
        result
    }

    pub fn ptr_eq(&self, other: &ChannelRoom) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for ChannelRoom {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ChannelRoom {}

impl fmt::Debug for ChannelRoom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ChannelRoom");
        debug.field("name", &self.inner.name);
        if let Some(clients) = self.inner.clients.try_lock() {
            debug.field("clients", &clients.len());
        }
        debug.finish()
    }
}

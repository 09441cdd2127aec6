//! Channels and their event loops
//!
//! A channel owns the set of connected clients and runs a single task that
//! applies membership changes and dispatches events to the handler. Because
//! only that task touches the membership map, it needs no lock.

use super::events::ChannelEvent;
use super::message::{ChannelCommand, ChannelRequest, SocketMessage};
use super::room::ChannelRoom;
use crate::config::ChannelConfig;
use crate::errors::{ChannelError, ChannelResult};
use crate::websocket::client::SocketClient;
use crate::websocket::handler::ChannelHandler;
use crate::websocket::ids::{IdAllocator, SnowflakeIds};
use crate::websocket::types::ClientId;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// Handle to a running channel.
///
/// Cloning is cheap; every clone talks to the same event loop. Opening a
/// channel spawns its loop, so it must happen inside a Tokio runtime.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    name: String,
    config: ChannelConfig,
    commands: mpsc::Sender<ChannelCommand>,
    requests: mpsc::UnboundedSender<ChannelRequest>,
    rooms: Mutex<HashMap<String, ChannelRoom>>,
    ids: Arc<dyn IdAllocator>,
}

/// Builder for channels with non-default configuration
pub struct ChannelBuilder {
    name: String,
    config: ChannelConfig,
    ids: Option<Arc<dyn IdAllocator>>,
}

impl ChannelBuilder {
    pub fn config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom client id allocator
    pub fn id_allocator<A: IdAllocator>(mut self, ids: A) -> Self {
        self.ids = Some(Arc::new(ids));
        self
    }

    /// Spawn the event loop and return a handle to it
    pub fn open<H: ChannelHandler>(self, handler: H) -> Channel {
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(SnowflakeIds::default()));
        Channel::spawn(self.name, self.config, ids, Arc::new(handler))
    }
}

impl Channel {
    /// Open a channel with the default configuration
    pub fn open<H: ChannelHandler>(name: impl Into<String>, handler: H) -> Self {
        Self::builder(name).open(handler)
    }

    pub fn builder(name: impl Into<String>) -> ChannelBuilder {
        ChannelBuilder {
            name: name.into(),
            config: ChannelConfig::default(),
            ids: None,
        }
    }

    fn spawn(
        name: String,
        config: ChannelConfig,
        ids: Arc<dyn IdAllocator>,
        handler: Arc<dyn ChannelHandler>,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(config.event_queue_capacity.max(1));
        let (requests, request_rx) = mpsc::unbounded_channel();

        let event_loop = EventLoop {
            name: name.clone(),
            handler,
            clients: HashMap::new(),
            commands: command_rx,
            requests: request_rx,
        };
        tokio::spawn(event_loop.run());

        Self {
            inner: Arc::new(ChannelInner {
                name,
                config,
                commands,
                requests,
                rooms: Mutex::new(HashMap::new()),
                ids,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Get the room called `name`, creating it on first use. The room is not
    /// pruned while the returned handle is alive.
    pub fn room(&self, name: &str) -> ChannelRoom {
        let mut rooms = self.inner.rooms.lock();
        rooms
            .entry(name.to_string())
            .or_insert_with(|| ChannelRoom::new(name))
            .clone()
    }

    /// Add `client` to the named room, creating the room if needed.
    ///
    /// The room map stays locked until the client is in, so a concurrent
    /// `prune_rooms` cannot drop the room in between. Returns `false` if the
    /// client was already a member or has been disconnected.
    pub fn join(&self, name: &str, client: &SocketClient) -> bool {
        let mut rooms = self.inner.rooms.lock();
        rooms
            .entry(name.to_string())
            .or_insert_with(|| ChannelRoom::new(name))
            .add(client)
    }

    /// Every room created so far
    pub fn rooms(&self) -> Vec<ChannelRoom> {
        self.inner.rooms.lock().values().cloned().collect()
    }

    /// Drop rooms that have no members and no outstanding handles. Returns
    /// how many were removed.
    pub fn prune_rooms(&self) -> usize {
        let mut rooms = self.inner.rooms.lock();
        let before = rooms.len();
        rooms.retain(|_, room| room.is_held_elsewhere() || !room.is_empty());
        let pruned = before - rooms.len();
        if pruned > 0 {
            debug!(channel = %self.inner.name, pruned, "Pruned empty rooms");
        }
        pruned
    }

    /// Serialize `value` once and queue it to every connected client
    pub fn broadcast<T: Serialize + ?Sized>(&self, value: &T) -> ChannelResult<()> {
        let payload = serde_json::to_vec(value).map_err(|err| {
            error!(channel = %self.inner.name, error = %err, "Failed to serialize broadcast");
            err
        })?;
        self.broadcast_raw(payload)
    }

    /// Queue raw bytes to every connected client.
    ///
    /// Returns immediately; delivery happens on the event loop. Safe to call
    /// from inside a handler.
    pub fn broadcast_raw(&self, payload: impl Into<Vec<u8>>) -> ChannelResult<()> {
        self.inner
            .requests
            .send(ChannelRequest::Broadcast(payload.into()))
            .map_err(|_| ChannelError::ChannelClosed)
    }

    /// Snapshot of the connected clients.
    ///
    /// Answered by the event loop, so awaiting this from inside a handler
    /// would never complete.
    pub async fn clients(&self) -> ChannelResult<Vec<SocketClient>> {
        let (reply, members) = oneshot::channel();
        self.inner
            .requests
            .send(ChannelRequest::Members(reply))
            .map_err(|_| ChannelError::ChannelClosed)?;
        members.await.map_err(|_| ChannelError::ChannelClosed)
    }

    pub async fn client_count(&self) -> ChannelResult<usize> {
        Ok(self.clients().await?.len())
    }

    pub fn ptr_eq(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn next_client_id(&self) -> ClientId {
        self.inner.ids.next_id()
    }

    /// Register a client and wait until the connect event has been handled
    pub(crate) async fn connect(&self, client: SocketClient) -> ChannelResult<()> {
        let (registered, done) = oneshot::channel();
        self.command(ChannelCommand::Connect { client, registered })
            .await?;
        done.await.map_err(|_| ChannelError::ChannelClosed)
    }

    /// Deregister a client and wait until it has been removed
    pub(crate) async fn disconnect(&self, client: SocketClient) -> ChannelResult<()> {
        let (removed, done) = oneshot::channel();
        self.command(ChannelCommand::Disconnect { client, removed })
            .await?;
        done.await.map_err(|_| ChannelError::ChannelClosed)
    }

    /// Hand an inbound payload to the event loop
    pub(crate) async fn deliver(&self, message: SocketMessage) -> ChannelResult<()> {
        self.command(ChannelCommand::Message(message)).await
    }

    async fn command(&self, command: ChannelCommand) -> ChannelResult<()> {
        self.inner
            .commands
            .send(command)
            .await
            .map_err(|_| ChannelError::ChannelClosed)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.inner.name)
            .finish()
    }
}

struct EventLoop {
    name: String,
    handler: Arc<dyn ChannelHandler>,
    clients: HashMap<ClientId, SocketClient>,
    commands: mpsc::Receiver<ChannelCommand>,
    requests: mpsc::UnboundedReceiver<ChannelRequest>,
}

impl EventLoop {
    async fn run(mut self) {
        info!(channel = %self.name, "Channel event loop started");

        loop {
            tokio::select! {
                Some(command) = self.commands.recv() => self.handle_command(command),
                Some(request) = self.requests.recv() => self.handle_request(request),
                else => break,
            }
        }

        debug!(channel = %self.name, "Channel event loop stopped");
    }

    fn handle_command(&mut self, command: ChannelCommand) {
        match command {
            ChannelCommand::Connect { client, registered } => {
                self.clients.insert(client.id(), client.clone());
                debug!(channel = %self.name, client = %client.id(), "Client registered");
                self.dispatch(&client, ChannelEvent::connect());
                let _ = registered.send(());
            }
            ChannelCommand::Disconnect { client, removed } => {
                if self.clients.contains_key(&client.id()) {
                    self.dispatch(&client, ChannelEvent::disconnect());
                    self.clients.remove(&client.id());
                    client.close_outbound();
                    for room in client.depart_rooms() {
                        room.remove(&client);
                    }
                    debug!(channel = %self.name, client = %client.id(), "Client deregistered");
                } else {
                    debug!(channel = %self.name, client = %client.id(), "Ignoring disconnect for unknown client");
                }
                let _ = removed.send(());
            }
            ChannelCommand::Message(SocketMessage { client, payload }) => {
                if self.clients.contains_key(&client.id()) {
                    self.dispatch(&client, ChannelEvent::message(payload));
                } else {
                    debug!(channel = %self.name, client = %client.id(), "Dropping message from unknown client");
                }
            }
        }
    }

    fn handle_request(&mut self, request: ChannelRequest) {
        match request {
            ChannelRequest::Broadcast(payload) => {
                for client in self.clients.values() {
                    if let Err(err) = client.send_raw(payload.clone()) {
                        debug!(channel = %self.name, client = %client.id(), error = %err, "Skipping broadcast to closed client");
                    }
                }
            }
            ChannelRequest::Members(reply) => {
                let _ = reply.send(self.clients.values().cloned().collect());
            }
        }
    }

    fn dispatch(&self, client: &SocketClient, event: ChannelEvent) {
        let kind = event.kind();
        let handler = &self.handler;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(client, event)));

        if let Err(panic) = outcome {
            error!(
                channel = %self.name,
                client = %client.id(),
                event = %kind,
                "Panic in channel handler: {}",
                panic_message(panic.as_ref())
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "Unknown panic".to_string()
    }
}

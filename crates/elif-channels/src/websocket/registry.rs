//! Channel registry: named channels and the paths they are served on

use super::channel::Channel;
use super::handler::ChannelHandler;
use super::server::channel_route;
use super::types::ClientState;
use crate::config::ChannelConfig;
use crate::errors::{ChannelError, ChannelResult};
use axum::Router;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
struct RegisteredChannel {
    path: String,
    channel: Channel,
}

/// Registry of channels keyed by name.
///
/// Cloning shares the registry. Channels registered here can be looked up
/// from anywhere, for example to broadcast from a request handler.
#[derive(Clone)]
pub struct ChannelRegistry {
    config: ChannelConfig,
    channels: Arc<RwLock<HashMap<String, RegisteredChannel>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::with_config(ChannelConfig::default())
    }

    /// Registry whose channels all use `config`
    pub fn with_config(config: ChannelConfig) -> Self {
        Self {
            config,
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Open a channel called `name` and serve it at `path`.
    ///
    /// Names and paths must be unique and paths must start with `/`. Opening
    /// spawns the channel's event loop, so this needs a Tokio runtime.
    pub fn register_channel<H: ChannelHandler>(
        &self,
        name: &str,
        path: &str,
        handler: H,
    ) -> ChannelResult<Channel> {
        if !path.starts_with('/') {
            return Err(ChannelError::InvalidPath {
                path: path.to_string(),
            });
        }

        let mut channels = self.channels.write();
        if channels.contains_key(name) {
            return Err(ChannelError::DuplicateChannel {
                name: name.to_string(),
            });
        }
        if channels.values().any(|registered| registered.path == path) {
            return Err(ChannelError::InvalidPath {
                path: path.to_string(),
            });
        }

        let channel = Channel::builder(name)
            .config(self.config.clone())
            .open(handler);
        channels.insert(
            name.to_string(),
            RegisteredChannel {
                path: path.to_string(),
                channel: channel.clone(),
            },
        );

        info!("Registered channel '{}' at {}", name, path);
        Ok(channel)
    }

    /// Look up a channel by name
    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.channels
            .read()
            .get(name)
            .map(|registered| registered.channel.clone())
    }

    /// Path a channel is served on
    pub fn path_of(&self, name: &str) -> Option<String> {
        self.channels
            .read()
            .get(name)
            .map(|registered| registered.path.clone())
    }

    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }

    /// Router with one upgrade route per registered channel
    pub fn router(&self) -> Router {
        self.channels
            .read()
            .values()
            .fold(Router::new(), |router, registered| {
                router.route(&registered.path, channel_route(registered.channel.clone()))
            })
    }

    /// Drop empty rooms in every channel
    pub fn prune_rooms(&self) -> usize {
        let pruned: usize = self
            .channels()
            .iter()
            .map(|channel| channel.prune_rooms())
            .sum();
        if pruned > 0 {
            debug!("Pruned {} empty rooms", pruned);
        }
        pruned
    }

    /// Close every connected client in every channel
    pub async fn close_all(&self) -> ChannelResult<usize> {
        let mut closed = 0;
        for channel in self.channels() {
            for client in channel.clients().await? {
                client.close();
                closed += 1;
            }
        }
        info!("Closed {} socket clients", closed);
        Ok(closed)
    }

    /// Aggregate client counts and traffic across channels
    pub async fn stats(&self) -> ChannelResult<RegistryStats> {
        let mut stats = RegistryStats::default();

        for channel in self.channels() {
            stats.channels += 1;
            stats.rooms += channel.rooms().len();

            for client in channel.clients().await? {
                stats.total_clients += 1;
                match client.state() {
                    ClientState::Connecting => stats.connecting_clients += 1,
                    ClientState::Open => stats.open_clients += 1,
                    ClientState::Closing | ClientState::Closed => stats.closing_clients += 1,
                }

                let client_stats = client.stats();
                stats.total_messages_sent += client_stats.messages_sent;
                stats.total_messages_received += client_stats.messages_received;
                stats.total_bytes_sent += client_stats.bytes_sent;
                stats.total_bytes_received += client_stats.bytes_received;
            }
        }

        Ok(stats)
    }

    fn channels(&self) -> Vec<Channel> {
        self.channels
            .read()
            .values()
            .map(|registered| registered.channel.clone())
            .collect()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub channels: usize,
    pub rooms: usize,
    pub total_clients: usize,
    pub connecting_clients: usize,
    pub open_clients: usize,
    pub closing_clients: usize,
    pub total_messages_sent: u64,
    pub total_messages_received: u64,
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
}

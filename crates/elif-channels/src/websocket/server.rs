//! HTTP upgrade glue and the channel server
//!
//! `upgrade_handler` is the axum handler behind every channel route: it
//! checks the origin, applies the channel's wire limits and starts a socket
//! client once the connection is upgraded.

use super::channel::Channel;
use super::client::{ClientInfo, SocketClient};
use super::registry::{ChannelRegistry, RegistryStats};
use crate::errors::{ChannelError, ChannelResult};
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use axum::Router;
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

/// GET route that upgrades requests onto `channel`
pub fn channel_route<S>(channel: Channel) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    get(upgrade_handler).with_state(channel)
}

/// Upgrade an HTTP request into a socket client of the routed channel
pub async fn upgrade_handler(
    State(channel): State<Channel>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    uri: Uri,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            error!(
                channel = %channel.name(),
                path = %uri.path(),
                "WebSocket upgrade failed: {}",
                rejection
            );
            return rejection.into_response();
        }
    };

    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    if !channel.config().origin_policy.allows(origin) {
        let err = ChannelError::OriginRejected {
            origin: origin.unwrap_or_default().to_string(),
        };
        warn!(channel = %channel.name(), code = err.error_code(), "{}", err);
        return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
    }

    let info = ClientInfo::from_request(&uri, &headers, connect_info.map(|ConnectInfo(addr)| addr));
    let config = channel.config().clone();
    let name = channel.name().to_string();

    upgrade
        .max_message_size(config.max_message_size)
        .write_buffer_size(config.write_buffer_size)
        .on_failed_upgrade(move |err| {
            error!(channel = %name, "WebSocket upgrade failed: {}", err);
        })
        .on_upgrade(move |socket| async move {
            if let Err(err) = SocketClient::start(&channel, socket, info).await {
                error!(channel = %channel.name(), "Failed to start socket client: {}", err);
            }
        })
}

/// Serves every channel of a registry and keeps their rooms tidy
pub struct ChannelServer {
    registry: ChannelRegistry,
    prune_handle: Option<JoinHandle<()>>,
}

impl ChannelServer {
    pub fn new(registry: ChannelRegistry) -> Self {
        Self {
            registry,
            prune_handle: None,
        }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Router serving every registered channel
    pub fn router(&self) -> Router {
        self.registry.router()
    }

    pub async fn stats(&self) -> ChannelResult<RegistryStats> {
        self.registry.stats().await
    }

    /// Serve the registry's channels on `listener` until the task is dropped
    pub async fn serve(&self, listener: TcpListener) -> io::Result<()> {
        info!("Serving channels on {}", listener.local_addr()?);
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
    }

    /// Periodically drop empty rooms from every channel
    pub fn start_room_pruning(&mut self, interval_seconds: u64) {
        if self.prune_handle.is_some() {
            debug!("Room pruning task already running");
            return;
        }

        let registry = self.registry.clone();
        let handle = tokio::spawn(async move {
            let mut prune_interval = interval(Duration::from_secs(interval_seconds));

            loop {
                prune_interval.tick().await;
                registry.prune_rooms();
            }
        });

        self.prune_handle = Some(handle);
        info!("Started room pruning task with {}s interval", interval_seconds);
    }

    pub fn stop_room_pruning(&mut self) {
        if let Some(handle) = self.prune_handle.take() {
            handle.abort();
            info!("Stopped room pruning task");
        }
    }
}

impl Drop for ChannelServer {
    fn drop(&mut self) {
        self.stop_room_pruning();
    }
}

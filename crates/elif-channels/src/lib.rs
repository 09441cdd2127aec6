//! # elif-channels
//!
//! Real-time publish/subscribe channels over WebSockets for the elif.rs web
//! framework.
//!
//! This crate provides:
//! - Channels that own a dynamic set of connected clients and dispatch their
//!   connect, message and disconnect events to a handler
//! - Named rooms for addressing a subset of a channel's clients
//! - Per-connection keepalive, write deadlines and outbound coalescing
//! - axum routes that upgrade HTTP requests onto a channel
//!
//! ```no_run
//! use elif_channels::{ChannelEvent, ChannelRegistry, SocketClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ChannelRegistry::new();
//! registry.register_channel("chat", "/chat", |client: &SocketClient, event: ChannelEvent| {
//!     if event.is_message() {
//!         let _ = client.channel().broadcast_raw(event.data());
//!     }
//! })?;
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, registry.router()).await?;
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod config;
pub mod errors;
pub mod logging;
pub mod testing;
pub mod websocket;

pub use config::{ChannelConfig, ConfigError, OriginPolicy};
pub use errors::{ChannelError, ChannelResult};
pub use logging::{init_logging, LoggingConfig};

// Re-export channel types
pub use websocket::{
    channel_route, BroadcastResult, Channel, ChannelBuilder, ChannelEvent, ChannelEventType,
    ChannelHandler, ChannelRegistry, ChannelRoom, ChannelServer, ClientId, ClientInfo, ClientState,
    ClientStats, CloseFrame, Frame, IdAllocator, RegistryStats, SequentialIds, SnowflakeIds,
    SocketClient, SocketMessage,
};

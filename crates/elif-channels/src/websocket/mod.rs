//! WebSocket channels for elif
//!
//! Clients connect by upgrading an HTTP request on a channel's route. Each
//! channel runs one event loop that registers clients, dispatches their
//! messages to the channel handler and fans broadcasts out to every member.

pub mod channel;
pub mod client;
pub mod handler;
pub mod ids;
pub mod registry;
pub mod server;
pub mod transport;
pub mod types;

// Re-export main types
pub use channel::{
    BroadcastResult, Channel, ChannelBuilder, ChannelEvent, ChannelEventType, ChannelRoom,
    SocketMessage,
};
pub use client::{ClientInfo, ClientStats, SocketClient};
pub use handler::ChannelHandler;
pub use ids::{IdAllocator, SequentialIds, SnowflakeIds};
pub use registry::{ChannelRegistry, RegistryStats};
pub use server::{channel_route, upgrade_handler, ChannelServer};
pub use transport::{FrameSink, FrameSource, Transport};
pub use types::{ClientId, ClientState, CloseFrame, Frame};

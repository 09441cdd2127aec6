//! Test utilities for channel handlers and servers

pub mod handler;
pub mod server;
pub mod transport;

pub use handler::RecordingHandler;
pub use server::TestServer;
pub use transport::{memory_transport, MemorySink, MemorySource, MemoryTransport, TestPeer};

use crate::errors::ChannelResult;
use crate::websocket::channel::Channel;
use crate::websocket::client::{ClientInfo, SocketClient};

/// Attach an in-memory client to `channel`
pub async fn connect_memory_client(channel: &Channel) -> ChannelResult<(SocketClient, TestPeer)> {
    let (transport, peer) = memory_transport();
    let client = SocketClient::start(channel, transport, ClientInfo::new("/memory")).await?;
    Ok((client, peer))
}

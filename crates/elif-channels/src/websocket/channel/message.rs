//! Messages flowing from clients into a channel's event loop

use crate::websocket::client::SocketClient;
use tokio::sync::oneshot;

/// One inbound payload tagged with the client that sent it
#[derive(Debug, Clone)]
pub struct SocketMessage {
    pub client: SocketClient,
    pub payload: Vec<u8>,
}

impl SocketMessage {
    pub fn new(client: SocketClient, payload: Vec<u8>) -> Self {
        Self { client, payload }
    }
}

/// Membership changes and inbound messages share one FIFO queue, so a
/// client's connect always precedes its messages and its messages always
/// precede its disconnect.
#[derive(Debug)]
pub(crate) enum ChannelCommand {
    Connect {
        client: SocketClient,
        registered: oneshot::Sender<()>,
    },
    Disconnect {
        client: SocketClient,
        removed: oneshot::Sender<()>,
    },
    Message(SocketMessage),
}

/// Requests made through a channel handle, including from inside handlers
#[derive(Debug)]
pub(crate) enum ChannelRequest {
    Broadcast(Vec<u8>),
    Members(oneshot::Sender<Vec<SocketClient>>),
}

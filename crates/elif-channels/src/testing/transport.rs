//! In-memory transport for driving socket clients without a network

use crate::errors::{ChannelError, ChannelResult};
use crate::websocket::transport::{FrameSink, FrameSource, Transport};
use crate::websocket::types::Frame;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;

/// Server side of an in-memory connection
pub struct MemoryTransport {
    sink: MemorySink,
    source: MemorySource,
}

pub struct MemorySink {
    outbound: mpsc::UnboundedSender<Frame>,
}

pub struct MemorySource {
    inbound: mpsc::UnboundedReceiver<ChannelResult<Frame>>,
}

/// Peer side of an in-memory connection, held by the test
pub struct TestPeer {
    inbound: Option<mpsc::UnboundedSender<ChannelResult<Frame>>>,
    outbound: mpsc::UnboundedReceiver<Frame>,
}

/// Create a connected transport and peer pair
pub fn memory_transport() -> (MemoryTransport, TestPeer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let transport = MemoryTransport {
        sink: MemorySink {
            outbound: outbound_tx,
        },
        source: MemorySource {
            inbound: inbound_rx,
        },
    };
    let peer = TestPeer {
        inbound: Some(inbound_tx),
        outbound: outbound_rx,
    };
    (transport, peer)
}

impl Transport for MemoryTransport {
    type Sink = MemorySink;
    type Source = MemorySource;

    fn split(self) -> (Self::Sink, Self::Source) {
        (self.sink, self.source)
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_frame(&mut self, frame: Frame) -> ChannelResult<()> {
        self.outbound
            .send(frame)
            .map_err(|_| ChannelError::ConnectionClosed)
    }
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_frame(&mut self) -> Option<ChannelResult<Frame>> {
        self.inbound.recv().await
    }
}

impl TestPeer {
    /// Deliver a frame to the server side. Returns `false` once hung up.
    pub fn send_frame(&self, frame: Frame) -> bool {
        self.inbound
            .as_ref()
            .map(|inbound| inbound.send(Ok(frame)).is_ok())
            .unwrap_or(false)
    }

    pub fn send_text(&self, text: &str) -> bool {
        self.send_frame(Frame::text(text))
    }

    pub fn send_close(&self, code: u16, reason: &str) -> bool {
        self.send_frame(Frame::close_with_reason(code, reason))
    }

    /// Make the server's next read fail with `error`
    pub fn fail(&self, error: ChannelError) -> bool {
        self.inbound
            .as_ref()
            .map(|inbound| inbound.send(Err(error)).is_ok())
            .unwrap_or(false)
    }

    /// End the inbound stream as if the peer went away
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Wait up to a second for the next frame written by the server
    pub async fn recv(&mut self) -> Option<Frame> {
        self.recv_timeout(Duration::from_secs(1)).await
    }

    pub async fn recv_timeout(&mut self, wait: Duration) -> Option<Frame> {
        time::timeout(wait, self.outbound.recv()).await.ok().flatten()
    }

    /// Next data frame as text, skipping control frames
    pub async fn recv_text(&mut self) -> Option<String> {
        loop {
            match self.recv().await? {
                Frame::Text(text) => return Some(text),
                Frame::Binary(data) => return String::from_utf8(data).ok(),
                Frame::Close(_) => return None,
                Frame::Ping(_) | Frame::Pong(_) => continue,
            }
        }
    }
}

//! Connection transport capability
//!
//! A transport is an upgraded, full-duplex frame connection that can be split
//! into a read half and a write half, one for each client task.

use super::types::Frame;
use crate::errors::{ChannelError, ChannelResult};
use async_trait::async_trait;
use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tokio_tungstenite::WebSocketStream;

/// Read half of a transport
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Wait for the next frame; `None` once the stream has ended
    async fn next_frame(&mut self) -> Option<ChannelResult<Frame>>;
}

/// Write half of a transport
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Write and flush one frame
    async fn send_frame(&mut self, frame: Frame) -> ChannelResult<()>;
}

/// An upgraded connection that can be split for concurrent reading and writing
pub trait Transport: Send + 'static {
    type Sink: FrameSink;
    type Source: FrameSource;

    fn split(self) -> (Self::Sink, Self::Source);
}

#[async_trait]
impl FrameSource for SplitStream<WebSocket> {
    async fn next_frame(&mut self) -> Option<ChannelResult<Frame>> {
        self.next()
            .await
            .map(|result| result.map(Frame::from).map_err(ChannelError::from))
    }
}

#[async_trait]
impl FrameSink for SplitSink<WebSocket, AxumMessage> {
    async fn send_frame(&mut self, frame: Frame) -> ChannelResult<()> {
        self.send(AxumMessage::from(frame)).await?;
        Ok(())
    }
}

impl Transport for WebSocket {
    type Sink = SplitSink<WebSocket, AxumMessage>;
    type Source = SplitStream<WebSocket>;

    fn split(self) -> (Self::Sink, Self::Source) {
        StreamExt::split(self)
    }
}

#[async_trait]
impl<S> FrameSource for SplitStream<WebSocketStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn next_frame(&mut self) -> Option<ChannelResult<Frame>> {
        self.next()
            .await
            .map(|result| result.map(Frame::from).map_err(ChannelError::from))
    }
}

#[async_trait]
impl<S> FrameSink for SplitSink<WebSocketStream<S>, TungsteniteMessage>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send_frame(&mut self, frame: Frame) -> ChannelResult<()> {
        self.send(TungsteniteMessage::from(frame)).await?;
        Ok(())
    }
}

impl<S> Transport for WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Sink = SplitSink<WebSocketStream<S>, TungsteniteMessage>;
    type Source = SplitStream<WebSocketStream<S>>;

    fn split(self) -> (Self::Sink, Self::Source) {
        StreamExt::split(self)
    }
}

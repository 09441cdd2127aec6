//! Socket clients: one upgraded connection attached to a channel
//!
//! Each client runs two tasks. The read task forwards inbound frames to the
//! channel's event loop and the write task drains the client's outbound queue
//! and keeps the connection alive with pings. When either task stops the
//! other follows, and the client is deregistered from its channel.

use super::channel::{Channel, ChannelRoom, SocketMessage};
use super::transport::{FrameSink, FrameSource, Transport};
use super::types::{ClientId, ClientState, Frame};
use crate::errors::{ChannelError, ChannelResult};
use axum::http::{header, HeaderMap, Uri};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, error, info, warn};

/// Request details captured when the connection was upgraded
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub path: String,
    pub query: Option<String>,
    pub remote_addr: Option<SocketAddr>,
    pub user_agent: Option<String>,
    pub origin: Option<String>,
    pub connected_at: DateTime<Utc>,
}

impl ClientInfo {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: None,
            remote_addr: None,
            user_agent: None,
            origin: None,
            connected_at: Utc::now(),
        }
    }

    /// Capture the parts of an upgrade request worth keeping
    pub fn from_request(uri: &Uri, headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> Self {
        let header_value = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };

        Self {
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            remote_addr,
            user_agent: header_value(header::USER_AGENT),
            origin: header_value(header::ORIGIN),
            connected_at: Utc::now(),
        }
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::new("/")
    }
}

/// Traffic counters for one client
#[derive(Debug, Clone, Default)]
pub struct ClientStats {
    /// Payloads written to the peer; coalesced payloads count individually
    pub messages_sent: u64,
    /// Data frames read from the peer
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub last_activity: Option<Instant>,
}

/// Handle to one connected peer.
///
/// Cloning is cheap and every clone refers to the same connection; equality
/// is by client id.
#[derive(Clone)]
pub struct SocketClient {
    inner: Arc<ClientInner>,
}

/// Rooms a client is in. `departed` is set once the channel has
/// disconnected the client, after which no room accepts it.
#[derive(Default)]
struct RoomMembership {
    rooms: Vec<ChannelRoom>,
    departed: bool,
}

struct ClientInner {
    id: ClientId,
    channel: Channel,
    info: ClientInfo,
    outbound: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rooms: Mutex<RoomMembership>,
    state: Mutex<ClientState>,
    stats: Mutex<ClientStats>,
    live_tasks: AtomicUsize,
}

impl SocketClient {
    /// Create a client that is not yet registered with its channel, along with
    /// the receiving end of its outbound queue
    pub(crate) fn new(
        channel: &Channel,
        info: ClientInfo,
    ) -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let client = Self {
            inner: Arc::new(ClientInner {
                id: channel.next_client_id(),
                channel: channel.clone(),
                info,
                outbound: Mutex::new(Some(sender)),
                rooms: Mutex::new(RoomMembership::default()),
                state: Mutex::new(ClientState::Connecting),
                stats: Mutex::new(ClientStats::default()),
                live_tasks: AtomicUsize::new(0),
            }),
        };
        (client, receiver)
    }

    /// Register a client for an upgraded connection and start its tasks.
    ///
    /// Returns once the channel has processed the connect event, so the
    /// handler has seen the client before any of its frames are read.
    pub async fn start<T: Transport>(
        channel: &Channel,
        transport: T,
        info: ClientInfo,
    ) -> ChannelResult<SocketClient> {
        let (client, outbound) = Self::new(channel, info);
        let (sink, source) = transport.split();

        channel.connect(client.clone()).await?;
        // The connect handler may already have closed the client
        client.open_if_connecting();

        let (writer_done, writer_gone) = oneshot::channel();
        client.inner.live_tasks.store(2, Ordering::SeqCst);
        tokio::spawn(write_loop(client.clone(), sink, outbound, writer_done));
        tokio::spawn(read_loop(client.clone(), source, writer_gone));

        info!(
            channel = %channel.name(),
            client = %client.id(),
            remote_addr = ?client.inner.info.remote_addr,
            "Socket client connected"
        );
        Ok(client)
    }

    /// Perform the WebSocket handshake on a raw stream, then start the client
    pub async fn accept<S>(
        channel: &Channel,
        stream: S,
        info: ClientInfo,
    ) -> ChannelResult<SocketClient>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let config = channel.config();
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(config.max_message_size);
        ws_config.write_buffer_size = config.write_buffer_size;

        let socket = tokio_tungstenite::accept_async_with_config(stream, Some(ws_config))
            .await
            .map_err(|err| {
                error!(channel = %channel.name(), error = %err, "WebSocket handshake failed");
                ChannelError::upgrade_failed(err.to_string())
            })?;

        Self::start(channel, socket, info).await
    }

    pub fn id(&self) -> ClientId {
        self.inner.id
    }

    /// The channel this client belongs to
    pub fn channel(&self) -> &Channel {
        &self.inner.channel
    }

    pub fn info(&self) -> &ClientInfo {
        &self.inner.info
    }

    pub fn state(&self) -> ClientState {
        *self.inner.state.lock()
    }

    pub fn stats(&self) -> ClientStats {
        self.inner.stats.lock().clone()
    }

    /// Rooms this client currently belongs to
    pub fn rooms(&self) -> Vec<ChannelRoom> {
        self.inner.rooms.lock().rooms.clone()
    }

    /// Serialize `value` as JSON and queue it for delivery
    pub fn send<T: Serialize + ?Sized>(&self, value: &T) -> ChannelResult<()> {
        let payload = serde_json::to_vec(value).map_err(|err| {
            error!(client = %self.inner.id, error = %err, "Failed to serialize outbound message");
            err
        })?;
        self.send_raw(payload)
    }

    /// Queue raw bytes for delivery.
    ///
    /// Never blocks. Fails with `ClientClosed` once the client has been
    /// closed or deregistered.
    pub fn send_raw(&self, payload: impl Into<Vec<u8>>) -> ChannelResult<()> {
        let outbound = self.inner.outbound.lock();
        let sender = outbound.as_ref().ok_or(ChannelError::ClientClosed)?;
        sender
            .send(payload.into())
            .map_err(|_| ChannelError::ClientClosed)
    }

    /// Queue a string for delivery
    pub fn send_string(&self, text: impl Into<String>) -> ChannelResult<()> {
        self.send_raw(text.into().into_bytes())
    }

    /// Close the outbound queue.
    ///
    /// Payloads already queued are still written, then the peer is sent a
    /// close frame and the client is deregistered. Closing twice is a no-op.
    pub fn close(&self) {
        if self.close_outbound() {
            self.begin_closing();
            debug!(client = %self.inner.id, "Socket client closed locally");
        }
    }

    pub(crate) fn close_outbound(&self) -> bool {
        self.inner.outbound.lock().take().is_some()
    }

    /// Record membership of `room`. Fails once the client has departed.
    pub(crate) fn joined_room(&self, room: ChannelRoom) -> bool {
        let mut membership = self.inner.rooms.lock();
        if membership.departed {
            return false;
        }
        membership.rooms.push(room);
        true
    }

    pub(crate) fn left_room(&self, room: &ChannelRoom) {
        let mut membership = self.inner.rooms.lock();
        if let Some(index) = membership.rooms.iter().position(|member| member.ptr_eq(room)) {
            membership.rooms.swap_remove(index);
        }
    }

    /// Mark the client as departed and hand back the rooms it was in
    pub(crate) fn depart_rooms(&self) -> Vec<ChannelRoom> {
        let mut membership = self.inner.rooms.lock();
        membership.departed = true;
        std::mem::take(&mut membership.rooms)
    }

    fn set_state(&self, state: ClientState) {
        *self.inner.state.lock() = state;
    }

    fn open_if_connecting(&self) {
        let mut state = self.inner.state.lock();
        if *state == ClientState::Connecting {
            *state = ClientState::Open;
        }
    }

    fn begin_closing(&self) {
        let mut state = self.inner.state.lock();
        if !state.is_closed() {
            *state = ClientState::Closing;
        }
    }

    fn task_exited(&self) {
        if self.inner.live_tasks.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.set_state(ClientState::Closed);
            debug!(client = %self.inner.id, "Socket client tasks finished");
        }
    }

    fn record_received(&self, bytes: usize) {
        let mut stats = self.inner.stats.lock();
        stats.messages_received += 1;
        stats.bytes_received += bytes as u64;
        stats.last_activity = Some(Instant::now());
    }

    fn record_sent(&self, messages: usize, bytes: usize) {
        let mut stats = self.inner.stats.lock();
        stats.messages_sent += messages as u64;
        stats.bytes_sent += bytes as u64;
        stats.last_activity = Some(Instant::now());
    }

    fn touch(&self) {
        self.inner.stats.lock().last_activity = Some(Instant::now());
    }
}

impl PartialEq for SocketClient {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for SocketClient {}

impl std::hash::Hash for SocketClient {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for SocketClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketClient")
            .field("id", &self.inner.id)
            .field("channel", &self.inner.channel.name())
            .field("path", &self.inner.info.path)
            .finish()
    }
}

/// Replace newlines with spaces and trim surrounding whitespace
pub(crate) fn normalize_payload(mut payload: Vec<u8>) -> Vec<u8> {
    for byte in payload.iter_mut() {
        if *byte == b'\n' {
            *byte = b' ';
        }
    }

    let start = payload
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .unwrap_or(payload.len());
    let end = payload
        .iter()
        .rposition(|byte| !byte.is_ascii_whitespace())
        .map_or(start, |index| index + 1);

    payload.truncate(end);
    payload.drain(..start);
    payload
}

/// Join everything already queued behind `first` into one newline-separated
/// payload. Reports how many payloads went in and whether the queue has been
/// closed.
pub(crate) fn coalesce(
    first: Vec<u8>,
    outbound: &mut mpsc::UnboundedReceiver<Vec<u8>>,
) -> (Vec<u8>, usize, bool) {
    let mut batch = first;
    let mut count = 1;

    loop {
        match outbound.try_recv() {
            Ok(next) => {
                batch.push(b'\n');
                batch.extend_from_slice(&next);
                count += 1;
            }
            Err(TryRecvError::Empty) => return (batch, count, false),
            Err(TryRecvError::Disconnected) => return (batch, count, true),
        }
    }
}

async fn write_with_deadline<W: FrameSink>(
    sink: &mut W,
    frame: Frame,
    wait: Duration,
) -> ChannelResult<()> {
    match time::timeout(wait, sink.send_frame(frame)).await {
        Ok(result) => result,
        Err(_) => Err(ChannelError::transport(format!(
            "write did not complete within {:?}",
            wait
        ))),
    }
}

async fn write_loop<W: FrameSink>(
    client: SocketClient,
    mut sink: W,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    _writer_done: oneshot::Sender<()>,
) {
    let config = client.channel().config();
    let write_wait = config.write_wait();
    let ping_period = config.ping_period();

    let mut ping = time::interval_at(time::Instant::now() + ping_period, ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            next = outbound.recv() => {
                let Some(first) = next else {
                    let _ = write_with_deadline(&mut sink, Frame::close(), write_wait).await;
                    break;
                };

                let (batch, count, closed) = coalesce(first, &mut outbound);
                let bytes = batch.len();
                if let Err(err) = write_with_deadline(&mut sink, Frame::from_payload(batch), write_wait).await {
                    debug!(client = %client.id(), error = %err, "Write failed, dropping connection");
                    break;
                }
                client.record_sent(count, bytes);

                if closed {
                    let _ = write_with_deadline(&mut sink, Frame::close(), write_wait).await;
                    break;
                }
            }
            _ = ping.tick() => {
                if let Err(err) = write_with_deadline(&mut sink, Frame::Ping(Vec::new()), write_wait).await {
                    debug!(client = %client.id(), error = %err, "Ping failed, dropping connection");
                    break;
                }
            }
        }
    }

    client.begin_closing();
    client.task_exited();
}

async fn read_loop<R: FrameSource>(
    client: SocketClient,
    mut source: R,
    mut writer_gone: oneshot::Receiver<()>,
) {
    let config = client.channel().config();
    let pong_wait = config.pong_wait();
    let limit = config.max_message_size;

    loop {
        let next = tokio::select! {
            _ = &mut writer_gone => {
                debug!(client = %client.id(), "Writer stopped, dropping connection");
                break;
            }
            next = time::timeout(pong_wait, source.next_frame()) => next,
        };

        let frame = match next {
            Err(_) => {
                warn!(client = %client.id(), "No frames from peer within {:?}, dropping connection", pong_wait);
                break;
            }
            Ok(None) => {
                debug!(client = %client.id(), "Peer stream ended");
                break;
            }
            Ok(Some(Err(err))) => {
                report_read_error(&client, &err);
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        client.touch();
        let payload = match frame {
            Frame::Ping(_) | Frame::Pong(_) => continue,
            Frame::Close(close) => {
                let (code, reason) = close
                    .map(|frame| (frame.code, frame.reason))
                    .unwrap_or((1005, String::new()));
                report_read_error(&client, &ChannelError::ClosedByPeer { code, reason });
                break;
            }
            Frame::Text(text) => text.into_bytes(),
            Frame::Binary(data) => data,
        };

        if payload.len() > limit {
            let err = ChannelError::FrameTooLarge {
                size: payload.len(),
                limit,
            };
            report_read_error(&client, &err);
            break;
        }

        client.record_received(payload.len());
        let payload = normalize_payload(payload);
        if payload.is_empty() {
            continue;
        }

        if let Err(err) = client
            .channel()
            .deliver(SocketMessage::new(client.clone(), payload))
            .await
        {
            debug!(client = %client.id(), error = %err, "Channel stopped accepting messages");
            break;
        }
    }

    client.begin_closing();
    if let Err(err) = client.channel().disconnect(client.clone()).await {
        debug!(client = %client.id(), error = %err, "Channel gone before disconnect");
    }
    client.task_exited();

    info!(channel = %client.channel().name(), client = %client.id(), "Socket client disconnected");
}

fn report_read_error(client: &SocketClient, err: &ChannelError) {
    if err.is_expected_close() {
        debug!(client = %client.id(), reason = %err, "Connection closed");
    } else {
        error!(client = %client.id(), error = %err, "Unexpected connection error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_payload() {
        assert_eq!(normalize_payload(b"  hello\nworld \n".to_vec()), b"hello world");
        assert_eq!(normalize_payload(b"plain".to_vec()), b"plain");
        assert!(normalize_payload(b" \n\t ".to_vec()).is_empty());
        assert!(normalize_payload(Vec::new()).is_empty());
    }

    #[test]
    fn test_coalesce_drains_queue() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        sender.send(b"two".to_vec()).unwrap();
        sender.send(b"three".to_vec()).unwrap();

        let (batch, count, closed) = coalesce(b"one".to_vec(), &mut receiver);
        assert_eq!(batch, b"one\ntwo\nthree");
        assert_eq!(count, 3);
        assert!(!closed);

        sender.send(b"last".to_vec()).unwrap();
        drop(sender);
        let (batch, count, closed) = coalesce(b"first".to_vec(), &mut receiver);
        assert_eq!(batch, b"first\nlast");
        assert_eq!(count, 2);
        assert!(closed);
    }

    #[test]
    fn test_client_info_from_request() {
        let uri: Uri = "/chat?room=lobby".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, "test-agent".parse().unwrap());
        headers.insert(header::ORIGIN, "https://app.example".parse().unwrap());
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();

        let info = ClientInfo::from_request(&uri, &headers, Some(addr));

        assert_eq!(info.path, "/chat");
        assert_eq!(info.query.as_deref(), Some("room=lobby"));
        assert_eq!(info.user_agent.as_deref(), Some("test-agent"));
        assert_eq!(info.origin.as_deref(), Some("https://app.example"));
        assert_eq!(info.remote_addr, Some(addr));
    }
}

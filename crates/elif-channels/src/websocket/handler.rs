//! Channel handler trait

use super::channel::ChannelEvent;
use super::client::SocketClient;

/// Application callback invoked by a channel's event loop.
///
/// Calls for one channel are serialized: the handler never runs concurrently
/// with itself for the same channel, so it may keep per-channel state behind
/// a plain lock without contention. It runs inside the event loop, so it must
/// not block; queueing sends and touching rooms is fine.
///
/// Closures with the matching signature are handlers:
///
/// ```no_run
/// use elif_channels::{Channel, ChannelEvent, SocketClient};
///
/// # async fn demo() {
/// let channel = Channel::open("echo", |client: &SocketClient, event: ChannelEvent| {
///     if event.is_message() {
///         let _ = client.send_raw(event.data());
///     }
/// });
/// # }
/// ```
pub trait ChannelHandler: Send + Sync + 'static {
    fn handle(&self, client: &SocketClient, event: ChannelEvent);
}

impl<F> ChannelHandler for F
where
    F: Fn(&SocketClient, ChannelEvent) + Send + Sync + 'static,
{
    fn handle(&self, client: &SocketClient, event: ChannelEvent) {
        self(client, event)
    }
}

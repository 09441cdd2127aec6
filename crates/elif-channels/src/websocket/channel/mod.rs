//! Channels, rooms and the events handlers receive

pub mod channel;
pub mod events;
pub mod message;
pub mod room;


pub use channel::{Channel, ChannelBuilder};
pub use events::{ChannelEvent, ChannelEventType};
pub use message::SocketMessage;
pub use room::{BroadcastResult, ChannelRoom};

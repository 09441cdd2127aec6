//! Default configuration values

pub struct ChannelDefaults;

impl ChannelDefaults {
    pub const MAX_MESSAGE_SIZE: usize = 512;
    pub const PONG_WAIT_SECS: u64 = 60;
    pub const WRITE_WAIT_SECS: u64 = 10;
    pub const WRITE_BUFFER_SIZE: usize = 1024;
    pub const EVENT_QUEUE_CAPACITY: usize = 32;
}

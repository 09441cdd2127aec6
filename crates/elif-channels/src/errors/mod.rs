pub mod channel_error;

pub use channel_error::*;

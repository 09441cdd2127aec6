pub mod channel_config;
pub mod defaults;
pub mod error;
pub mod origin;

pub use channel_config::*;
pub use defaults::*;
pub use error::*;
pub use origin::*;

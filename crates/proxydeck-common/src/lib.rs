pub mod errors;
pub mod id;
pub mod protocol;
pub mod types;

pub use errors::{ConfigError, ProbeError, ProxydeckError, TerminalError};
pub use id::{new_id, SessionId};
pub use protocol::{ClientMessage, ServerMessage};
pub use types::TermSize;

pub type Result<T> = std::result::Result<T, ProxydeckError>;

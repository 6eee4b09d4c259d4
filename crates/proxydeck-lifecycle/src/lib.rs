//! Client side of the terminal bridge and the proxy connection lifecycle.
//!
//! - [`transport`]: WebSocket client for the bridge server
//! - [`controller`]: mount/visibility/banner handling and the connection status
//! - [`health`]: HTTP probe of the running proxy
//! - [`registry`]: ownership of a proxy process started directly

pub mod banner;
pub mod controller;
pub mod health;
pub mod registry;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use banner::BannerWatcher;
pub use controller::{ConnectionStatus, LifecycleController, LifecycleTimings, ProbeTrigger};
pub use health::{HealthProbe, HealthStatus};
pub use registry::ProxyRegistry;
pub use transport::{TerminalClient, TerminalEvent};

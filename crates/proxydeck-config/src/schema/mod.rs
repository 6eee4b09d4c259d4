//! Configuration schema types for proxydeck.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod automation;
mod logging;
mod proxy;
mod server;
mod shell;

pub use automation::*;
pub use logging::*;
pub use proxy::*;
pub use server::*;
pub use shell::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxydeckConfig {
    pub server: ServerConfig,
    pub shell: ShellConfig,
    pub proxy: ProxyConfig,
    pub automation: AutomationConfig,
    pub logging: LoggingConfig,
}

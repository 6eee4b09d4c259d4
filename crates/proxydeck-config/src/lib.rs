//! Proxydeck configuration.
//!
//! TOML-based configuration for the terminal bridge, the managed proxy
//! and the account wizard driver. Every section has defaults so partial
//! files work out of the box.
//!
//! ```rust,no_run
//! use proxydeck_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    AutomationConfig, LogLevel, LoggingConfig, ProxyConfig, ProxydeckConfig, ServerConfig,
    ShellConfig, CONFIG_SCHEMA_VERSION,
};

use proxydeck_common::ConfigError;
use std::path::Path;

/// Load config from the platform default path, creating it if missing,
/// and validate the result.
pub fn load_config() -> Result<ProxydeckConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Load and validate config from an explicit path.
pub fn load_config_from(path: &Path) -> Result<ProxydeckConfig, ConfigError> {
    let config = toml_loader::load_from_path(path)?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &ProxydeckConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}

//! Full configuration validation.
//!
//! Checks numeric ranges and required strings, collecting every problem
//! into a single `ConfigError`.

mod helpers;


use crate::schema::ProxydeckConfig;
use helpers::{validate_non_empty, validate_range};
use proxydeck_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &ProxydeckConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_non_empty(&mut errors, "server.host", &config.server.host);
    validate_range(&mut errors, "server.port", config.server.port, 1, u16::MAX);
    validate_range(
        &mut errors,
        "server.handshake_timeout_secs",
        config.server.handshake_timeout_secs,
        1,
        300,
    );

    validate_range(&mut errors, "shell.cols", config.shell.cols, 1, 1000);
    validate_range(&mut errors, "shell.rows", config.shell.rows, 1, 1000);
    validate_non_empty(&mut errors, "shell.term", &config.shell.term);

    validate_non_empty(&mut errors, "proxy.command", &config.proxy.command);
    validate_range(&mut errors, "proxy.port", config.proxy.port, 1, u16::MAX);
    validate_range(
        &mut errors,
        "proxy.probe_timeout_ms",
        config.proxy.probe_timeout_ms,
        100,
        60_000,
    );
    if config.proxy.startup_banners.iter().any(|b| b.is_empty()) {
        errors.push("proxy.startup_banners must not contain empty strings".into());
    }

    let automation = &config.automation;
    validate_range(
        &mut errors,
        "automation.poll_interval_ms",
        automation.poll_interval_ms,
        100,
        60_000,
    );
    validate_range(
        &mut errors,
        "automation.add_timeout_secs",
        automation.add_timeout_secs,
        1,
        3600,
    );
    validate_range(
        &mut errors,
        "automation.remove_timeout_secs",
        automation.remove_timeout_secs,
        1,
        3600,
    );
    validate_range(
        &mut errors,
        "automation.interrupt_delay_ms",
        automation.interrupt_delay_ms,
        0,
        10_000,
    );
    validate_range(
        &mut errors,
        "automation.roster_timeout_secs",
        automation.roster_timeout_secs,
        1,
        120,
    );
    validate_range(
        &mut errors,
        "automation.tail_capacity",
        automation.tail_capacity,
        256,
        1 << 20,
    );
    if automation.poll_interval() >= automation.remove_timeout() {
        errors.push(format!(
            "automation.poll_interval_ms = {} must be shorter than remove_timeout_secs",
            automation.poll_interval_ms
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

//! One-shot subcommands.

use proxydeck_automation::{CommandRoster, RosterSource};
use proxydeck_common::{ProxydeckError, Result};
use proxydeck_config::ProxydeckConfig;
use proxydeck_lifecycle::HealthProbe;

/// Probe the proxy and render the result as pretty JSON.
pub async fn status(config: &ProxydeckConfig, limits: bool) -> Result<String> {
    let probe = HealthProbe::from_config(&config.proxy);
    let health = probe.check().await?;

    let mut report = serde_json::json!({
        "url": probe.base_url(),
        "alive": health.alive,
        "models": health.models,
    });
    if limits {
        report["limits"] = match probe.account_limits().await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "account limits unavailable");
                serde_json::Value::Null
            }
        };
    }
    serde_json::to_string_pretty(&report).map_err(|e| ProxydeckError::Other(e.to_string()))
}

/// Render the account roster, numbered the way the wizard numbers it.
pub async fn accounts(config: &ProxydeckConfig) -> Result<String> {
    let roster = CommandRoster::new(
        config.proxy.command.clone(),
        config.automation.roster_timeout(),
    );
    let accounts = roster
        .query_roster()
        .await
        .map_err(|e| ProxydeckError::Other(e.to_string()))?;
    if accounts.is_empty() {
        return Ok("no accounts".into());
    }
    Ok(numbered(&accounts).join("\n"))
}

fn numbered(accounts: &[String]) -> Vec<String> {
    accounts
        .iter()
        .enumerate()
        .map(|(i, account)| format!("{:>3}. {account}", i + 1))
        .collect()
}

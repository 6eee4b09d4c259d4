//! HTTP health probe for the running proxy.

use std::time::Duration;

use proxydeck_common::ProbeError;
use proxydeck_config::ProxyConfig;
use serde::Serialize;
use tracing::debug;

/// Result of a successful probe.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct HealthStatus {
    pub alive: bool,
    /// Model identifiers served by the proxy, in the order it lists them.
    pub models: Vec<String>,
}

/// Probes `/health` and `/v1/models` on the proxy.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl HealthProbe {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http,
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(
            config.base_url(),
            config.api_key.clone(),
            Duration::from_millis(config.probe_timeout_ms),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, ProbeError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ProbeError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::BadStatus(status.as_u16()));
        }
        Ok(response)
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, ProbeError> {
        self.get(path)
            .await?
            .json()
            .await
            .map_err(|e| ProbeError::Malformed(e.to_string()))
    }

    /// Check liveness, then list the models.
    pub async fn check(&self) -> Result<HealthStatus, ProbeError> {
        self.get("/health").await?;
        let models = parse_models(&self.get_json("/v1/models").await?)?;
        debug!(models = models.len(), "proxy healthy");
        Ok(HealthStatus {
            alive: true,
            models,
        })
    }

    /// Per-account quota information as reported by the proxy.
    pub async fn account_limits(&self) -> Result<serde_json::Value, ProbeError> {
        self.get_json("/account-limits").await
    }
}

/// Extract `data[].id` from an OpenAI-style model list.
fn parse_models(body: &serde_json::Value) -> Result<Vec<String>, ProbeError> {
    let data = body
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| ProbeError::Malformed("model list has no `data` array".into()))?;
    Ok(data
        .iter()
        .filter_map(|m| m.get("id").and_then(|id| id.as_str()))
        .map(str::to_string)
        .collect())
}

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and text heuristics for the account wizard driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub poll_interval_ms: u64,
    pub add_timeout_secs: u64,
    pub remove_timeout_secs: u64,
    /// Pause between answering "no" and sending the interrupt byte.
    pub interrupt_delay_ms: u64,
    /// Upper bound for one `accounts list` invocation.
    pub roster_timeout_secs: u64,
    /// Bytes of recent terminal output kept for pattern matching.
    pub tail_capacity: usize,
    /// Printed by the wizard once a login completes.
    pub success_banner: String,
    /// Printed by the wizard when it asks whether to repeat.
    pub repeat_prompt: String,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            add_timeout_secs: 180,
            remove_timeout_secs: 30,
            interrupt_delay_ms: 500,
            roster_timeout_secs: 10,
            tail_capacity: 2000,
            success_banner: "Successfully authenticated".into(),
            repeat_prompt: "another account".into(),
        }
    }
}

impl AutomationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn add_timeout(&self) -> Duration {
        Duration::from_secs(self.add_timeout_secs)
    }

    pub fn remove_timeout(&self) -> Duration {
        Duration::from_secs(self.remove_timeout_secs)
    }

    pub fn interrupt_delay(&self) -> Duration {
        Duration::from_millis(self.interrupt_delay_ms)
    }

    pub fn roster_timeout(&self) -> Duration {
        Duration::from_secs(self.roster_timeout_secs)
    }
}

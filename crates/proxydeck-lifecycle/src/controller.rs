//! Connection lifecycle: mounting the terminal, detecting the proxy coming
//! up, and tracking whether it answers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proxydeck_automation::INTERRUPT;
use proxydeck_common::{ProbeError, ProxydeckError, TermSize};
use proxydeck_config::{AutomationConfig, ProxyConfig};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::banner::BannerWatcher;
use crate::health::HealthProbe;
use crate::registry::ProxyRegistry;
use crate::transport::TerminalClient;

// =============================================================================
// STATUS & TIMINGS
// =============================================================================

/// What the controller currently believes about the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Checking,
    Connected { models: Vec<String> },
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected { .. })
    }
}

/// Delays between the lifecycle steps.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleTimings {
    /// Mount to typing the auto-start command.
    pub auto_start_delay: Duration,
    /// Mount to typing the initial command.
    pub initial_command_delay: Duration,
    /// Banner seen to first probe.
    pub probe_delay: Duration,
    /// Failed probe to the single retry.
    pub retry_delay: Duration,
    /// Interrupt to retyping the start command on restart.
    pub interrupt_delay: Duration,
}

impl Default for LifecycleTimings {
    fn default() -> Self {
        Self {
            auto_start_delay: Duration::from_millis(500),
            initial_command_delay: Duration::from_secs(1),
            probe_delay: Duration::from_millis(500),
            retry_delay: Duration::from_secs(1),
            interrupt_delay: Duration::from_millis(500),
        }
    }
}

/// Returned by [`LifecycleController::observe_output`] when a startup banner
/// was seen. Hand it to [`LifecycleController::run_trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTrigger {
    pub delay: Duration,
}

// =============================================================================
// CONTROLLER
// =============================================================================

pub struct LifecycleController {
    proxy: ProxyConfig,
    timings: LifecycleTimings,
    probe: HealthProbe,
    registry: ProxyRegistry,
    status: watch::Sender<ConnectionStatus>,
    banners: Mutex<BannerWatcher>,
    auto_started: AtomicBool,
    initial_sent: AtomicBool,
    client: Mutex<Option<Arc<TerminalClient>>>,
    size: Mutex<TermSize>,
}

impl LifecycleController {
    pub fn new(proxy: ProxyConfig, tail_capacity: usize, timings: LifecycleTimings) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            probe: HealthProbe::from_config(&proxy),
            registry: ProxyRegistry::from_config(&proxy),
            banners: Mutex::new(BannerWatcher::new(
                proxy.startup_banners.clone(),
                tail_capacity,
            )),
            proxy,
            timings,
            status,
            auto_started: AtomicBool::new(false),
            initial_sent: AtomicBool::new(false),
            client: Mutex::new(None),
            size: Mutex::new(TermSize::default()),
        }
    }

    pub fn from_config(proxy: &ProxyConfig, automation: &AutomationConfig) -> Self {
        let timings = LifecycleTimings {
            interrupt_delay: automation.interrupt_delay(),
            ..LifecycleTimings::default()
        };
        Self::new(proxy.clone(), automation.tail_capacity, timings)
    }

    /// Command line that starts the proxy on the configured port.
    pub fn start_command(&self) -> String {
        if cfg!(windows) {
            format!("$env:PORT={}; {} start", self.proxy.port, self.proxy.command)
        } else {
            format!("PORT={} {} start", self.proxy.port, self.proxy.command)
        }
    }

    pub fn client(&self) -> Option<Arc<TerminalClient>> {
        self.client.lock().ok().and_then(|c| c.clone())
    }

    fn require_client(&self) -> Result<Arc<TerminalClient>, ProxydeckError> {
        self.client()
            .ok_or_else(|| ProxydeckError::Transport("terminal not mounted".into()))
    }

    pub fn size(&self) -> TermSize {
        self.size.lock().map(|s| *s).unwrap_or_default()
    }

    // -------------------------------------------------------------------------
    // Terminal
    // -------------------------------------------------------------------------

    /// Connect to the bridge, start the shell and send the current size.
    ///
    /// The auto-start command and the initial command are typed at most
    /// once per controller, however many times it is mounted.
    pub async fn mount(&self, url: &str) -> Result<Arc<TerminalClient>, ProxydeckError> {
        let client = Arc::new(TerminalClient::connect(url).await?);
        client.start()?;
        client.resize(self.size())?;

        if let Ok(mut slot) = self.client.lock() {
            if let Some(previous) = slot.replace(Arc::clone(&client)) {
                previous.close();
            }
        }

        if self.proxy.auto_start && !self.auto_started.swap(true, Ordering::SeqCst) {
            let command = self.start_command();
            info!(command = %command, "auto-starting proxy in terminal");
            spawn_typed(&client, self.timings.auto_start_delay, command);
        }

        if let Some(command) = self.proxy.initial_command.clone() {
            if !self.initial_sent.swap(true, Ordering::SeqCst) {
                info!(command = %command, "running initial command");
                spawn_typed(&client, self.timings.initial_command_delay, command);
            }
        }

        Ok(client)
    }

    /// Close the current connection. The server kills the shell.
    pub fn unmount(&self) {
        let previous = self.client.lock().ok().and_then(|mut slot| slot.take());
        if let Some(client) = previous {
            client.close();
        }
    }

    /// Record the new size and propagate it when the view becomes visible.
    /// Hiding the view leaves the session alone.
    pub fn on_visibility_change(&self, visible: bool, size: TermSize) -> Result<(), ProxydeckError> {
        if !visible || size.is_empty() {
            return Ok(());
        }
        if let Ok(mut current) = self.size.lock() {
            *current = size;
        }
        match self.client() {
            Some(client) => client.resize(size),
            None => Ok(()),
        }
    }

    /// Feed terminal output. Returns a trigger when the proxy just announced
    /// it is listening.
    pub fn observe_output(&self, chunk: &[u8]) -> Option<ProbeTrigger> {
        let connected = self.status.borrow().is_connected();
        let fired = self
            .banners
            .lock()
            .map(|mut banners| banners.observe(chunk, connected))
            .unwrap_or(false);
        fired.then_some(ProbeTrigger {
            delay: self.timings.probe_delay,
        })
    }

    /// Wait out the trigger's delay, then probe.
    pub async fn run_trigger(&self, trigger: ProbeTrigger) -> ConnectionStatus {
        tokio::time::sleep(trigger.delay).await;
        self.check_proxy().await
    }

    /// Forget buffered output and re-arm banner detection.
    pub fn clear_output(&self) {
        if let Ok(mut banners) = self.banners.lock() {
            banners.clear();
        }
    }

    /// Interrupt whatever runs in the shell and start the proxy again.
    pub async fn restart_proxy_in_terminal(&self) -> Result<(), ProxydeckError> {
        let client = self.require_client()?;
        self.clear_output();
        self.status.send_replace(ConnectionStatus::Disconnected);

        client.send_bytes(INTERRUPT)?;
        tokio::time::sleep(self.timings.interrupt_delay).await;
        client.run_command(&self.start_command())?;
        info!("proxy restarted in terminal");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Health
    // -------------------------------------------------------------------------

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Probe the proxy, retrying once, and publish the result.
    pub async fn check_proxy(&self) -> ConnectionStatus {
        self.status.send_replace(ConnectionStatus::Checking);

        let result = match self.probe.check().await {
            Ok(health) => Ok(health),
            Err(e) => {
                debug!(error = %e, "proxy probe failed, retrying");
                tokio::time::sleep(self.timings.retry_delay).await;
                self.probe.check().await
            }
        };

        let status = match result {
            Ok(health) => {
                info!(models = health.models.len(), "proxy connected");
                ConnectionStatus::Connected {
                    models: health.models,
                }
            }
            Err(e) => {
                warn!(error = %e, url = %self.probe.base_url(), "proxy not reachable");
                ConnectionStatus::Disconnected
            }
        };

        self.status.send_replace(status.clone());
        if let Ok(mut banners) = self.banners.lock() {
            banners.release();
        }
        status
    }

    /// Probe every `interval` in the background. Failures only update the
    /// published status.
    pub fn spawn_health_cycle(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let status = match controller.probe.check().await {
                    Ok(health) => ConnectionStatus::Connected {
                        models: health.models,
                    },
                    Err(e) => {
                        debug!(error = %e, "periodic proxy probe failed");
                        ConnectionStatus::Disconnected
                    }
                };
                controller.status.send_if_modified(|current| {
                    if *current == status {
                        return false;
                    }
                    *current = status;
                    true
                });
            }
        })
    }

    pub async fn account_limits(&self) -> Result<serde_json::Value, ProbeError> {
        self.probe.account_limits().await
    }

    // -------------------------------------------------------------------------
    // Directly owned proxy process
    // -------------------------------------------------------------------------

    pub async fn start_proxy(&self) -> Result<Option<u32>, ProbeError> {
        self.registry.start().await
    }

    pub async fn stop_proxy(&self) -> Result<bool, ProbeError> {
        let stopped = self.registry.stop().await?;
        if stopped {
            self.status.send_replace(ConnectionStatus::Disconnected);
        }
        Ok(stopped)
    }

    pub async fn proxy_running(&self) -> bool {
        self.registry.is_running().await
    }
}

fn spawn_typed(client: &Arc<TerminalClient>, delay: Duration, command: String) {
    let client = Arc::clone(client);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = client.run_command(&command) {
            debug!(error = %e, command = %command, "could not type command");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBridge, FakeProxy};
    use proxydeck_common::ClientMessage;

    fn fast_timings() -> LifecycleTimings {
        LifecycleTimings {
            auto_start_delay: Duration::from_millis(10),
            initial_command_delay: Duration::from_millis(30),
            probe_delay: Duration::from_millis(5),
            retry_delay: Duration::from_millis(20),
            interrupt_delay: Duration::from_millis(10),
        }
    }

    fn proxy_config(port: u16) -> ProxyConfig {
        ProxyConfig {
            host: "127.0.0.1".into(),
            port,
            probe_timeout_ms: 1000,
            ..ProxyConfig::default()
        }
    }

    fn controller(config: ProxyConfig) -> LifecycleController {
        LifecycleController::new(config, 2000, fast_timings())
    }

    fn input(data: &str) -> Option<ClientMessage> {
        Some(ClientMessage::Input { data: data.into() })
    }

    #[tokio::test]
    async fn mount_starts_shell_and_types_commands_once() {
        let config = ProxyConfig {
            auto_start: true,
            initial_command: Some("antigravity-claude-proxy accounts".into()),
            ..proxy_config(8642)
        };
        let ctl = controller(config);

        let mut bridge = FakeBridge::start().await;
        ctl.mount(&bridge.url()).await.unwrap();
        assert_eq!(bridge.next_message().await, Some(ClientMessage::Start));
        assert_eq!(
            bridge.next_message().await,
            Some(ClientMessage::Resize { cols: 80, rows: 24 })
        );
        assert_eq!(
            bridge.next_message().await,
            input(&format!("{}\r", ctl.start_command()))
        );
        assert_eq!(
            bridge.next_message().await,
            input("antigravity-claude-proxy accounts\r")
        );

        let mut second = FakeBridge::start().await;
        ctl.mount(&second.url()).await.unwrap();
        assert_eq!(second.next_message().await, Some(ClientMessage::Start));
        assert_eq!(
            second.next_message().await,
            Some(ClientMessage::Resize { cols: 80, rows: 24 })
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(second.drain().is_empty());
    }

    #[test]
    fn start_command_exports_port() {
        let ctl = controller(proxy_config(9000));
        if cfg!(windows) {
            assert_eq!(ctl.start_command(), "$env:PORT=9000; antigravity-claude-proxy start");
        } else {
            assert_eq!(ctl.start_command(), "PORT=9000 antigravity-claude-proxy start");
        }
    }

    #[tokio::test]
    async fn visibility_resizes_only_when_shown() {
        let ctl = controller(proxy_config(8642));
        let mut bridge = FakeBridge::start().await;
        ctl.mount(&bridge.url()).await.unwrap();
        bridge.next_message().await;
        bridge.next_message().await;

        ctl.on_visibility_change(false, TermSize::new(200, 50)).unwrap();
        ctl.on_visibility_change(true, TermSize::new(120, 40)).unwrap();
        assert_eq!(
            bridge.next_message().await,
            Some(ClientMessage::Resize {
                cols: 120,
                rows: 40
            })
        );
        assert_eq!(ctl.size(), TermSize::new(120, 40));
        assert!(bridge.drain().is_empty());
    }

    #[tokio::test]
    async fn visibility_before_mount_only_records_size() {
        let ctl = controller(proxy_config(8642));
        ctl.on_visibility_change(true, TermSize::new(100, 30)).unwrap();
        assert_eq!(ctl.size(), TermSize::new(100, 30));
    }

    #[tokio::test]
    async fn banner_triggers_single_check_that_connects() {
        let proxy = FakeProxy::start().await;
        let ctl = controller(proxy_config(proxy.port()));

        assert!(ctl.observe_output(b"Starting proxy...\r\n").is_none());
        let trigger = ctl
            .observe_output(b"Server running at: http://localhost:8642\r\n")
            .unwrap();
        assert!(ctl.observe_output(b"Server started successfully\r\n").is_none());

        let status = ctl.run_trigger(trigger).await;
        assert_eq!(
            status,
            ConnectionStatus::Connected {
                models: vec!["claude-sonnet-4".into(), "gemini-2.5-pro".into()]
            }
        );
        assert!(ctl.status().is_connected());
        assert!(ctl.observe_output(b"Server started successfully\r\n").is_none());
    }

    #[tokio::test]
    async fn failed_check_retries_once_and_rearms() {
        let proxy = FakeProxy::start().await;
        proxy.set_health_status(503);
        let ctl = controller(proxy_config(proxy.port()));
        let mut rx = ctl.subscribe();

        let trigger = ctl.observe_output(b"Server started successfully").unwrap();
        let status = ctl.run_trigger(trigger).await;

        assert_eq!(status, ConnectionStatus::Disconnected);
        assert_eq!(proxy.health_hits(), 2);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ConnectionStatus::Disconnected);
        assert!(ctl.observe_output(b"\r\n").is_some());
    }

    #[tokio::test]
    async fn clear_output_rearms_detection() {
        let ctl = controller(proxy_config(8642));
        assert!(ctl.observe_output(b"Server started successfully").is_some());
        ctl.clear_output();
        assert!(ctl.observe_output(b"$ ").is_none());
        assert!(ctl.observe_output(b"Server started successfully").is_some());
    }

    #[tokio::test]
    async fn restart_interrupts_then_retypes_start() {
        let ctl = controller(proxy_config(8642));
        let mut bridge = FakeBridge::start().await;
        ctl.mount(&bridge.url()).await.unwrap();
        bridge.next_message().await;
        bridge.next_message().await;

        ctl.restart_proxy_in_terminal().await.unwrap();
        assert_eq!(bridge.next_message().await, input("\u{3}"));
        assert_eq!(
            bridge.next_message().await,
            input(&format!("{}\r", ctl.start_command()))
        );
        assert_eq!(ctl.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn restart_without_terminal_fails() {
        let ctl = controller(proxy_config(8642));
        assert!(matches!(
            ctl.restart_proxy_in_terminal().await,
            Err(ProxydeckError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn health_cycle_publishes_changes() {
        let proxy = FakeProxy::start().await;
        let ctl = Arc::new(controller(proxy_config(proxy.port())));
        let mut rx = ctl.subscribe();

        let task = ctl.spawn_health_cycle(Duration::from_millis(20));
        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(rx.borrow_and_update().is_connected());

        proxy.set_health_status(500);
        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*rx.borrow(), ConnectionStatus::Disconnected);
        task.abort();
    }

    #[tokio::test]
    async fn account_limits_passthrough() {
        let proxy = FakeProxy::start().await;
        let ctl = controller(proxy_config(proxy.port()));
        let limits = ctl.account_limits().await.unwrap();
        assert_eq!(limits["accounts"][0]["remaining"], 42);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn owned_proxy_start_and_stop() {
        let config = ProxyConfig {
            command: "sleep".into(),
            ..proxy_config(8642)
        };
        let ctl = LifecycleController {
            registry: ProxyRegistry::new("sleep", vec!["30".into()], 8642),
            ..controller(config)
        };

        ctl.start_proxy().await.unwrap();
        assert!(ctl.proxy_running().await);
        assert!(matches!(
            ctl.start_proxy().await,
            Err(ProbeError::AlreadyRunning)
        ));
        assert!(ctl.stop_proxy().await.unwrap());
        assert!(!ctl.proxy_running().await);
    }
}

//! `add` / `remove` subcommands: drive the account wizard in a bridge
//! session from the command line.

use std::sync::Arc;

use proxydeck_automation::{
    AccountDriver, AutomationError, CommandRoster, DriverConfig, KeySink, RosterSource,
    WaitOutcome,
};
use proxydeck_common::{ProxydeckError, Result};
use proxydeck_config::{ProxyConfig, ProxydeckConfig};
use proxydeck_lifecycle::{LifecycleController, TerminalClient};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type Driver<R> = AccountDriver<Arc<TerminalClient>, R>;

fn automation(e: AutomationError) -> ProxydeckError {
    ProxydeckError::Other(e.to_string())
}

/// Bridge URL for the configured listener.
pub fn default_url(config: &ProxydeckConfig) -> String {
    format!("ws://{}", config.server.bind_addr())
}

/// Proxy settings for a wizard session: the shell only ever runs the wizard,
/// so nothing is typed on mount.
fn wizard_proxy_config(proxy: &ProxyConfig) -> ProxyConfig {
    ProxyConfig {
        auto_start: false,
        initial_command: None,
        ..proxy.clone()
    }
}

/// An open bridge session with its output mirrored to stdout.
struct WizardSession<R: RosterSource> {
    controller: LifecycleController,
    driver: Driver<R>,
    output: mpsc::UnboundedReceiver<Vec<u8>>,
    echo: JoinHandle<()>,
}

impl<R: RosterSource> WizardSession<R> {
    async fn open(config: &ProxydeckConfig, url: &str, roster: R) -> Result<Self> {
        let controller = LifecycleController::from_config(
            &wizard_proxy_config(&config.proxy),
            &config.automation,
        );
        let client = controller.mount(url).await?;

        let (tx, output) = mpsc::unbounded_channel();
        let echo = tokio::spawn(mirror_output(Arc::clone(&client), tx));

        let driver = AccountDriver::new(
            client,
            roster,
            DriverConfig::from_config(&config.automation, &config.proxy.command),
        );
        Ok(Self {
            controller,
            driver,
            output,
            echo,
        })
    }

    /// Poll until the roster changes, feeding output to the driver and
    /// polling early once the success banner shows up.
    async fn wait(&mut self) -> Result<WaitOutcome> {
        let mut ticker = tokio::time::interval(self.driver.config().poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while self.driver.phase().is_waiting() {
            tokio::select! {
                Some(chunk) = self.output.recv() => {
                    self.driver.observe_output(&chunk);
                    if self.driver.take_poll_now() {
                        ticker.reset_immediately();
                    }
                }
                _ = ticker.tick() => {
                    if let Some(outcome) = self.driver.poll_once().await.map_err(automation)? {
                        return Ok(outcome);
                    }
                }
            }
        }
        Ok(WaitOutcome::NotWaiting)
    }

    fn close(self) {
        self.controller.unmount();
        self.echo.abort();
    }
}

async fn mirror_output(client: Arc<TerminalClient>, tx: mpsc::UnboundedSender<Vec<u8>>) {
    let mut stdout = tokio::io::stdout();
    while let Some(chunk) = client.next_output().await {
        let _ = stdout.write_all(&chunk).await;
        let _ = stdout.flush().await;
        if tx.send(chunk).is_err() {
            break;
        }
    }
}

fn roster(config: &ProxydeckConfig) -> CommandRoster {
    CommandRoster::new(
        config.proxy.command.clone(),
        config.automation.roster_timeout(),
    )
}

/// Launch the wizard, pick "add" (or "fresh"), wait for the new account and
/// decline adding another.
pub async fn add_account(config: &ProxydeckConfig, url: &str, fresh: bool) -> Result<String> {
    let mut session = WizardSession::open(config, url, roster(config)).await?;
    let result = run_add(&mut session, fresh).await;
    session.close();
    result
}

async fn run_add<R: RosterSource>(session: &mut WizardSession<R>, fresh: bool) -> Result<String> {
    let driver = &mut session.driver;
    driver.launch_wizard().await.map_err(automation)?;
    if fresh {
        driver.begin_fresh().await.map_err(automation)?;
    } else {
        driver.begin_add().await.map_err(automation)?;
    }

    match session.wait().await? {
        WaitOutcome::Added(account) => {
            session.driver.answer_repeat(false).await.map_err(automation)?;
            Ok(format!("added {account}"))
        }
        WaitOutcome::TimedOut => Err(ProxydeckError::Other(
            "timed out waiting for the new account to appear".into(),
        )),
        other => Err(ProxydeckError::Other(format!(
            "wizard ended unexpectedly: {other:?}"
        ))),
    }
}

/// Launch the wizard and remove the account with the given 1-based number.
pub async fn remove_account(config: &ProxydeckConfig, url: &str, number: usize) -> Result<String> {
    let mut session = WizardSession::open(config, url, roster(config)).await?;
    let result = run_remove(&mut session, number).await;
    session.close();
    result
}

async fn run_remove<R: RosterSource>(
    session: &mut WizardSession<R>,
    number: usize,
) -> Result<String> {
    let driver = &mut session.driver;
    driver.launch_wizard().await.map_err(automation)?;
    driver.begin_remove().await.map_err(automation)?;
    if let Err(e) = driver.select_target(number).await {
        if let Err(err) = driver.keys().send_interrupt().await {
            tracing::debug!(error = %err, "could not interrupt the wizard");
        }
        driver.reset();
        return Err(automation(e));
    }
    driver.confirm_removal(true).await.map_err(automation)?;

    match session.wait().await? {
        WaitOutcome::Removed(target) => {
            session.driver.answer_repeat(false).await.map_err(automation)?;
            Ok(format!("removed #{} {}", target.number, target.account))
        }
        WaitOutcome::TimedOut => Err(ProxydeckError::Other(
            "timed out waiting for the account to disappear".into(),
        )),
        other => Err(ProxydeckError::Other(format!(
            "wizard ended unexpectedly: {other:?}"
        ))),
    }
}

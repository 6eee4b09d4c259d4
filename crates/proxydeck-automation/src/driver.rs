//! Account wizard driver.
//!
//! A finite-state machine over [`Phase`]. Every transition is caused by an
//! explicit call (a user decision) or by an observed change: a roster size
//! change while polling, or a known line of wizard output. The driver never
//! advances on its own.

use std::time::Duration;

use proxydeck_config::AutomationConfig;
use tokio::time::Instant;

use crate::error::AutomationError;
use crate::keys::{KeySink, MenuChoice};
use crate::phase::{Flow, Phase, RemovalTarget};
use crate::roster::RosterSource;
use crate::tail::OutputTail;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Timing and text heuristics used by [`AccountDriver`].
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub poll_interval: Duration,
    pub add_timeout: Duration,
    pub remove_timeout: Duration,
    /// Pause between a declined prompt and the interrupt that ends the wizard.
    pub interrupt_delay: Duration,
    pub tail_capacity: usize,
    pub success_banner: String,
    pub repeat_prompt: String,
    /// Command line that opens the wizard menu.
    pub wizard_command: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::from_config(&AutomationConfig::default(), "antigravity-claude-proxy")
    }
}

impl DriverConfig {
    pub fn from_config(config: &AutomationConfig, proxy_command: &str) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            add_timeout: config.add_timeout(),
            remove_timeout: config.remove_timeout(),
            interrupt_delay: config.interrupt_delay(),
            tail_capacity: config.tail_capacity,
            success_banner: config.success_banner.clone(),
            repeat_prompt: config.repeat_prompt.clone(),
            wizard_command: format!("{proxy_command} accounts add"),
        }
    }
}

/// How a wait for a roster change ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A new account appeared; carries its identifier.
    Added(String),
    /// The roster shrank after a confirmed removal.
    Removed(RemovalTarget),
    /// The phase timeout elapsed first. Reported exactly once per wait.
    TimedOut,
    /// No wait was in progress.
    NotWaiting,
}

// =============================================================================
// DRIVER
// =============================================================================

pub struct AccountDriver<K, R> {
    keys: K,
    roster: R,
    config: DriverConfig,
    phase: Phase,
    /// Last roster successfully read.
    accounts: Vec<String>,
    /// Roster snapshot taken when the current wait began.
    baseline: Vec<String>,
    pending: Option<RemovalTarget>,
    last_added: Option<String>,
    last_removed: Option<RemovalTarget>,
    tail: OutputTail,
    /// Success banner seen; the next wait tick polls without sleeping.
    poll_now: bool,
    /// The banner already armed `poll_now` during this wait.
    banner_seen: bool,
    deadline: Option<Instant>,
}

impl<K: KeySink, R: RosterSource> AccountDriver<K, R> {
    pub fn new(keys: K, roster: R, config: DriverConfig) -> Self {
        let tail = OutputTail::new(config.tail_capacity);
        Self {
            keys,
            roster,
            config,
            phase: Phase::Idle,
            accounts: Vec::new(),
            baseline: Vec::new(),
            pending: None,
            last_added: None,
            last_removed: None,
            tail,
            poll_now: false,
            banner_seen: false,
            deadline: None,
        }
    }

    // -- accessors ------------------------------------------------------------

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Most recent roster read, in wizard order.
    pub fn accounts(&self) -> &[String] {
        &self.accounts
    }

    pub fn baseline(&self) -> &[String] {
        &self.baseline
    }

    pub fn pending_target(&self) -> Option<&RemovalTarget> {
        self.pending.as_ref()
    }

    pub fn last_added(&self) -> Option<&str> {
        self.last_added.as_deref()
    }

    pub fn last_removed(&self) -> Option<&RemovalTarget> {
        self.last_removed.as_ref()
    }

    pub fn tail(&self) -> &OutputTail {
        &self.tail
    }

    pub fn keys(&self) -> &K {
        &self.keys
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    // -- roster ---------------------------------------------------------------

    /// Re-read the roster and remember it.
    pub async fn refresh(&mut self) -> Result<&[String], AutomationError> {
        self.accounts = self.roster.query_roster().await?;
        Ok(&self.accounts)
    }

    /// Re-read the roster, keeping the previous one if the query fails.
    async fn refresh_quietly(&mut self) {
        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "roster refresh failed, keeping last known roster");
        }
    }

    /// Snapshot the roster as the baseline for the next wait.
    /// Fails without touching the baseline when the roster cannot be read.
    async fn snapshot_baseline(&mut self) -> Result<(), AutomationError> {
        let current = self.roster.query_roster().await?;
        self.baseline = current.clone();
        self.accounts = current;
        Ok(())
    }

    // -- wizard launch ----------------------------------------------------------

    /// Interrupt whatever runs in the shell and open the wizard menu.
    pub async fn launch_wizard(&mut self) -> Result<(), AutomationError> {
        self.require("launch the wizard", self.phase.at_menu())?;

        self.keys.send_interrupt().await?;
        tokio::time::sleep(self.config.interrupt_delay).await;
        self.keys.send_line(&self.config.wizard_command).await?;

        self.tail.clear();
        self.refresh_quietly().await;
        self.enter(Phase::AwaitingMenuSelection);
        Ok(())
    }

    // -- add flow -------------------------------------------------------------

    /// Pick "add" from the menu and start waiting for a new login.
    pub async fn begin_add(&mut self) -> Result<(), AutomationError> {
        self.begin_login(MenuChoice::Add).await
    }

    /// Pick "fresh start" from the menu and start waiting for a new login.
    pub async fn begin_fresh(&mut self) -> Result<(), AutomationError> {
        self.begin_login(MenuChoice::Fresh).await
    }

    async fn begin_login(&mut self, choice: MenuChoice) -> Result<(), AutomationError> {
        self.require("begin adding an account", self.phase.at_menu())?;

        self.snapshot_baseline().await?;
        self.keys.send_menu_selection(choice).await?;
        self.await_authentication();
        Ok(())
    }

    fn await_authentication(&mut self) {
        self.last_added = None;
        self.tail.clear();
        self.poll_now = false;
        self.banner_seen = false;
        self.deadline = Some(Instant::now() + self.config.add_timeout);
        self.enter(Phase::AwaitingAuthentication);
    }

    /// Leave the authentication wait and go back to the menu. Sends nothing.
    pub fn cancel_wait(&mut self) -> Result<(), AutomationError> {
        self.require(
            "cancel the wait",
            self.phase == Phase::AwaitingAuthentication,
        )?;
        self.deadline = None;
        self.poll_now = false;
        self.enter(Phase::AwaitingMenuSelection);
        Ok(())
    }

    // -- remove flow ----------------------------------------------------------

    /// Pick "remove" from the menu; the wizard then lists the accounts.
    pub async fn begin_remove(&mut self) -> Result<(), AutomationError> {
        self.require("begin removing an account", self.phase.at_menu())?;

        self.keys.send_menu_selection(MenuChoice::Remove).await?;
        self.refresh_quietly().await;
        self.pending = None;
        self.enter(Phase::AwaitingRemovalTarget);
        Ok(())
    }

    /// Choose the account to remove by its 1-based number.
    pub async fn select_target(&mut self, number: usize) -> Result<(), AutomationError> {
        self.require(
            "select a removal target",
            self.phase == Phase::AwaitingRemovalTarget,
        )?;
        if number == 0 || number > self.accounts.len() {
            return Err(AutomationError::InvalidTarget {
                number,
                len: self.accounts.len(),
            });
        }

        let target = RemovalTarget {
            number,
            account: self.accounts[number - 1].clone(),
        };
        self.keys.send_index(number).await?;
        self.pending = Some(target.clone());
        self.enter(Phase::AwaitingRemovalConfirmation { target });
        Ok(())
    }

    /// Answer the wizard's "are you sure" prompt.
    pub async fn confirm_removal(&mut self, yes: bool) -> Result<(), AutomationError> {
        let target = match &self.phase {
            Phase::AwaitingRemovalConfirmation { target } => target.clone(),
            _ => return Err(self.invalid("confirm a removal")),
        };

        if yes {
            self.snapshot_baseline().await?;
            self.keys.send_yes_no(true).await?;
            self.poll_now = false;
            self.deadline = Some(Instant::now() + self.config.remove_timeout);
            self.enter(Phase::AwaitingRemovalResult { target });
        } else {
            self.keys.send_yes_no(false).await?;
            self.pending = None;
            self.enter(Phase::Idle);
            self.refresh_quietly().await;
        }
        Ok(())
    }

    // -- repeat prompt --------------------------------------------------------

    /// Answer "add/remove another?".
    ///
    /// Also accepted right after an add settles, before the prompt text has
    /// been seen. Declining ends the wizard with an interrupt.
    pub async fn answer_repeat(&mut self, yes: bool) -> Result<(), AutomationError> {
        let flow = match &self.phase {
            Phase::AwaitingRepeatPrompt { flow } => *flow,
            Phase::SettledAdded { .. } => Flow::Add,
            _ => return Err(self.invalid("answer the repeat prompt")),
        };

        if yes {
            match flow {
                Flow::Add => {
                    self.snapshot_baseline().await?;
                    self.keys.send_yes_no(true).await?;
                    self.await_authentication();
                }
                Flow::Remove => {
                    self.keys.send_yes_no(true).await?;
                    self.refresh_quietly().await;
                    self.pending = None;
                    self.enter(Phase::AwaitingRemovalTarget);
                }
            }
        } else {
            self.keys.send_yes_no(false).await?;
            tokio::time::sleep(self.config.interrupt_delay).await;
            self.keys.send_interrupt().await?;
            self.enter(Phase::Idle);
            self.refresh_quietly().await;
        }
        Ok(())
    }

    // -- polling --------------------------------------------------------------

    /// Check the deadline, then query the roster once.
    ///
    /// Returns `Ok(None)` while nothing has changed. A failed query counts
    /// as "no change yet".
    pub async fn poll_once(&mut self) -> Result<Option<WaitOutcome>, AutomationError> {
        if !self.phase.is_waiting() {
            return Err(self.invalid("poll the roster"));
        }

        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok(Some(self.time_out().await));
        }

        let current = match self.roster.query_roster().await {
            Ok(current) => current,
            Err(e) => {
                tracing::debug!(error = %e, "roster poll failed, retrying next tick");
                return Ok(None);
            }
        };

        let removing = match &self.phase {
            Phase::AwaitingRemovalResult { target } => Some(target.clone()),
            _ => None,
        };

        let outcome = match removing {
            None if current.len() > self.baseline.len() => {
                let account = current
                    .iter()
                    .find(|acc| !self.baseline.contains(*acc))
                    .or_else(|| current.last())
                    .cloned()
                    .unwrap_or_default();
                self.settle_added(account.clone());
                Some(WaitOutcome::Added(account))
            }
            Some(target) if current.len() < self.baseline.len() => {
                self.settle_removed(target.clone());
                Some(WaitOutcome::Removed(target))
            }
            _ => None,
        };
        self.accounts = current;
        Ok(outcome)
    }

    /// Poll every `poll_interval` until the roster changes or the phase
    /// times out. Polls immediately after the success banner shows up.
    pub async fn wait_for_change(&mut self) -> Result<WaitOutcome, AutomationError> {
        while self.phase.is_waiting() {
            if let Some(outcome) = self.poll_once().await? {
                return Ok(outcome);
            }
            if self.poll_now {
                self.poll_now = false;
                continue;
            }
            let mut wake = Instant::now() + self.config.poll_interval;
            if let Some(deadline) = self.deadline {
                wake = wake.min(deadline);
            }
            tokio::time::sleep_until(wake).await;
        }
        Ok(WaitOutcome::NotWaiting)
    }

    fn settle_added(&mut self, account: String) {
        tracing::info!(account = %account, "account added");
        self.last_added = Some(account.clone());
        self.deadline = None;
        self.enter(Phase::SettledAdded { account });
        // The prompt may have arrived in the same burst as the banner
        self.detect_repeat_prompt();
    }

    fn settle_removed(&mut self, target: RemovalTarget) {
        tracing::info!(account = %target.account, number = target.number, "account removed");
        self.last_removed = Some(target);
        self.pending = None;
        self.deadline = None;
        self.enter(Phase::AwaitingRepeatPrompt { flow: Flow::Remove });
    }

    async fn time_out(&mut self) -> WaitOutcome {
        self.deadline = None;
        self.poll_now = false;
        let removing = matches!(self.phase, Phase::AwaitingRemovalResult { .. });
        tracing::warn!(phase = self.phase.name(), "wait timed out");

        if removing {
            self.refresh_quietly().await;
            if let Err(e) = self.keys.send_interrupt().await {
                tracing::debug!(error = %e, "interrupt after removal timeout not delivered");
            }
            self.pending = None;
        }
        self.enter(Phase::Idle);
        WaitOutcome::TimedOut
    }

    /// Consume the early-poll request raised by the success banner.
    ///
    /// Returns true at most once per banner, for callers that drive
    /// `poll_once` on their own schedule.
    pub fn take_poll_now(&mut self) -> bool {
        std::mem::take(&mut self.poll_now)
    }

    // -- output ---------------------------------------------------------------

    /// Feed terminal output. Returns true when the phase changed.
    pub fn observe_output(&mut self, chunk: &[u8]) -> bool {
        self.tail.push(chunk);
        match self.phase {
            Phase::AwaitingAuthentication => {
                if !self.banner_seen && self.tail.contains(&self.config.success_banner) {
                    tracing::debug!("success banner seen, polling roster now");
                    self.banner_seen = true;
                    self.poll_now = true;
                }
                false
            }
            Phase::SettledAdded { .. } => self.detect_repeat_prompt(),
            _ => false,
        }
    }

    fn detect_repeat_prompt(&mut self) -> bool {
        if matches!(self.phase, Phase::SettledAdded { .. })
            && self.tail.contains(&self.config.repeat_prompt)
        {
            self.tail.clear();
            self.enter(Phase::AwaitingRepeatPrompt { flow: Flow::Add });
            return true;
        }
        false
    }

    /// Back to idle with nothing remembered. Sends nothing.
    pub fn reset(&mut self) {
        self.baseline.clear();
        self.pending = None;
        self.last_added = None;
        self.last_removed = None;
        self.tail.clear();
        self.poll_now = false;
        self.banner_seen = false;
        self.deadline = None;
        self.enter(Phase::Idle);
    }

    // -- helpers --------------------------------------------------------------

    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            tracing::debug!(from = self.phase.name(), to = phase.name(), "phase change");
        }
        self.phase = phase;
    }

    fn invalid(&self, operation: &'static str) -> AutomationError {
        AutomationError::InvalidPhase {
            operation,
            phase: self.phase.name(),
        }
    }

    fn require(&self, operation: &'static str, ok: bool) -> Result<(), AutomationError> {
        if ok {
            Ok(())
        } else {
            Err(self.invalid(operation))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

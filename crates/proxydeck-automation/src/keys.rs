//! Keystroke vocabulary understood by the account wizard.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AutomationError;

/// Ctrl+C.
pub const INTERRUPT: &[u8] = &[0x03];

/// Entries of the wizard's top-level menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    /// Add an account to the existing roster.
    Add,
    /// Start over with an empty roster, then add.
    Fresh,
    Remove,
}

impl MenuChoice {
    pub fn key(self) -> &'static str {
        match self {
            MenuChoice::Add => "a",
            MenuChoice::Fresh => "f",
            MenuChoice::Remove => "r",
        }
    }
}

/// Anything that can deliver keystrokes to the shell running the wizard.
///
/// Only [`send_keys`](KeySink::send_keys) must be implemented; answers to
/// prompts are submitted with a carriage return like a user pressing Enter.
#[async_trait]
pub trait KeySink: Send + Sync {
    /// Deliver raw bytes verbatim.
    async fn send_keys(&self, data: &[u8]) -> Result<(), AutomationError>;

    /// Type `text` and press Enter.
    async fn send_line(&self, text: &str) -> Result<(), AutomationError> {
        let mut line = Vec::with_capacity(text.len() + 1);
        line.extend_from_slice(text.as_bytes());
        line.push(b'\r');
        self.send_keys(&line).await
    }

    async fn send_menu_selection(&self, choice: MenuChoice) -> Result<(), AutomationError> {
        self.send_line(choice.key()).await
    }

    /// Answer a numbered list prompt. `number` is 1-based.
    async fn send_index(&self, number: usize) -> Result<(), AutomationError> {
        self.send_line(&number.to_string()).await
    }

    async fn send_yes_no(&self, yes: bool) -> Result<(), AutomationError> {
        self.send_line(if yes { "y" } else { "n" }).await
    }

    async fn send_interrupt(&self) -> Result<(), AutomationError> {
        self.send_keys(INTERRUPT).await
    }
}

#[async_trait]
impl<T: KeySink + ?Sized> KeySink for Arc<T> {
    async fn send_keys(&self, data: &[u8]) -> Result<(), AutomationError> {
        (**self).send_keys(data).await
    }
}

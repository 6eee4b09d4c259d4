//! Account wizard automation for the proxy CLI.
//!
//! Drives the interactive `accounts add` wizard running inside a terminal
//! session by sending synthetic keystrokes, and infers where the wizard is
//! from the account roster (ground truth) and from the terminal output
//! (secondary signal).

pub mod driver;
pub mod error;
pub mod keys;
pub mod phase;
pub mod roster;
pub mod tail;

pub use driver::{AccountDriver, DriverConfig, WaitOutcome};
pub use error::AutomationError;
pub use keys::{KeySink, MenuChoice, INTERRUPT};
pub use phase::{Flow, Phase, RemovalTarget};
pub use roster::{parse_roster, CommandRoster, RosterSource};
pub use tail::OutputTail;

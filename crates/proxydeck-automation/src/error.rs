use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("roster query failed: {0}")]
    Roster(String),

    #[error("cannot {operation} while {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: &'static str,
    },

    #[error("account #{number} does not exist (roster has {len})")]
    InvalidTarget { number: usize, len: usize },

    #[error("keystroke delivery failed: {0}")]
    Transport(String),
}

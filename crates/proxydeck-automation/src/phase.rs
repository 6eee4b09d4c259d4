use serde::Serialize;

/// Which wizard flow a repeat prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    Add,
    Remove,
}

/// An account picked for removal, numbered the way the wizard lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalTarget {
    /// 1-based position in the roster.
    pub number: usize,
    pub account: String,
}

/// Where the driver believes the wizard currently is.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    AwaitingMenuSelection,
    AwaitingAuthentication,
    SettledAdded {
        account: String,
    },
    AwaitingRemovalTarget,
    AwaitingRemovalConfirmation {
        target: RemovalTarget,
    },
    AwaitingRemovalResult {
        target: RemovalTarget,
    },
    AwaitingRepeatPrompt {
        flow: Flow,
    },
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::AwaitingMenuSelection => "awaiting menu selection",
            Phase::AwaitingAuthentication => "awaiting authentication",
            Phase::SettledAdded { .. } => "settled after add",
            Phase::AwaitingRemovalTarget => "awaiting removal target",
            Phase::AwaitingRemovalConfirmation { .. } => "awaiting removal confirmation",
            Phase::AwaitingRemovalResult { .. } => "awaiting removal result",
            Phase::AwaitingRepeatPrompt { .. } => "awaiting repeat prompt",
        }
    }

    /// Phases in which the roster is being polled for a change.
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            Phase::AwaitingAuthentication | Phase::AwaitingRemovalResult { .. }
        )
    }

    /// Phases from which a new menu flow may begin.
    pub fn at_menu(&self) -> bool {
        matches!(self, Phase::Idle | Phase::AwaitingMenuSelection)
    }
}

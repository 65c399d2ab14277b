//! Command lifecycle states.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a command.
///
/// ```text
/// Initialized -> Pending -> Running -> (Canceled) -> Removed
///      ^                                               |
///      +---------------- start() again ----------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    /// Created (or returned to idle) and not scheduled.
    #[default]
    Initialized,
    /// Waiting in the scheduler's admission queue.
    Pending,
    /// Admitted and executed every cycle.
    Running,
    /// Still admitted, but marked for the interrupted path on its next run.
    Canceled,
    /// Left the command table; its terminal callback has been delivered.
    Removed,
}

impl CommandState {
    /// Returns true while the command is admitted (running or canceled but
    /// not yet removed).
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running | Self::Canceled)
    }

    /// Returns true if the command is waiting for admission.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns true if the command may be submitted again.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Initialized | Self::Removed)
    }
}

/// Why a command left the command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Finished normally; `end()` was delivered.
    Finished,
    /// Canceled or preempted; `interrupted()` was delivered.
    Interrupted,
    /// A lifecycle callback panicked; no terminal callback was delivered.
    Faulted,
}

/// How a child runs inside a command group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    /// Runs in-process after every earlier sequential entry has finished.
    Sequential,
    /// Handed to the scheduler when the cursor reaches it.
    Parallel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_includes_canceled() {
        assert!(CommandState::Running.is_running());
        assert!(CommandState::Canceled.is_running());
        assert!(!CommandState::Pending.is_running());
        assert!(!CommandState::Removed.is_running());
    }

    #[test]
    fn test_idle_states() {
        assert!(CommandState::Initialized.is_idle());
        assert!(CommandState::Removed.is_idle());
        assert!(!CommandState::Pending.is_idle());
        assert!(!CommandState::Canceled.is_idle());
    }

    #[test]
    fn test_snake_case_serialization() {
        let json = serde_json::to_string(&EndReason::Interrupted).unwrap();
        assert_eq!(json, "\"interrupted\"");
    }
}

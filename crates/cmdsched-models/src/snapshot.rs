//! Point-in-time views of the scheduler for dashboards and telemetry.

use serde::{Deserialize, Serialize};

use crate::ids::{CommandId, SubsystemId};
use crate::state::CommandState;

/// A command as seen by an introspection collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInfo {
    /// Handle used for administrative cancellation.
    pub id: CommandId,

    /// Display name.
    pub name: String,

    /// Lifecycle state at snapshot time.
    pub state: CommandState,

    /// Owning group, if this command is a group child.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<CommandId>,

    /// Declared requirements, in handle order.
    #[serde(default)]
    pub requirements: Vec<SubsystemId>,

    /// Whether the command currently accepts preemption.
    pub interruptible: bool,
}

/// A subsystem and its ownership at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemInfo {
    /// Subsystem handle.
    pub id: SubsystemId,

    /// Display name.
    pub name: String,

    /// Command that currently owns the subsystem.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_command: Option<CommandId>,

    /// Command backfilled whenever the subsystem is idle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_command: Option<CommandId>,
}

/// The command table plus subsystem ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SchedulerSnapshot {
    /// Number of completed `run()` cycles.
    pub cycle: u64,

    /// Whether trigger polling is enabled.
    pub enabled: bool,

    /// Commands in the table, in admission order.
    pub running: Vec<CommandInfo>,

    /// Every registered subsystem, in registration order.
    pub subsystems: Vec<SubsystemInfo>,
}

impl SchedulerSnapshot {
    /// Returns the names of the running commands, in admission order.
    pub fn running_names(&self) -> Vec<&str> {
        self.running.iter().map(|c| c.name.as_str()).collect()
    }

    /// Finds the owner of a subsystem by subsystem name.
    pub fn owner_of(&self, subsystem: &str) -> Option<CommandId> {
        self.subsystems
            .iter()
            .find(|s| s.name == subsystem)
            .and_then(|s| s.current_command)
    }
}

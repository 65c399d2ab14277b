//! Scheduler events.

use chrono::{DateTime, Utc};
use cmdsched_models::{CommandId, EndReason};

/// Events emitted by the scheduler.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A command entered the command table.
    CommandAdmitted {
        /// Command handle.
        id: CommandId,
        /// Command name.
        name: String,
        /// Wall-clock time of admission.
        at: DateTime<Utc>,
    },
    /// Admission was refused because a non-interruptible command holds a
    /// required subsystem.
    AdmissionRefused {
        /// Refused command.
        id: CommandId,
        /// Refused command name.
        name: String,
        /// Command holding the contested subsystem.
        blocked_by: CommandId,
    },
    /// A command left the command table.
    CommandRemoved {
        /// Command handle.
        id: CommandId,
        /// Command name.
        name: String,
        /// Which terminal path was taken.
        reason: EndReason,
        /// Wall-clock time of removal.
        at: DateTime<Utc>,
    },
    /// A lifecycle callback panicked and the command was evicted.
    CommandFaulted {
        /// Command handle.
        id: CommandId,
        /// Command name.
        name: String,
        /// Panic message, when it was a string.
        message: String,
    },
}

impl SchedulerEvent {
    /// Returns the command this event is about.
    pub fn command_id(&self) -> CommandId {
        match self {
            SchedulerEvent::CommandAdmitted { id, .. } => *id,
            SchedulerEvent::AdmissionRefused { id, .. } => *id,
            SchedulerEvent::CommandRemoved { id, .. } => *id,
            SchedulerEvent::CommandFaulted { id, .. } => *id,
        }
    }

    /// Returns the command name this event is about.
    pub fn command_name(&self) -> &str {
        match self {
            SchedulerEvent::CommandAdmitted { name, .. } => name,
            SchedulerEvent::AdmissionRefused { name, .. } => name,
            SchedulerEvent::CommandRemoved { name, .. } => name,
            SchedulerEvent::CommandFaulted { name, .. } => name,
        }
    }

    /// Returns true if this is a fault event.
    pub fn is_fault(&self) -> bool {
        matches!(self, SchedulerEvent::CommandFaulted { .. })
    }
}

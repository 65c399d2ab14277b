//! Error types for the scheduler crate.
//!
//! Every variant is a precondition violation: a defect in the calling code
//! rather than a runtime condition. Refused admissions and repeated
//! start/cancel calls are not errors and never show up here.

use cmdsched_models::{CommandId, SubsystemId};
use thiserror::Error;

/// Errors that can occur when configuring or driving the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Command handle was not issued by this scheduler.
    #[error("unknown command: {0}")]
    UnknownCommand(CommandId),

    /// Subsystem handle was not issued by this scheduler.
    #[error("unknown subsystem: {0}")]
    UnknownSubsystem(SubsystemId),

    /// Requirements can no longer change once a command has been admitted
    /// or placed in a group.
    #[error("requirements of '{command}' are locked")]
    RequirementsLocked {
        /// Command name.
        command: String,
    },

    /// Group children are driven by their group, not started or canceled
    /// directly.
    #[error("'{command}' is part of a command group")]
    InGroup {
        /// Command name.
        command: String,
    },

    /// A command can belong to at most one group.
    #[error("'{command}' already belongs to a command group")]
    AlreadyInGroup {
        /// Command name.
        command: String,
    },

    /// Composition operation on a command that is not a group.
    #[error("'{command}' is not a command group")]
    NotAGroup {
        /// Command name.
        command: String,
    },

    /// Adding the child would make a group contain itself.
    #[error("adding '{child}' to '{group}' would create a cycle")]
    GroupCycle {
        /// Group name.
        group: String,
        /// Child name.
        child: String,
    },

    /// A pending or running command cannot be moved into a group.
    #[error("'{command}' is scheduled and cannot be added to a group")]
    ChildActive {
        /// Command name.
        command: String,
    },

    /// A default command must require the subsystem it is installed on.
    #[error("default command '{command}' does not require '{subsystem}'")]
    MissingRequirement {
        /// Command name.
        command: String,
        /// Subsystem name.
        subsystem: String,
    },

    /// Button index out of the valid range.
    #[error("invalid button index {index}: buttons are numbered 1..={max}")]
    InvalidButton {
        /// Requested index.
        index: u32,
        /// Highest valid index.
        max: u32,
    },

    /// Configuration value could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

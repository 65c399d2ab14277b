//! Typed handles into the scheduler's command and subsystem tables.
//!
//! Handles are issued by the scheduler in registration order and are never
//! reused, so a stale handle can only ever miss, never alias another entry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to a command registered with a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(u32);

impl CommandId {
    /// Creates a handle from its raw table index.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw table index.
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Returns the handle as a table index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}

/// Handle to a subsystem registered with a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubsystemId(u32);

impl SubsystemId {
    /// Creates a handle from its raw table index.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw table index.
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Returns the handle as a table index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subsystem-{}", self.0)
    }
}

//! Core data models for cmdsched.
//!
//! This crate provides the plain data types shared between the scheduler
//! core and its collaborators: typed handles for commands and subsystems,
//! lifecycle states, and serializable snapshots of the command table for
//! dashboards and telemetry.

pub mod ids;
pub mod snapshot;
pub mod state;

// Re-export main types
pub use ids::{CommandId, SubsystemId};
pub use snapshot::{CommandInfo, SchedulerSnapshot, SubsystemInfo};
pub use state::{CommandState, EndReason, EntryMode};

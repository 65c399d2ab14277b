//! Cooperative command scheduler for periodic robot-control loops.
//!
//! This crate provides the command-based control framework:
//! - `Command` - a unit of behavior with an explicit lifecycle
//! - `Subsystem` - an exclusive-access resource with an optional default
//!   command
//! - `Trigger` - a boolean signal whose edges start or cancel commands
//! - `Scheduler` - owns everything and runs one cycle per control period
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use cmdsched_core::{Scheduler, SchedulerConfig, Subsystem, WaitCommand};
//!
//! struct Drivetrain;
//! impl Subsystem for Drivetrain {}
//!
//! let mut scheduler = Scheduler::new(SchedulerConfig::default());
//! let drive = scheduler.register_subsystem("Drivetrain", Drivetrain);
//! let settle = scheduler.register_command("Settle", WaitCommand::new(Duration::from_secs(1)));
//! scheduler.requires(settle, drive)?;
//!
//! scheduler.start(settle)?;
//! scheduler.run();
//! assert_eq!(scheduler.current_command(drive), Some(settle));
//! # Ok::<(), cmdsched_core::SchedulerError>(())
//! ```
//!
//! # Key Concepts
//!
//! ## Ownership
//!
//! Every command and subsystem is registered with the scheduler and named by
//! a handle (`CommandId`, `SubsystemId`) afterwards. A subsystem is owned by
//! at most one running command at a time; admitting a command that needs a
//! held subsystem preempts the holder, unless the holder is not
//! interruptible, in which case the newcomer is refused.
//!
//! ## Cycle
//!
//! Each call to `Scheduler::run` polls triggers, admits pending commands,
//! runs every admitted command once and finally backfills idle subsystems
//! with their default commands. Nothing blocks: hooks that need to wait
//! return `false` from `is_finished` across cycles.
//!
//! ## Groups
//!
//! A group composes commands into sequential and parallel entries and
//! claims the union of their requirements for its whole run.

pub mod builtin;
pub mod command;
pub mod config;
pub mod environment;
pub mod error;
pub mod event;
pub mod group;
pub mod scheduler;
pub mod subsystem;
pub mod trigger;

pub use builtin::{InstantCommand, PrintCommand, StartCommand, WaitCommand};
pub use command::{Command, CommandContext};
pub use config::SchedulerConfig;
pub use environment::{Clock, ManualClock, MonotonicClock, RobotMode, RobotState};
pub use error::{Result, SchedulerError};
pub use event::SchedulerEvent;
pub use scheduler::Scheduler;
pub use subsystem::{DefaultCommandSlot, Subsystem};
pub use trigger::{
    BindingAction, InternalButton, Joystick, JoystickButton, Trigger, TriggerBinding,
    TriggerContext, VirtualJoystick, MAX_JOYSTICK_BUTTONS,
};

pub use cmdsched_models::{
    CommandId, CommandInfo, CommandState, EndReason, EntryMode, SchedulerSnapshot, SubsystemId,
    SubsystemInfo,
};

//! Small commands that cover the common one-liners.

use std::fmt;
use std::time::Duration;

use cmdsched_models::CommandId;
use tracing::info;

use crate::command::{Command, CommandContext};

/// Runs a closure once and finishes immediately.
pub struct InstantCommand<F> {
    action: F,
}

impl<F> InstantCommand<F>
where
    F: FnMut(&mut CommandContext<'_>),
{
    /// Creates an instant command around `action`.
    pub fn new(action: F) -> Self {
        Self { action }
    }
}

impl<F> Command for InstantCommand<F>
where
    F: FnMut(&mut CommandContext<'_>),
{
    fn initialize(&mut self, ctx: &mut CommandContext<'_>) {
        (self.action)(ctx);
    }

    fn is_finished(&mut self, _ctx: &mut CommandContext<'_>) -> bool {
        true
    }
}

impl<F> fmt::Debug for InstantCommand<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstantCommand").finish_non_exhaustive()
    }
}

/// Does nothing for a fixed duration.
///
/// Mostly useful as a delay between sequential entries of a group.
#[derive(Debug, Clone, Copy)]
pub struct WaitCommand {
    duration: Duration,
}

impl WaitCommand {
    /// Creates a wait of `duration`.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Command for WaitCommand {
    fn is_finished(&mut self, ctx: &mut CommandContext<'_>) -> bool {
        ctx.elapsed() >= self.duration
    }
}

/// Logs a message and finishes immediately.
#[derive(Debug, Clone)]
pub struct PrintCommand {
    message: String,
}

impl PrintCommand {
    /// Creates a command that logs `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Command for PrintCommand {
    fn initialize(&mut self, ctx: &mut CommandContext<'_>) {
        info!(command = %ctx.name(), message = %self.message, "print");
    }

    fn is_finished(&mut self, _ctx: &mut CommandContext<'_>) -> bool {
        true
    }
}

/// Starts another command and finishes immediately.
///
/// The target runs independently; it is not a child of whatever group this
/// command belongs to.
#[derive(Debug, Clone, Copy)]
pub struct StartCommand {
    target: CommandId,
}

impl StartCommand {
    /// Creates a command that starts `target`.
    pub fn new(target: CommandId) -> Self {
        Self { target }
    }
}

impl Command for StartCommand {
    fn initialize(&mut self, ctx: &mut CommandContext<'_>) {
        ctx.start(self.target);
    }

    fn is_finished(&mut self, _ctx: &mut CommandContext<'_>) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::environment::{ManualClock, RobotMode};
    use crate::scheduler::Scheduler;
    use std::cell::Cell;
    use std::rc::Rc;

    fn scheduler(clock: &ManualClock) -> Scheduler {
        Scheduler::with_environment(
            SchedulerConfig::default(),
            Rc::new(clock.clone()),
            Rc::new(RobotMode::new()),
        )
    }

    #[test]
    fn test_instant_command_runs_once() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let bump = scheduler.register_command(
            "Bump",
            InstantCommand::new(move |_ctx: &mut CommandContext<'_>| counter.set(counter.get() + 1)),
        );

        scheduler.start(bump).unwrap();
        scheduler.run();
        scheduler.run();

        assert_eq!(calls.get(), 1);
        assert!(!scheduler.is_running(bump));
    }

    #[test]
    fn test_wait_command_waits_for_duration() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        let wait = scheduler.register_command("Wait", WaitCommand::new(Duration::from_secs(1)));

        scheduler.start(wait).unwrap();
        scheduler.run();

        clock.set(Duration::from_millis(999));
        scheduler.run();
        assert!(scheduler.is_running(wait));

        clock.set(Duration::from_secs(1));
        scheduler.run();
        assert!(!scheduler.is_running(wait));
    }

    #[test]
    fn test_print_command_finishes_immediately() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        let print = scheduler.register_command("Hello", PrintCommand::new("hello"));

        scheduler.start(print).unwrap();
        scheduler.run();
        assert!(!scheduler.is_running(print));
    }

    #[test]
    fn test_start_command_queues_target() {
        let clock = ManualClock::new();
        let mut scheduler = scheduler(&clock);
        let wait = scheduler.register_command("Wait", WaitCommand::new(Duration::from_secs(1)));
        let kick = scheduler.register_command("Kick", StartCommand::new(wait));

        scheduler.start(kick).unwrap();
        scheduler.run();
        assert!(!scheduler.is_running(kick));
        assert_eq!(scheduler.pending_commands(), vec![wait]);

        scheduler.run();
        assert!(scheduler.is_running(wait));
    }
}

//! The command abstraction: a unit of behavior with an explicit lifecycle.
//!
//! User code implements [`Command`] for the behavior and registers it with a
//! [`Scheduler`](crate::Scheduler), which hands back a [`CommandId`]. Every
//! piece of bookkeeping (requirements, timeout, lifecycle state) lives in the
//! scheduler's table, keyed by that handle; the trait object only carries the
//! behavior.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use cmdsched_models::{CommandId, CommandState, SubsystemId};

use crate::group::GroupState;

/// Lifecycle hooks of a command.
///
/// Hooks must not block: the whole control loop waits on each call.
/// "Waiting" is expressed by returning `false` from [`is_finished`] across
/// cycles.
///
/// [`is_finished`]: Command::is_finished
pub trait Command {
    /// Called once, on the first cycle after admission.
    fn initialize(&mut self, _ctx: &mut CommandContext<'_>) {}

    /// Called every cycle while the command runs, right after `initialize`
    /// on the first cycle.
    fn execute(&mut self, _ctx: &mut CommandContext<'_>) {}

    /// Returns true once the command has completed its work.
    fn is_finished(&mut self, ctx: &mut CommandContext<'_>) -> bool;

    /// Called once when the command finishes normally or times out.
    fn end(&mut self, _ctx: &mut CommandContext<'_>) {}

    /// Called once when the command is canceled or preempted.
    ///
    /// Defaults to [`end`](Command::end).
    fn interrupted(&mut self, ctx: &mut CommandContext<'_>) {
        self.end(ctx);
    }
}

/// Lifecycle hook selector used when the scheduler dispatches into a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Hook {
    Initialize,
    Execute,
    IsFinished,
    End,
    Interrupted,
}

/// Deferred scheduler operation requested from inside a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Request {
    Start(CommandId),
    Cancel(CommandId),
}

/// View of the scheduler handed to every lifecycle hook.
///
/// `start` and `cancel` only record the request; the scheduler applies it as
/// soon as the hook returns, which is indistinguishable from calling it
/// directly because both operations only enqueue or mark.
pub struct CommandContext<'a> {
    id: CommandId,
    name: Rc<str>,
    now: Duration,
    started_at: Option<Duration>,
    timeout: Option<Duration>,
    disabled: bool,
    requests: &'a mut Vec<Request>,
}

impl<'a> CommandContext<'a> {
    pub(crate) fn new(
        slot: &CommandSlot,
        id: CommandId,
        now: Duration,
        disabled: bool,
        requests: &'a mut Vec<Request>,
    ) -> Self {
        Self {
            id,
            name: Rc::clone(&slot.name),
            now,
            started_at: slot.started_at,
            timeout: slot.timeout,
            disabled,
            requests,
        }
    }

    /// Handle of the command being run.
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Name of the command being run.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time since the command was admitted.
    pub fn elapsed(&self) -> Duration {
        self.started_at
            .map(|start| self.now.saturating_sub(start))
            .unwrap_or_default()
    }

    /// Returns true if a timeout is set and has been exceeded.
    pub fn is_timed_out(&self) -> bool {
        self.timeout.is_some_and(|timeout| self.elapsed() > timeout)
    }

    /// Returns true while the robot is disabled.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Submits another command for admission.
    pub fn start(&mut self, command: CommandId) {
        self.requests.push(Request::Start(command));
    }

    /// Cancels another command (or this one).
    pub fn cancel(&mut self, command: CommandId) {
        self.requests.push(Request::Cancel(command));
    }
}

/// What a table entry executes.
pub(crate) enum CommandBody {
    Leaf(Box<dyn Command>),
    Group(GroupState),
    /// Moved out while one of its hooks runs.
    Detached,
}

impl CommandBody {
    pub(crate) fn is_group(&self) -> bool {
        matches!(self, CommandBody::Group(_))
    }
}

/// Scheduler-side record of a registered command.
pub(crate) struct CommandSlot {
    pub(crate) name: Rc<str>,
    pub(crate) body: CommandBody,
    pub(crate) requirements: BTreeSet<SubsystemId>,
    pub(crate) requirements_locked: bool,
    pub(crate) state: CommandState,
    pub(crate) initialized: bool,
    pub(crate) parent: Option<CommandId>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) started_at: Option<Duration>,
    pub(crate) interruptible: bool,
    pub(crate) run_when_disabled: bool,
}

impl CommandSlot {
    pub(crate) fn new(name: &str, body: CommandBody) -> Self {
        Self {
            name: Rc::from(name),
            body,
            requirements: BTreeSet::new(),
            requirements_locked: false,
            state: CommandState::Initialized,
            initialized: false,
            parent: None,
            timeout: None,
            started_at: None,
            interruptible: true,
            run_when_disabled: false,
        }
    }

    pub(crate) fn name(&self) -> String {
        self.name.to_string()
    }

    /// Moves the command into the table: arms timing and locks requirements.
    pub(crate) fn start_running(&mut self, now: Duration) {
        self.state = CommandState::Running;
        self.requirements_locked = true;
        self.initialized = false;
        self.started_at = Some(now);
    }

    /// Clears per-run bookkeeping after removal.
    pub(crate) fn reset_run_state(&mut self) {
        self.initialized = false;
        self.started_at = None;
    }

    pub(crate) fn is_timed_out(&self, now: Duration) -> bool {
        match (self.timeout, self.started_at) {
            (Some(timeout), Some(start)) => now.saturating_sub(start) > timeout,
            _ => false,
        }
    }
}

impl fmt::Debug for CommandSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSlot")
            .field("name", &self.name)
            .field("group", &self.body.is_group())
            .field("requirements", &self.requirements)
            .field("state", &self.state)
            .field("parent", &self.parent)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Never;

    impl Command for Never {
        fn is_finished(&mut self, _ctx: &mut CommandContext<'_>) -> bool {
            false
        }
    }

    fn slot() -> CommandSlot {
        CommandSlot::new("Never", CommandBody::Leaf(Box::new(Never)))
    }

    #[test]
    fn test_slot_defaults() {
        let slot = slot();
        assert_eq!(slot.state, CommandState::Initialized);
        assert!(slot.interruptible);
        assert!(!slot.run_when_disabled);
        assert!(!slot.requirements_locked);
        assert!(!slot.body.is_group());
    }

    #[test]
    fn test_start_running_arms_timing_and_lock() {
        let mut slot = slot();
        slot.start_running(Duration::from_secs(3));

        assert_eq!(slot.state, CommandState::Running);
        assert!(slot.requirements_locked);
        assert_eq!(slot.started_at, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_timeout_is_strictly_exceeded() {
        let mut slot = slot();
        slot.timeout = Some(Duration::from_secs(2));
        slot.start_running(Duration::ZERO);

        assert!(!slot.is_timed_out(Duration::from_millis(1900)));
        assert!(!slot.is_timed_out(Duration::from_secs(2)));
        assert!(slot.is_timed_out(Duration::from_millis(2100)));
    }

    #[test]
    fn test_context_records_requests() {
        let mut slot = slot();
        slot.timeout = Some(Duration::from_secs(1));
        slot.start_running(Duration::from_secs(1));

        let mut requests = Vec::new();
        let id = CommandId::from_raw(0);
        let mut ctx = CommandContext::new(&slot, id, Duration::from_millis(2500), false, &mut requests);

        assert_eq!(ctx.name(), "Never");
        assert_eq!(ctx.elapsed(), Duration::from_millis(1500));
        assert!(ctx.is_timed_out());

        ctx.start(CommandId::from_raw(4));
        ctx.cancel(id);
        assert_eq!(
            requests,
            vec![Request::Start(CommandId::from_raw(4)), Request::Cancel(id)]
        );
    }
}

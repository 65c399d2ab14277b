//! The scheduler: sole owner of every command and subsystem, and the only
//! code that changes which command owns which subsystem.
//!
//! # Cycle
//!
//! [`Scheduler::run`] is called once per control period and performs, in
//! order:
//!
//! 1. trigger polling (only while enabled), most recently registered first;
//! 2. admission of every pending command in FIFO order, resolving subsystem
//!    conflicts;
//! 3. one `run` of every command in the table, removing the ones that are
//!    done;
//! 4. `periodic` on every subsystem and default-command backfill of idle
//!    subsystems.
//!
//! # Failure containment
//!
//! Every dispatch into user code goes through `with_body`, which catches a
//! panic, evicts the command (and anything it contains) with its subsystems
//! released, and then re-raises the panic to the driver.

use std::any::Any;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use chrono::Utc;
use cmdsched_models::{
    CommandId, CommandInfo, CommandState, EndReason, SchedulerSnapshot, SubsystemId,
    SubsystemInfo,
};
use tracing::{debug, error, trace, warn};

use crate::command::{Command, CommandBody, CommandContext, CommandSlot, Hook, Request};
use crate::config::SchedulerConfig;
use crate::environment::{Clock, MonotonicClock, RobotMode, RobotState};
use crate::error::{Result, SchedulerError};
use crate::event::SchedulerEvent;
use crate::subsystem::{DefaultCommandSlot, Subsystem, SubsystemSlot};
use crate::trigger::TriggerBinding;

/// Cooperative, single-threaded command scheduler.
pub struct Scheduler {
    /// Configuration.
    config: SchedulerConfig,
    /// Time source for timing and timeouts.
    clock: Rc<dyn Clock>,
    /// Disabled query consulted once per command per cycle.
    robot: Rc<dyn RobotState>,
    /// Every registered command, indexed by `CommandId`.
    pub(crate) commands: Vec<CommandSlot>,
    /// Admitted commands, in admission order.
    pub(crate) table: Vec<CommandId>,
    /// Commands awaiting admission.
    pub(crate) pending: VecDeque<CommandId>,
    /// Every registered subsystem, indexed by `SubsystemId`.
    pub(crate) subsystems: Vec<SubsystemSlot>,
    /// Edge-check callbacks, in registration order.
    pub(crate) triggers: Vec<Box<dyn TriggerBinding>>,
    /// Gate on trigger polling.
    enabled: bool,
    /// Set whenever the table composition changes.
    changed: bool,
    /// Completed cycles.
    cycle: u64,
    /// Event subscribers.
    subscribers: Vec<Sender<SchedulerEvent>>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.config.name)
            .field("commands", &self.commands.len())
            .field("table", &self.table)
            .field("pending", &self.pending)
            .field("subsystems", &self.subsystems.len())
            .field("triggers", &self.triggers.len())
            .field("enabled", &self.enabled)
            .field("cycle", &self.cycle)
            .finish()
    }
}

impl Scheduler {
    /// Creates a scheduler on the system monotonic clock with an always
    /// enabled robot mode.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_environment(
            config,
            Rc::new(MonotonicClock::new()),
            Rc::new(RobotMode::new()),
        )
    }

    /// Creates a scheduler with explicit collaborators.
    pub fn with_environment(
        config: SchedulerConfig,
        clock: Rc<dyn Clock>,
        robot: Rc<dyn RobotState>,
    ) -> Self {
        let enabled = config.enabled;
        Self {
            config,
            clock,
            robot,
            commands: Vec::new(),
            table: Vec::new(),
            pending: VecDeque::new(),
            subsystems: Vec::new(),
            triggers: Vec::new(),
            enabled,
            changed: false,
            cycle: 0,
            subscribers: Vec::new(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Current reading of the scheduler's clock.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Registers a command and returns its handle.
    pub fn register_command(
        &mut self,
        name: impl Into<String>,
        command: impl Command + 'static,
    ) -> CommandId {
        self.insert_command(&name.into(), CommandBody::Leaf(Box::new(command)))
    }

    pub(crate) fn insert_command(&mut self, name: &str, body: CommandBody) -> CommandId {
        let id = CommandId::from_raw(self.commands.len() as u32);
        trace!(command = %name, id = %id, group = body.is_group(), "registered command");
        self.commands.push(CommandSlot::new(name, body));
        id
    }

    /// Registers a subsystem, installing the default command it builds in
    /// [`Subsystem::init_default_command`].
    pub fn register_subsystem(
        &mut self,
        name: impl Into<String>,
        subsystem: impl Subsystem + 'static,
    ) -> SubsystemId {
        let name = name.into();
        let id = SubsystemId::from_raw(self.subsystems.len() as u32);

        let mut body: Box<dyn Subsystem> = Box::new(subsystem);
        let mut default = DefaultCommandSlot::default();
        body.init_default_command(&mut default);
        self.subsystems.push(SubsystemSlot::new(&name, body));

        if let Some((command_name, command)) = default.command.take() {
            let command = self.insert_command(&command_name, CommandBody::Leaf(command));
            self.commands[command.index()].requirements.insert(id);
            self.subsystems[id.index()].default = Some(command);
        }

        debug!(subsystem = %name, id = %id, "registered subsystem");
        id
    }

    /// Registers an edge-check callback, polled every enabled cycle.
    pub fn add_button(&mut self, binding: impl TriggerBinding + 'static) {
        self.triggers.push(Box::new(binding));
    }

    // ------------------------------------------------------------------
    // Command operations
    // ------------------------------------------------------------------

    /// Declares that `command` needs exclusive use of `subsystem`.
    pub fn requires(&mut self, command: CommandId, subsystem: SubsystemId) -> Result<()> {
        self.subsystem_slot(subsystem)?;
        let slot = self.slot_mut(command)?;
        if slot.requirements_locked {
            return Err(SchedulerError::RequirementsLocked {
                command: slot.name(),
            });
        }
        slot.requirements.insert(subsystem);
        Ok(())
    }

    /// Submits a command for admission on the next cycle.
    ///
    /// Starting a command that is already pending or running does nothing.
    pub fn start(&mut self, command: CommandId) -> Result<()> {
        let slot = self.slot(command)?;
        if slot.parent.is_some() {
            return Err(SchedulerError::InGroup {
                command: slot.name(),
            });
        }
        self.submit(command);
        Ok(())
    }

    /// Alias of [`start`](Self::start).
    pub fn add(&mut self, command: CommandId) -> Result<()> {
        self.start(command)
    }

    pub(crate) fn submit(&mut self, id: CommandId) {
        let slot = &mut self.commands[id.index()];
        if !slot.state.is_idle() {
            return;
        }
        slot.state = CommandState::Pending;
        slot.reset_run_state();
        trace!(command = %slot.name, id = %id, "queued for admission");
        self.pending.push_back(id);
    }

    /// Cancels a command.
    ///
    /// A running command takes the interrupted path on the next cycle; a
    /// pending one is dropped from the admission queue. Canceling anything
    /// else does nothing.
    pub fn cancel(&mut self, command: CommandId) -> Result<()> {
        let slot = self.slot(command)?;
        if slot.parent.is_some() {
            return Err(SchedulerError::InGroup {
                command: slot.name(),
            });
        }
        self.mark_canceled(command);
        Ok(())
    }

    pub(crate) fn mark_canceled(&mut self, id: CommandId) {
        let slot = &mut self.commands[id.index()];
        match slot.state {
            CommandState::Running => {
                slot.state = CommandState::Canceled;
                debug!(command = %slot.name, id = %id, "canceled");
            }
            CommandState::Pending => {
                slot.state = CommandState::Initialized;
                trace!(command = %slot.name, id = %id, "dropped from admission queue");
                self.pending.retain(|queued| *queued != id);
            }
            _ => {}
        }
    }

    /// Returns true while the command is admitted.
    pub fn is_running(&self, command: CommandId) -> bool {
        self.commands
            .get(command.index())
            .is_some_and(|slot| slot.state.is_running())
    }

    /// Returns true if the command is admitted and marked canceled.
    pub fn is_canceled(&self, command: CommandId) -> bool {
        self.state(command) == Some(CommandState::Canceled)
    }

    /// Returns the command's lifecycle state.
    pub fn state(&self, command: CommandId) -> Option<CommandState> {
        self.commands.get(command.index()).map(|slot| slot.state)
    }

    /// Returns the command's name.
    pub fn name(&self, command: CommandId) -> Option<&str> {
        self.commands.get(command.index()).map(|slot| &*slot.name)
    }

    /// Finds the first command registered under `name`.
    pub fn find_command(&self, name: &str) -> Option<CommandId> {
        self.commands
            .iter()
            .position(|slot| &*slot.name == name)
            .map(|index| CommandId::from_raw(index as u32))
    }

    /// Returns the group a command belongs to.
    pub fn parent(&self, command: CommandId) -> Option<CommandId> {
        self.commands.get(command.index()).and_then(|slot| slot.parent)
    }

    /// Returns a copy of the command's requirements.
    pub fn requirements(&self, command: CommandId) -> Result<BTreeSet<SubsystemId>> {
        Ok(self.slot(command)?.requirements.clone())
    }

    /// Returns true if `command` requires `subsystem`.
    pub fn does_require(&self, command: CommandId, subsystem: SubsystemId) -> bool {
        self.commands
            .get(command.index())
            .is_some_and(|slot| slot.requirements.contains(&subsystem))
    }

    /// Sets or clears the command's timeout.
    pub fn set_timeout(&mut self, command: CommandId, timeout: Option<Duration>) -> Result<()> {
        self.slot_mut(command)?.timeout = timeout;
        Ok(())
    }

    /// Returns the command's timeout.
    pub fn timeout(&self, command: CommandId) -> Option<Duration> {
        self.commands.get(command.index()).and_then(|slot| slot.timeout)
    }

    /// Returns true if a timeout is set and the time since admission
    /// exceeds it.
    pub fn is_timed_out(&self, command: CommandId) -> bool {
        let now = self.clock.now();
        self.commands
            .get(command.index())
            .is_some_and(|slot| slot.is_timed_out(now))
    }

    /// Time since the command was admitted, if it is timing.
    pub fn time_since_initialized(&self, command: CommandId) -> Option<Duration> {
        let now = self.clock.now();
        self.commands
            .get(command.index())
            .and_then(|slot| slot.started_at)
            .map(|start| now.saturating_sub(start))
    }

    /// Sets whether the command accepts preemption.
    pub fn set_interruptible(&mut self, command: CommandId, interruptible: bool) -> Result<()> {
        self.slot_mut(command)?.interruptible = interruptible;
        Ok(())
    }

    /// Returns true if the command accepts preemption. A group accepts it
    /// only if it and every child it is currently running do.
    pub fn is_interruptible(&self, command: CommandId) -> bool {
        let Some(slot) = self.commands.get(command.index()) else {
            return false;
        };
        if !slot.interruptible {
            return false;
        }
        match &slot.body {
            CommandBody::Group(group) => group
                .active_children()
                .filter(|child| self.is_running(*child))
                .all(|child| self.is_interruptible(child)),
            _ => true,
        }
    }

    /// Sets whether the command keeps running while the robot is disabled.
    pub fn set_run_when_disabled(&mut self, command: CommandId, run: bool) -> Result<()> {
        self.slot_mut(command)?.run_when_disabled = run;
        Ok(())
    }

    /// Returns true if the command keeps running while the robot is disabled.
    pub fn will_run_when_disabled(&self, command: CommandId) -> bool {
        self.commands
            .get(command.index())
            .is_some_and(|slot| slot.run_when_disabled)
    }

    // ------------------------------------------------------------------
    // Subsystem operations
    // ------------------------------------------------------------------

    /// Installs (or clears, with `None`) a subsystem's default command.
    ///
    /// The command must require the subsystem. It is stored, not started.
    pub fn set_default_command(
        &mut self,
        subsystem: SubsystemId,
        command: Option<CommandId>,
    ) -> Result<()> {
        let subsystem_name = self.subsystem_slot(subsystem)?.name.to_string();
        if let Some(command) = command {
            let slot = self.slot(command)?;
            if slot.parent.is_some() {
                return Err(SchedulerError::InGroup {
                    command: slot.name(),
                });
            }
            if !slot.requirements.contains(&subsystem) {
                return Err(SchedulerError::MissingRequirement {
                    command: slot.name(),
                    subsystem: subsystem_name,
                });
            }
        }
        self.subsystems[subsystem.index()].default = command;
        Ok(())
    }

    /// Returns the subsystem's default command.
    pub fn default_command(&self, subsystem: SubsystemId) -> Option<CommandId> {
        self.subsystems
            .get(subsystem.index())
            .and_then(|slot| slot.default)
    }

    /// Returns the command currently owning the subsystem.
    pub fn current_command(&self, subsystem: SubsystemId) -> Option<CommandId> {
        self.subsystems
            .get(subsystem.index())
            .and_then(|slot| slot.current)
    }

    /// Returns the subsystem's name.
    pub fn subsystem_name(&self, subsystem: SubsystemId) -> Option<&str> {
        self.subsystems
            .get(subsystem.index())
            .map(|slot| &*slot.name)
    }

    // ------------------------------------------------------------------
    // Gating
    // ------------------------------------------------------------------

    /// Enables trigger polling.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Disables trigger polling. Running commands are unaffected.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Returns true if trigger polling is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    // ------------------------------------------------------------------
    // The cycle
    // ------------------------------------------------------------------

    /// Runs one scheduler cycle.
    ///
    /// # Panics
    ///
    /// Re-raises a panic from a lifecycle hook, trigger or subsystem after
    /// the offending command has been evicted and its subsystems released.
    pub fn run(&mut self) {
        trace!(scheduler = %self.config.name, cycle = self.cycle, "cycle start");

        if self.enabled {
            self.poll_triggers();
        }
        self.drain_pending();
        self.execute_table();
        self.run_subsystems();

        self.cycle += 1;
    }

    fn drain_pending(&mut self) {
        while let Some(id) = self.pending.pop_front() {
            if self.commands[id.index()].state.is_pending() {
                self.admit(id);
            }
        }
    }

    /// Admits a command into the table, preempting interruptible owners of
    /// its requirements. Returns false if admission was refused.
    pub(crate) fn admit(&mut self, id: CommandId) -> bool {
        if self.table.contains(&id) {
            return true;
        }
        if let Some(parent) = self.commands[id.index()].parent {
            return self.admit_child(id, parent);
        }

        let requirements: Vec<SubsystemId> = self.commands[id.index()]
            .requirements
            .iter()
            .copied()
            .collect();

        let mut preempted: Vec<CommandId> = Vec::new();
        for subsystem in &requirements {
            let Some(owner) = self.subsystems[subsystem.index()].current else {
                continue;
            };
            if owner == id || preempted.contains(&owner) {
                continue;
            }
            let owner_canceled = self.commands[owner.index()].state == CommandState::Canceled;
            if !owner_canceled && !self.is_interruptible(owner) {
                self.refuse(id, owner);
                return false;
            }
            preempted.push(owner);
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            for owner in preempted {
                debug!(
                    command = %self.commands[owner.index()].name,
                    by = %self.commands[id.index()].name,
                    "preempting"
                );
                self.mark_canceled(owner);
                self.retire(owner);
            }
        }));
        if let Err(payload) = outcome {
            // Already off the queue and never admitted: leave it startable.
            let slot = &mut self.commands[id.index()];
            if slot.state.is_pending() {
                slot.state = CommandState::Initialized;
            }
            warn!(command = %slot.name, id = %id, "admission abandoned after preempted command panicked");
            panic::resume_unwind(payload);
        }

        let now = self.clock.now();
        for subsystem in &requirements {
            self.subsystems[subsystem.index()].current = Some(id);
        }
        self.enter_table(id, now);
        true
    }

    fn admit_child(&mut self, id: CommandId, parent: CommandId) -> bool {
        if self.commands[parent.index()].state != CommandState::Running {
            let slot = &mut self.commands[id.index()];
            trace!(command = %slot.name, "group no longer running; dropping child");
            slot.state = CommandState::Initialized;
            return false;
        }
        // The root group already owns every subsystem this child requires.
        let now = self.clock.now();
        self.enter_table(id, now);
        true
    }

    fn enter_table(&mut self, id: CommandId, now: Duration) {
        let slot = &mut self.commands[id.index()];
        slot.start_running(now);
        let name = slot.name();
        self.table.push(id);
        self.changed = true;

        debug!(command = %name, id = %id, "admitted");
        self.emit(SchedulerEvent::CommandAdmitted {
            id,
            name,
            at: Utc::now(),
        });
    }

    fn refuse(&mut self, id: CommandId, owner: CommandId) {
        let slot = &mut self.commands[id.index()];
        if slot.state.is_pending() {
            slot.state = CommandState::Initialized;
        }
        let name = slot.name();
        debug!(
            command = %name,
            blocked_by = %self.commands[owner.index()].name,
            "admission refused"
        );
        self.emit(SchedulerEvent::AdmissionRefused {
            id,
            name,
            blocked_by: owner,
        });
    }

    fn execute_table(&mut self) {
        let snapshot = self.table.clone();
        for id in snapshot {
            // An earlier command in this pass may have evicted this one.
            if !self.table.contains(&id) {
                continue;
            }
            if !self.run_command(id) {
                self.retire(id);
            }
        }
    }

    /// One cycle of a command's lifecycle. Returns false once the command
    /// should be removed.
    pub(crate) fn run_command(&mut self, id: CommandId) -> bool {
        let disabled = self.robot.is_disabled();
        {
            let slot = &mut self.commands[id.index()];
            if disabled
                && slot.parent.is_none()
                && !slot.run_when_disabled
                && slot.state == CommandState::Running
            {
                debug!(command = %slot.name, "robot disabled; canceling");
                slot.state = CommandState::Canceled;
            }
            if slot.state != CommandState::Running {
                return false;
            }
        }

        if !self.commands[id.index()].initialized {
            self.commands[id.index()].initialized = true;
            self.invoke(id, Hook::Initialize);
        }
        self.invoke(id, Hook::Execute);

        let finished = self.invoke(id, Hook::IsFinished);
        let timed_out = self.commands[id.index()].is_timed_out(self.clock.now());
        trace!(
            command = %self.commands[id.index()].name,
            finished,
            timed_out,
            "executed"
        );
        !(finished || timed_out)
    }

    /// Removes a command: delivers its terminal callback exactly once,
    /// releases its subsystems and drops it from the table. Retiring a
    /// command that is not running does nothing.
    pub(crate) fn retire(&mut self, id: CommandId) {
        let state = self.commands[id.index()].state;
        if !state.is_running() {
            return;
        }
        let reason = if state == CommandState::Canceled {
            EndReason::Interrupted
        } else {
            EndReason::Finished
        };

        // Marked before the callback so a re-entrant path finds it removed.
        self.commands[id.index()].state = CommandState::Removed;
        match reason {
            EndReason::Interrupted => self.invoke(id, Hook::Interrupted),
            _ => self.invoke(id, Hook::End),
        };

        self.release(id);
        let in_table = self.leave_table(id);
        let slot = &mut self.commands[id.index()];
        slot.reset_run_state();
        let name = slot.name();

        debug!(command = %name, id = %id, ?reason, in_table, "removed");
        self.emit(SchedulerEvent::CommandRemoved {
            id,
            name,
            reason,
            at: Utc::now(),
        });
    }

    fn release(&mut self, id: CommandId) {
        let slot = &self.commands[id.index()];
        for subsystem in &slot.requirements {
            let owner = &mut self.subsystems[subsystem.index()].current;
            if *owner == Some(id) {
                *owner = None;
            }
        }
    }

    fn leave_table(&mut self, id: CommandId) -> bool {
        let before = self.table.len();
        self.table.retain(|running| *running != id);
        let removed = self.table.len() != before;
        if removed {
            self.changed = true;
        }
        removed
    }

    fn run_subsystems(&mut self) {
        for index in 0..self.subsystems.len() {
            self.subsystem_periodic(index);

            let slot = &self.subsystems[index];
            if slot.current.is_some() {
                continue;
            }
            let Some(default) = slot.default else {
                continue;
            };
            if !self.commands[default.index()].state.is_running() {
                trace!(
                    subsystem = %slot.name,
                    command = %self.commands[default.index()].name,
                    "backfilling default command"
                );
                self.admit(default);
            }
        }
    }

    fn subsystem_periodic(&mut self, index: usize) {
        let Some(mut body) = self.subsystems[index].body.take() else {
            return;
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body.periodic()));
        self.subsystems[index].body = Some(body);

        if let Err(payload) = outcome {
            error!(
                subsystem = %self.subsystems[index].name,
                panic = %panic_message(&*payload),
                "subsystem periodic panicked"
            );
            panic::resume_unwind(payload);
        }
    }

    // ------------------------------------------------------------------
    // Dispatch into user code
    // ------------------------------------------------------------------

    /// Runs one hook of a command. Only `IsFinished` produces a meaningful
    /// return value.
    pub(crate) fn invoke(&mut self, id: CommandId, hook: Hook) -> bool {
        self.with_body(id, |scheduler, body| match body {
            CommandBody::Leaf(command) => scheduler.invoke_leaf(id, &mut **command, hook),
            CommandBody::Group(group) => scheduler.invoke_group(id, group, hook),
            CommandBody::Detached => false,
        })
    }

    fn invoke_leaf(&mut self, id: CommandId, command: &mut dyn Command, hook: Hook) -> bool {
        let mut requests = Vec::new();
        let now = self.clock.now();
        let disabled = self.robot.is_disabled();

        let result = {
            let mut ctx =
                CommandContext::new(&self.commands[id.index()], id, now, disabled, &mut requests);
            match hook {
                Hook::Initialize => {
                    command.initialize(&mut ctx);
                    false
                }
                Hook::Execute => {
                    command.execute(&mut ctx);
                    false
                }
                Hook::IsFinished => command.is_finished(&mut ctx),
                Hook::End => {
                    command.end(&mut ctx);
                    false
                }
                Hook::Interrupted => {
                    command.interrupted(&mut ctx);
                    false
                }
            }
        };

        self.apply_requests(id, requests);
        result
    }

    /// Moves the body out for the duration of `f`, restoring it afterwards
    /// even if `f` panics.
    fn with_body<R>(&mut self, id: CommandId, f: impl FnOnce(&mut Self, &mut CommandBody) -> R) -> R {
        let mut body = mem::replace(&mut self.commands[id.index()].body, CommandBody::Detached);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(self, &mut body)));
        self.commands[id.index()].body = body;

        match outcome {
            Ok(value) => value,
            Err(payload) => {
                self.abort(id, &*payload);
                panic::resume_unwind(payload)
            }
        }
    }

    fn apply_requests(&mut self, origin: CommandId, requests: Vec<Request>) {
        for request in requests {
            let result = match request {
                Request::Cancel(target) if target == origin => {
                    self.mark_canceled(target);
                    Ok(())
                }
                Request::Start(target) => self.start(target),
                Request::Cancel(target) => self.cancel(target),
            };
            if let Err(e) = result {
                warn!(
                    command = %self.commands[origin.index()].name,
                    error = %e,
                    "request from command rejected"
                );
            }
        }
    }

    /// Evicts a command whose hook panicked, together with every command it
    /// contains, without further callbacks.
    fn abort(&mut self, id: CommandId, payload: &(dyn Any + Send)) {
        let message = panic_message(payload);
        let name = self.commands[id.index()].name();
        error!(command = %name, id = %id, panic = %message, "lifecycle hook panicked; evicting");

        self.evict(id);
        for member in self.family_of(id) {
            self.evict(member);
        }
        self.emit(SchedulerEvent::CommandFaulted { id, name, message });
    }

    fn evict(&mut self, id: CommandId) {
        self.release(id);
        let in_table = self.leave_table(id);
        self.pending.retain(|queued| *queued != id);

        let slot = &mut self.commands[id.index()];
        if !slot.state.is_idle() {
            slot.state = CommandState::Removed;
        }
        slot.reset_run_state();

        if in_table {
            let name = slot.name();
            self.emit(SchedulerEvent::CommandRemoved {
                id,
                name,
                reason: EndReason::Faulted,
                at: Utc::now(),
            });
        }
    }

    /// Every command nested (at any depth) inside `root`.
    fn family_of(&self, root: CommandId) -> Vec<CommandId> {
        (0..self.commands.len())
            .map(|index| CommandId::from_raw(index as u32))
            .filter(|id| self.has_ancestor(*id, root))
            .collect()
    }

    pub(crate) fn has_ancestor(&self, id: CommandId, ancestor: CommandId) -> bool {
        let mut current = self.commands[id.index()].parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.commands[parent.index()].parent;
        }
        false
    }

    // ------------------------------------------------------------------
    // Administrative eviction
    // ------------------------------------------------------------------

    /// Removes a command outside the normal cycle, with the same terminal
    /// callback and subsystem release as a regular removal. A pending
    /// command is dropped from the admission queue.
    pub fn remove(&mut self, command: CommandId) -> Result<()> {
        let slot = self.slot(command)?;
        if slot.parent.is_some() {
            return Err(SchedulerError::InGroup {
                command: slot.name(),
            });
        }
        let state = slot.state;
        match state {
            CommandState::Pending => self.mark_canceled(command),
            state if state.is_running() => self.retire(command),
            _ => {}
        }
        Ok(())
    }

    /// Removes every running command and clears the admission queue.
    pub fn remove_all(&mut self) {
        debug!(running = self.table.len(), pending = self.pending.len(), "removing all commands");

        let table = self.table.clone();
        for id in table {
            // Group children are removed by their group.
            if self.commands[id.index()].parent.is_none() {
                self.retire(id);
            }
        }
        for id in self.table.clone() {
            self.retire(id);
        }

        for id in mem::take(&mut self.pending) {
            let slot = &mut self.commands[id.index()];
            if slot.state.is_pending() {
                slot.state = CommandState::Initialized;
            }
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Subscribes to scheduler events.
    ///
    /// The receiver is dropped from the subscriber list once it hangs up.
    pub fn subscribe(&mut self) -> Receiver<SchedulerEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: SchedulerEvent) {
        if self.subscribers.is_empty() {
            return;
        }
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Returns the admitted commands, in admission order.
    pub fn running_commands(&self) -> Vec<CommandId> {
        self.table.clone()
    }

    /// Returns the commands awaiting admission, in queue order.
    pub fn pending_commands(&self) -> Vec<CommandId> {
        self.pending.iter().copied().collect()
    }

    /// Returns whether the table composition changed since the last call,
    /// and clears the flag.
    pub fn take_changed(&mut self) -> bool {
        mem::take(&mut self.changed)
    }

    /// Returns the number of completed cycles.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Returns an introspection record for a command.
    pub fn command_info(&self, command: CommandId) -> Option<CommandInfo> {
        let slot = self.commands.get(command.index())?;
        Some(CommandInfo {
            id: command,
            name: slot.name(),
            state: slot.state,
            parent: slot.parent,
            requirements: slot.requirements.iter().copied().collect(),
            interruptible: self.is_interruptible(command),
        })
    }

    /// Returns the command table and subsystem ownership.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        let running = self
            .table
            .iter()
            .filter_map(|id| self.command_info(*id))
            .collect();

        let subsystems = self
            .subsystems
            .iter()
            .enumerate()
            .map(|(index, slot)| SubsystemInfo {
                id: SubsystemId::from_raw(index as u32),
                name: slot.name.to_string(),
                current_command: slot.current,
                default_command: slot.default,
            })
            .collect();

        SchedulerSnapshot {
            cycle: self.cycle,
            enabled: self.enabled,
            running,
            subsystems,
        }
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub(crate) fn slot(&self, id: CommandId) -> Result<&CommandSlot> {
        self.commands
            .get(id.index())
            .ok_or(SchedulerError::UnknownCommand(id))
    }

    pub(crate) fn slot_mut(&mut self, id: CommandId) -> Result<&mut CommandSlot> {
        self.commands
            .get_mut(id.index())
            .ok_or(SchedulerError::UnknownCommand(id))
    }

    fn subsystem_slot(&self, id: SubsystemId) -> Result<&SubsystemSlot> {
        self.subsystems
            .get(id.index())
            .ok_or(SchedulerError::UnknownSubsystem(id))
    }
}

/// Extracts a readable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

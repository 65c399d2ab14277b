//! Command groups: composite commands built from sequential and parallel
//! entries.
//!
//! A group is a registered command like any other. Its requirements are the
//! union of its children's, so admitting the group claims every subsystem
//! any child will need. Sequential children run inside the group's own
//! `execute`; parallel children are submitted to the scheduler and run from
//! the command table under the group's ownership.

use std::mem;
use std::time::Duration;

use cmdsched_models::{CommandId, EntryMode};
use tracing::{debug, trace};

use crate::command::{CommandBody, Hook};
use crate::error::{Result, SchedulerError};
use crate::scheduler::Scheduler;

/// One entry of a group, in the order it was added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GroupEntry {
    Child {
        id: CommandId,
        mode: EntryMode,
        timeout: Option<Duration>,
    },
    /// Barrier: blocks the cursor until every parallel child has ended.
    WaitForChildren,
}

/// A child the group is currently driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ActiveChild {
    pub(crate) id: CommandId,
    pub(crate) timeout: Option<Duration>,
}

/// Per-group run state.
#[derive(Debug, Default)]
pub(crate) struct GroupState {
    pub(crate) entries: Vec<GroupEntry>,
    pub(crate) cursor: usize,
    pub(crate) active: Option<ActiveChild>,
    pub(crate) parallel: Vec<ActiveChild>,
}

impl GroupState {
    /// Children currently being driven: the sequential one, then parallel
    /// ones in start order.
    pub(crate) fn active_children(&self) -> impl Iterator<Item = CommandId> + '_ {
        self.active
            .iter()
            .chain(self.parallel.iter())
            .map(|child| child.id)
    }

    fn reset(&mut self) {
        self.cursor = 0;
        self.active = None;
        self.parallel.clear();
    }

    fn is_done(&self) -> bool {
        self.cursor >= self.entries.len() && self.active.is_none() && self.parallel.is_empty()
    }
}

impl Scheduler {
    /// Registers an empty command group.
    pub fn register_group(&mut self, name: impl Into<String>) -> CommandId {
        self.insert_command(&name.into(), CommandBody::Group(GroupState::default()))
    }

    /// Returns true if the command is a group.
    pub fn is_group(&self, command: CommandId) -> bool {
        self.commands
            .get(command.index())
            .is_some_and(|slot| slot.body.is_group())
    }

    /// Appends a child that runs after every earlier sequential entry.
    pub fn add_sequential(&mut self, group: CommandId, child: CommandId) -> Result<()> {
        self.add_entry(group, child, EntryMode::Sequential, None)
    }

    /// Like [`add_sequential`](Self::add_sequential), but the child is
    /// canceled once it has run longer than `timeout`.
    pub fn add_sequential_with_timeout(
        &mut self,
        group: CommandId,
        child: CommandId,
        timeout: Duration,
    ) -> Result<()> {
        self.add_entry(group, child, EntryMode::Sequential, Some(timeout))
    }

    /// Appends a child that is started when the cursor reaches it and then
    /// runs alongside later entries.
    pub fn add_parallel(&mut self, group: CommandId, child: CommandId) -> Result<()> {
        self.add_entry(group, child, EntryMode::Parallel, None)
    }

    /// Like [`add_parallel`](Self::add_parallel), but the child is canceled
    /// once it has run longer than `timeout`.
    pub fn add_parallel_with_timeout(
        &mut self,
        group: CommandId,
        child: CommandId,
        timeout: Duration,
    ) -> Result<()> {
        self.add_entry(group, child, EntryMode::Parallel, Some(timeout))
    }

    /// Appends a barrier that holds the cursor until every parallel child
    /// started so far has ended.
    pub fn add_wait_for_children(&mut self, group: CommandId) -> Result<()> {
        self.check_group_open(group)?;
        if let CommandBody::Group(state) = &mut self.commands[group.index()].body {
            state.entries.push(GroupEntry::WaitForChildren);
        }
        Ok(())
    }

    /// Returns the group's children with their entry modes, in entry order.
    pub fn group_children(&self, group: CommandId) -> Result<Vec<(CommandId, EntryMode)>> {
        let slot = self.slot(group)?;
        let CommandBody::Group(state) = &slot.body else {
            return Err(SchedulerError::NotAGroup {
                command: slot.name(),
            });
        };
        Ok(state
            .entries
            .iter()
            .filter_map(|entry| match entry {
                GroupEntry::Child { id, mode, .. } => Some((*id, *mode)),
                GroupEntry::WaitForChildren => None,
            })
            .collect())
    }

    fn check_group_open(&self, group: CommandId) -> Result<()> {
        let slot = self.slot(group)?;
        if !slot.body.is_group() {
            return Err(SchedulerError::NotAGroup {
                command: slot.name(),
            });
        }
        if slot.requirements_locked {
            return Err(SchedulerError::RequirementsLocked {
                command: slot.name(),
            });
        }
        Ok(())
    }

    fn add_entry(
        &mut self,
        group: CommandId,
        child: CommandId,
        mode: EntryMode,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.check_group_open(group)?;
        let child_slot = self.slot(child)?;

        if child == group || self.has_ancestor(group, child) {
            return Err(SchedulerError::GroupCycle {
                group: self.commands[group.index()].name(),
                child: child_slot.name(),
            });
        }
        if child_slot.parent.is_some() {
            return Err(SchedulerError::AlreadyInGroup {
                command: child_slot.name(),
            });
        }
        if !child_slot.state.is_idle() {
            return Err(SchedulerError::ChildActive {
                command: child_slot.name(),
            });
        }

        let requirements = child_slot.requirements.clone();
        let child_slot = &mut self.commands[child.index()];
        child_slot.parent = Some(group);
        child_slot.requirements_locked = true;

        let group_slot = &mut self.commands[group.index()];
        group_slot.requirements.extend(requirements);
        if let CommandBody::Group(state) = &mut group_slot.body {
            state.entries.push(GroupEntry::Child { id: child, mode, timeout });
        }

        trace!(group = %group_slot.name, child = %child, ?mode, "added group entry");
        Ok(())
    }

    pub(crate) fn invoke_group(&mut self, id: CommandId, group: &mut GroupState, hook: Hook) -> bool {
        match hook {
            Hook::Initialize => {
                group.reset();
                false
            }
            Hook::Execute => {
                self.step_group(id, group);
                false
            }
            Hook::IsFinished => group.is_done(),
            Hook::End | Hook::Interrupted => {
                self.stop_children(id, group);
                false
            }
        }
    }

    /// Advances the group as far as it can go this cycle.
    fn step_group(&mut self, id: CommandId, group: &mut GroupState) {
        let now = self.now();

        loop {
            if let Some(active) = group.active {
                if self.entry_timed_out(active, now) {
                    debug!(group = %self.commands[id.index()].name, child = %active.id, "child timed out");
                    self.mark_canceled(active.id);
                }
                if self.run_command(active.id) {
                    break;
                }
                self.retire(active.id);
                group.active = None;
            }

            self.prune_parallel(group, now);

            let Some(entry) = group.entries.get(group.cursor).copied() else {
                break;
            };
            match entry {
                GroupEntry::Child {
                    id: child,
                    mode: EntryMode::Sequential,
                    timeout,
                } => {
                    self.cancel_conflicting(group, child);
                    group.cursor += 1;
                    self.commands[child.index()].start_running(now);
                    group.active = Some(ActiveChild { id: child, timeout });
                    trace!(group = %self.commands[id.index()].name, child = %child, "sequential child started");
                }
                GroupEntry::Child {
                    id: child,
                    mode: EntryMode::Parallel,
                    timeout,
                } => {
                    self.cancel_conflicting(group, child);
                    group.cursor += 1;
                    self.submit(child);
                    group.parallel.push(ActiveChild { id: child, timeout });
                    trace!(group = %self.commands[id.index()].name, child = %child, "parallel child submitted");
                }
                GroupEntry::WaitForChildren => {
                    if !group.parallel.is_empty() {
                        break;
                    }
                    group.cursor += 1;
                }
            }
        }
    }

    /// Drops parallel children that have ended and cancels the ones past
    /// their entry timeout.
    fn prune_parallel(&mut self, group: &mut GroupState, now: Duration) {
        let mut index = 0;
        while index < group.parallel.len() {
            let child = group.parallel[index];
            let state = self.commands[child.id.index()].state;
            if !(state.is_pending() || state.is_running()) {
                group.parallel.remove(index);
                continue;
            }
            if self.entry_timed_out(child, now) {
                self.mark_canceled(child.id);
            }
            index += 1;
        }
    }

    /// Ends every parallel child sharing a subsystem with `next`, so the next
    /// entry never runs alongside a child using the same subsystem.
    fn cancel_conflicting(&mut self, group: &mut GroupState, next: CommandId) {
        let mut index = 0;
        while index < group.parallel.len() {
            let child = group.parallel[index].id;
            let conflicts = self.commands[child.index()]
                .requirements
                .iter()
                .any(|subsystem| self.commands[next.index()].requirements.contains(subsystem));
            if conflicts {
                debug!(child = %child, next = %next, "canceling conflicting parallel child");
                group.parallel.remove(index);
                self.mark_canceled(child);
                self.retire(child);
                continue;
            }
            index += 1;
        }
    }

    fn stop_children(&mut self, id: CommandId, group: &mut GroupState) {
        let children: Vec<ActiveChild> = group
            .active
            .take()
            .into_iter()
            .chain(mem::take(&mut group.parallel))
            .collect();
        if !children.is_empty() {
            debug!(group = %self.commands[id.index()].name, children = children.len(), "stopping children");
        }
        for child in children {
            self.mark_canceled(child.id);
            self.retire(child.id);
        }
    }

    fn entry_timed_out(&self, child: ActiveChild, now: Duration) -> bool {
        match (child.timeout, self.commands[child.id.index()].started_at) {
            (Some(timeout), Some(start)) => now.saturating_sub(start) > timeout,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::WaitCommand;
    use crate::config::SchedulerConfig;
    use crate::subsystem::Subsystem;

    struct Plain;
    impl Subsystem for Plain {}

    fn wait(scheduler: &mut Scheduler, name: &str) -> CommandId {
        scheduler.register_command(name, WaitCommand::new(Duration::from_secs(1)))
    }

    #[test]
    fn test_group_requirements_are_union_of_children() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        let arm = scheduler.register_subsystem("Arm", Plain);
        let drive = scheduler.register_subsystem("Drive", Plain);

        let raise = wait(&mut scheduler, "Raise");
        scheduler.requires(raise, arm).unwrap();
        let forward = wait(&mut scheduler, "Forward");
        scheduler.requires(forward, drive).unwrap();

        let auto = scheduler.register_group("Auto");
        scheduler.add_sequential(auto, raise).unwrap();
        scheduler.add_parallel(auto, forward).unwrap();

        assert!(scheduler.does_require(auto, arm));
        assert!(scheduler.does_require(auto, drive));
        assert_eq!(
            scheduler.group_children(auto).unwrap(),
            vec![(raise, EntryMode::Sequential), (forward, EntryMode::Parallel)]
        );
        assert_eq!(scheduler.parent(raise), Some(auto));
    }

    #[test]
    fn test_children_are_locked_once_added() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        let arm = scheduler.register_subsystem("Arm", Plain);
        let raise = wait(&mut scheduler, "Raise");
        let auto = scheduler.register_group("Auto");
        scheduler.add_sequential(auto, raise).unwrap();

        assert!(matches!(
            scheduler.requires(raise, arm),
            Err(SchedulerError::RequirementsLocked { .. })
        ));
        assert!(matches!(scheduler.start(raise), Err(SchedulerError::InGroup { .. })));
        assert!(matches!(scheduler.cancel(raise), Err(SchedulerError::InGroup { .. })));
    }

    #[test]
    fn test_child_cannot_join_two_groups() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        let raise = wait(&mut scheduler, "Raise");
        let first = scheduler.register_group("First");
        let second = scheduler.register_group("Second");
        scheduler.add_sequential(first, raise).unwrap();

        let err = scheduler.add_parallel(second, raise).unwrap_err();
        assert!(matches!(err, SchedulerError::AlreadyInGroup { .. }));
    }

    #[test]
    fn test_group_cycles_are_rejected() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        let outer = scheduler.register_group("Outer");
        let inner = scheduler.register_group("Inner");

        assert!(matches!(
            scheduler.add_sequential(outer, outer),
            Err(SchedulerError::GroupCycle { .. })
        ));

        scheduler.add_sequential(outer, inner).unwrap();
        // `inner` is locked now, so nesting the other way is refused before
        // the cycle check is even reached.
        assert!(scheduler.add_sequential(inner, outer).is_err());
    }

    #[test]
    fn test_entries_require_a_group() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        let raise = wait(&mut scheduler, "Raise");
        let lower = wait(&mut scheduler, "Lower");

        assert!(matches!(
            scheduler.add_sequential(raise, lower),
            Err(SchedulerError::NotAGroup { .. })
        ));
        assert!(matches!(
            scheduler.add_wait_for_children(raise),
            Err(SchedulerError::NotAGroup { .. })
        ));
        assert!(!scheduler.is_group(raise));
    }

    #[test]
    fn test_running_command_cannot_join_group() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        let raise = wait(&mut scheduler, "Raise");
        let auto = scheduler.register_group("Auto");
        scheduler.start(raise).unwrap();

        assert!(matches!(
            scheduler.add_sequential(auto, raise),
            Err(SchedulerError::ChildActive { .. })
        ));
    }

    #[test]
    fn test_group_is_sealed_after_admission() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        let raise = wait(&mut scheduler, "Raise");
        let lower = wait(&mut scheduler, "Lower");
        let auto = scheduler.register_group("Auto");
        scheduler.add_sequential(auto, raise).unwrap();

        scheduler.start(auto).unwrap();
        scheduler.run();

        assert!(matches!(
            scheduler.add_sequential(auto, lower),
            Err(SchedulerError::RequirementsLocked { .. })
        ));
    }

    #[test]
    fn test_empty_group_finishes_on_first_cycle() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        let auto = scheduler.register_group("Empty");
        scheduler.start(auto).unwrap();
        scheduler.run();

        assert!(!scheduler.is_running(auto));
        assert!(scheduler.running_commands().is_empty());
    }
}

//! Integration tests for the scheduler cycle as seen from a robot program.

mod common;

use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::mpsc::TryRecvError;
use std::time::Duration;

use cmdsched_core::{
    Command, CommandContext, CommandState, EndReason, InternalButton, JoystickButton, SchedulerEvent, VirtualJoystick,
};
use common::{Mechanism, Recorder, Rig};

#[test]
fn test_preemption_in_one_cycle() {
    let mut rig = Rig::new();
    let m = rig.scheduler.register_subsystem("M", Mechanism);
    let x = rig.scheduler.register_command("X", Recorder::forever(&rig.log, "X"));
    let y = rig.scheduler.register_command("Y", Recorder::forever(&rig.log, "Y"));
    rig.scheduler.requires(x, m).unwrap();
    rig.scheduler.requires(y, m).unwrap();

    rig.scheduler.start(x).unwrap();
    rig.cycles(1);
    rig.take_log();

    rig.scheduler.start(y).unwrap();
    rig.cycles(1);

    assert_eq!(rig.take_log(), vec!["X:interrupted", "Y:init", "Y:exec"]);
    assert_eq!(rig.scheduler.current_command(m), Some(y));
}

#[test]
fn test_refused_command_leaves_holder_untouched() {
    let mut rig = Rig::new();
    let m = rig.scheduler.register_subsystem("M", Mechanism);
    let x = rig.scheduler.register_command("X", Recorder::forever(&rig.log, "X"));
    let y = rig.scheduler.register_command("Y", Recorder::forever(&rig.log, "Y"));
    rig.scheduler.requires(x, m).unwrap();
    rig.scheduler.requires(y, m).unwrap();
    rig.scheduler.set_interruptible(x, false).unwrap();

    rig.scheduler.start(x).unwrap();
    rig.cycles(1);
    rig.scheduler.start(y).unwrap();
    rig.cycles(1);

    assert_eq!(rig.scheduler.current_command(m), Some(x));
    assert!(!rig.scheduler.is_running(y));
    let log = rig.take_log();
    assert!(!log.iter().any(|entry| entry == "X:interrupted" || entry == "X:end"));
}

#[test]
fn test_timeout_boundary() {
    let mut rig = Rig::new();
    let x = rig.scheduler.register_command("X", Recorder::forever(&rig.log, "X"));
    rig.scheduler.set_timeout(x, Some(Duration::from_secs(2))).unwrap();

    rig.scheduler.start(x).unwrap();
    rig.scheduler.run();

    rig.clock.set(Duration::from_millis(1900));
    rig.scheduler.run();
    assert!(rig.scheduler.is_running(x));

    rig.clock.set(Duration::from_millis(2100));
    rig.scheduler.run();
    assert!(!rig.scheduler.is_running(x));
    assert_eq!(rig.take_log().last().map(String::as_str), Some("X:end"));
}

#[test]
fn test_disjoint_commands_share_a_cycle_in_fifo_order() {
    let mut rig = Rig::new();
    let left = rig.scheduler.register_subsystem("Left", Mechanism);
    let right = rig.scheduler.register_subsystem("Right", Mechanism);
    let a = rig.scheduler.register_command("A", Recorder::forever(&rig.log, "A"));
    let b = rig.scheduler.register_command("B", Recorder::forever(&rig.log, "B"));
    rig.scheduler.requires(a, left).unwrap();
    rig.scheduler.requires(b, right).unwrap();

    rig.scheduler.start(b).unwrap();
    rig.scheduler.start(a).unwrap();
    rig.cycles(1);

    assert_eq!(rig.take_log(), vec!["B:init", "B:exec", "A:init", "A:exec"]);
}

#[test]
fn test_button_starts_command_in_same_cycle() {
    let mut rig = Rig::new();
    let x = rig.scheduler.register_command("X", Recorder::forever(&rig.log, "X"));
    let button = InternalButton::new();
    button.trigger().when_pressed(&mut rig.scheduler, x).unwrap();

    button.set_pressed(true);
    rig.cycles(1);

    assert_eq!(rig.take_log(), vec!["X:init", "X:exec"]);
}

#[test]
fn test_joystick_hold_drives_group() {
    let mut rig = Rig::new();
    let arm = rig.scheduler.register_subsystem("Arm", Mechanism);
    let a = rig.scheduler.register_command("A", Recorder::cycles(&rig.log, "A", 1));
    let b = rig.scheduler.register_command("B", Recorder::forever(&rig.log, "B"));
    rig.scheduler.requires(b, arm).unwrap();
    let group = rig.scheduler.register_group("Sweep");
    rig.scheduler.add_sequential(group, a).unwrap();
    rig.scheduler.add_sequential(group, b).unwrap();

    let stick = VirtualJoystick::new();
    let trigger = JoystickButton::new(Rc::new(stick.clone()), 1).unwrap();
    trigger.trigger().while_held(&mut rig.scheduler, group).unwrap();

    stick.set_button(1, true);
    rig.cycles(3);
    assert!(rig.scheduler.is_running(group));
    assert_eq!(rig.scheduler.current_command(arm), Some(group));

    stick.set_button(1, false);
    rig.cycles(1);
    assert!(!rig.scheduler.is_running(group));
    assert_eq!(rig.scheduler.state(b), Some(CommandState::Removed));
    assert!(rig.take_log().contains(&"B:interrupted".to_string()));
}

#[test]
fn test_events_follow_lifecycle() {
    let mut rig = Rig::new();
    let events = rig.scheduler.subscribe();
    let x = rig.scheduler.register_command("X", Recorder::cycles(&rig.log, "X", 1));

    rig.scheduler.start(x).unwrap();
    rig.cycles(1);

    match events.try_recv().unwrap() {
        SchedulerEvent::CommandAdmitted { id, name, .. } => {
            assert_eq!(id, x);
            assert_eq!(name, "X");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    match events.try_recv().unwrap() {
        SchedulerEvent::CommandRemoved { id, reason, .. } => {
            assert_eq!(id, x);
            assert_eq!(reason, EndReason::Finished);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(events.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[test]
fn test_dropped_subscriber_is_pruned() {
    let mut rig = Rig::new();
    let events = rig.scheduler.subscribe();
    drop(events);

    let x = rig.scheduler.register_command("X", Recorder::cycles(&rig.log, "X", 1));
    rig.scheduler.start(x).unwrap();
    rig.cycles(1);
    assert_eq!(rig.take_log(), vec!["X:init", "X:exec", "X:end"]);
}

/// Holds its subsystem forever and panics when interrupted.
struct Jammed;

impl Command for Jammed {
    fn is_finished(&mut self, _ctx: &mut CommandContext<'_>) -> bool {
        false
    }

    fn interrupted(&mut self, _ctx: &mut CommandContext<'_>) {
        panic!("arm jammed");
    }
}

#[test]
fn test_panic_in_preempted_command_leaves_newcomer_startable() {
    let mut rig = Rig::new();
    let arm = rig.scheduler.register_subsystem("Arm", Mechanism);
    let x = rig.scheduler.register_command("X", Jammed);
    let y = rig.scheduler.register_command("Y", Recorder::forever(&rig.log, "Y"));
    rig.scheduler.requires(x, arm).unwrap();
    rig.scheduler.requires(y, arm).unwrap();

    rig.scheduler.start(x).unwrap();
    rig.cycles(1);
    rig.scheduler.start(y).unwrap();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| rig.cycles(1)));
    assert!(outcome.is_err());

    assert_eq!(rig.scheduler.state(x), Some(CommandState::Removed));
    assert_eq!(rig.scheduler.state(y), Some(CommandState::Initialized));
    assert!(rig.scheduler.pending_commands().is_empty());
    assert_eq!(rig.scheduler.current_command(arm), None);

    rig.scheduler.start(y).unwrap();
    rig.cycles(2);
    assert!(rig.scheduler.is_running(y));
    assert_eq!(rig.scheduler.current_command(arm), Some(y));
    assert_eq!(rig.take_log(), vec!["Y:init", "Y:exec", "Y:exec"]);
}

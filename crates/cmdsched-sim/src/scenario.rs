//! Scripted scenarios played against the simulated robot.

use std::rc::Rc;
use std::time::Duration;

use cmdsched_core::{
    CommandId, JoystickButton, PrintCommand, Result, SchedulerConfig, SchedulerSnapshot,
    WaitCommand,
};
use tracing::info;

use crate::robot::SimRobot;

/// Available scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioName {
    /// A second drive command preempts the first.
    Preempt,
    /// A non-interruptible arm move refuses a competing command.
    Guarded,
    /// An autonomous routine built from a command group.
    Group,
    /// Joystick buttons drive commands, then the robot is disabled.
    Buttons,
}

impl ScenarioName {
    /// Every scenario, in listing order.
    pub const ALL: [ScenarioName; 4] = [
        ScenarioName::Preempt,
        ScenarioName::Guarded,
        ScenarioName::Group,
        ScenarioName::Buttons,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScenarioName::Preempt => "preempt",
            ScenarioName::Guarded => "guarded",
            ScenarioName::Group => "group",
            ScenarioName::Buttons => "buttons",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ScenarioName::Preempt => "a second drive command preempts the first",
            ScenarioName::Guarded => "a non-interruptible arm move refuses a competing command",
            ScenarioName::Group => "autonomous routine: drive and raise the arm, wait, then report",
            ScenarioName::Buttons => "joystick buttons drive commands, then the robot is disabled",
        }
    }

    /// Cycles needed for the scenario to play out.
    pub fn suggested_cycles(self) -> u64 {
        match self {
            ScenarioName::Preempt => 60,
            ScenarioName::Guarded => 40,
            ScenarioName::Group => 120,
            ScenarioName::Buttons => 80,
        }
    }
}

/// Something the script does right before a cycle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start(CommandId),
    Cancel(CommandId),
    Press(u32),
    Release(u32),
    Disable,
    Enable,
}

/// A robot plus the script being played against it.
pub struct Scenario {
    pub name: ScenarioName,
    pub robot: SimRobot,
    script: Vec<(u64, Action)>,
    cycle: u64,
}

impl Scenario {
    /// Builds the robot and script for `name`.
    pub fn build(name: ScenarioName, config: SchedulerConfig) -> Result<Self> {
        let mut robot = SimRobot::new(config);
        let script = match name {
            ScenarioName::Preempt => preempt(&mut robot)?,
            ScenarioName::Guarded => guarded(&mut robot)?,
            ScenarioName::Group => group(&mut robot)?,
            ScenarioName::Buttons => buttons(&mut robot)?,
        };
        info!(scenario = name.as_str(), actions = script.len(), "scenario ready");

        Ok(Self {
            name,
            robot,
            script,
            cycle: 0,
        })
    }

    /// Applies this cycle's actions, runs one cycle and returns the
    /// resulting snapshot.
    pub fn step(&mut self) -> Result<SchedulerSnapshot> {
        let cycle = self.cycle;
        let actions: Vec<Action> = self
            .script
            .iter()
            .filter(|(at, _)| *at == cycle)
            .map(|(_, action)| *action)
            .collect();

        for action in actions {
            self.apply(action)?;
        }

        self.robot.step();
        self.cycle += 1;
        Ok(self.robot.scheduler.snapshot())
    }

    /// Returns whether the last cycle changed the command table.
    pub fn take_changed(&mut self) -> bool {
        self.robot.scheduler.take_changed()
    }

    fn apply(&mut self, action: Action) -> Result<()> {
        let scheduler = &mut self.robot.scheduler;
        match action {
            Action::Start(command) => scheduler.start(command)?,
            Action::Cancel(command) => scheduler.cancel(command)?,
            Action::Press(button) => self.robot.joystick.set_button(button, true),
            Action::Release(button) => self.robot.joystick.set_button(button, false),
            Action::Disable => self.robot.mode.set_disabled(true),
            Action::Enable => self.robot.mode.set_disabled(false),
        }
        Ok(())
    }
}

fn preempt(robot: &mut SimRobot) -> Result<Vec<(u64, Action)>> {
    let forward = robot.drive_distance("DriveForward", 2.0, 1.0);
    let back = robot.drive_distance("DriveBack", 0.5, -1.0);
    Ok(vec![(0, Action::Start(forward)), (20, Action::Start(back))])
}

fn guarded(robot: &mut SimRobot) -> Result<Vec<(u64, Action)>> {
    let raise = robot.move_arm("RaiseArm", 90.0);
    robot.scheduler.set_interruptible(raise, false)?;
    let stow = robot.move_arm("StowArm", 0.0);
    Ok(vec![(0, Action::Start(raise)), (5, Action::Start(stow))])
}

fn group(robot: &mut SimRobot) -> Result<Vec<(u64, Action)>> {
    let drive = robot.drive_distance("DriveOut", 1.5, 1.5);
    let raise = robot.move_arm("RaiseArm", 45.0);
    let settle = robot
        .scheduler
        .register_command("Settle", WaitCommand::new(Duration::from_millis(500)));
    let done = robot
        .scheduler
        .register_command("Report", PrintCommand::new("autonomous complete"));

    let scheduler = &mut robot.scheduler;
    let auto = scheduler.register_group("Autonomous");
    scheduler.add_parallel(auto, raise)?;
    scheduler.add_sequential_with_timeout(auto, drive, Duration::from_secs(3))?;
    scheduler.add_wait_for_children(auto)?;
    scheduler.add_sequential(auto, settle)?;
    scheduler.add_sequential(auto, done)?;

    Ok(vec![(0, Action::Start(auto))])
}

fn buttons(robot: &mut SimRobot) -> Result<Vec<(u64, Action)>> {
    let creep = robot.drive_distance("Creep", 100.0, 0.5);
    let raise = robot.move_arm("RaiseArm", 60.0);
    let stow = robot.move_arm("StowArm", 0.0);

    let joystick = Rc::new(robot.joystick.clone());
    let hold = JoystickButton::new(joystick.clone(), 1)?;
    let up = JoystickButton::new(joystick.clone(), 2)?;
    let down = JoystickButton::new(joystick, 3)?;

    let scheduler = &mut robot.scheduler;
    hold.trigger().while_held(scheduler, creep)?;
    up.trigger().when_pressed(scheduler, raise)?;
    down.trigger().when_released(scheduler, stow)?;

    Ok(vec![
        (2, Action::Press(1)),
        (20, Action::Release(1)),
        (25, Action::Press(2)),
        (27, Action::Release(2)),
        (45, Action::Press(3)),
        (47, Action::Release(3)),
        (50, Action::Press(1)),
        (60, Action::Disable),
        (70, Action::Enable),
    ])
}

//! A small simulated robot: a drivetrain and an arm with just enough physics
//! for commands to have something to finish against.
//!
//! Subsystem state lives in shared cells so commands and the subsystem's own
//! `periodic` can both reach it. Commands set setpoints; `periodic`
//! integrates them once per cycle.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use cmdsched_core::{
    Command, CommandContext, CommandId, DefaultCommandSlot, ManualClock, RobotMode, Scheduler,
    SchedulerConfig, Subsystem, SubsystemId, VirtualJoystick,
};
use tracing::{debug, trace};

/// Arm slew rate, in degrees per second.
pub const ARM_RATE_DEG_PER_S: f64 = 180.0;

/// Arm position tolerance, in degrees.
pub const ARM_TOLERANCE_DEG: f64 = 0.5;

/// Drivetrain state shared with drive commands.
#[derive(Debug, Default)]
pub struct DriveState {
    /// Odometer reading.
    pub distance_m: Cell<f64>,
    /// Commanded speed; negative drives backwards.
    pub speed_mps: Cell<f64>,
}

/// Arm state shared with arm commands.
#[derive(Debug, Default)]
pub struct ArmState {
    pub angle_deg: Cell<f64>,
    pub target_deg: Cell<f64>,
}

pub struct Drivetrain {
    state: Rc<DriveState>,
    dt: f64,
}

impl Subsystem for Drivetrain {
    fn periodic(&mut self) {
        let distance = self.state.distance_m.get() + self.state.speed_mps.get() * self.dt;
        self.state.distance_m.set(distance);
    }
}

pub struct Arm {
    state: Rc<ArmState>,
    dt: f64,
}

impl Subsystem for Arm {
    fn init_default_command(&mut self, default: &mut DefaultCommandSlot) {
        default.set("HoldArm", HoldArm::new(Rc::clone(&self.state)));
    }

    fn periodic(&mut self) {
        let angle = self.state.angle_deg.get();
        let error = self.state.target_deg.get() - angle;
        let step = (ARM_RATE_DEG_PER_S * self.dt).min(error.abs());
        self.state.angle_deg.set(angle + step.copysign(error));
    }
}

/// Drives a fixed distance at a fixed speed.
pub struct DriveDistance {
    state: Rc<DriveState>,
    distance_m: f64,
    speed_mps: f64,
    start_m: f64,
}

impl DriveDistance {
    pub fn new(state: Rc<DriveState>, distance_m: f64, speed_mps: f64) -> Self {
        Self {
            state,
            distance_m,
            speed_mps,
            start_m: 0.0,
        }
    }
}

impl Command for DriveDistance {
    fn initialize(&mut self, ctx: &mut CommandContext<'_>) {
        self.start_m = self.state.distance_m.get();
        debug!(command = %ctx.name(), start_m = self.start_m, "driving");
    }

    fn execute(&mut self, _ctx: &mut CommandContext<'_>) {
        self.state.speed_mps.set(self.speed_mps);
    }

    fn is_finished(&mut self, _ctx: &mut CommandContext<'_>) -> bool {
        (self.state.distance_m.get() - self.start_m).abs() >= self.distance_m
    }

    fn end(&mut self, _ctx: &mut CommandContext<'_>) {
        self.state.speed_mps.set(0.0);
    }
}

/// Moves the arm to an angle.
pub struct MoveArm {
    state: Rc<ArmState>,
    target_deg: f64,
}

impl MoveArm {
    pub fn new(state: Rc<ArmState>, target_deg: f64) -> Self {
        Self { state, target_deg }
    }
}

impl Command for MoveArm {
    fn initialize(&mut self, _ctx: &mut CommandContext<'_>) {
        self.state.target_deg.set(self.target_deg);
    }

    fn is_finished(&mut self, _ctx: &mut CommandContext<'_>) -> bool {
        (self.state.angle_deg.get() - self.target_deg).abs() < ARM_TOLERANCE_DEG
    }

    fn interrupted(&mut self, ctx: &mut CommandContext<'_>) {
        // Freeze wherever the arm got to.
        self.state.target_deg.set(self.state.angle_deg.get());
        trace!(command = %ctx.name(), angle = self.state.angle_deg.get(), "arm move interrupted");
    }
}

/// Default arm command: holds the current angle.
pub struct HoldArm {
    state: Rc<ArmState>,
}

impl HoldArm {
    pub fn new(state: Rc<ArmState>) -> Self {
        Self { state }
    }
}

impl Command for HoldArm {
    fn initialize(&mut self, _ctx: &mut CommandContext<'_>) {
        self.state.target_deg.set(self.state.angle_deg.get());
    }

    fn is_finished(&mut self, _ctx: &mut CommandContext<'_>) -> bool {
        false
    }
}

/// The simulated robot with its scheduler and environment.
pub struct SimRobot {
    pub scheduler: Scheduler,
    pub clock: ManualClock,
    pub mode: RobotMode,
    pub joystick: VirtualJoystick,
    pub drive: Rc<DriveState>,
    pub arm: Rc<ArmState>,
    pub drivetrain_id: SubsystemId,
    pub arm_id: SubsystemId,
    period: Duration,
}

impl SimRobot {
    /// Builds the robot and registers its subsystems.
    pub fn new(config: SchedulerConfig) -> Self {
        let clock = ManualClock::new();
        let mode = RobotMode::new();
        let period = config.period;
        let dt = period.as_secs_f64();

        let mut scheduler =
            Scheduler::with_environment(config, Rc::new(clock.clone()), Rc::new(mode.clone()));

        let drive = Rc::new(DriveState::default());
        let arm = Rc::new(ArmState::default());
        let drivetrain_id = scheduler.register_subsystem(
            "Drivetrain",
            Drivetrain {
                state: Rc::clone(&drive),
                dt,
            },
        );
        let arm_id = scheduler.register_subsystem(
            "Arm",
            Arm {
                state: Rc::clone(&arm),
                dt,
            },
        );

        Self {
            scheduler,
            clock,
            mode,
            joystick: VirtualJoystick::new(),
            drive,
            arm,
            drivetrain_id,
            arm_id,
            period,
        }
    }

    /// Registers a drive command requiring the drivetrain.
    pub fn drive_distance(&mut self, name: &str, distance_m: f64, speed_mps: f64) -> CommandId {
        let command = self.scheduler.register_command(
            name,
            DriveDistance::new(Rc::clone(&self.drive), distance_m, speed_mps),
        );
        // Freshly registered handles are always known and unlocked.
        let _ = self.scheduler.requires(command, self.drivetrain_id);
        command
    }

    /// Registers an arm command requiring the arm.
    pub fn move_arm(&mut self, name: &str, target_deg: f64) -> CommandId {
        let command = self
            .scheduler
            .register_command(name, MoveArm::new(Rc::clone(&self.arm), target_deg));
        let _ = self.scheduler.requires(command, self.arm_id);
        command
    }

    /// Advances simulated time by one period and runs one cycle.
    pub fn step(&mut self) {
        self.clock.advance(self.period);
        self.scheduler.run();
    }

    /// Simulated time.
    pub fn elapsed(&self) -> Duration {
        self.scheduler.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn robot() -> SimRobot {
        SimRobot::new(SchedulerConfig::default())
    }

    #[test]
    fn test_arm_default_command_holds_after_first_cycle() {
        let mut robot = robot();
        let hold = robot.scheduler.default_command(robot.arm_id).unwrap();
        assert_eq!(robot.scheduler.name(hold), Some("HoldArm"));

        robot.step();
        assert_eq!(robot.scheduler.current_command(robot.arm_id), Some(hold));
    }

    #[test]
    fn test_drive_distance_finishes() {
        let mut robot = robot();
        let drive = robot.drive_distance("Drive1m", 1.0, 2.0);
        robot.scheduler.start(drive).unwrap();

        // 2 m/s over 20 ms periods covers 1 m in 25 cycles.
        for _ in 0..30 {
            robot.step();
        }
        assert!(!robot.scheduler.is_running(drive));
        assert!(robot.drive.distance_m.get() >= 1.0);
        assert_eq!(robot.drive.speed_mps.get(), 0.0);
    }

    #[test]
    fn test_move_arm_reaches_target() {
        let mut robot = robot();
        let raise = robot.move_arm("Raise", 90.0);
        robot.scheduler.start(raise).unwrap();

        // 180 deg/s at 20 ms is 3.6 deg per cycle.
        for _ in 0..30 {
            robot.step();
        }
        assert!(!robot.scheduler.is_running(raise));
        assert!((robot.arm.angle_deg.get() - 90.0).abs() < ARM_TOLERANCE_DEG);
        // The arm falls back to its default command.
        assert_eq!(
            robot.scheduler.current_command(robot.arm_id),
            robot.scheduler.default_command(robot.arm_id)
        );
    }

    #[test]
    fn test_elapsed_tracks_cycles() {
        let mut robot = robot();
        robot.step();
        robot.step();
        assert_eq!(robot.elapsed(), Duration::from_millis(40));
    }
}

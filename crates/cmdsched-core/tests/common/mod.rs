//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use cmdsched_core::{
    Command, CommandContext, ManualClock, RobotMode, Scheduler, SchedulerConfig, Subsystem,
};

pub type Log = Rc<RefCell<Vec<String>>>;

/// Command that records each hook call as `label:hook`.
pub struct Recorder {
    log: Log,
    label: &'static str,
    finish_after: Option<u32>,
    executed: u32,
}

impl Recorder {
    pub fn forever(log: &Log, label: &'static str) -> Self {
        Self {
            log: Rc::clone(log),
            label,
            finish_after: None,
            executed: 0,
        }
    }

    pub fn cycles(log: &Log, label: &'static str, cycles: u32) -> Self {
        Self {
            finish_after: Some(cycles),
            ..Self::forever(log, label)
        }
    }

    fn record(&self, hook: &str) {
        self.log.borrow_mut().push(format!("{}:{}", self.label, hook));
    }
}

impl Command for Recorder {
    fn initialize(&mut self, _ctx: &mut CommandContext<'_>) {
        self.executed = 0;
        self.record("init");
    }

    fn execute(&mut self, _ctx: &mut CommandContext<'_>) {
        self.executed += 1;
        self.record("exec");
    }

    fn is_finished(&mut self, _ctx: &mut CommandContext<'_>) -> bool {
        self.finish_after.is_some_and(|cycles| self.executed >= cycles)
    }

    fn end(&mut self, _ctx: &mut CommandContext<'_>) {
        self.record("end");
    }

    fn interrupted(&mut self, _ctx: &mut CommandContext<'_>) {
        self.record("interrupted");
    }
}

pub struct Mechanism;

impl Subsystem for Mechanism {}

pub struct Rig {
    pub scheduler: Scheduler,
    pub clock: ManualClock,
    pub robot: RobotMode,
    pub log: Log,
}

impl Rig {
    pub fn new() -> Self {
        let clock = ManualClock::new();
        let robot = RobotMode::new();
        let scheduler = Scheduler::with_environment(
            SchedulerConfig::default(),
            Rc::new(clock.clone()),
            Rc::new(robot.clone()),
        );
        Self {
            scheduler,
            clock,
            robot,
            log: Rc::default(),
        }
    }

    /// Drains and returns the recorded hook calls.
    pub fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    /// Runs `n` cycles, advancing the clock one period before each.
    pub fn cycles(&mut self, n: usize) {
        let period = self.scheduler.config().period;
        for _ in 0..n {
            self.clock.advance(period);
            self.scheduler.run();
        }
    }
}

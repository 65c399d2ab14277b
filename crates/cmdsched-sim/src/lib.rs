//! Simulation driver for the command scheduler.
//!
//! Plays the part of the robot's periodic control loop: builds a simulated
//! robot, feeds it a scripted scenario and calls `Scheduler::run()` once per
//! simulated period, reporting the command table as it changes.

pub mod cli;
pub mod commands;
pub mod robot;
pub mod scenario;

pub use robot::SimRobot;
pub use scenario::{Scenario, ScenarioName};

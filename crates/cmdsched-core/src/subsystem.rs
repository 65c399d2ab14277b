//! Subsystems: exclusive-access wrappers around physical or logical
//! resources.
//!
//! The scheduler owns each registered subsystem and records which command
//! currently holds it. That record is a plain [`CommandId`] looked up in the
//! scheduler's table; the subsystem never owns a command.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use cmdsched_models::CommandId;

use crate::command::Command;

/// Hooks a resource exposes to the scheduler.
pub trait Subsystem {
    /// Called once when the subsystem is registered, to install its default
    /// command. The installed command automatically requires this subsystem.
    fn init_default_command(&mut self, _default: &mut DefaultCommandSlot) {}

    /// Called once per cycle whether or not a command owns the subsystem.
    fn periodic(&mut self) {}
}

/// Shared subsystems: user code keeps one handle for its commands and
/// registers a clone with the scheduler.
impl<S> Subsystem for Rc<RefCell<S>>
where
    S: Subsystem + ?Sized,
{
    fn init_default_command(&mut self, default: &mut DefaultCommandSlot) {
        self.borrow_mut().init_default_command(default);
    }

    fn periodic(&mut self) {
        self.borrow_mut().periodic();
    }
}

/// Receives the default command a subsystem builds at registration.
#[derive(Default)]
pub struct DefaultCommandSlot {
    pub(crate) command: Option<(String, Box<dyn Command>)>,
}

impl DefaultCommandSlot {
    /// Installs `command` under `name` as the default command.
    pub fn set(&mut self, name: impl Into<String>, command: impl Command + 'static) {
        self.command = Some((name.into(), Box::new(command)));
    }

    /// Returns true if a default command was installed.
    pub fn is_set(&self) -> bool {
        self.command.is_some()
    }
}

impl fmt::Debug for DefaultCommandSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultCommandSlot")
            .field("command", &self.command.as_ref().map(|(name, _)| name))
            .finish()
    }
}

/// Scheduler-side record of a registered subsystem.
pub(crate) struct SubsystemSlot {
    pub(crate) name: Rc<str>,
    /// `None` only while `periodic` runs.
    pub(crate) body: Option<Box<dyn Subsystem>>,
    pub(crate) current: Option<CommandId>,
    pub(crate) default: Option<CommandId>,
}

impl SubsystemSlot {
    pub(crate) fn new(name: &str, body: Box<dyn Subsystem>) -> Self {
        Self {
            name: Rc::from(name),
            body: Some(body),
            current: None,
            default: None,
        }
    }
}

impl fmt::Debug for SubsystemSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubsystemSlot")
            .field("name", &self.name)
            .field("current", &self.current)
            .field("default", &self.default)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::WaitCommand;
    use std::time::Duration;

    #[derive(Default)]
    struct Arm {
        ticks: u32,
    }

    impl Subsystem for Arm {
        fn init_default_command(&mut self, default: &mut DefaultCommandSlot) {
            default.set("HoldArm", WaitCommand::new(Duration::from_secs(1)));
        }

        fn periodic(&mut self) {
            self.ticks += 1;
        }
    }

    #[test]
    fn test_shared_subsystem_forwards_hooks() {
        let arm = Rc::new(RefCell::new(Arm::default()));
        let mut registered: Box<dyn Subsystem> = Box::new(Rc::clone(&arm));

        registered.periodic();
        registered.periodic();
        assert_eq!(arm.borrow().ticks, 2);

        let mut slot = DefaultCommandSlot::default();
        registered.init_default_command(&mut slot);
        assert!(slot.is_set());
        assert_eq!(slot.command.as_ref().map(|(n, _)| n.as_str()), Some("HoldArm"));
    }

    #[test]
    fn test_default_slot_starts_empty() {
        let slot = DefaultCommandSlot::default();
        assert!(!slot.is_set());
    }
}

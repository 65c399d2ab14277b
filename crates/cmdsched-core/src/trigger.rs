//! Triggers and buttons: boolean signals whose edges start or cancel
//! commands.
//!
//! Binding a command to a [`Trigger`] registers an edge-check callback with
//! the scheduler. Callbacks are polled at the start of every enabled cycle,
//! most recently registered first, and may only start or cancel commands.

use std::cell::Cell;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use cmdsched_models::CommandId;
use tracing::{debug, error, trace, warn};

use crate::error::{Result, SchedulerError};
use crate::scheduler::Scheduler;

/// Highest valid joystick button index. Indices start at 1.
pub const MAX_JOYSTICK_BUTTONS: u32 = 32;

/// Restricted scheduler view handed to trigger callbacks.
pub struct TriggerContext<'a> {
    scheduler: &'a mut Scheduler,
}

impl TriggerContext<'_> {
    /// Submits a command for admission.
    pub fn start(&mut self, command: CommandId) -> Result<()> {
        self.scheduler.start(command)
    }

    /// Cancels a command.
    pub fn cancel(&mut self, command: CommandId) -> Result<()> {
        self.scheduler.cancel(command)
    }

    /// Returns true while the command is admitted.
    pub fn is_running(&self, command: CommandId) -> bool {
        self.scheduler.is_running(command)
    }
}

/// Edge-check callback polled once per enabled cycle.
pub trait TriggerBinding {
    /// Samples the signal and reacts to its edges.
    fn poll(&mut self, ctx: &mut TriggerContext<'_>);
}

impl<F> TriggerBinding for F
where
    F: FnMut(&mut TriggerContext<'_>),
{
    fn poll(&mut self, ctx: &mut TriggerContext<'_>) {
        self(ctx)
    }
}

/// How a binding reacts to its trigger's edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingAction {
    /// Start on the rising edge.
    StartOnRise,
    /// Start on every active poll, cancel on the falling edge.
    WhileActive,
    /// Start on the falling edge.
    StartOnFall,
    /// On the rising edge, cancel if running, otherwise start.
    ToggleOnRise,
    /// Cancel on the rising edge.
    CancelOnRise,
}

/// A boolean signal that can drive commands.
#[derive(Clone)]
pub struct Trigger {
    signal: Rc<dyn Fn() -> bool>,
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger").field("active", &self.get()).finish()
    }
}

impl Trigger {
    /// Creates a trigger from a signal.
    pub fn new(signal: impl Fn() -> bool + 'static) -> Self {
        Self {
            signal: Rc::new(signal),
        }
    }

    /// Samples the signal.
    pub fn get(&self) -> bool {
        (self.signal)()
    }

    /// Starts `command` when the trigger becomes active.
    pub fn when_active(&self, scheduler: &mut Scheduler, command: CommandId) -> Result<()> {
        self.bind(scheduler, command, BindingAction::StartOnRise)
    }

    /// Keeps `command` running while the trigger is active and cancels it
    /// when the trigger goes inactive.
    pub fn while_active(&self, scheduler: &mut Scheduler, command: CommandId) -> Result<()> {
        self.bind(scheduler, command, BindingAction::WhileActive)
    }

    /// Starts `command` when the trigger becomes inactive.
    pub fn when_inactive(&self, scheduler: &mut Scheduler, command: CommandId) -> Result<()> {
        self.bind(scheduler, command, BindingAction::StartOnFall)
    }

    /// Toggles `command` each time the trigger becomes active.
    pub fn toggle_when_active(&self, scheduler: &mut Scheduler, command: CommandId) -> Result<()> {
        self.bind(scheduler, command, BindingAction::ToggleOnRise)
    }

    /// Cancels `command` when the trigger becomes active.
    pub fn cancel_when_active(&self, scheduler: &mut Scheduler, command: CommandId) -> Result<()> {
        self.bind(scheduler, command, BindingAction::CancelOnRise)
    }

    /// Button spelling of [`when_active`](Self::when_active).
    pub fn when_pressed(&self, scheduler: &mut Scheduler, command: CommandId) -> Result<()> {
        self.when_active(scheduler, command)
    }

    /// Button spelling of [`while_active`](Self::while_active).
    pub fn while_held(&self, scheduler: &mut Scheduler, command: CommandId) -> Result<()> {
        self.while_active(scheduler, command)
    }

    /// Button spelling of [`when_inactive`](Self::when_inactive).
    pub fn when_released(&self, scheduler: &mut Scheduler, command: CommandId) -> Result<()> {
        self.when_inactive(scheduler, command)
    }

    /// Button spelling of [`toggle_when_active`](Self::toggle_when_active).
    pub fn toggle_when_pressed(&self, scheduler: &mut Scheduler, command: CommandId) -> Result<()> {
        self.toggle_when_active(scheduler, command)
    }

    /// Button spelling of [`cancel_when_active`](Self::cancel_when_active).
    pub fn cancel_when_pressed(&self, scheduler: &mut Scheduler, command: CommandId) -> Result<()> {
        self.cancel_when_active(scheduler, command)
    }

    /// Registers an edge binding. The previous value is seeded from the
    /// signal now, so a trigger that is already active does not fire a
    /// rising edge on the first poll.
    pub fn bind(
        &self,
        scheduler: &mut Scheduler,
        command: CommandId,
        action: BindingAction,
    ) -> Result<()> {
        let slot = scheduler.slot(command)?;
        if slot.parent.is_some() {
            return Err(SchedulerError::InGroup {
                command: slot.name(),
            });
        }
        debug!(command = %slot.name, ?action, "bound trigger");

        scheduler.add_button(EdgeBinding {
            signal: Rc::clone(&self.signal),
            command,
            action,
            previous: self.get(),
        });
        Ok(())
    }
}

struct EdgeBinding {
    signal: Rc<dyn Fn() -> bool>,
    command: CommandId,
    action: BindingAction,
    previous: bool,
}

impl TriggerBinding for EdgeBinding {
    fn poll(&mut self, ctx: &mut TriggerContext<'_>) {
        let current = (self.signal)();
        let rising = current && !self.previous;
        let falling = !current && self.previous;
        self.previous = current;

        let command = self.command;
        let result = match self.action {
            BindingAction::StartOnRise if rising => ctx.start(command),
            BindingAction::WhileActive if current => ctx.start(command),
            BindingAction::WhileActive if falling => ctx.cancel(command),
            BindingAction::StartOnFall if falling => ctx.start(command),
            BindingAction::ToggleOnRise if rising => {
                if ctx.is_running(command) {
                    ctx.cancel(command)
                } else {
                    ctx.start(command)
                }
            }
            BindingAction::CancelOnRise if rising => ctx.cancel(command),
            _ => return,
        };

        trace!(command = %command, action = ?self.action, "trigger fired");
        if let Err(e) = result {
            warn!(command = %command, error = %e, "trigger action rejected");
        }
    }
}

impl Scheduler {
    /// Polls every binding, most recently registered first.
    pub(crate) fn poll_triggers(&mut self) {
        let mut triggers = mem::take(&mut self.triggers);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut ctx = TriggerContext { scheduler: &mut *self };
            for binding in triggers.iter_mut().rev() {
                binding.poll(&mut ctx);
            }
        }));

        // Bindings registered while polling go after the existing ones.
        triggers.append(&mut self.triggers);
        self.triggers = triggers;

        if let Err(payload) = outcome {
            error!("trigger callback panicked");
            panic::resume_unwind(payload);
        }
    }
}

/// A button driven from code rather than hardware.
#[derive(Debug, Clone, Default)]
pub struct InternalButton {
    pressed: Rc<Cell<bool>>,
    inverted: Rc<Cell<bool>>,
}

impl InternalButton {
    /// Creates a released, non-inverted button.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a button with the given inversion.
    pub fn with_inverted(inverted: bool) -> Self {
        let button = Self::default();
        button.set_inverted(inverted);
        button
    }

    /// Sets the raw pressed value.
    pub fn set_pressed(&self, pressed: bool) {
        self.pressed.set(pressed);
    }

    /// Inverts the reported value.
    pub fn set_inverted(&self, inverted: bool) {
        self.inverted.set(inverted);
    }

    /// Returns the reported value: pressed, flipped if inverted.
    pub fn get(&self) -> bool {
        self.pressed.get() != self.inverted.get()
    }

    /// Returns a trigger sampling this button.
    pub fn trigger(&self) -> Trigger {
        let button = self.clone();
        Trigger::new(move || button.get())
    }
}

/// Source of raw joystick button values.
pub trait Joystick {
    /// Returns the state of button `index` (1-based).
    fn raw_button(&self, index: u32) -> bool;
}

/// Joystick whose buttons are set from code, for simulation and tests.
#[derive(Debug, Clone, Default)]
pub struct VirtualJoystick {
    buttons: Rc<Cell<u32>>,
}

impl VirtualJoystick {
    /// Creates a joystick with every button released.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets button `index` (1-based). Out-of-range indices are ignored.
    pub fn set_button(&self, index: u32, pressed: bool) {
        if !(1..=MAX_JOYSTICK_BUTTONS).contains(&index) {
            return;
        }
        let bit = 1u32 << (index - 1);
        let buttons = self.buttons.get();
        self.buttons
            .set(if pressed { buttons | bit } else { buttons & !bit });
    }
}

impl Joystick for VirtualJoystick {
    fn raw_button(&self, index: u32) -> bool {
        (1..=MAX_JOYSTICK_BUTTONS).contains(&index) && self.buttons.get() & (1 << (index - 1)) != 0
    }
}

/// One numbered button of a joystick.
#[derive(Clone)]
pub struct JoystickButton {
    joystick: Rc<dyn Joystick>,
    index: u32,
}

impl fmt::Debug for JoystickButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoystickButton")
            .field("index", &self.index)
            .finish()
    }
}

impl JoystickButton {
    /// Creates a button for `index` (1 through [`MAX_JOYSTICK_BUTTONS`]).
    pub fn new(joystick: Rc<dyn Joystick>, index: u32) -> Result<Self> {
        if !(1..=MAX_JOYSTICK_BUTTONS).contains(&index) {
            return Err(SchedulerError::InvalidButton {
                index,
                max: MAX_JOYSTICK_BUTTONS,
            });
        }
        Ok(Self { joystick, index })
    }

    /// Returns the button index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Samples the button.
    pub fn get(&self) -> bool {
        self.joystick.raw_button(self.index)
    }

    /// Returns a trigger sampling this button.
    pub fn trigger(&self) -> Trigger {
        let button = self.clone();
        Trigger::new(move || button.get())
    }
}

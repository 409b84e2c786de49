//! Pin catalog for the clock's relay board.
//!
//! Every physical pin the controller touches is described once here: which
//! outputs move the stepping mechanism, which outputs are status lamps, and
//! which input transitions map to which button action. The daemon, emulator
//! and tests all read the same table instead of hard-coding pin numbers.

use core::fmt;

use crate::scheduler::RelayPhase;

/// Physical pin index on the external pin controller.
pub type PinId = u8;

/// Number of pins (per direction) exposed by the pin controller.
pub const MAX_PINS: usize = 8;

/// Requested output level.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PinLevel {
    On,
    Off,
}

impl PinLevel {
    #[must_use]
    pub const fn from_on(on: bool) -> Self {
        if on { PinLevel::On } else { PinLevel::Off }
    }

    #[must_use]
    pub const fn is_on(self) -> bool {
        matches!(self, PinLevel::On)
    }

    /// Wire keyword for the level (`on` / `off`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PinLevel::On => "on",
            PinLevel::Off => "off",
        }
    }
}

impl fmt::Display for PinLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition reported for an input pin.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PinEdge {
    /// Input switched on (button pressed).
    On,
    /// Input switched off (button released).
    Off,
}

impl PinEdge {
    const fn slot(self) -> usize {
        match self {
            PinEdge::On => 0,
            PinEdge::Off => 1,
        }
    }
}

/// One output command for the pin controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PinCommand {
    pub pin: PinId,
    pub level: PinLevel,
}

impl PinCommand {
    #[must_use]
    pub const fn new(pin: PinId, level: PinLevel) -> Self {
        Self { pin, level }
    }

    #[must_use]
    pub const fn on(pin: PinId) -> Self {
        Self::new(pin, PinLevel::On)
    }

    #[must_use]
    pub const fn off(pin: PinId) -> Self {
        Self::new(pin, PinLevel::Off)
    }
}

/// Output that follows the relay phase.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PhasePin {
    pub pin: PinId,
    /// Phase in which this pin is switched on; it is off in the other phase.
    pub on_in: RelayPhase,
}

impl PhasePin {
    #[must_use]
    pub const fn new(pin: PinId, on_in: RelayPhase) -> Self {
        Self { pin, on_in }
    }

    /// Command that puts this pin into its state for `phase`.
    #[must_use]
    pub const fn command_for(self, phase: RelayPhase) -> PinCommand {
        PinCommand::new(self.pin, PinLevel::from_on(self.on_in.is_on() == phase.is_on()))
    }
}

/// Logical meaning of a button transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ButtonAction {
    /// Advance the target by one minute (manual mode only).
    StepMinute,
    /// Advance the target by one hour, keeping the minute (manual mode only).
    StepHour,
    /// Flip between real-time and manual mode.
    ToggleRealTime,
    /// Count towards the three-press shutdown.
    Shutdown,
}

impl fmt::Display for ButtonAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ButtonAction::StepMinute => "step-minute",
            ButtonAction::StepHour => "step-hour",
            ButtonAction::ToggleRealTime => "toggle-real-time",
            ButtonAction::Shutdown => "shutdown",
        })
    }
}

/// Binding from an input transition to a button action.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ButtonBinding {
    pub pin: PinId,
    pub edge: PinEdge,
    pub action: ButtonAction,
}

impl ButtonBinding {
    #[must_use]
    pub const fn new(pin: PinId, edge: PinEdge, action: ButtonAction) -> Self {
        Self { pin, edge, action }
    }
}

/// Outputs driven by each pulse, in the order they are switched.
pub const PHASE_PINS: [PhasePin; 4] = [
    PhasePin::new(0, RelayPhase::On),
    PhasePin::new(1, RelayPhase::On),
    PhasePin::new(4, RelayPhase::On),
    PhasePin::new(5, RelayPhase::Off),
];

/// Buttons are acted upon when released.
pub const BUTTONS: [ButtonBinding; 4] = [
    ButtonBinding::new(0, PinEdge::Off, ButtonAction::StepMinute),
    ButtonBinding::new(1, PinEdge::Off, ButtonAction::StepHour),
    ButtonBinding::new(2, PinEdge::Off, ButtonAction::ToggleRealTime),
    ButtonBinding::new(3, PinEdge::Off, ButtonAction::Shutdown),
];

/// Outputs switched off by the shutdown sequence.
pub const RELEASE_ON_SHUTDOWN: [PinId; 6] = [0, 1, 2, 3, 4, 5];

/// Lamp lit once the controller has announced itself to the pin controller.
pub const READY_PIN: PinId = 2;
/// Lamp lit while real-time mode is active.
pub const MODE_PIN: PinId = 3;

/// Complete pin table for one clock.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PinMap {
    pub phase_pins: &'static [PhasePin],
    pub ready_pin: PinId,
    pub mode_pin: PinId,
    pub buttons: &'static [ButtonBinding],
    pub release_on_shutdown: &'static [PinId],
}

/// Wiring of the deployed clock.
pub const PIN_MAP: PinMap = PinMap {
    phase_pins: &PHASE_PINS,
    ready_pin: READY_PIN,
    mode_pin: MODE_PIN,
    buttons: &BUTTONS,
    release_on_shutdown: &RELEASE_ON_SHUTDOWN,
};

impl PinMap {
    /// Commands that move the mechanism into `phase`.
    pub fn phase_commands(&self, phase: RelayPhase) -> impl Iterator<Item = PinCommand> + '_ {
        self.phase_pins.iter().map(move |pin| pin.command_for(phase))
    }

    /// Status lamp commands sent when a link session starts.
    #[must_use]
    pub const fn announce_commands(&self, use_real_time: bool) -> [PinCommand; 2] {
        [PinCommand::on(self.ready_pin), self.mode_command(use_real_time)]
    }

    /// Mode lamp command mirroring `use_real_time`.
    #[must_use]
    pub const fn mode_command(&self, use_real_time: bool) -> PinCommand {
        PinCommand::new(self.mode_pin, PinLevel::from_on(use_real_time))
    }

    /// Commands switching every output off, in pin order.
    pub fn release_commands(&self) -> impl Iterator<Item = PinCommand> + '_ {
        self.release_on_shutdown.iter().copied().map(PinCommand::off)
    }

    /// Builds the input dispatch table from the button bindings.
    #[must_use]
    pub fn dispatch(&self) -> PinDispatch {
        let mut dispatch = PinDispatch::new();
        for binding in self.buttons {
            // Bindings outside the controller's pin range are skipped.
            let _ = dispatch.bind(binding.pin, binding.edge, binding.action);
        }
        dispatch
    }
}

impl Default for PinMap {
    fn default() -> Self {
        PIN_MAP
    }
}

/// Raised when a binding names a pin the controller does not have.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PinOutOfRange(pub PinId);

impl fmt::Display for PinOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pin {} outside 0..{MAX_PINS}", self.0)
    }
}

/// Single-consumer table from `(pin, edge)` to a button action.
///
/// Each slot holds at most one action. Binding an occupied slot replaces the
/// previous action and hands it back to the caller.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PinDispatch {
    slots: [[Option<ButtonAction>; 2]; MAX_PINS],
}

impl PinDispatch {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [[None; 2]; MAX_PINS],
        }
    }

    /// Binds `action` to `(pin, edge)`, returning the action it replaced.
    pub fn bind(
        &mut self,
        pin: PinId,
        edge: PinEdge,
        action: ButtonAction,
    ) -> Result<Option<ButtonAction>, PinOutOfRange> {
        let slot = self.slot_mut(pin, edge)?;
        Ok(slot.replace(action))
    }

    /// Action bound to `(pin, edge)`, if any.
    #[must_use]
    pub fn lookup(&self, pin: PinId, edge: PinEdge) -> Option<ButtonAction> {
        self.slots
            .get(usize::from(pin))
            .and_then(|slots| slots[edge.slot()])
    }

    fn slot_mut(
        &mut self,
        pin: PinId,
        edge: PinEdge,
    ) -> Result<&mut Option<ButtonAction>, PinOutOfRange> {
        self.slots
            .get_mut(usize::from(pin))
            .map(|slots| &mut slots[edge.slot()])
            .ok_or(PinOutOfRange(pin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_on_energizes_primary_pins() {
        let commands: [PinCommand; 4] = {
            let mut iter = PIN_MAP.phase_commands(RelayPhase::On);
            core::array::from_fn(|_| iter.next().unwrap())
        };
        assert_eq!(
            commands,
            [
                PinCommand::on(0),
                PinCommand::on(1),
                PinCommand::on(4),
                PinCommand::off(5),
            ]
        );
    }

    #[test]
    fn phase_off_inverts_every_pin() {
        for (on, off) in PIN_MAP
            .phase_commands(RelayPhase::On)
            .zip(PIN_MAP.phase_commands(RelayPhase::Off))
        {
            assert_eq!(on.pin, off.pin);
            assert_ne!(on.level, off.level);
        }
    }

    #[test]
    fn default_dispatch_binds_release_edges() {
        let dispatch = PIN_MAP.dispatch();
        assert_eq!(dispatch.lookup(0, PinEdge::Off), Some(ButtonAction::StepMinute));
        assert_eq!(dispatch.lookup(1, PinEdge::Off), Some(ButtonAction::StepHour));
        assert_eq!(dispatch.lookup(2, PinEdge::Off), Some(ButtonAction::ToggleRealTime));
        assert_eq!(dispatch.lookup(3, PinEdge::Off), Some(ButtonAction::Shutdown));
        assert_eq!(dispatch.lookup(0, PinEdge::On), None);
        assert_eq!(dispatch.lookup(7, PinEdge::Off), None);
        assert_eq!(dispatch.lookup(200, PinEdge::Off), None);
    }

    #[test]
    fn last_binding_wins() {
        let mut dispatch = PinDispatch::new();
        assert_eq!(dispatch.bind(4, PinEdge::Off, ButtonAction::StepHour), Ok(None));
        assert_eq!(
            dispatch.bind(4, PinEdge::Off, ButtonAction::Shutdown),
            Ok(Some(ButtonAction::StepHour))
        );
        assert_eq!(dispatch.lookup(4, PinEdge::Off), Some(ButtonAction::Shutdown));
        assert_eq!(dispatch.lookup(4, PinEdge::On), None);
        assert_eq!(
            dispatch.bind(8, PinEdge::On, ButtonAction::StepMinute),
            Err(PinOutOfRange(8))
        );
    }

    #[test]
    fn announce_reflects_mode() {
        assert_eq!(
            PIN_MAP.announce_commands(true),
            [PinCommand::on(READY_PIN), PinCommand::on(MODE_PIN)]
        );
        assert_eq!(
            PIN_MAP.announce_commands(false),
            [PinCommand::on(READY_PIN), PinCommand::off(MODE_PIN)]
        );
    }
}

//! Virtual wheels: continuous controllers played with three buttons.
//!
//! A [`Wheel`] turns the state of a top / middle / bottom button group into
//! a target value, then ramps its current value toward that target by at
//! most one step per cooldown window. The ramp rate limit is what bounds
//! the outgoing controller message rate.
//!
//! The [`WheelBank`] holds the board's three wheels. Modulation and
//! pitch-bend share one button group and a toggle decides which of the two
//! is live; velocity has its own group and is always live.

use crate::buttons::{ButtonId, ButtonState, ButtonTable};
use crate::config::{WheelConfig, CC_COOLDOWN_US};
use crate::error::ConfigError;
use crate::midi::{MidiTransport, CC_MODULATION};

/// The three buttons that play one wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonGroup {
    pub top: ButtonId,
    pub middle: ButtonId,
    pub bottom: ButtonId,
}

impl ButtonGroup {
    /// Read the group's state out of the button table.
    pub fn state<const N: usize>(&self, table: &ButtonTable<N>) -> GroupState {
        GroupState {
            top: table.get(self.top),
            middle: table.get(self.middle),
            bottom: table.get(self.bottom),
        }
    }
}

/// Snapshot of one button group for a single control-loop pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GroupState {
    pub top: ButtonState,
    pub middle: ButtonState,
    pub bottom: ButtonState,
}

impl GroupState {
    /// Convenience for tests and menus: `(top, middle, bottom)` held.
    pub fn held(top: bool, middle: bool, bottom: bool) -> Self {
        let held = |pressed| ButtonState {
            pressed,
            previous: pressed,
        };
        Self {
            top: held(top),
            middle: held(middle),
            bottom: held(bottom),
        }
    }
}

/// One smoothed controller.
///
/// # Examples
///
/// ```
/// use hexboard_core::{GroupState, Wheel, WheelConfig};
///
/// let mut wheel = Wheel::new(WheelConfig::MODULATION).unwrap();
/// wheel.set_target(false, GroupState::held(true, false, false));
/// assert_eq!(wheel.target(), 127);
///
/// assert!(wheel.advance(0));
/// assert_eq!(wheel.value(), 8);
/// // Inside the cooldown window nothing moves.
/// assert!(!wheel.advance(1_000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Wheel {
    config: WheelConfig,
    current: i16,
    target: i16,
    last_changed_us: Option<u64>,
}

impl Wheel {
    /// Create a wheel resting at its default value.
    pub fn new(config: WheelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            current: config.default,
            target: config.default,
            last_changed_us: None,
        })
    }

    pub fn value(&self) -> i16 {
        self.current
    }

    pub fn target(&self) -> i16 {
        self.target
    }

    pub fn config(&self) -> &WheelConfig {
        &self.config
    }

    /// Change the ramp speed.
    ///
    /// # Errors
    /// [`ConfigError::InvalidWheel`] if `step` is not positive.
    pub fn set_step(&mut self, step: i16) -> Result<(), ConfigError> {
        if step <= 0 {
            return Err(ConfigError::InvalidWheel);
        }
        self.config.step = step;
        Ok(())
    }

    pub fn set_sticky(&mut self, sticky: bool) {
        self.config.sticky = sticky;
    }

    /// Recompute the target from the button group.
    ///
    /// Absolute mode reads the three held flags as a position on the wheel:
    ///
    /// ```text
    ///   top mid bot   target
    ///    1   0   0    max
    ///    1   1   0    (3·max + min) / 4
    ///    0   1   0    midpoint      (also 1 1 1)
    ///    0   1   1    (max + 3·min) / 4
    ///    0   0   1    min
    ///    0   0   0    sticky ? current : default   (also 1 0 1)
    /// ```
    ///
    /// In alternate mode, holding the middle button switches to stepping:
    /// a fresh press of top or bottom moves the target one step up or down.
    /// Without the middle button, top/bottom select max/min, both select
    /// the default, and none keeps the current value.
    pub fn set_target(&mut self, alternate: bool, buttons: GroupState) {
        let (min, max) = (self.config.min as i32, self.config.max as i32);
        let top = buttons.top.pressed;
        let middle = buttons.middle.pressed;
        let bottom = buttons.bottom.pressed;

        let resting = if self.config.sticky {
            self.current
        } else {
            self.config.default
        };

        self.target = if alternate {
            if middle {
                let mut stepped = self.current as i32;
                if buttons.top.is_new_press() {
                    stepped += self.config.step as i32;
                }
                if buttons.bottom.is_new_press() {
                    stepped -= self.config.step as i32;
                }
                stepped.clamp(min, max) as i16
            } else {
                match (top, bottom) {
                    (true, false) => self.config.max,
                    (true, true) => self.config.default,
                    (false, true) => self.config.min,
                    (false, false) => self.current,
                }
            }
        } else {
            match (top, middle, bottom) {
                (true, false, false) => self.config.max,
                (true, true, false) => ((3 * max + min) / 4) as i16,
                (false, true, false) | (true, true, true) => ((max + min) / 2) as i16,
                (false, true, true) => ((max + 3 * min) / 4) as i16,
                (false, false, true) => self.config.min,
                (false, false, false) | (true, false, true) => resting,
            }
        };
    }

    /// Move one step toward the target if the cooldown has expired.
    ///
    /// Returns `true` if the value changed; the caller then emits it.
    pub fn advance(&mut self, now_us: u64) -> bool {
        let diff = self.target as i32 - self.current as i32;
        if diff == 0 {
            return false;
        }
        if let Some(last) = self.last_changed_us {
            if now_us.saturating_sub(last) < CC_COOLDOWN_US {
                return false;
            }
        }
        self.last_changed_us = Some(now_us);

        let step = self.config.step as i32;
        self.current = if diff.abs() <= step {
            self.target
        } else {
            (self.current as i32 + step * diff.signum()) as i16
        };
        true
    }
}

/// What changed during one [`WheelBank::update`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WheelUpdate {
    pub velocity: bool,
    pub modulation: bool,
    /// Sounding synth voices must be re-pitched.
    pub pitch_bend: bool,
}

/// The board's three wheels and the button groups that play them.
pub struct WheelBank {
    pub modulation: Wheel,
    pub pitch_bend: Wheel,
    pub velocity: Wheel,
    expression_group: ButtonGroup,
    velocity_group: ButtonGroup,
    pitch_bend_live: bool,
    alternate_mode: bool,
}

impl WheelBank {
    pub fn new(
        modulation: Wheel,
        pitch_bend: Wheel,
        velocity: Wheel,
        expression_group: ButtonGroup,
        velocity_group: ButtonGroup,
    ) -> Self {
        Self {
            modulation,
            pitch_bend,
            velocity,
            expression_group,
            velocity_group,
            pitch_bend_live: false,
            alternate_mode: false,
        }
    }

    /// Swap which of modulation / pitch-bend the shared group plays.
    pub fn toggle(&mut self) {
        self.pitch_bend_live = !self.pitch_bend_live;

        #[cfg(feature = "defmt")]
        defmt::info!(
            "expression wheel now {}",
            if self.pitch_bend_live { "pitch bend" } else { "modulation" }
        );
    }

    pub fn is_pitch_bend_live(&self) -> bool {
        self.pitch_bend_live
    }

    pub fn set_alternate_mode(&mut self, alternate: bool) {
        self.alternate_mode = alternate;
    }

    pub fn alternate_mode(&self) -> bool {
        self.alternate_mode
    }

    /// Run one control-loop pass over all three wheels.
    ///
    /// Modulation changes go out as CC 1 and pitch-bend changes as a
    /// pitch-bend message, both on channel 1. Velocity changes are silent;
    /// the value is picked up by the next note-on and by the mixer.
    pub fn update<const N: usize, M: MidiTransport>(
        &mut self,
        now_us: u64,
        buttons: &ButtonTable<N>,
        transport: &mut M,
    ) -> WheelUpdate {
        let mut update = WheelUpdate::default();
        let alternate = self.alternate_mode;

        self.velocity.set_target(alternate, self.velocity_group.state(buttons));
        if self.velocity.advance(now_us) {
            update.velocity = true;

            #[cfg(feature = "defmt")]
            defmt::debug!("velocity wheel -> {}", self.velocity.value());
        }

        // Both shared wheels follow the buttons; only the live one ramps.
        let expression = self.expression_group.state(buttons);
        self.modulation.set_target(alternate, expression);
        self.pitch_bend.set_target(alternate, expression);

        if self.pitch_bend_live {
            if self.pitch_bend.advance(now_us) {
                transport.pitch_bend(self.pitch_bend.value(), 1);
                update.pitch_bend = true;
            }
        } else if self.modulation.advance(now_us) {
            transport.control_change(CC_MODULATION, self.modulation_value(), 1);
            update.modulation = true;
        }
        update
    }

    /// Velocity as a MIDI data byte.
    pub fn velocity_value(&self) -> u8 {
        self.velocity.value().clamp(0, 127) as u8
    }

    /// Modulation as a MIDI data byte.
    pub fn modulation_value(&self) -> u8 {
        self.modulation.value().clamp(0, 127) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MidiMessage;
    use heapless::Vec;

    fn modulation() -> Wheel {
        Wheel::new(WheelConfig::MODULATION).unwrap()
    }

    fn settle(wheel: &mut Wheel) {
        let mut now = 0;
        while wheel.advance(now) {
            now += CC_COOLDOWN_US;
        }
    }

    // ── Targets ──────────────────────────────────────────────────────

    #[test]
    fn absolute_mode_positions() {
        let mut wheel = modulation();
        let cases = [
            ((true, false, false), 127),
            ((true, true, false), 95),
            ((false, true, false), 63),
            ((true, true, true), 63),
            ((false, true, true), 31),
            ((false, false, true), 0),
            ((false, false, false), 0),
            ((true, false, true), 0),
        ];
        for ((t, m, b), expected) in cases {
            wheel.set_target(false, GroupState::held(t, m, b));
            assert_eq!(wheel.target(), expected, "buttons {:?}", (t, m, b));
        }
    }

    #[test]
    fn pitch_bend_quartiles_are_signed() {
        let mut wheel = Wheel::new(WheelConfig::PITCH_BEND).unwrap();
        wheel.set_target(false, GroupState::held(true, true, false));
        assert_eq!(wheel.target(), 4095);
        wheel.set_target(false, GroupState::held(false, true, true));
        assert_eq!(wheel.target(), -4096);
        wheel.set_target(false, GroupState::held(false, true, false));
        assert_eq!(wheel.target(), 0);
    }

    #[test]
    fn sticky_wheel_keeps_value_on_release() {
        let mut wheel = Wheel::new(WheelConfig::VELOCITY).unwrap();
        wheel.set_target(false, GroupState::held(false, false, true));
        settle(&mut wheel);
        assert_eq!(wheel.value(), 0);

        wheel.set_target(false, GroupState::held(false, false, false));
        assert_eq!(wheel.target(), 0);
    }

    #[test]
    fn non_sticky_wheel_springs_back() {
        let mut wheel = modulation();
        wheel.set_target(false, GroupState::held(true, false, false));
        settle(&mut wheel);
        wheel.set_target(false, GroupState::held(false, false, false));
        assert_eq!(wheel.target(), 0);
    }

    #[test]
    fn alternate_step_mode_taps() {
        let mut wheel = Wheel::new(WheelConfig::VELOCITY).unwrap();
        let tap_top = GroupState {
            top: ButtonState { pressed: true, previous: false },
            middle: ButtonState { pressed: true, previous: true },
            bottom: ButtonState::default(),
        };
        wheel.set_target(true, tap_top);
        assert_eq!(wheel.target(), 104);

        // Holding the top button does not repeat the step.
        wheel.set_target(true, GroupState::held(true, true, false));
        assert_eq!(wheel.target(), 96);
    }

    #[test]
    fn alternate_step_mode_clamps() {
        let mut wheel = modulation();
        let tap_bottom = GroupState {
            top: ButtonState::default(),
            middle: ButtonState { pressed: true, previous: true },
            bottom: ButtonState { pressed: true, previous: false },
        };
        wheel.set_target(true, tap_bottom);
        assert_eq!(wheel.target(), 0);
    }

    #[test]
    fn alternate_target_mode() {
        let mut wheel = modulation();
        wheel.set_target(true, GroupState::held(true, false, false));
        assert_eq!(wheel.target(), 127);
        wheel.set_target(true, GroupState::held(true, false, true));
        assert_eq!(wheel.target(), 0);
        wheel.set_target(true, GroupState::held(false, false, true));
        assert_eq!(wheel.target(), 0);
        wheel.set_target(true, GroupState::held(false, false, false));
        assert_eq!(wheel.target(), wheel.value());
    }

    // ── Ramp ─────────────────────────────────────────────────────────

    #[test]
    fn ramp_is_monotonic_rate_limited_and_exact() {
        let mut wheel = modulation();
        wheel.set_target(false, GroupState::held(true, false, false));

        let mut now = 0;
        let mut previous = wheel.value();
        let mut changes = 0;
        while wheel.value() != wheel.target() {
            assert!(wheel.advance(now));
            let value = wheel.value();
            assert!(value > previous);
            assert!(value - previous <= WheelConfig::MODULATION.step);
            assert!(value <= wheel.target());

            // A second call within the window is refused.
            assert!(!wheel.advance(now + CC_COOLDOWN_US - 1));
            previous = value;
            now += CC_COOLDOWN_US;
            changes += 1;
        }
        // 127 / 8 rounds up to 16 steps.
        assert_eq!(changes, 16);
        assert!(!wheel.advance(now));
    }

    #[test]
    fn step_must_be_positive() {
        let mut wheel = modulation();
        assert_eq!(wheel.set_step(0), Err(ConfigError::InvalidWheel));
        assert!(wheel.set_step(127).is_ok());
        wheel.set_target(false, GroupState::held(true, false, false));
        assert!(wheel.advance(0));
        assert_eq!(wheel.value(), 127);
    }

    // ── Bank ─────────────────────────────────────────────────────────

    fn bank() -> WheelBank {
        WheelBank::new(
            modulation(),
            Wheel::new(WheelConfig::PITCH_BEND).unwrap(),
            Wheel::new(WheelConfig::VELOCITY).unwrap(),
            ButtonGroup {
                top: ButtonId(0),
                middle: ButtonId(1),
                bottom: ButtonId(2),
            },
            ButtonGroup {
                top: ButtonId(3),
                middle: ButtonId(4),
                bottom: ButtonId(5),
            },
        )
    }

    #[test]
    fn only_live_expression_wheel_emits() {
        let mut bank = bank();
        let mut table = ButtonTable::<8>::new();
        let mut out: Vec<MidiMessage, 8> = Vec::new();

        table.latch(ButtonId(0), true);
        let update = bank.update(0, &table, &mut out);
        assert!(update.modulation);
        assert!(!update.pitch_bend);
        assert_eq!(
            out[0],
            MidiMessage::ControlChange { channel: 1, control: 1, value: 8 }
        );
        // The hidden pitch-bend wheel tracks its target without moving.
        assert_eq!(bank.pitch_bend.target(), 8191);
        assert_eq!(bank.pitch_bend.value(), 0);

        bank.toggle();
        out.clear();
        let update = bank.update(CC_COOLDOWN_US, &table, &mut out);
        assert!(update.pitch_bend);
        assert_eq!(out[0], MidiMessage::PitchBend { channel: 1, value: 1024 });
        assert_eq!(bank.modulation.value(), 8);
    }

    #[test]
    fn modulation_below_zero_sends_zero() {
        let below_zero = WheelConfig {
            min: -16,
            ..WheelConfig::MODULATION
        };
        let mut bank = bank();
        bank.modulation = Wheel::new(below_zero).unwrap();
        let mut table = ButtonTable::<8>::new();
        let mut out: Vec<MidiMessage, 8> = Vec::new();

        table.latch(ButtonId(2), true);
        assert!(bank.update(0, &table, &mut out).modulation);
        assert_eq!(bank.modulation.value(), -8);
        assert_eq!(
            out[0],
            MidiMessage::ControlChange { channel: 1, control: 1, value: 0 }
        );
    }

    #[test]
    fn velocity_wheel_is_silent() {
        let mut bank = bank();
        let mut table = ButtonTable::<8>::new();
        let mut out: Vec<MidiMessage, 8> = Vec::new();

        table.latch(ButtonId(5), true);
        let update = bank.update(0, &table, &mut out);
        assert!(update.velocity);
        assert_eq!(bank.velocity_value(), 88);
        assert!(out.is_empty());
    }
}

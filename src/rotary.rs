//! Quadrature rotary decoder with a debounced click button.
//!
//! When the knob is turned one detent, pins A/B walk through a fixed
//! sequence and return to the neutral `1/1` state:
//!
//! ```text
//!   clockwise          1/1 → 1/0 → 0/0 → 0/1 → 1/1
//!   counterclockwise   1/1 → 0/1 → 0/0 → 1/0 → 1/1
//! ```
//!
//! A seven-state machine follows that walk. Only a walk that reaches the
//! end state of one direction counts as a turn; bounces and half turns
//! fall back to neutral without touching the accumulator.

use embedded_hal::digital::InputPin;
use heapless::Deque;

/// Capacity of the click-duration queue.
pub const CLICK_QUEUE_CAPACITY: usize = 8;

const DONE_CCW: u8 = 0b01000;
const DONE_CW: u8 = 0b10000;
const STATE_MASK: u8 = 0b00111;

/// Next state indexed by `[state][pin code]`.
///
/// The flag bits mark a completed turn; the low three bits are the state
/// the machine continues from (always neutral after a completed turn).
const TRANSITIONS: [[u8; 4]; 7] = [
    [0, 4, 1, 0],
    [2, 0, 1, 0],
    [2, 3, 1, 0],
    [2, 3, 0, DONE_CCW],
    [5, 4, 0, 0],
    [5, 4, 6, 0],
    [5, 0, 6, DONE_CW],
];

/// Position of the decoder within one detent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TurnState {
    #[default]
    Neutral,
    CcwBegin,
    CcwMiddle,
    CcwEnd,
    CwBegin,
    CwMiddle,
    CwEnd,
}

impl TurnState {
    fn from_bits(bits: u8) -> Self {
        match bits & STATE_MASK {
            1 => TurnState::CcwBegin,
            2 => TurnState::CcwMiddle,
            3 => TurnState::CcwEnd,
            4 => TurnState::CwBegin,
            5 => TurnState::CwMiddle,
            6 => TurnState::CwEnd,
            _ => TurnState::Neutral,
        }
    }

    fn bits(self) -> u8 {
        self as u8
    }
}

/// The three input pins of the knob (all pulled up, active low).
pub struct RotaryPins<P> {
    pub a: P,
    pub b: P,
    pub click: P,
}

/// Rotary knob state: turn accumulator plus a queue of click durations.
pub struct Rotary<P> {
    pins: RotaryPins<P>,
    inverted: bool,
    state: TurnState,
    turns: i32,
    click_state: u8,
    pressed_at_us: u64,
    clicks: Deque<u64, CLICK_QUEUE_CAPACITY>,
}

impl<P> Rotary<P> {
    /// Wrap the knob pins. The decoder starts in the neutral state.
    pub fn new(pins: RotaryPins<P>) -> Self {
        Self {
            pins,
            inverted: false,
            state: TurnState::Neutral,
            turns: 0,
            click_state: 0,
            pressed_at_us: 0,
            clicks: Deque::new(),
        }
    }

    /// Swap the roles of pins A and B.
    ///
    /// Later board revisions wire the quadrature pins the other way round.
    pub fn invert_direction(&mut self, inverted: bool) {
        self.inverted = inverted;
    }

    /// Current decoder state.
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Completed turns not yet drained (positive = clockwise).
    pub fn pending_turns(&self) -> i32 {
        self.turns
    }

    /// Drain one unit from the turn accumulator.
    ///
    /// Returns `+1`, `-1` or `0`. A fast spin is never lost, it is handed
    /// out one detent per call.
    pub fn take_turn(&mut self) -> i8 {
        let step = self.turns.signum();
        self.turns -= step;
        step as i8
    }

    /// Pop the oldest recorded click duration in microseconds.
    ///
    /// The duration runs from the poll that first saw the button debounced
    /// down (`0b11`) to the poll that saw it released (`0b10`). It is not
    /// re-stamped on later `0b11` samples, so a long hold reports the whole
    /// hold rather than a single poll period.
    pub fn take_click(&mut self) -> Option<u64> {
        self.clicks.pop_front()
    }

    fn step(&mut self, a: bool, b: bool) {
        let (a, b) = (a as usize, b as usize);
        let code = if self.inverted {
            (a << 1) | b
        } else {
            (b << 1) | a
        };
        let next = TRANSITIONS[self.state.bits() as usize][code];
        if next & DONE_CW != 0 {
            self.turns = self.turns.saturating_add(1);
        }
        if next & DONE_CCW != 0 {
            self.turns = self.turns.saturating_sub(1);
        }
        self.state = TurnState::from_bits(next);
    }

    fn step_click(&mut self, pressed: bool, now_us: u64) {
        let previous = self.click_state;
        self.click_state = ((previous << 1) | pressed as u8) & 0b11;
        match (previous, self.click_state) {
            (p, 0b11) if p != 0b11 => self.pressed_at_us = now_us,
            (0b11, 0b10) => {
                let duration = now_us.saturating_sub(self.pressed_at_us);
                if self.clicks.push_back(duration).is_err() {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("click queue full, dropped click of {}us", duration);
                }
            }
            _ => {}
        }
    }
}

impl<P> Rotary<P>
where
    P: InputPin,
{
    /// Sample the three pins once.
    ///
    /// `now_us` timestamps the click edges. Pin errors are returned as the
    /// HAL reports them and leave the decoder state untouched.
    pub fn poll(&mut self, now_us: u64) -> Result<(), P::Error> {
        let a = self.pins.a.is_high()?;
        let b = self.pins.b.is_high()?;
        let pressed = self.pins.click.is_low()?;
        self.step(a, b);
        self.step_click(pressed, now_us);
        Ok(())
    }
}

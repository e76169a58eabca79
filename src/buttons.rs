//! Per-key press state derived from completed matrix snapshots.
//!
//! The control loop copies each complete scan into a [`ButtonTable`] and
//! immediately releases the scanner. Everything downstream (notes, wheels,
//! command keys) reads this table, never the live matrix.

use crate::scanner::{KeyMatrix, MatrixIo};

/// Index of a hardware key in the [`ButtonTable`].
///
/// Wheels and command logic hold these instead of references into the
/// table, so the table itself stays singly owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonId(pub u16);

impl ButtonId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What happened to a key between the last two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonEvent {
    Idle,
    NewPress,
    Released,
    Held,
}

/// Current and previous press state of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonState {
    pub pressed: bool,
    pub previous: bool,
}

impl ButtonState {
    /// Shift the current state into `previous` and store the new reading.
    pub fn latch(&mut self, pressed: bool) {
        self.previous = self.pressed;
        self.pressed = pressed;
    }

    pub fn event(&self) -> ButtonEvent {
        match (self.pressed, self.previous) {
            (true, false) => ButtonEvent::NewPress,
            (false, true) => ButtonEvent::Released,
            (true, true) => ButtonEvent::Held,
            (false, false) => ButtonEvent::Idle,
        }
    }

    pub fn is_new_press(&self) -> bool {
        self.event() == ButtonEvent::NewPress
    }
}

/// Press state for every hardware key on the board.
pub struct ButtonTable<const N: usize> {
    states: [ButtonState; N],
}

impl<const N: usize> Default for ButtonTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ButtonTable<N> {
    pub fn new() -> Self {
        Self {
            states: [ButtonState::default(); N],
        }
    }

    /// State of one key. Unknown ids read as idle.
    pub fn get(&self, id: ButtonId) -> ButtonState {
        self.states.get(id.index()).copied().unwrap_or_default()
    }

    /// Latch a new reading for one key. Unknown ids are ignored.
    pub fn latch(&mut self, id: ButtonId, pressed: bool) {
        if let Some(state) = self.states.get_mut(id.index()) {
            state.latch(pressed);
        }
    }

    /// Iterate `(id, state)` over all keys.
    pub fn iter(&self) -> impl Iterator<Item = (ButtonId, ButtonState)> + '_ {
        self.states
            .iter()
            .enumerate()
            .map(|(i, s)| (ButtonId(i as u16), *s))
    }

    /// Copy a completed snapshot out of `matrix` and release the scanner.
    ///
    /// A cell reading of 0 (pulled low) means pressed. Returns `false`
    /// without touching anything if the current pass is still running.
    pub fn refresh<IO: MatrixIo>(&mut self, matrix: &mut KeyMatrix<IO, N>) -> bool {
        match matrix.take_snapshot() {
            Some(snapshot) => {
                self.latch_snapshot(&snapshot);
                true
            }
            None => false,
        }
    }

    /// Latch every key from a snapshot already copied out of the scanner.
    ///
    /// A cell reading of 0 (pulled low) means pressed.
    pub fn latch_snapshot(&mut self, snapshot: &[u16; N]) {
        for (state, &level) in self.states.iter_mut().zip(snapshot.iter()) {
            state.latch(level == 0);
        }
    }
}

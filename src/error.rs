//! Error types for setup-time configuration.
//!
//! Runtime resource exhaustion (no free MIDI channel, no free synth voice)
//! is deliberately *not* an error: it is logged and reported as a value by
//! the allocator. Only inconsistencies that must stop the board before the
//! scheduler starts are represented here.

use core::fmt;

/// Configuration problems detected while constructing the core objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A tick or task period of zero microseconds was requested.
    ZeroPeriod,
    /// The scheduler's fixed task list is full.
    TooManyTasks,
    /// Tasks cannot be registered (or the alarm re-armed) after `start()`.
    AlreadyStarted,
    /// Matrix geometry does not match the cell storage
    /// (`columns << mux_bits` must equal the cell count).
    InvalidMatrix,
    /// Polyphony must be between 1 and [`MAX_POLYPHONY`](crate::config::MAX_POLYPHONY).
    InvalidPolyphony,
    /// Audio output index is out of bounds.
    InvalidOutput,
    /// Key index is out of bounds for the board.
    InvalidKey,
    /// Wheel step must be positive and the default must lie within range.
    InvalidWheel,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::ZeroPeriod => write!(f, "Period must be non-zero"),
            ConfigError::TooManyTasks => write!(f, "Scheduler task list is full"),
            ConfigError::AlreadyStarted => write!(f, "Scheduler already started"),
            ConfigError::InvalidMatrix => write!(f, "Matrix size does not match columns and mux lines"),
            ConfigError::InvalidPolyphony => write!(f, "Polyphony out of range"),
            ConfigError::InvalidOutput => write!(f, "Audio output index out of range"),
            ConfigError::InvalidKey => write!(f, "Key index out of range"),
            ConfigError::InvalidWheel => write!(f, "Wheel step or default out of range"),
        }
    }
}

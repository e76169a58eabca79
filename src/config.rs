//! Board timing, sizing and controller configuration.
//!
//! [`HardwareConfig`] is the single source of timing and geometry for the
//! background jobs; [`WheelConfig`] describes one virtual wheel. Both
//! `Default`/associated constants reproduce the shipping HexBoard values.

use crate::error::ConfigError;

/// Minimum time between two smoothed controller updates (about 1/30 s).
pub const CC_COOLDOWN_US: u64 = 32_768;

/// Interval between arpeggiator steps (about a 1/32 note at 114 BPM).
pub const ARPEGGIO_INTERVAL_US: u64 = 65_536;

/// Hard upper bound on simultaneously sounding synth voices.
pub const MAX_POLYPHONY: usize = 8;

/// Pitch-bend wheel range applied to the local synth, in semitones.
pub const SYNTH_PITCH_BEND_SEMITONES: f32 = 2.0;

/// Pitch-bend range requested from MIDI receivers for per-note retuning.
pub const MPE_PITCH_BEND_SEMITONES: u8 = 2;

/// Slots in the output sample ring. One slot is reserved by the queue, so
/// at most `SAMPLE_BUFFER_CAPACITY - 1` samples are pending at once.
pub const SAMPLE_BUFFER_CAPACITY: usize = 512;

/// Hardware keys on the HexBoard: 10 column lines × 2^4 multiplexer states.
pub const BOARD_KEY_COUNT: usize = 160;

/// Timing and geometry of the background jobs.
///
/// [`HardwareConfig::default()`] reproduces the HexBoard v1.1 wiring:
/// 10 column pins, 4 multiplexer pins scanned mux-first, a 31.25 kHz audio
/// target and 8 synth voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HardwareConfig {
    /// How often the rotary pins are sampled. Default: 768 µs.
    pub rotary_period_us: u32,
    /// Settling time after switching a key-matrix cell. Default: 16 µs.
    pub key_reset_period_us: u32,
    /// Requested audio sample rate. Default: 31 250 Hz.
    pub target_sample_rate_hz: u32,
    /// Number of column selector lines. Default: 10.
    pub columns: usize,
    /// Number of multiplexer selector lines. Default: 4 (16 states).
    pub mux_bits: u8,
    /// Cycle the multiplexer before advancing the column. Default: `true`.
    pub mux_first: bool,
    /// Local synth polyphony. Default: 8, max [`MAX_POLYPHONY`].
    pub polyphony: u8,
    /// Swap the quadrature pins (v1.2 boards are wired the other way round).
    pub invert_rotary: bool,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            rotary_period_us: 768,
            key_reset_period_us: 16,
            target_sample_rate_hz: 31_250,
            columns: 10,
            mux_bits: 4,
            mux_first: true,
            polyphony: MAX_POLYPHONY as u8,
            invert_rotary: false,
        }
    }
}

impl HardwareConfig {
    /// The scheduler tick.
    ///
    /// Formula: `max(500_000 / target_sample_rate_hz, key_reset_period_us)`,
    /// i.e. half the audio period or the key settling time, whichever is
    /// longer. The audio period is then an exact multiple (2×) of the tick.
    pub fn tick_us(&self) -> u32 {
        let half_period = 500_000 / self.target_sample_rate_hz.max(1);
        half_period.max(self.key_reset_period_us)
    }

    /// Period of the audio output job: two ticks.
    pub fn audio_period_us(&self) -> u32 {
        2 * self.tick_us()
    }

    /// Sample rate actually achieved after rounding to whole ticks.
    pub fn actual_sample_rate_hz(&self) -> u32 {
        1_000_000 / self.audio_period_us()
    }

    /// Number of multiplexer states (`2^mux_bits`).
    pub fn mux_states(&self) -> usize {
        1 << self.mux_bits
    }

    /// Number of matrix cells (`columns × 2^mux_bits`).
    pub fn key_count(&self) -> usize {
        self.columns << self.mux_bits
    }

    /// Check the setup-time invariants before anything is constructed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rotary_period_us == 0 || self.key_reset_period_us == 0 {
            return Err(ConfigError::ZeroPeriod);
        }
        if self.target_sample_rate_hz == 0 || self.target_sample_rate_hz > 500_000 {
            return Err(ConfigError::ZeroPeriod);
        }
        if self.columns == 0 || self.mux_bits > 8 {
            return Err(ConfigError::InvalidMatrix);
        }
        if self.polyphony == 0 || self.polyphony as usize > MAX_POLYPHONY {
            return Err(ConfigError::InvalidPolyphony);
        }
        Ok(())
    }
}

/// Range and behaviour of one virtual wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WheelConfig {
    /// Lowest value (inclusive).
    pub min: i16,
    /// Highest value (inclusive).
    pub max: i16,
    /// Snap-back value when no button is held and the wheel is not sticky.
    pub default: i16,
    /// Largest change per update.
    pub step: i16,
    /// Keep the current value when no button is held.
    pub sticky: bool,
}

impl WheelConfig {
    /// Modulation wheel: CC 1, 0–127, springs back to 0.
    pub const MODULATION: Self = Self {
        min: 0,
        max: 127,
        default: 0,
        step: 8,
        sticky: false,
    };

    /// Pitch-bend wheel: 14-bit signed, springs back to centre.
    pub const PITCH_BEND: Self = Self {
        min: -8192,
        max: 8191,
        default: 0,
        step: 1024,
        sticky: false,
    };

    /// Velocity wheel: 0–127, starts at 96 and stays where it is left.
    pub const VELOCITY: Self = Self {
        min: 0,
        max: 127,
        default: 96,
        step: 8,
        sticky: true,
    };

    /// Check that the step is positive and the default lies within range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step <= 0 || self.min > self.max {
            return Err(ConfigError::InvalidWheel);
        }
        if self.default < self.min || self.default > self.max {
            return Err(ConfigError::InvalidWheel);
        }
        Ok(())
    }
}

use micromath::F32Ext;

use super::wavetables::{CLARINET, SINE, STRINGS};

// Hybrid waveform transition frequencies (Hz).
const SQUARE_BELOW: f32 = 220.0;
const SAW_FROM: f32 = 440.0;
const SAW_UNTIL: f32 = 880.0;
const TRIANGLE_FROM: f32 = 1760.0;

/// Shape read by every oscillator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Waveform {
    /// Square at low pitch, saw in the middle, triangle at the top.
    #[default]
    Hybrid,
    /// Duty cycle narrows from 50% to 6.25% with the modulation wheel.
    Square,
    Saw,
    Triangle,
    Sine,
    Strings,
    Clarinet,
}

/// One phase-accumulator voice.
///
/// The 16-bit counter advances by `increment` every audio sample and its
/// high byte is the phase fed to the waveform. An increment of 0 is the
/// silent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Oscillator {
    increment: u16,
    counter: u16,
    // Hybrid shape: 0 up to `a`, ramp to `b`, 255 up to `c`, ramp down.
    a: u8,
    b: u8,
    c: u8,
    rise: u16,
    fall: u16,
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::SILENT
    }
}

impl Oscillator {
    pub const SILENT: Self = Self {
        increment: 0,
        counter: 0,
        a: 127,
        b: 128,
        c: 255,
        rise: u16::MAX,
        fall: u16::MAX,
    };

    /// Tune the voice and restart its cycle.
    ///
    /// `increment = round(hz × sample_period_us × 65536 / 10^6)`, so the
    /// counter wraps `hz` times per second. Non-positive or non-finite
    /// frequencies silence the voice.
    pub fn set_frequency(&mut self, hz: f32, sample_period_us: u32) {
        self.counter = 0;
        if !hz.is_finite() || hz <= 0.0 {
            self.increment = 0;
            return;
        }
        let increment = (hz * sample_period_us as f32 * 0.065536).round();
        self.increment = increment.clamp(0.0, u16::MAX as f32) as u16;
        self.set_hybrid_breakpoints(hz);
    }

    pub fn silence(&mut self) {
        self.increment = 0;
        self.counter = 0;
    }

    pub fn is_active(&self) -> bool {
        self.increment != 0
    }

    pub fn increment(&self) -> u16 {
        self.increment
    }

    fn set_hybrid_breakpoints(&mut self, hz: f32) {
        let b = if hz < SQUARE_BELOW {
            128.0
        } else if hz < SAW_FROM {
            128.0 + 127.0 * (hz - SQUARE_BELOW) / (SAW_FROM - SQUARE_BELOW)
        } else if hz < SAW_UNTIL {
            255.0
        } else if hz < TRIANGLE_FROM {
            127.0 + 128.0 * (TRIANGLE_FROM - hz) / (TRIANGLE_FROM - SAW_UNTIL)
        } else {
            127.0
        };
        self.b = b as u8;
        if hz < SAW_FROM {
            self.a = 255 - self.b;
            self.c = 255;
        } else {
            self.a = 0;
            self.c = self.b;
        }
        self.rise = if self.a > 126 {
            u16::MAX
        } else {
            u16::MAX / (self.b as u16 - self.a as u16 - 1)
        };
        self.fall = u16::MAX / (256 - self.c as u16);
    }

    /// Advance one sample and return the phase (0–255).
    pub(super) fn next_phase(&mut self) -> u8 {
        self.counter = self.counter.wrapping_add(self.increment);
        (self.counter >> 8) as u8
    }

    /// Level of `waveform` at phase `t`.
    pub(super) fn level(&self, waveform: Waveform, t: u8, modulation: u8) -> u8 {
        match waveform {
            Waveform::Hybrid => self.hybrid(t),
            Waveform::Square => {
                let edge = 128 + modulation.min(127) as u16 * 112 / 127;
                if t as u16 >= edge {
                    255
                } else {
                    0
                }
            }
            Waveform::Saw => t,
            Waveform::Triangle => {
                if t < 128 {
                    t * 2
                } else {
                    (255 - t) * 2
                }
            }
            Waveform::Sine => SINE[t as usize],
            Waveform::Strings => STRINGS[t as usize],
            Waveform::Clarinet => CLARINET[t as usize],
        }
    }

    fn hybrid(&self, t: u8) -> u8 {
        let t32 = t as u32;
        if t <= self.a {
            0
        } else if t < self.b {
            (((t32 - self.a as u32) * self.rise as u32) >> 8).min(255) as u8
        } else if t <= self.c {
            255
        } else {
            (((256 - t32) * self.fall as u32) >> 8).min(255) as u8
        }
    }
}

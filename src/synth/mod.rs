//! Local synthesizer: oscillator bank and sample mixer.
//!
//! # Architecture
//!
//! ```text
//!   Allocator ──set_frequency(voice, hz)──► Synth ─┬─ Oscillator 1
//!                                                 ├─ Oscillator 2
//!                                                 ⋮
//!                                                 └─ Oscillator 8
//!   fill_audio ──next_sample(mode, mod, vel)──► 8-bit sample ──► ring buffer
//! ```
//!
//! Voices are numbered from 1, matching the allocator's voice pool.
//! Every active voice contributes one 8-bit level per sample; the sum is
//! scaled by an attenuation that depends on the playback mode and the
//! number of active voices, then by the velocity wheel.

mod oscillator;
pub mod wavetables;

pub use oscillator::{Oscillator, Waveform};

use crate::config::MAX_POLYPHONY;

/// Attenuation by active voice count in poly mode; index 0 is used in
/// mono and arpeggio mode.
///
/// `255 × attenuation × 127 >> 13` stays within 8 bits at full velocity.
const ATTENUATION: [u32; MAX_POLYPHONY + 1] = [64, 24, 17, 14, 12, 11, 10, 9, 8];

/// How pressed notes drive the local synth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlaybackMode {
    /// No local sound.
    Off,
    /// One voice, last pressed note wins.
    Mono,
    /// One voice cycling through the held notes.
    Arpeggio,
    /// One voice per held note, up to the polyphony limit.
    #[default]
    Poly,
}

/// The oscillator bank.
pub struct Synth {
    voices: [Oscillator; MAX_POLYPHONY],
    waveform: Waveform,
    sample_period_us: u32,
}

impl Synth {
    /// Create a silent synth producing one sample every `sample_period_us`.
    pub fn new(sample_period_us: u32) -> Self {
        Self {
            voices: [Oscillator::SILENT; MAX_POLYPHONY],
            waveform: Waveform::default(),
            sample_period_us,
        }
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    pub fn sample_period_us(&self) -> u32 {
        self.sample_period_us
    }

    /// Tune voice `voice` (1-based). Out-of-range voices are ignored.
    pub fn set_frequency(&mut self, voice: u8, hz: f32) {
        let period = self.sample_period_us;
        if let Some(osc) = self.voice_mut(voice) {
            osc.set_frequency(hz, period);
        }
    }

    pub fn silence(&mut self, voice: u8) {
        if let Some(osc) = self.voice_mut(voice) {
            osc.silence();
        }
    }

    /// Silence every voice.
    pub fn reset(&mut self) {
        for osc in self.voices.iter_mut() {
            osc.silence();
        }
    }

    pub fn voice(&self, voice: u8) -> Option<&Oscillator> {
        (voice as usize).checked_sub(1).and_then(|i| self.voices.get(i))
    }

    fn voice_mut(&mut self, voice: u8) -> Option<&mut Oscillator> {
        (voice as usize)
            .checked_sub(1)
            .and_then(move |i| self.voices.get_mut(i))
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|osc| osc.is_active()).count()
    }

    /// Advance every active voice and mix one output sample.
    pub fn next_sample(&mut self, mode: PlaybackMode, modulation: u8, velocity: u8) -> u8 {
        let waveform = self.waveform;
        let mut mix: u32 = 0;
        let mut active = 0;
        for osc in self.voices.iter_mut().filter(|osc| osc.is_active()) {
            let t = osc.next_phase();
            mix += osc.level(waveform, t, modulation) as u32;
            active += 1;
        }
        let attenuation = match mode {
            PlaybackMode::Poly => ATTENUATION[active],
            _ => ATTENUATION[0],
        };
        let scaled = (mix * attenuation * velocity.min(127) as u32) >> 13;
        scaled.min(255) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_synth_outputs_zero() {
        let mut synth = Synth::new(32);
        assert_eq!(synth.active_voices(), 0);
        assert_eq!(synth.next_sample(PlaybackMode::Poly, 0, 127), 0);
    }

    #[test]
    fn voices_are_one_based() {
        let mut synth = Synth::new(32);
        synth.set_frequency(1, 440.0);
        synth.set_frequency(0, 440.0);
        synth.set_frequency(9, 440.0);
        assert_eq!(synth.active_voices(), 1);
        assert!(synth.voice(1).is_some_and(|osc| osc.is_active()));

        synth.silence(1);
        assert_eq!(synth.active_voices(), 0);
    }

    #[test]
    fn mono_full_level_fits_eight_bits() {
        let mut synth = Synth::new(32);
        synth.set_waveform(Waveform::Square);
        synth.set_frequency(1, 100.0);
        let peak = (0..1000)
            .map(|_| synth.next_sample(PlaybackMode::Mono, 0, 127))
            .max()
            .unwrap_or(0);
        // 255 × 64 × 127 >> 13
        assert_eq!(peak, 253);
    }

    #[test]
    fn poly_mix_is_equalised() {
        let mut synth = Synth::new(32);
        synth.set_waveform(Waveform::Square);
        for voice in 1..=8 {
            synth.set_frequency(voice, 100.0);
        }
        let peak = (0..1000)
            .map(|_| synth.next_sample(PlaybackMode::Poly, 0, 127))
            .max()
            .unwrap_or(0);
        // 8 × 255 × 8 × 127 >> 13
        assert_eq!(peak, 253);
    }

    #[test]
    fn velocity_scales_output() {
        let mut synth = Synth::new(32);
        synth.set_waveform(Waveform::Square);
        synth.set_frequency(1, 100.0);
        let peak = (0..1000)
            .map(|_| synth.next_sample(PlaybackMode::Mono, 0, 0))
            .max()
            .unwrap_or(0);
        assert_eq!(peak, 0);
    }

    #[test]
    fn reset_silences_everything() {
        let mut synth = Synth::new(32);
        for voice in 1..=4 {
            synth.set_frequency(voice, 220.0 * voice as f32);
        }
        synth.reset();
        assert_eq!(synth.active_voices(), 0);
    }
}

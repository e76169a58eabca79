//! Per-key pitch data and MIDI channel policy selection.
//!
//! Tuning, scale and layout math live outside this crate. The tuning
//! collaborator hands over a fractional MIDI pitch (or a frequency) per
//! key; [`KeyPitch`] splits it into the nearest MIDI note plus a pitch-bend
//! offset and keeps the synth frequency alongside.

use micromath::F32Ext;

/// Concert A.
pub const CONCERT_A_HZ: f32 = 440.0;
/// MIDI note number of concert A.
pub const CONCERT_A_NOTE: f32 = 69.0;

/// Frequency of a (fractional) MIDI pitch.
pub fn midi_to_frequency(pitch: f32) -> f32 {
    CONCERT_A_HZ * 2.0f32.powf((pitch - CONCERT_A_NOTE) / 12.0)
}

/// Fractional MIDI pitch of a frequency.
pub fn frequency_to_midi(hz: f32) -> f32 {
    CONCERT_A_NOTE + 12.0 * (hz / CONCERT_A_HZ).log2()
}

/// Everything the allocator needs to sound one key.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyPitch {
    /// Synth frequency in Hz; 0 means the key cannot sound.
    pub frequency: f32,
    /// Nearest MIDI note, `None` if the pitch is outside the MIDI range.
    pub note: Option<u8>,
    /// Per-note bend from `note` to the exact pitch, -8192..=8191.
    pub bend: i16,
    /// Scale steps from the tonic; drives deterministic channel mapping.
    pub steps_from_tonic: i16,
    pub in_scale: bool,
}

impl Default for KeyPitch {
    fn default() -> Self {
        Self::unplayable(0, false)
    }
}

impl KeyPitch {
    /// A key that never produces sound or MIDI.
    pub const fn unplayable(steps_from_tonic: i16, in_scale: bool) -> Self {
        Self {
            frequency: 0.0,
            note: None,
            bend: 0,
            steps_from_tonic,
            in_scale,
        }
    }

    /// Split a fractional MIDI pitch into note + bend.
    ///
    /// `bend_range` is the receiver's pitch-bend range in semitones.
    /// Pitches outside `0.0..128.0` (and NaN) give an unplayable key.
    pub fn from_midi_pitch(pitch: f32, steps_from_tonic: i16, in_scale: bool, bend_range: u8) -> Self {
        if !(0.0..128.0).contains(&pitch) {
            return Self::unplayable(steps_from_tonic, in_scale);
        }
        let note = if pitch >= 127.0 { 127 } else { pitch.round() as u8 };
        let range = bend_range.max(1) as f32;
        let bend = ((pitch - note as f32) * 8192.0 / range)
            .round()
            .clamp(-8192.0, 8191.0) as i16;
        Self {
            frequency: midi_to_frequency(pitch),
            note: Some(note),
            bend,
            steps_from_tonic,
            in_scale,
        }
    }

    /// Same as [`from_midi_pitch`](Self::from_midi_pitch) for a frequency.
    ///
    /// Zero, negative and non-finite frequencies give an unplayable key.
    pub fn from_frequency(hz: f32, steps_from_tonic: i16, in_scale: bool, bend_range: u8) -> Self {
        if !hz.is_finite() || hz <= 0.0 {
            return Self::unplayable(steps_from_tonic, in_scale);
        }
        Self::from_midi_pitch(frequency_to_midi(hz), steps_from_tonic, in_scale, bend_range)
    }

    pub fn is_playable(&self) -> bool {
        self.note.is_some() && self.frequency > 0.0
    }
}

/// How MIDI channels are handed out to sounding notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelPolicy {
    /// Whole-semitone tuning: every note on channel 1, no per-note bend.
    Single,
    /// `n` distinct bend offsets: note goes to `2 + steps mod n`.
    Deterministic(u8),
    /// Too many offsets: FIFO pool of channels 2–16.
    Pool,
}

impl ChannelPolicy {
    /// Pick the policy for a tuning of `step_cents` with `cycle_length`
    /// steps per cycle.
    ///
    /// Equal divisions of the octave need `cycle / gcd(12, cycle)` bend
    /// offsets; if that fits in the 15 member channels the mapping is
    /// deterministic.
    pub fn for_tuning(step_cents: f32, cycle_length: u16) -> Self {
        if step_cents == 100.0 {
            return ChannelPolicy::Single;
        }
        if cycle_length > 0 && (cycle_length as f32 * step_cents).round() == 1200.0 {
            let offsets = cycle_length / gcd(12, cycle_length);
            if offsets <= 15 {
                return ChannelPolicy::Deterministic(offsets as u8);
            }
        }
        ChannelPolicy::Pool
    }

    /// Whether notes on this policy carry their own pitch bend.
    pub fn sends_bend(&self) -> bool {
        !matches!(self, ChannelPolicy::Single)
    }
}

fn gcd(mut a: u16, mut b: u16) -> u16 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.05
    }

    // ── Pitch conversion ─────────────────────────────────────────────

    #[test]
    fn concert_a_round_trips() {
        assert!(close(midi_to_frequency(69.0), 440.0));
        assert!(close(midi_to_frequency(81.0), 880.0));
        assert!(close(frequency_to_midi(220.0), 57.0));
    }

    #[test]
    fn quarter_tone_splits_into_note_and_bend() {
        let key = KeyPitch::from_midi_pitch(60.5, 3, true, 2);
        // 60.5 rounds away from zero to 61, then bends down a quarter tone.
        assert_eq!(key.note, Some(61));
        assert_eq!(key.bend, -2048);
        assert!(key.is_playable());
    }

    #[test]
    fn bend_respects_range() {
        let key = KeyPitch::from_midi_pitch(60.25, 0, true, 1);
        assert_eq!(key.note, Some(60));
        assert_eq!(key.bend, 2048);
    }

    #[test]
    fn top_of_range_clamps_to_127() {
        let key = KeyPitch::from_midi_pitch(127.9, 0, true, 2);
        assert_eq!(key.note, Some(127));
        assert_eq!(key.bend, 3686);
    }

    #[test]
    fn out_of_range_and_zero_frequency_are_unplayable() {
        assert!(!KeyPitch::from_midi_pitch(-0.5, 0, true, 2).is_playable());
        assert!(!KeyPitch::from_midi_pitch(128.0, 0, true, 2).is_playable());
        assert!(!KeyPitch::from_midi_pitch(f32::NAN, 0, true, 2).is_playable());
        assert!(!KeyPitch::from_frequency(0.0, 0, true, 2).is_playable());
        assert!(KeyPitch::from_frequency(261.63, 0, true, 2).is_playable());
    }

    // ── Channel policy ───────────────────────────────────────────────

    #[test]
    fn twelve_edo_uses_one_channel() {
        assert_eq!(ChannelPolicy::for_tuning(100.0, 12), ChannelPolicy::Single);
    }

    #[test]
    fn small_edos_map_deterministically() {
        // 24-EDO: 24 / gcd(12, 24) = 2 offsets.
        assert_eq!(
            ChannelPolicy::for_tuning(50.0, 24),
            ChannelPolicy::Deterministic(2)
        );
        // 19-EDO: 19 / 1 = 19 offsets, too many.
        assert_eq!(ChannelPolicy::for_tuning(1200.0 / 19.0, 19), ChannelPolicy::Pool);
        // 31-EDO needs the pool too.
        assert_eq!(ChannelPolicy::for_tuning(1200.0 / 31.0, 31), ChannelPolicy::Pool);
        // 10-EDO: 10 / 2 = 5.
        assert_eq!(
            ChannelPolicy::for_tuning(120.0, 10),
            ChannelPolicy::Deterministic(5)
        );
    }

    #[test]
    fn non_octave_tunings_use_the_pool() {
        // Bohlen-Pierce: 13 steps of ~146.3 cents per tritave.
        assert_eq!(ChannelPolicy::for_tuning(146.3, 13), ChannelPolicy::Pool);
    }
}

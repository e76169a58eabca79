//! MIDI channel and synth voice allocation.
//!
//! Every playable key is either idle or sounding. A press moves it to
//! sounding and tries to claim a MIDI channel and a synth voice; a release
//! gives both back. Running out of either is never an error: the note is
//! dropped for that resource, a warning is logged, and nothing else is
//! disturbed.
//!
//! # Channels
//!
//! The [`ChannelPolicy`] is chosen whenever the tuning changes:
//!
//! - `Single`: everything on channel 1.
//! - `Deterministic(n)`: channel `2 + steps_from_tonic mod n`, so the same
//!   pitch class always lands on the same channel.
//! - `Pool`: channels 2–16 are handed out first-in, first-out.
//!
//! # Voices
//!
//! - Poly: voices 1..=polyphony are handed out first-in, first-out.
//! - Mono / Arpeggio: voice 1 follows the most recent note; on release it
//!   falls back to the next held key in board order.

use heapless::Deque;

use crate::config::{ARPEGGIO_INTERVAL_US, MAX_POLYPHONY, SYNTH_PITCH_BEND_SEMITONES};
use crate::error::ConfigError;
use crate::midi::MidiTransport;
use crate::pitch::{ChannelPolicy, KeyPitch};
use crate::synth::{PlaybackMode, Synth};

use micromath::F32Ext;

/// Member channels of the MPE lower zone.
const POOL_CHANNELS: core::ops::RangeInclusive<u8> = 2..=16;

/// Which resources a note-on obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NoteOn {
    pub channel: Option<u8>,
    pub voice: Option<u8>,
}

/// Per-key state for the LED collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyStatus {
    pub pressed: bool,
    pub sounding: bool,
    pub in_scale: bool,
}

#[derive(Debug, Clone, Copy)]
struct KeySlot {
    pitch: KeyPitch,
    held: bool,
    // 0 = unassigned
    midi_channel: u8,
    synth_voice: u8,
}

impl KeySlot {
    const IDLE: Self = Self {
        pitch: KeyPitch::unplayable(0, false),
        held: false,
        midi_channel: 0,
        synth_voice: 0,
    };
}

/// Frequency with the pitch-bend wheel applied.
pub fn bent_frequency(hz: f32, pitch_bend: i16) -> f32 {
    hz * 2.0f32.powf(pitch_bend as f32 * SYNTH_PITCH_BEND_SEMITONES / 98_304.0)
}

/// Channel and voice bookkeeping for `N` keys.
pub struct Allocator<const N: usize> {
    keys: [KeySlot; N],
    policy: ChannelPolicy,
    channels: Deque<u8, 15>,
    mode: PlaybackMode,
    polyphony: u8,
    voices: Deque<u8, MAX_POLYPHONY>,
    mono_key: Option<usize>,
    last_arpeggio_us: u64,
    scale_lock: bool,
    bend_range: u8,
}

impl<const N: usize> Allocator<N> {
    /// Create an allocator in poly mode with the single-channel policy.
    ///
    /// # Arguments
    /// * `polyphony` — synth voices available in poly mode (1–8)
    /// * `bend_range` — pitch-bend range of the MIDI receiver in semitones
    ///
    /// # Errors
    /// [`ConfigError::InvalidPolyphony`] if `polyphony` is out of range.
    pub fn new(polyphony: u8, bend_range: u8) -> Result<Self, ConfigError> {
        if polyphony == 0 || polyphony as usize > MAX_POLYPHONY {
            return Err(ConfigError::InvalidPolyphony);
        }
        let mut allocator = Self {
            keys: [KeySlot::IDLE; N],
            policy: ChannelPolicy::Single,
            channels: Deque::new(),
            mode: PlaybackMode::Poly,
            polyphony,
            voices: Deque::new(),
            mono_key: None,
            last_arpeggio_us: 0,
            scale_lock: false,
            bend_range,
        };
        allocator.refill_voices();
        Ok(allocator)
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Store the pitch the tuning collaborator computed for `key`.
    ///
    /// Takes effect at the key's next press.
    pub fn set_key_pitch(&mut self, key: usize, pitch: KeyPitch) -> Result<(), ConfigError> {
        let slot = self.keys.get_mut(key).ok_or(ConfigError::InvalidKey)?;
        slot.pitch = pitch;
        Ok(())
    }

    pub fn key_pitch(&self, key: usize) -> Option<&KeyPitch> {
        self.keys.get(key).map(|slot| &slot.pitch)
    }

    pub fn policy(&self) -> ChannelPolicy {
        self.policy
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn bend_range(&self) -> u8 {
        self.bend_range
    }

    /// Receiver pitch-bend range, sent out at the next [`retune`](Self::retune).
    pub fn set_bend_range(&mut self, semitones: u8) {
        self.bend_range = semitones;
    }

    pub fn scale_lock(&self) -> bool {
        self.scale_lock
    }

    /// When locked, out-of-scale keys are ignored.
    pub fn set_scale_lock(&mut self, locked: bool) {
        self.scale_lock = locked;
    }

    /// Switch channel policy after a tuning change.
    ///
    /// Refills the channel pool, configures the MPE zone (15 member
    /// channels for the pool, none otherwise), silences every channel and
    /// resends the pitch-bend range. Every key loses its channel.
    pub fn retune<M: MidiTransport>(&mut self, policy: ChannelPolicy, transport: &mut M) {
        self.policy = policy;
        self.channels.clear();
        if policy == ChannelPolicy::Pool {
            for channel in POOL_CHANNELS {
                // Capacity matches the range exactly.
                let _ = self.channels.push_back(channel);
            }
            transport.set_mpe_zone(1, 15);
        } else {
            transport.set_mpe_zone(1, 0);
        }
        for channel in 1..=16 {
            transport.all_notes_off(channel);
            transport.set_pitch_bend_range(channel, self.bend_range);
        }
        for slot in self.keys.iter_mut() {
            slot.midi_channel = 0;
        }

        #[cfg(feature = "defmt")]
        defmt::info!("tuning reset, channel policy {}", policy);
    }

    /// Change how the local synth follows the keys.
    ///
    /// Silences the synth, forgets every voice assignment and refills the
    /// voice pool for poly mode.
    pub fn set_playback_mode(&mut self, mode: PlaybackMode, synth: &mut Synth) {
        self.mode = mode;
        synth.reset();
        for slot in self.keys.iter_mut() {
            slot.synth_voice = 0;
        }
        self.mono_key = None;
        self.refill_voices();

        #[cfg(feature = "defmt")]
        defmt::info!("synth reset, playback mode {}", mode);
    }

    /// Send a program change on channel 1.
    pub fn program_change<M: MidiTransport>(&mut self, program: u8, transport: &mut M) {
        transport.program_change(program & 0x7F, 1);
    }

    fn refill_voices(&mut self) {
        self.voices.clear();
        if self.mode == PlaybackMode::Poly {
            for voice in 1..=self.polyphony {
                let _ = self.voices.push_back(voice);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Note events
    // -----------------------------------------------------------------------

    /// Handle a key press.
    ///
    /// Unplayable, unknown, scale-locked and already sounding keys are
    /// ignored. Otherwise the key claims a channel (sending note-on and,
    /// for microtonal policies, its pitch bend) and a synth voice.
    pub fn note_on<M: MidiTransport>(
        &mut self,
        key: usize,
        velocity: u8,
        pitch_bend: i16,
        transport: &mut M,
        synth: &mut Synth,
    ) -> NoteOn {
        let Some(slot) = self.keys.get(key) else {
            return NoteOn::default();
        };
        if slot.held || (self.scale_lock && !slot.pitch.in_scale) {
            return NoteOn::default();
        }
        let Some(note) = slot.pitch.note.filter(|_| slot.pitch.is_playable()) else {
            #[cfg(feature = "defmt")]
            defmt::warn!("key {} is unplayable, ignored", key);
            return NoteOn::default();
        };

        self.keys[key].held = true;
        let channel = self.claim_channel(key, note, velocity, transport);
        let voice = match self.mode {
            PlaybackMode::Off => None,
            PlaybackMode::Poly => self.claim_voice(key, pitch_bend, synth),
            PlaybackMode::Mono | PlaybackMode::Arpeggio => {
                self.replace_mono(Some(key), pitch_bend, synth);
                Some(1)
            }
        };

        #[cfg(feature = "defmt")]
        defmt::debug!("note on: key {} note {} ch {} voice {}", key, note, channel, voice);

        NoteOn { channel, voice }
    }

    /// Handle a key release. Keys that are not sounding are ignored.
    pub fn note_off<M: MidiTransport>(
        &mut self,
        key: usize,
        velocity: u8,
        pitch_bend: i16,
        transport: &mut M,
        synth: &mut Synth,
    ) {
        let Some(slot) = self.keys.get_mut(key) else {
            return;
        };
        if !slot.held {
            return;
        }
        slot.held = false;

        if slot.midi_channel != 0 {
            let channel = slot.midi_channel;
            slot.midi_channel = 0;
            if let Some(note) = slot.pitch.note {
                transport.note_off(note, velocity, channel);
            }
            if self.policy == ChannelPolicy::Pool {
                let _ = self.channels.push_back(channel);
            }
        }

        match self.mode {
            PlaybackMode::Off => {}
            PlaybackMode::Poly => {
                let voice = core::mem::take(&mut self.keys[key].synth_voice);
                if voice != 0 {
                    synth.silence(voice);
                    let _ = self.voices.push_back(voice);
                }
            }
            PlaybackMode::Mono | PlaybackMode::Arpeggio => {
                if self.mono_key == Some(key) {
                    let next = self.next_held(Some(key));
                    self.replace_mono(next, pitch_bend, synth);
                }
            }
        }

        #[cfg(feature = "defmt")]
        defmt::debug!("note off: key {}", key);
    }

    /// Step the arpeggiator if its interval has elapsed.
    ///
    /// Returns `true` if the sounding key changed.
    pub fn arpeggiate(&mut self, now_us: u64, pitch_bend: i16, synth: &mut Synth) -> bool {
        if self.mode != PlaybackMode::Arpeggio {
            return false;
        }
        if now_us.saturating_sub(self.last_arpeggio_us) <= ARPEGGIO_INTERVAL_US {
            return false;
        }
        self.last_arpeggio_us = now_us;
        let previous = self.mono_key;
        let next = self.next_held(previous);
        self.replace_mono(next, pitch_bend, synth);
        next != previous
    }

    /// Re-pitch every sounding voice after a pitch-bend wheel change.
    pub fn refresh_synth_pitches(&self, pitch_bend: i16, synth: &mut Synth) {
        for slot in self.keys.iter().filter(|slot| slot.synth_voice != 0) {
            synth.set_frequency(slot.synth_voice, bent_frequency(slot.pitch.frequency, pitch_bend));
        }
    }

    fn claim_channel<M: MidiTransport>(
        &mut self,
        key: usize,
        note: u8,
        velocity: u8,
        transport: &mut M,
    ) -> Option<u8> {
        let pitch = self.keys[key].pitch;
        let channel = match self.policy {
            ChannelPolicy::Single => 1,
            ChannelPolicy::Deterministic(n) => {
                2 + pitch.steps_from_tonic.rem_euclid(n.clamp(1, 15) as i16) as u8
            }
            ChannelPolicy::Pool => match self.channels.pop_front() {
                Some(channel) => channel,
                None => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("no free MIDI channel, key {} not sent", key);
                    return None;
                }
            },
        };
        self.keys[key].midi_channel = channel;
        transport.note_on(note, velocity, channel);
        if self.policy.sends_bend() {
            transport.pitch_bend(pitch.bend, channel);
        }
        Some(channel)
    }

    fn claim_voice(&mut self, key: usize, pitch_bend: i16, synth: &mut Synth) -> Option<u8> {
        let Some(voice) = self.voices.pop_front() else {
            #[cfg(feature = "defmt")]
            defmt::warn!("all synth voices busy, key {} not played", key);
            return None;
        };
        let slot = &mut self.keys[key];
        slot.synth_voice = voice;
        synth.set_frequency(voice, bent_frequency(slot.pitch.frequency, pitch_bend));
        Some(voice)
    }

    /// Hand the single mono voice to `next` (or silence it).
    fn replace_mono(&mut self, next: Option<usize>, pitch_bend: i16, synth: &mut Synth) {
        if self.mono_key == next {
            return;
        }
        if let Some(previous) = self.mono_key {
            self.keys[previous].synth_voice = 0;
        }
        self.mono_key = next;
        match next {
            Some(key) => {
                let slot = &mut self.keys[key];
                slot.synth_voice = 1;
                synth.set_frequency(1, bent_frequency(slot.pitch.frequency, pitch_bend));
            }
            None => synth.silence(1),
        }
    }

    /// First held key after `after` in board order, wrapping around.
    ///
    /// `after` itself is the last candidate, so a lone held key is found.
    fn next_held(&self, after: Option<usize>) -> Option<usize> {
        let start = after.map_or(0, |key| key + 1);
        (start..N).chain(0..start.min(N)).find(|&key| self.keys[key].held)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn channel_of(&self, key: usize) -> Option<u8> {
        self.keys
            .get(key)
            .map(|slot| slot.midi_channel)
            .filter(|&channel| channel != 0)
    }

    pub fn voice_of(&self, key: usize) -> Option<u8> {
        self.keys
            .get(key)
            .map(|slot| slot.synth_voice)
            .filter(|&voice| voice != 0)
    }

    /// Key currently owning the mono voice.
    pub fn mono_key(&self) -> Option<usize> {
        self.mono_key
    }

    pub fn free_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn free_voices(&self) -> usize {
        self.voices.len()
    }

    /// Press / sound / scale state of `key` for LED rendering.
    pub fn key_status(&self, key: usize) -> KeyStatus {
        self.keys
            .get(key)
            .map(|slot| KeyStatus {
                pressed: slot.held,
                sounding: slot.midi_channel != 0 || slot.synth_voice != 0,
                in_scale: slot.pitch.in_scale,
            })
            .unwrap_or_default()
    }
}

//! The control-loop context object.
//!
//! [`Hexboard`] owns everything the main loop mutates: the button table,
//! the key roles, the wheels, the allocator and the synth. The interrupt
//! side (matrix scanner, rotary decoder, audio output) is owned elsewhere
//! and handed in by reference for the few operations that touch it.
//!
//! One control-loop pass is typically:
//!
//! ```text
//!   interpret_keys   → note on/off, wheel toggle
//!   update_wheels    → CC 1 / pitch bend, synth re-pitch
//!   arpeggiate       → next arpeggio step
//!   interpret_rotary → menu navigation
//!   fill_audio       → top up the sample ring
//! ```

use crate::allocator::{Allocator, KeyStatus, NoteOn};
use crate::audio::{self, SampleProducer};
use crate::buttons::{ButtonEvent, ButtonId, ButtonTable};
use crate::config::{HardwareConfig, WheelConfig, MPE_PITCH_BEND_SEMITONES};
use crate::error::ConfigError;
use crate::midi::MidiTransport;
use crate::pitch::{ChannelPolicy, KeyPitch};
use crate::rotary::Rotary;
use crate::scanner::{KeyMatrix, MatrixIo};
use crate::synth::{PlaybackMode, Synth};
use crate::wheel::{ButtonGroup, Wheel, WheelBank, WheelUpdate};

/// What a hardware key does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyRole {
    /// Matrix cell with no button behind it.
    Unused,
    /// Plays a note.
    Note,
    /// Wheel button or wheel toggle.
    Command,
}

/// Abstract menu input derived from the rotary knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NavigationEvent {
    Select,
    Up,
    Down,
}

/// Board wiring and controller settings for [`Hexboard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlConfig {
    pub hardware: HardwareConfig,
    /// Multiplexer states that have buttons wired; higher states are unused.
    pub wired_mux_states: u8,
    /// Buttons playing the velocity wheel.
    pub velocity_buttons: ButtonGroup,
    /// Buttons playing the modulation / pitch-bend wheel.
    pub expression_buttons: ButtonGroup,
    /// Swaps the expression buttons between modulation and pitch bend.
    pub wheel_toggle: ButtonId,
    pub modulation: WheelConfig,
    pub pitch_bend: WheelConfig,
    pub velocity: WheelConfig,
}

impl Default for ControlConfig {
    /// HexBoard v1.1: the seven command buttons sit in column 0 on even
    /// multiplexer states 0–12; states 14 and 15 are not wired.
    fn default() -> Self {
        Self {
            hardware: HardwareConfig::default(),
            wired_mux_states: 14,
            velocity_buttons: ButtonGroup {
                top: ButtonId(0),
                middle: ButtonId(2),
                bottom: ButtonId(4),
            },
            expression_buttons: ButtonGroup {
                top: ButtonId(8),
                middle: ButtonId(10),
                bottom: ButtonId(12),
            },
            wheel_toggle: ButtonId(6),
            modulation: WheelConfig::MODULATION,
            pitch_bend: WheelConfig::PITCH_BEND,
            velocity: WheelConfig::VELOCITY,
        }
    }
}

impl ControlConfig {
    fn command_buttons(&self) -> [ButtonId; 7] {
        [
            self.velocity_buttons.top,
            self.velocity_buttons.middle,
            self.velocity_buttons.bottom,
            self.wheel_toggle,
            self.expression_buttons.top,
            self.expression_buttons.middle,
            self.expression_buttons.bottom,
        ]
    }
}

/// Control-loop state for an `N`-key board.
pub struct Hexboard<const N: usize> {
    config: ControlConfig,
    buttons: ButtonTable<N>,
    roles: [KeyRole; N],
    wheels: WheelBank,
    allocator: Allocator<N>,
    synth: Synth,
}

impl<const N: usize> Hexboard<N> {
    /// Build the context from a validated configuration.
    ///
    /// # Errors
    /// * any [`HardwareConfig::validate`] error
    /// * [`ConfigError::InvalidMatrix`] if the matrix size is not `N`
    /// * [`ConfigError::InvalidKey`] if a command button is out of range
    /// * [`ConfigError::InvalidWheel`] for a bad wheel configuration
    pub fn new(config: ControlConfig) -> Result<Self, ConfigError> {
        let hardware = config.hardware;
        hardware.validate()?;
        if hardware.key_count() != N {
            return Err(ConfigError::InvalidMatrix);
        }

        let commands = config.command_buttons();
        if commands.iter().any(|id| id.index() >= N) {
            return Err(ConfigError::InvalidKey);
        }

        let mux_states = hardware.mux_states();
        let mut roles = [KeyRole::Note; N];
        for (key, role) in roles.iter_mut().enumerate() {
            if key % mux_states >= config.wired_mux_states as usize {
                *role = KeyRole::Unused;
            }
        }
        for id in commands {
            roles[id.index()] = KeyRole::Command;
        }

        let wheels = WheelBank::new(
            Wheel::new(config.modulation)?,
            Wheel::new(config.pitch_bend)?,
            Wheel::new(config.velocity)?,
            config.expression_buttons,
            config.velocity_buttons,
        );

        #[cfg(feature = "defmt")]
        defmt::info!(
            "hexboard: {} keys, tick {}us, {} Hz audio",
            N,
            hardware.tick_us(),
            hardware.actual_sample_rate_hz()
        );

        Ok(Self {
            config,
            buttons: ButtonTable::new(),
            roles,
            wheels,
            allocator: Allocator::new(hardware.polyphony, MPE_PITCH_BEND_SEMITONES)?,
            synth: Synth::new(hardware.audio_period_us()),
        })
    }

    // -----------------------------------------------------------------------
    // Control-loop passes
    // -----------------------------------------------------------------------

    /// Consume a completed scan and act on every key that changed.
    ///
    /// Returns `false` (doing nothing) while the scan is still running.
    pub fn interpret_keys<IO: MatrixIo, M: MidiTransport>(
        &mut self,
        matrix: &mut KeyMatrix<IO, N>,
        transport: &mut M,
    ) -> bool {
        match matrix.take_snapshot() {
            Some(snapshot) => {
                self.interpret_snapshot(&snapshot, transport);
                true
            }
            None => false,
        }
    }

    /// Act on a snapshot already copied out of the scanner.
    ///
    /// Used when the scanner sits behind a lock shared with the tick
    /// interrupt: only [`KeyMatrix::take_snapshot`] runs under the lock and
    /// the note handling runs here, after it is released.
    pub fn interpret_snapshot<M: MidiTransport>(&mut self, snapshot: &[u16; N], transport: &mut M) {
        self.buttons.latch_snapshot(snapshot);
        let velocity = self.wheels.velocity_value();
        let pitch_bend = self.wheels.pitch_bend.value();

        for key in 0..N {
            let id = ButtonId(key as u16);
            match (self.roles[key], self.buttons.get(id).event()) {
                (KeyRole::Command, ButtonEvent::NewPress) if id == self.config.wheel_toggle => {
                    self.wheels.toggle();
                }
                (KeyRole::Note, ButtonEvent::NewPress) => {
                    self.allocator
                        .note_on(key, velocity, pitch_bend, transport, &mut self.synth);
                }
                (KeyRole::Note, ButtonEvent::Released) => {
                    self.allocator
                        .note_off(key, velocity, pitch_bend, transport, &mut self.synth);
                }
                _ => {}
            }
        }
    }

    /// One wheel pass. A pitch-bend change re-pitches the sounding voices.
    pub fn update_wheels<M: MidiTransport>(&mut self, now_us: u64, transport: &mut M) -> WheelUpdate {
        let update = self.wheels.update(now_us, &self.buttons, transport);
        if update.pitch_bend {
            self.allocator
                .refresh_synth_pitches(self.wheels.pitch_bend.value(), &mut self.synth);
        }
        update
    }

    pub fn arpeggiate(&mut self, now_us: u64) -> bool {
        let pitch_bend = self.wheels.pitch_bend.value();
        self.allocator.arpeggiate(now_us, pitch_bend, &mut self.synth)
    }

    /// Turn queued knob input into one navigation event.
    ///
    /// A pending click wins; turns stay queued for later calls.
    pub fn interpret_rotary<P>(&mut self, rotary: &mut Rotary<P>) -> Option<NavigationEvent> {
        if rotary.take_click().is_some() {
            return Some(NavigationEvent::Select);
        }
        match rotary.take_turn() {
            1 => Some(NavigationEvent::Up),
            -1 => Some(NavigationEvent::Down),
            _ => None,
        }
    }

    /// Top up the sample ring. Returns the number of samples written.
    pub fn fill_audio(&mut self, producer: &mut SampleProducer<'_>) -> usize {
        audio::fill(
            &mut self.synth,
            producer,
            self.allocator.mode(),
            self.wheels.modulation_value(),
            self.wheels.velocity_value(),
        )
    }

    // -----------------------------------------------------------------------
    // Collaborator entry points
    // -----------------------------------------------------------------------

    /// Pitch for one key, from the tuning collaborator.
    pub fn set_key_pitch(&mut self, key: usize, pitch: KeyPitch) -> Result<(), ConfigError> {
        self.allocator.set_key_pitch(key, pitch)
    }

    pub fn retune<M: MidiTransport>(&mut self, policy: ChannelPolicy, transport: &mut M) {
        self.allocator.retune(policy, transport);
    }

    pub fn set_playback_mode(&mut self, mode: PlaybackMode) {
        self.allocator.set_playback_mode(mode, &mut self.synth);
    }

    /// Key state for LED rendering. `pressed` reflects the physical button.
    pub fn key_status(&self, key: usize) -> KeyStatus {
        let status = self.allocator.key_status(key);
        KeyStatus {
            pressed: self.buttons.get(ButtonId(key as u16)).pressed,
            ..status
        }
    }

    /// Manually play a note, e.g. from a menu preview.
    ///
    /// The note holds its channel and voice until [`stop`](Self::stop) is
    /// called for the same key. A physical release of that key stops it too.
    pub fn play<M: MidiTransport>(&mut self, key: usize, transport: &mut M) -> NoteOn {
        let velocity = self.wheels.velocity_value();
        let pitch_bend = self.wheels.pitch_bend.value();
        self.allocator
            .note_on(key, velocity, pitch_bend, transport, &mut self.synth)
    }

    /// Stop a note started by [`play`](Self::play). Keys that are not
    /// sounding are ignored.
    pub fn stop<M: MidiTransport>(&mut self, key: usize, transport: &mut M) {
        let velocity = self.wheels.velocity_value();
        let pitch_bend = self.wheels.pitch_bend.value();
        self.allocator
            .note_off(key, velocity, pitch_bend, transport, &mut self.synth);
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn key_role(&self, key: usize) -> KeyRole {
        self.roles.get(key).copied().unwrap_or(KeyRole::Unused)
    }

    pub fn buttons(&self) -> &ButtonTable<N> {
        &self.buttons
    }

    pub fn wheels(&self) -> &WheelBank {
        &self.wheels
    }

    pub fn wheels_mut(&mut self) -> &mut WheelBank {
        &mut self.wheels
    }

    pub fn allocator(&self) -> &Allocator<N> {
        &self.allocator
    }

    pub fn allocator_mut(&mut self) -> &mut Allocator<N> {
        &mut self.allocator
    }

    pub fn synth(&self) -> &Synth {
        &self.synth
    }

    pub fn synth_mut(&mut self) -> &mut Synth {
        &mut self.synth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SampleQueue;
    use crate::config::{BOARD_KEY_COUNT, CC_COOLDOWN_US};
    use crate::midi::MidiMessage;
    use crate::rotary::RotaryPins;
    use crate::scanner::ScanOrder;
    use core::cell::Cell;
    use embedded_hal::digital::{ErrorType, InputPin};
    use heapless::Vec;

    type Board = Hexboard<BOARD_KEY_COUNT>;
    type Out = Vec<MidiMessage, 256>;

    /// Board matrix with a settable set of pressed keys.
    struct Keys {
        pressed: [bool; BOARD_KEY_COUNT],
        mux: u8,
    }

    impl MatrixIo for Keys {
        type Error = core::convert::Infallible;

        fn select_mux(&mut self, state: u8) -> Result<(), Self::Error> {
            self.mux = state;
            Ok(())
        }

        fn select_column(&mut self, _: usize, _: usize) -> Result<(), Self::Error> {
            Ok(())
        }

        fn read(&mut self, column: usize) -> Result<u16, Self::Error> {
            let key = (column << 4) | self.mux as usize;
            Ok(if self.pressed[key] { 0 } else { 1 })
        }
    }

    fn matrix() -> KeyMatrix<Keys, BOARD_KEY_COUNT> {
        let keys = Keys {
            pressed: [false; BOARD_KEY_COUNT],
            mux: 0,
        };
        KeyMatrix::new(keys, 10, 4, ScanOrder::MuxFirst).unwrap()
    }

    fn scan(matrix: &mut KeyMatrix<Keys, BOARD_KEY_COUNT>, pressed: &[usize]) {
        let keys = matrix.io_mut();
        keys.pressed = [false; BOARD_KEY_COUNT];
        for &key in pressed {
            keys.pressed[key] = true;
        }
        for _ in 0..BOARD_KEY_COUNT {
            matrix.poll().unwrap();
        }
    }

    fn board() -> Board {
        let mut board = Board::new(ControlConfig::default()).unwrap();
        for key in 0..BOARD_KEY_COUNT {
            let pitch = KeyPitch::from_midi_pitch(36.0 + (key % 64) as f32, key as i16, true, 2);
            board.set_key_pitch(key, pitch).unwrap();
        }
        board
    }

    // ── Setup ────────────────────────────────────────────────────────

    #[test]
    fn board_roles() {
        let board = board();
        for key in [0, 2, 4, 6, 8, 10, 12] {
            assert_eq!(board.key_role(key), KeyRole::Command);
        }
        assert_eq!(board.key_role(1), KeyRole::Note);
        assert_eq!(board.key_role(14), KeyRole::Unused);
        assert_eq!(board.key_role(31), KeyRole::Unused);
        assert_eq!(board.key_role(16), KeyRole::Note);
    }

    #[test]
    fn rejects_mismatched_board_size() {
        assert!(matches!(
            Hexboard::<64>::new(ControlConfig::default()),
            Err(ConfigError::InvalidMatrix)
        ));
    }

    // ── Keys ─────────────────────────────────────────────────────────

    #[test]
    fn note_keys_play_and_release() {
        let mut board = board();
        let mut matrix = matrix();
        let mut out = Out::new();

        assert!(!board.interpret_keys(&mut matrix, &mut out));

        scan(&mut matrix, &[17]);
        assert!(board.interpret_keys(&mut matrix, &mut out));
        assert_eq!(
            out.as_slice(),
            &[MidiMessage::NoteOn { channel: 1, note: 53, velocity: 96 }]
        );
        assert!(board.key_status(17).sounding);

        out.clear();
        scan(&mut matrix, &[]);
        board.interpret_keys(&mut matrix, &mut out);
        assert_eq!(
            out.as_slice(),
            &[MidiMessage::NoteOff { channel: 1, note: 53, velocity: 96 }]
        );
        assert!(!board.key_status(17).sounding);
    }

    #[test]
    fn snapshot_copied_out_plays_like_a_scan() {
        let mut board = board();
        let mut out = Out::new();

        let mut snapshot = [1u16; BOARD_KEY_COUNT];
        snapshot[17] = 0;
        board.interpret_snapshot(&snapshot, &mut out);
        assert_eq!(
            out.as_slice(),
            &[MidiMessage::NoteOn { channel: 1, note: 53, velocity: 96 }]
        );

        out.clear();
        board.interpret_snapshot(&snapshot, &mut out);
        assert!(out.is_empty());

        board.interpret_snapshot(&[1; BOARD_KEY_COUNT], &mut out);
        assert_eq!(
            out.as_slice(),
            &[MidiMessage::NoteOff { channel: 1, note: 53, velocity: 96 }]
        );
    }

    #[test]
    fn played_note_stops_and_returns_to_pool() {
        let mut board = board();
        let mut out = Out::new();
        let voices = board.allocator().free_voices();
        let channels = board.allocator().free_channels();

        board.play(20, &mut out);
        assert!(board.key_status(20).sounding);
        assert!(!board.key_status(20).pressed);
        assert_eq!(board.allocator().free_voices(), voices - 1);

        board.stop(20, &mut out);
        assert_eq!(
            out.as_slice(),
            &[
                MidiMessage::NoteOn { channel: 1, note: 56, velocity: 96 },
                MidiMessage::NoteOff { channel: 1, note: 56, velocity: 96 },
            ]
        );
        assert!(!board.key_status(20).sounding);
        assert_eq!(board.allocator().free_voices(), voices);
        assert_eq!(board.allocator().free_channels(), channels);

        // A second stop finds nothing to release.
        out.clear();
        board.stop(20, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn command_and_unused_keys_send_nothing() {
        let mut board = board();
        let mut matrix = matrix();
        let mut out = Out::new();

        scan(&mut matrix, &[0, 14, 15]);
        board.interpret_keys(&mut matrix, &mut out);
        assert!(out.is_empty());
        assert!(board.key_status(0).pressed);
    }

    #[test]
    fn toggle_button_swaps_expression_wheel() {
        let mut board = board();
        let mut matrix = matrix();
        let mut out = Out::new();

        scan(&mut matrix, &[6]);
        board.interpret_keys(&mut matrix, &mut out);
        assert!(board.wheels().is_pitch_bend_live());

        // Holding the toggle does not flip it back.
        scan(&mut matrix, &[6]);
        board.interpret_keys(&mut matrix, &mut out);
        assert!(board.wheels().is_pitch_bend_live());
    }

    // ── Wheels ───────────────────────────────────────────────────────

    #[test]
    fn pitch_bend_wheel_emits_and_repitches() {
        let mut board = board();
        let mut matrix = matrix();
        let mut out = Out::new();

        scan(&mut matrix, &[6, 17]);
        board.interpret_keys(&mut matrix, &mut out);
        let before = board.synth().voice(1).map(|osc| osc.increment()).unwrap_or(0);

        // Expression top button: bend up.
        scan(&mut matrix, &[8, 17]);
        board.interpret_keys(&mut matrix, &mut out);
        out.clear();
        let update = board.update_wheels(0, &mut out);
        assert!(update.pitch_bend);
        assert_eq!(out[0], MidiMessage::PitchBend { channel: 1, value: 1024 });

        let after = board.synth().voice(1).map(|osc| osc.increment()).unwrap_or(0);
        assert!(after > before);
    }

    #[test]
    fn velocity_wheel_sets_note_velocity() {
        let mut board = board();
        let mut matrix = matrix();
        let mut out = Out::new();

        // Velocity top button ramps toward 127.
        scan(&mut matrix, &[0]);
        board.interpret_keys(&mut matrix, &mut out);
        let mut now = 0;
        for _ in 0..4 {
            board.update_wheels(now, &mut out);
            now += CC_COOLDOWN_US;
        }
        assert_eq!(board.wheels().velocity_value(), 127);

        out.clear();
        scan(&mut matrix, &[17]);
        board.interpret_keys(&mut matrix, &mut out);
        assert_eq!(out[0], MidiMessage::NoteOn { channel: 1, note: 53, velocity: 127 });
    }

    // ── Rotary and audio ─────────────────────────────────────────────

    struct Level<'a>(&'a Cell<bool>);

    impl ErrorType for Level<'_> {
        type Error = core::convert::Infallible;
    }

    impl InputPin for Level<'_> {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            Ok(self.0.get())
        }

        fn is_low(&mut self) -> Result<bool, Self::Error> {
            Ok(!self.0.get())
        }
    }

    #[test]
    fn rotary_click_then_turn() {
        let mut board = board();
        let (a, b, click) = (Cell::new(true), Cell::new(true), Cell::new(true));
        let mut rotary = Rotary::new(RotaryPins {
            a: Level(&a),
            b: Level(&b),
            click: Level(&click),
        });

        for (pa, pb, pc) in [
            (true, false, false),
            (false, false, false),
            (false, true, true),
            (true, true, true),
        ] {
            a.set(pa);
            b.set(pb);
            click.set(pc);
            rotary.poll(0).unwrap();
        }

        assert_eq!(board.interpret_rotary(&mut rotary), Some(NavigationEvent::Select));
        assert_eq!(board.interpret_rotary(&mut rotary), Some(NavigationEvent::Up));
        assert_eq!(board.interpret_rotary(&mut rotary), None);
    }

    #[test]
    fn fill_audio_renders_sounding_notes() {
        let mut board = board();
        let mut matrix = matrix();
        let mut out = Out::new();
        let mut queue = SampleQueue::new();
        let (mut producer, mut consumer) = queue.split();

        scan(&mut matrix, &[17]);
        board.interpret_keys(&mut matrix, &mut out);
        assert!(board.fill_audio(&mut producer) > 0);

        let mut peak = 0;
        while let Some(sample) = consumer.dequeue() {
            peak = peak.max(sample);
        }
        assert!(peak > 0);
    }
}

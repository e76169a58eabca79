//! Real-time control core for the HexBoard isomorphic MIDI controller.
//!
//! A single periodic interrupt drives three background jobs (audio output,
//! rotary polling and key-matrix scanning) through the [`Scheduler`]. The
//! main control loop drains their results through the [`Hexboard`] context
//! object, which turns button presses into MIDI traffic and synth voices.
//!
//! # Architecture
//!
//! ```text
//!  tick ──► Scheduler ──► AudioOut::poll   (1st, sample-rate critical)
//!                    ├──► Rotary::poll     (2nd, input drop risk)
//!                    └──► KeyMatrix::poll  (3rd, loose timing)
//!
//!  control loop ──► Hexboard::interpret_keys ──► Allocator ──► MidiTransport
//!               ├─► Hexboard::update_wheels  ──► WheelBank ──► MidiTransport
//!               ├─► Hexboard::interpret_rotary ──► menu collaborator
//!               └─► Hexboard::fill_audio ──► Synth ──► sample ring ──► AudioOut
//! ```
//!
//! The two execution contexts share state only through explicit protocols:
//! the scanner's pause-until-resumed flag, the single-producer /
//! single-consumer sample ring, and short critical sections around the
//! rotary accumulators.
//!
//! # `no_std` Compatibility
//!
//! No heap allocation is used anywhere. Every queue is a fixed-capacity
//! [`heapless`] container. The optional `defmt` feature enables structured
//! logging for embedded targets.

#![no_std]

pub mod allocator;
pub mod audio;
pub mod buttons;
pub mod config;
pub mod control;
pub mod error;
pub mod midi;
pub mod pitch;
pub mod rotary;
pub mod scanner;
pub mod scheduler;
pub mod synth;
pub mod wheel;

// ── Re-exports for convenience ───────────────────────────────────────────

pub use allocator::{Allocator, KeyStatus, NoteOn};
pub use audio::{AudioOut, LevelSink, SampleConsumer, SampleProducer, SampleQueue};
pub use buttons::{ButtonEvent, ButtonId, ButtonState, ButtonTable};
pub use config::{HardwareConfig, WheelConfig};
pub use control::{ControlConfig, Hexboard, KeyRole, NavigationEvent};
pub use error::ConfigError;
pub use midi::{MidiMessage, MidiTransport};
pub use pitch::{ChannelPolicy, KeyPitch};
pub use rotary::{Rotary, RotaryPins, TurnState};
pub use scanner::{KeyMatrix, MatrixIo, ScanOrder};
pub use scheduler::{Alarm, Scheduler, Task};
pub use synth::{Oscillator, PlaybackMode, Synth, Waveform};
pub use wheel::{ButtonGroup, GroupState, Wheel, WheelBank, WheelUpdate};

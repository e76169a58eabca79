//! Outbound MIDI capability.
//!
//! The core never builds protocol bytes. The allocator and the wheels talk
//! to a [`MidiTransport`]; the firmware turns the calls into USB-MIDI
//! packets and DIN serial bytes. Channels are 1-based (1–16) throughout.

use heapless::Vec;

/// Controller number of the modulation wheel.
pub const CC_MODULATION: u8 = 1;
/// Controller number of "all notes off".
pub const CC_ALL_NOTES_OFF: u8 = 123;

const CC_DATA_ENTRY_MSB: u8 = 6;
const CC_DATA_ENTRY_LSB: u8 = 38;
const CC_RPN_LSB: u8 = 100;
const CC_RPN_MSB: u8 = 101;

const RPN_PITCH_BEND_RANGE: u8 = 0;
const RPN_MPE_CONFIGURATION: u8 = 6;

/// One channel voice message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    /// Signed bend, -8192..=8191, 0 = centre.
    PitchBend { channel: u8, value: i16 },
    ControlChange { channel: u8, control: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
}

impl MidiMessage {
    /// The 1-based channel the message is addressed to.
    pub fn channel(&self) -> u8 {
        match *self {
            MidiMessage::NoteOn { channel, .. }
            | MidiMessage::NoteOff { channel, .. }
            | MidiMessage::PitchBend { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ProgramChange { channel, .. } => channel,
        }
    }

    /// Encode as a 4-byte USB-MIDI event packet on virtual cable 0.
    pub fn to_usb_packet(&self) -> [u8; 4] {
        let ch = self.channel().saturating_sub(1) & 0x0F;
        match *self {
            MidiMessage::NoteOn { note, velocity, .. } => {
                [0x09, 0x90 | ch, note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::NoteOff { note, velocity, .. } => {
                [0x08, 0x80 | ch, note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::PitchBend { value, .. } => {
                let raw = (value as i32 + 8192).clamp(0, 16383) as u16;
                [0x0E, 0xE0 | ch, (raw & 0x7F) as u8, (raw >> 7) as u8]
            }
            MidiMessage::ControlChange { control, value, .. } => {
                [0x0B, 0xB0 | ch, control & 0x7F, value & 0x7F]
            }
            MidiMessage::ProgramChange { program, .. } => [0x0C, 0xC0 | ch, program & 0x7F, 0],
        }
    }

    /// Encode as raw bytes for a 31 250 baud serial MIDI line.
    ///
    /// Every message carries its own status byte; program change is two
    /// bytes long, everything else three.
    pub fn to_serial_bytes(&self) -> Vec<u8, 3> {
        let packet = self.to_usb_packet();
        let len = match self {
            MidiMessage::ProgramChange { .. } => 2,
            _ => 3,
        };
        packet[1..=len].iter().copied().collect()
    }
}

/// Sink for outgoing MIDI traffic.
pub trait MidiTransport {
    fn note_on(&mut self, note: u8, velocity: u8, channel: u8);

    fn note_off(&mut self, note: u8, velocity: u8, channel: u8);

    /// `value` is signed, -8192..=8191.
    fn pitch_bend(&mut self, value: i16, channel: u8);

    fn control_change(&mut self, control: u8, value: u8, channel: u8);

    fn program_change(&mut self, program: u8, channel: u8);

    /// Set the pitch-bend range (RPN 0) on one channel.
    fn set_pitch_bend_range(&mut self, channel: u8, semitones: u8) {
        self.registered_parameter(RPN_PITCH_BEND_RANGE, semitones, channel);
    }

    /// Configure an MPE zone (RPN 6) on its master channel.
    ///
    /// A size of 0 turns MPE off on that zone.
    fn set_mpe_zone(&mut self, master_channel: u8, size: u8) {
        self.registered_parameter(RPN_MPE_CONFIGURATION, size, master_channel);
    }

    fn all_notes_off(&mut self, channel: u8) {
        self.control_change(CC_ALL_NOTES_OFF, 0, channel);
    }

    /// Write a registered parameter with a coarse value and close the RPN.
    fn registered_parameter(&mut self, parameter: u8, coarse: u8, channel: u8) {
        self.control_change(CC_RPN_MSB, 0, channel);
        self.control_change(CC_RPN_LSB, parameter, channel);
        self.control_change(CC_DATA_ENTRY_MSB, coarse, channel);
        self.control_change(CC_DATA_ENTRY_LSB, 0, channel);
        self.control_change(CC_RPN_MSB, 127, channel);
        self.control_change(CC_RPN_LSB, 127, channel);
    }
}

impl<T: MidiTransport + ?Sized> MidiTransport for &mut T {
    fn note_on(&mut self, note: u8, velocity: u8, channel: u8) {
        (**self).note_on(note, velocity, channel)
    }

    fn note_off(&mut self, note: u8, velocity: u8, channel: u8) {
        (**self).note_off(note, velocity, channel)
    }

    fn pitch_bend(&mut self, value: i16, channel: u8) {
        (**self).pitch_bend(value, channel)
    }

    fn control_change(&mut self, control: u8, value: u8, channel: u8) {
        (**self).control_change(control, value, channel)
    }

    fn program_change(&mut self, program: u8, channel: u8) {
        (**self).program_change(program, channel)
    }
}

/// Collect messages into a bounded batch.
///
/// The control loop fills one batch per pass and hands it to the USB task.
/// Messages beyond capacity are dropped.
impl<const N: usize> MidiTransport for Vec<MidiMessage, N> {
    fn note_on(&mut self, note: u8, velocity: u8, channel: u8) {
        push_or_drop(self, MidiMessage::NoteOn { channel, note, velocity });
    }

    fn note_off(&mut self, note: u8, velocity: u8, channel: u8) {
        push_or_drop(self, MidiMessage::NoteOff { channel, note, velocity });
    }

    fn pitch_bend(&mut self, value: i16, channel: u8) {
        push_or_drop(self, MidiMessage::PitchBend { channel, value });
    }

    fn control_change(&mut self, control: u8, value: u8, channel: u8) {
        push_or_drop(self, MidiMessage::ControlChange { channel, control, value });
    }

    fn program_change(&mut self, program: u8, channel: u8) {
        push_or_drop(self, MidiMessage::ProgramChange { channel, program });
    }
}

fn push_or_drop<const N: usize>(batch: &mut Vec<MidiMessage, N>, message: MidiMessage) {
    if let Err(_message) = batch.push(message) {
        #[cfg(feature = "defmt")]
        defmt::warn!("MIDI batch full, dropped {}", _message);
    }
}

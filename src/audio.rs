//! Sample ring buffer and the duty-cycle output drive.
//!
//! The control loop produces samples with [`fill`]; the scheduler's audio
//! job consumes exactly one per call with [`AudioOut::poll`]. The ring is a
//! single-producer / single-consumer queue, so the two sides never lock.
//! A full ring makes the producer stop (samples are skipped, never
//! overwritten). An empty ring makes the output repeat its last level.

use heapless::spsc::{Consumer, Producer, Queue};

use crate::config::SAMPLE_BUFFER_CAPACITY;
use crate::error::ConfigError;
use crate::synth::{PlaybackMode, Synth};

/// The output ring. Holds up to `SAMPLE_BUFFER_CAPACITY - 1` samples.
pub type SampleQueue = Queue<u8, SAMPLE_BUFFER_CAPACITY>;
pub type SampleProducer<'q> = Producer<'q, u8, SAMPLE_BUFFER_CAPACITY>;
pub type SampleConsumer<'q> = Consumer<'q, u8, SAMPLE_BUFFER_CAPACITY>;

/// A peripheral that outputs an 8-bit level (a PWM channel).
pub trait LevelSink {
    fn set_level(&mut self, level: u8);
}

/// Drives up to `N` level sinks from the sample ring.
pub struct AudioOut<'q, S, const N: usize> {
    samples: SampleConsumer<'q>,
    sinks: [S; N],
    enabled: [bool; N],
    level: u8,
}

impl<'q, S, const N: usize> AudioOut<'q, S, N>
where
    S: LevelSink,
{
    /// All sinks start enabled at level 0.
    pub fn new(samples: SampleConsumer<'q>, mut sinks: [S; N]) -> Self {
        for sink in sinks.iter_mut() {
            sink.set_level(0);
        }
        Self {
            samples,
            sinks,
            enabled: [true; N],
            level: 0,
        }
    }

    /// Output the next sample, or repeat the last one if the ring is empty.
    pub fn poll(&mut self) {
        if let Some(level) = self.samples.dequeue() {
            self.level = level;
        }
        for (sink, &enabled) in self.sinks.iter_mut().zip(self.enabled.iter()) {
            if enabled {
                sink.set_level(self.level);
            }
        }
    }

    /// Enable or disable one output.
    ///
    /// A disabled output is parked at level 0 and no longer written.
    ///
    /// # Errors
    /// [`ConfigError::InvalidOutput`] if `index >= N`.
    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> Result<(), ConfigError> {
        let flag = self.enabled.get_mut(index).ok_or(ConfigError::InvalidOutput)?;
        *flag = enabled;
        if !enabled {
            self.sinks[index].set_level(0);
        }
        Ok(())
    }

    pub fn is_enabled(&self, index: usize) -> bool {
        self.enabled.get(index).copied().unwrap_or(false)
    }

    /// Level most recently written.
    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn sinks(&self) -> &[S; N] {
        &self.sinks
    }
}

/// Top up the ring with freshly mixed samples until it is full.
///
/// Returns the number of samples written.
pub fn fill(
    synth: &mut Synth,
    producer: &mut SampleProducer<'_>,
    mode: PlaybackMode,
    modulation: u8,
    velocity: u8,
) -> usize {
    let mut written = 0;
    while producer.ready() {
        let sample = synth.next_sample(mode, modulation, velocity);
        if producer.enqueue(sample).is_err() {
            break;
        }
        written += 1;
    }
    written
}

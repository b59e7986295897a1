//! Playback state machine.
//!
//! Received samples are collected in a ring buffer. Playback starts once the buffer is half full and falls
//! back to silence when it runs low, until enough data arrived to resume.
use crate::gain::Mixer;
use crate::output::{AudioOutput, StatusIndicator};
use crate::ring_buffer::{self, RingBuffer};
use crate::*;

/// Fill level at which playback starts.
pub const SAFE_LEVEL: f32 = 0.5;
/// Fill level at (or below) which playback stalls.
pub const UNDERRUN_LEVEL: f32 = 0.16;
/// Fill level at which a stalled playback resumes.
pub const RECOVERY_LEVEL: f32 = 0.4;

pub const STOPPED_BLINK_PERIOD_US: u32 = 1_000_000;
pub const BUFFERING_BLINK_PERIOD_US: u32 = 500_000;
pub const STALLED_BLINK_PERIOD_US: u32 = 250_000;

// Samples are moved into the ring buffer in chunks of this size.
const INGRESS_CHUNK_SAMPLES: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlaybackState {
    Stopped,
    Buffering,
    Playing,
    Stalled,
}

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Amount of audio that the ring buffer holds, per sample rate.
    pub buffer_duration_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_duration_ms: BUFFER_DURATION_MS,
        }
    }
}

pub struct Playback<O: AudioOutput, L: StatusIndicator> {
    output: O,
    indicator: L,
    mixer: Mixer,
    ring_buffer: RingBuffer<RING_BUFFER_CAPACITY>,
    config: Config,
    state: PlaybackState,
    sample_rate_hz: u32,
    bit_depth: u8,
    steady_fill_ratio: f32,
    period: [u8; MAX_PERIOD_SAMPLE_COUNT * SAMPLE_SIZE],
}

impl<O: AudioOutput, L: StatusIndicator> Playback<O, L> {
    pub fn new(mut output: O, mut indicator: L, config: Config) -> Result<Self, ring_buffer::Error> {
        let sample_rate_hz = DEFAULT_SAMPLE_RATE_HZ;
        let bit_depth = 16;

        let ring_buffer = RingBuffer::new(
            ring_buffer_size(sample_rate_hz, config.buffer_duration_ms),
            RING_BUFFER_CAPACITY,
        )?;

        output.configure(sample_rate_hz, bit_depth);
        indicator.set_blink_period_us(STOPPED_BLINK_PERIOD_US);

        Ok(Self {
            output,
            indicator,
            mixer: Mixer::new(),
            ring_buffer,
            config,
            state: PlaybackState::Stopped,
            sample_rate_hz,
            bit_depth,
            steady_fill_ratio: 0.0,
            period: [0; MAX_PERIOD_SAMPLE_COUNT * SAMPLE_SIZE],
        })
    }

    /// Advances the state machine. Called continuously from the main loop.
    pub fn tick(&mut self) {
        match self.state {
            PlaybackState::Stopped => {}
            PlaybackState::Buffering => {
                if self.ring_buffer.fill_ratio() >= SAFE_LEVEL {
                    debug!("Buffer reached safe level, start playback");
                    self.output.start();
                    self.output.unmute();
                    self.state = PlaybackState::Playing;
                    self.indicator.led_on();
                }
            }
            PlaybackState::Stalled => {
                if self.ring_buffer.fill_ratio() >= RECOVERY_LEVEL {
                    debug!("Buffer recovered, resume playback");
                    self.state = PlaybackState::Playing;
                    self.indicator.led_on();
                } else if self.output.is_write_buffer_ready() {
                    self.output.write_buffer().fill(0);
                }
            }
            PlaybackState::Playing => {
                if !self.output.is_write_buffer_ready() {
                    return;
                }

                let fill_ratio = self.ring_buffer.fill_ratio();
                self.steady_fill_ratio = fill_ratio;

                if fill_ratio <= UNDERRUN_LEVEL {
                    debug!("Underrun at fill ratio {}, stall playback", fill_ratio);
                    self.state = PlaybackState::Stalled;
                    self.indicator.set_blink_period_us(STALLED_BLINK_PERIOD_US);
                    self.output.write_buffer().fill(0);
                } else {
                    self.play_period();
                }
            }
        }
    }

    /// Moves one output buffer worth of samples from the ring buffer through the mixer.
    fn play_period(&mut self) {
        let mut sample_count = self.output.buffer_size_frames() * CHANNEL_COUNT;
        if sample_count > MAX_PERIOD_SAMPLE_COUNT {
            warn!(
                "Output period of {} samples exceeds {}, truncated",
                sample_count, MAX_PERIOD_SAMPLE_COUNT
            );
            sample_count = MAX_PERIOD_SAMPLE_COUNT;
        }

        let buffer = self.output.write_buffer();
        let sample_count = sample_count.min(buffer.len());

        let bytes = &mut self.period[..sample_count * SAMPLE_SIZE];
        let read = self.ring_buffer.read(bytes);
        bytes[read..].fill(0);

        for (sample, word) in buffer.iter_mut().zip(bytes.chunks_exact(SAMPLE_SIZE)) {
            *sample = i32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        }

        self.mixer.apply(&mut buffer[..sample_count]);
    }

    /// (Re)starts a stream with the given bit depth, at the current sample rate.
    pub fn stream_start(&mut self, bit_depth: u8) -> Result<(), ring_buffer::Error> {
        info!("Start stream with {} bit at {} Hz", bit_depth, self.sample_rate_hz);

        self.output.stop();
        self.bit_depth = bit_depth;
        self.output.configure(self.sample_rate_hz, bit_depth);

        self.ring_buffer
            .resize(ring_buffer_size(self.sample_rate_hz, self.config.buffer_duration_ms))?;
        self.ring_buffer.clear();

        self.state = PlaybackState::Buffering;
        self.indicator.set_blink_period_us(BUFFERING_BLINK_PERIOD_US);
        Ok(())
    }

    pub fn stream_stop(&mut self) {
        debug!("Stop stream");
        self.output.stop();
        self.state = PlaybackState::Stopped;
        self.indicator.set_blink_period_us(STOPPED_BLINK_PERIOD_US);
    }

    /// Selects a new sample rate, which stops any active stream.
    pub fn set_sample_rate(&mut self, sample_rate_hz: u32) {
        debug!("Set sample rate: {} Hz", sample_rate_hz);
        self.sample_rate_hz = sample_rate_hz;
        self.stream_stop();
    }

    /// Stores received samples.
    ///
    /// Only whole frames are stored. Whatever does not fit into the ring buffer is dropped.
    pub fn on_samples_received(&mut self, samples: &[i32]) {
        let total = samples.len() * SAMPLE_SIZE;
        let mut remaining = (self.ring_buffer.free().min(total) / FRAME_SIZE) * FRAME_SIZE;
        let mut written = 0;

        for chunk in samples.chunks(INGRESS_CHUNK_SAMPLES) {
            if remaining == 0 {
                break;
            }

            let mut bytes = [0u8; INGRESS_CHUNK_SAMPLES * SAMPLE_SIZE];
            for (word, sample) in bytes.chunks_exact_mut(SAMPLE_SIZE).zip(chunk) {
                word.copy_from_slice(&sample.to_le_bytes());
            }

            let length = (chunk.len() * SAMPLE_SIZE).min(remaining);
            let count = self.ring_buffer.write(&bytes[..length]);
            remaining -= count;
            written += count;
        }

        if written != total {
            debug!("Ring buffer overflow, {} of {} bytes written", written, total);
        }

        // While playing, the level is measured right before the output consumes data.
        if self.state != PlaybackState::Playing {
            self.steady_fill_ratio = self.ring_buffer.fill_ratio();
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Buffer fill ratio, sampled at a consistent point of the playback cycle.
    pub fn steady_fill_ratio(&self) -> f32 {
        self.steady_fill_ratio
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn bit_depth(&self) -> u8 {
        self.bit_depth
    }

    pub fn fill_ratio(&self) -> f32 {
        self.ring_buffer.fill_ratio()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.ring_buffer.len()
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn mixer_mut(&mut self) -> &mut Mixer {
        &mut self.mixer
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    pub fn indicator(&self) -> &L {
        &self.indicator
    }
}

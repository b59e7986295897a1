//! I2S output on PIO0, fed through DMA by [`i2s_task`].
//!
//! The main loop fills a staging period through [`AudioOutput`]. Finished periods are queued to the task over a
//! zero-copy channel, so that the DMA never reads memory that the main loop writes.
use audio::output::AudioOutput;
use audio::{frames_per_ms, CHANNEL_COUNT, DEFAULT_SAMPLE_RATE_HZ, MAX_PERIOD_SAMPLE_COUNT};
use defmt::{debug, warn};
use embassy_rp::clocks::clk_sys_freq;
use embassy_rp::gpio::Output;
use embassy_rp::pac;
use embassy_rp::peripherals::PIO0;
use embassy_rp::pio_programs::i2s::PioI2sOut;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::zerocopy_channel::{Receiver, Sender};

use crate::{I2sPeriod, I2S_BIT_DEPTH, I2S_CHANNEL_COUNT, MAX_PERIOD_FRAMES};

const STATE_MACHINE: usize = 0;

/// Output side of the playback, owned by the main loop.
pub struct I2sOutput<'a> {
    sender: Sender<'a, NoopRawMutex, I2sPeriod>,
    /// Soft mute input of the DAC, active low.
    xsmt: Output<'a>,
    staging: [i32; MAX_PERIOD_SAMPLE_COUNT],
    staged: bool,
    running: bool,
    frames: usize,
    bit_depth: u8,
}

impl<'a> I2sOutput<'a> {
    pub fn new(sender: Sender<'a, NoopRawMutex, I2sPeriod>, mut xsmt: Output<'a>) -> Self {
        xsmt.set_low();

        Self {
            sender,
            xsmt,
            staging: [0; MAX_PERIOD_SAMPLE_COUNT],
            staged: false,
            running: false,
            frames: frames_per_ms(DEFAULT_SAMPLE_RATE_HZ),
            bit_depth: 16,
        }
    }
}

/// Converts right-aligned samples into 16 bit I2S frames.
fn pack(samples: &[i32], bit_depth: u8, period: &mut I2sPeriod) {
    let shift = bit_depth.saturating_sub(I2S_BIT_DEPTH as u8);

    period.clear();
    for frame in samples.chunks_exact(CHANNEL_COUNT) {
        let left = (frame[0] >> shift) as u16 as u32;
        let right = (frame[1] >> shift) as u16 as u32;

        // Capacity is checked against the frame count on configuration.
        let _ = period.push((left << 16) | right);
    }
}

/// Sets the state machine's clock for a sample rate, two PIO cycles per bit.
fn set_clock_divider(sample_rate_hz: u32) {
    let bit_rate = sample_rate_hz as u64 * (I2S_BIT_DEPTH * I2S_CHANNEL_COUNT) as u64;
    let divider_q8 = (clk_sys_freq() as u64 * 256 / (bit_rate * 2)) as u32;

    pac::PIO0.sm(STATE_MACHINE).clkdiv().write(|w| {
        w.set_int((divider_q8 >> 8) as u16);
        w.set_frac(divider_q8 as u8);
    });
    pac::PIO0.ctrl().modify(|w| w.set_clkdiv_restart(1 << STATE_MACHINE));
}

impl AudioOutput for I2sOutput<'_> {
    fn configure(&mut self, sample_rate_hz: u32, bit_depth: u8) {
        let frames = frames_per_ms(sample_rate_hz);
        if frames > MAX_PERIOD_FRAMES {
            warn!("Period of {} frames exceeds {}, truncated", frames, MAX_PERIOD_FRAMES);
        }

        self.frames = frames.min(MAX_PERIOD_FRAMES);
        self.bit_depth = bit_depth;
        set_clock_divider(sample_rate_hz);

        debug!("I2S configured for {} Hz, {} bit input", sample_rate_hz, bit_depth);
    }

    fn start(&mut self) {
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
        self.staged = false;
        self.xsmt.set_low();
    }

    fn unmute(&mut self) {
        self.xsmt.set_high();
    }

    fn is_write_buffer_ready(&mut self) -> bool {
        if !self.running {
            return false;
        }

        let Some(period) = self.sender.try_send() else {
            return false;
        };

        if self.staged {
            let samples = &self.staging[..self.frames * CHANNEL_COUNT];
            pack(samples, self.bit_depth, period);
            self.sender.send_done();
        }

        self.staged = true;
        true
    }

    fn write_buffer(&mut self) -> &mut [i32] {
        &mut self.staging[..self.frames * CHANNEL_COUNT]
    }

    fn buffer_size_frames(&self) -> usize {
        self.frames
    }
}

#[embassy_executor::task]
pub async fn i2s_task(
    mut i2s: PioI2sOut<'static, PIO0, STATE_MACHINE>,
    mut receiver: Receiver<'static, NoopRawMutex, I2sPeriod>,
) {
    loop {
        let period = receiver.receive().await;
        i2s.write(period).await;
        receiver.receive_done();
    }
}

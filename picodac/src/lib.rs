#![no_std]

pub mod i2s;
pub mod led;
pub mod usb_bus;

use audio::{frames_per_ms, CHANNEL_COUNT, MAX_PERIOD_SAMPLE_COUNT, MAX_SAMPLE_RATE_HZ};
use static_assertions::const_assert_eq;

// Raspberry Pi Pico with a PCM5102A board on GPIO 18 (BCK), 19 (LRCK), 20 (DIN) and 22 (XSMT).
pub const I2S_CHANNEL_COUNT: u32 = 2;
pub const I2S_BIT_DEPTH: u32 = 16;

/// Stereo frames in the longest output period (1 ms).
pub const MAX_PERIOD_FRAMES: usize = frames_per_ms(MAX_SAMPLE_RATE_HZ);

const_assert_eq!(MAX_PERIOD_FRAMES * CHANNEL_COUNT, MAX_PERIOD_SAMPLE_COUNT);

/// Output periods that are queued towards the DMA.
pub const PERIOD_COUNT: usize = 2;

/// One output period, one word per stereo frame (left in the upper half).
pub type I2sPeriod = heapless::Vec<u32, MAX_PERIOD_FRAMES>;

#![cfg_attr(not(test), no_std)]

mod fmt;

pub mod feedback;
pub mod gain;
pub mod output;
pub mod playback;
pub mod ring_buffer;

use static_assertions::const_assert;

/// Discrete sample rates offered to the host.
pub const SAMPLE_RATES_HZ: [u32; 4] = [44_100, 48_000, 88_200, 96_000];
pub const MAX_SAMPLE_RATE_HZ: u32 = 96_000;
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 48_000;

// Stereo, with every sample carried in a 32 bit container.
pub const CHANNEL_COUNT: usize = 2;
pub const SAMPLE_SIZE: usize = 4;
pub const FRAME_SIZE: usize = CHANNEL_COUNT * SAMPLE_SIZE;

/// Default amount of audio that the ring buffer absorbs.
pub const BUFFER_DURATION_MS: u32 = 16;

/// Worst-case ring buffer length, at the highest sample rate.
pub const RING_BUFFER_CAPACITY: usize = ring_buffer_size(MAX_SAMPLE_RATE_HZ, BUFFER_DURATION_MS);

/// Worst-case number of samples in one output period (1 ms).
pub const MAX_PERIOD_SAMPLE_COUNT: usize = frames_per_ms(MAX_SAMPLE_RATE_HZ) * CHANNEL_COUNT;

const_assert!(RING_BUFFER_CAPACITY % FRAME_SIZE == 0);
const_assert!(MAX_PERIOD_SAMPLE_COUNT * SAMPLE_SIZE < RING_BUFFER_CAPACITY);

/// Number of full frames that are played per millisecond.
pub const fn frames_per_ms(sample_rate_hz: u32) -> usize {
    sample_rate_hz as usize / 1000
}

/// Ring buffer length in bytes for a sample rate, rounded down to whole frames.
pub const fn ring_buffer_size(sample_rate_hz: u32, duration_ms: u32) -> usize {
    (sample_rate_hz as usize * duration_ms as usize / 1000) * FRAME_SIZE
}

pub fn is_supported_sample_rate(sample_rate_hz: u32) -> bool {
    SAMPLE_RATES_HZ.contains(&sample_rate_hz)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_sizes() {
        assert_eq!(RING_BUFFER_CAPACITY, 96 * 16 * 8);
        assert_eq!(MAX_PERIOD_SAMPLE_COUNT, 192);

        // 705.6 frames are truncated to 705.
        assert_eq!(ring_buffer_size(44_100, 16), 705 * FRAME_SIZE);
        assert_eq!(ring_buffer_size(48_000, 16), 768 * FRAME_SIZE);

        for rate in SAMPLE_RATES_HZ {
            assert!(ring_buffer_size(rate, BUFFER_DURATION_MS) <= RING_BUFFER_CAPACITY);
        }
    }

    #[test]
    fn supported_rates() {
        assert!(is_supported_sample_rate(88_200));
        assert!(!is_supported_sample_rate(32_000));
    }
}

//! Rate feedback towards the host.
//!
//! The device clock is independent of the USB clock. The buffer fill level is kept at half by reporting a
//! slightly faster or slower rate than nominal to the host [UAC 3.7.2.2].

/// Smoothing factor of the fill ratio filter.
pub const FILTER_ALPHA: f32 = 0.01;
/// Relative rate correction per unit of fill ratio error.
pub const FEEDBACK_GAIN: f32 = 0.01;
pub const TARGET_FILL_RATIO: f32 = 0.5;

/// Size of a full-speed feedback packet (16.16 format).
pub const FEEDBACK_PACKET_SIZE: usize = 4;

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FeedbackController {
    filtered_ratio: f32,
}

impl Default for FeedbackController {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedbackController {
    pub const fn new() -> Self {
        Self {
            filtered_ratio: TARGET_FILL_RATIO,
        }
    }

    /// Computes the next feedback value, in samples per frame (1 ms) as 16.16 fixed point.
    pub fn update(&mut self, is_playing: bool, steady_fill_ratio: f32, sample_rate_hz: u32) -> u32 {
        let nominal_rate_per_ms = sample_rate_hz as f32 / 1000.0;

        let rate_per_ms = if is_playing {
            self.filtered_ratio = steady_fill_ratio * FILTER_ALPHA + self.filtered_ratio * (1.0 - FILTER_ALPHA);
            let error = self.filtered_ratio - TARGET_FILL_RATIO;
            nominal_rate_per_ms * (1.0 - error * FEEDBACK_GAIN)
        } else {
            self.filtered_ratio = TARGET_FILL_RATIO;
            nominal_rate_per_ms
        };

        (rate_per_ms * 65536.0) as u32
    }

    pub fn filtered_ratio(&self) -> f32 {
        self.filtered_ratio
    }
}

/// Encodes a 16.16 feedback value for the wire.
pub fn feedback_packet(value: u32) -> [u8; FEEDBACK_PACKET_SIZE] {
    value.to_le_bytes()
}

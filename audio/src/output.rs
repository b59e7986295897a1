//! Collaborators that the playback state machine drives.
/// A double-buffered audio output (e.g. I2S via DMA).
///
/// The hardware plays one buffer while the other one is filled. Samples are interleaved left/right, one
/// 32 bit word per sample, right-aligned to the configured bit depth.
pub trait AudioOutput {
    /// Reconfigures the output. Only called while stopped.
    fn configure(&mut self, sample_rate_hz: u32, bit_depth: u8);

    fn start(&mut self);

    fn stop(&mut self);

    /// Releases the hardware mute of the DAC.
    fn unmute(&mut self);

    /// Returns `true` once per buffer that the hardware released for writing.
    fn is_write_buffer_ready(&mut self) -> bool;

    /// The buffer that the hardware plays next.
    fn write_buffer(&mut self) -> &mut [i32];

    fn buffer_size_frames(&self) -> usize;
}

/// A status LED.
pub trait StatusIndicator {
    fn set_blink_period_us(&mut self, period_us: u32);

    /// Solid on, no blinking.
    fn led_on(&mut self);
}

//! USB Audio Class 2.0 speaker with asynchronous rate feedback.
//!
//! Currently, only a single stereo output streaming interface is supported. Register the handlers with
//! [`Speaker::register`], and call [`Speaker::tick`] from the main loop.
use audio::feedback::{feedback_packet, FeedbackController};
use audio::output::{AudioOutput, StatusIndicator};
use audio::playback::Playback;
use audio::{frames_per_ms, FRAME_SIZE, MAX_SAMPLE_RATE_HZ};
use static_assertions::const_assert;

use crate::device::UsbDevice;
use crate::endpoint::Endpoints;
use crate::hal::UsbBus;
use crate::{Error, MAX_PACKET_SIZE};

mod class_codes;
mod control;
mod descriptors;
mod streaming;

pub use control::{AudioControl, AudioStreaming};
pub use descriptors::{descriptor_set, CONFIGURATION_DESCRIPTOR, DEVICE_DESCRIPTOR, STRING_DESCRIPTOR};
pub use streaming::{FeedbackEndpoint, SampleFormat, StreamEndpoint};

pub const AUDIO_CONTROL_INTERFACE: u8 = 0;
pub const AUDIO_STREAMING_INTERFACE: u8 = 1;

pub const STREAM_OUT_ENDPOINT: u8 = 0x01;
pub const FEEDBACK_IN_ENDPOINT: u8 = 0x81;

/// One frame more than nominal per packet, so that the host can catch up when asked to by feedback.
pub const AUDIO_MAX_PACKET_SIZE: usize = (frames_per_ms(MAX_SAMPLE_RATE_HZ) + 1) * FRAME_SIZE;

/// Samples in the largest packet. 16 bit samples are packed in pairs.
pub const MAX_PACKET_SAMPLE_COUNT: usize = AUDIO_MAX_PACKET_SIZE / 2;

const_assert!(AUDIO_MAX_PACKET_SIZE <= MAX_PACKET_SIZE);

/// Unit and terminal IDs.
pub mod entity {
    pub const INPUT_TERMINAL: u8 = 0x01;
    pub const FEATURE_UNIT: u8 = 0x02;
    pub const OUTPUT_TERMINAL: u8 = 0x03;
    pub const CLOCK_SOURCE: u8 = 0x04;
}

static AUDIO_CONTROL: AudioControl = AudioControl;
static AUDIO_STREAMING: AudioStreaming = AudioStreaming;
static STREAM_ENDPOINT: StreamEndpoint = StreamEndpoint;
static FEEDBACK_ENDPOINT: FeedbackEndpoint = FeedbackEndpoint;

/// Audio state behind the speaker's interfaces and endpoints.
pub struct Speaker<O: AudioOutput, L: StatusIndicator> {
    playback: Playback<O, L>,
    feedback: FeedbackController,
    format: Option<SampleFormat>,
    samples: [i32; MAX_PACKET_SAMPLE_COUNT],
}

impl<O: AudioOutput, L: StatusIndicator> Speaker<O, L> {
    pub fn new(playback: Playback<O, L>) -> Self {
        Self {
            playback,
            feedback: FeedbackController::new(),
            format: None,
            samples: [0; MAX_PACKET_SAMPLE_COUNT],
        }
    }

    /// Installs the speaker's handlers on a device that uses [`descriptor_set`].
    pub fn register<B: UsbBus>(device: &mut UsbDevice<'_, B, Self>) -> Result<(), Error> {
        device.set_interface_handler(AUDIO_CONTROL_INTERFACE, &AUDIO_CONTROL)?;
        device.set_interface_handler(AUDIO_STREAMING_INTERFACE, &AUDIO_STREAMING)?;
        device.set_endpoint_handler(STREAM_OUT_ENDPOINT, &STREAM_ENDPOINT)?;
        device.set_endpoint_handler(FEEDBACK_IN_ENDPOINT, &FEEDBACK_ENDPOINT)?;
        Ok(())
    }

    /// Advances playback.
    pub fn tick(&mut self) {
        self.playback.tick();
    }

    pub fn playback(&self) -> &Playback<O, L> {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut Playback<O, L> {
        &mut self.playback
    }

    /// Format of the selected alternate setting, `None` while streaming is idle.
    pub fn format(&self) -> Option<SampleFormat> {
        self.format
    }

    /// Computes and sends the next feedback value.
    fn send_feedback<B: UsbBus>(&mut self, endpoints: &mut Endpoints<B>) {
        let value = self.feedback.update(
            self.playback.is_playing(),
            self.playback.steady_fill_ratio(),
            self.playback.sample_rate_hz(),
        );

        if let Err(e) = endpoints.start_in(FEEDBACK_IN_ENDPOINT & 0x0F, &feedback_packet(value)) {
            trace!("Feedback not sent: {:?}", e);
        }
    }

    /// Unpacks a stream packet into the ring buffer.
    fn receive(&mut self, data: &[u8]) {
        let Some(format) = self.format else {
            return;
        };

        let count = format.unpack(data, &mut self.samples);
        self.playback.on_samples_received(&self.samples[..count]);
    }
}

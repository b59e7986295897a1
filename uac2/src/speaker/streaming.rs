//! Stream and feedback endpoints.
use audio::output::{AudioOutput, StatusIndicator};

use super::{Speaker, AUDIO_MAX_PACKET_SIZE, STREAM_OUT_ENDPOINT};
use crate::device::EndpointHandler;
use crate::endpoint::Endpoints;
use crate::hal::UsbBus;

/// Sample format of an operational alternate setting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleFormat {
    /// Two 16 bit samples per 32 bit word, left in the lower half.
    Bits16,
    /// 24 bit samples, left-justified in 32 bit words.
    Bits24,
    Bits32,
}

impl SampleFormat {
    pub fn for_alternate_setting(alternate_setting: u8) -> Option<Self> {
        match alternate_setting {
            1 => Some(SampleFormat::Bits16),
            2 => Some(SampleFormat::Bits24),
            3 => Some(SampleFormat::Bits32),
            _ => None,
        }
    }

    pub fn bit_depth(&self) -> u8 {
        match self {
            SampleFormat::Bits16 => 16,
            SampleFormat::Bits24 => 24,
            SampleFormat::Bits32 => 32,
        }
    }

    /// Unpacks little-endian packet data into right-aligned samples.
    ///
    /// Returns the number of samples written. Trailing bytes that do not form a full word are ignored.
    pub fn unpack(&self, data: &[u8], samples: &mut [i32]) -> usize {
        let words = data
            .chunks_exact(4)
            .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]));

        match self {
            SampleFormat::Bits16 => {
                let mut count = 0;
                for (word, pair) in words.zip(samples.chunks_exact_mut(2)) {
                    pair[0] = word as u16 as i16 as i32;
                    pair[1] = (word >> 16) as u16 as i16 as i32;
                    count += 2;
                }
                count
            }
            SampleFormat::Bits24 => {
                let mut count = 0;
                for (word, sample) in words.zip(samples.iter_mut()) {
                    *sample = (word as i32) >> 8;
                    count += 1;
                }
                count
            }
            SampleFormat::Bits32 => {
                let mut count = 0;
                for (word, sample) in words.zip(samples.iter_mut()) {
                    *sample = word as i32;
                    count += 1;
                }
                count
            }
        }
    }
}

/// The isochronous OUT endpoint that carries samples.
pub struct StreamEndpoint;

/// The isochronous IN endpoint that reports the device's sample rate.
pub struct FeedbackEndpoint;

fn arm_stream<B: UsbBus>(endpoints: &mut Endpoints<B>) {
    if let Err(e) = endpoints.start_out(STREAM_OUT_ENDPOINT, AUDIO_MAX_PACKET_SIZE) {
        trace!("Stream endpoint not armed: {:?}", e);
    }
}

impl<B: UsbBus, O: AudioOutput, L: StatusIndicator> EndpointHandler<B, Speaker<O, L>> for StreamEndpoint {
    fn out_complete(&self, speaker: &mut Speaker<O, L>, endpoints: &mut Endpoints<B>, data: &[u8]) {
        speaker.receive(data);
        arm_stream(endpoints);
    }

    fn halt_cleared(&self, _speaker: &mut Speaker<O, L>, endpoints: &mut Endpoints<B>) {
        arm_stream(endpoints);
    }
}

impl<B: UsbBus, O: AudioOutput, L: StatusIndicator> EndpointHandler<B, Speaker<O, L>> for FeedbackEndpoint {
    fn in_complete(&self, speaker: &mut Speaker<O, L>, endpoints: &mut Endpoints<B>) {
        speaker.send_feedback(endpoints);
    }

    fn halt_cleared(&self, speaker: &mut Speaker<O, L>, endpoints: &mut Endpoints<B>) {
        speaker.send_feedback(endpoints);
    }
}

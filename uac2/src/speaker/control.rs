//! Class requests of the audio control interface, and alternate settings of the streaming interface.
use audio::gain::Channel;
use audio::output::{AudioOutput, StatusIndicator};
use audio::{is_supported_sample_rate, SAMPLE_RATES_HZ};

use super::class_codes::*;
use super::streaming::SampleFormat;
use super::{entity, Speaker};
use crate::device::{InResponse, InterfaceHandler, OutResponse};
use crate::endpoint::Endpoints;
use crate::hal::UsbBus;
use crate::setup::SetupPacket;

/// The audio control interface, with the clock source and the feature unit.
pub struct AudioControl;

/// The audio streaming interface.
pub struct AudioStreaming;

impl<B: UsbBus, O: AudioOutput, L: StatusIndicator> InterfaceHandler<B, Speaker<O, L>> for AudioControl {
    fn control_in<'a>(&self, speaker: &mut Speaker<O, L>, req: &SetupPacket, buf: &'a mut [u8]) -> InResponse<'a> {
        let control_selector = req.control_selector();

        let len = match req.entity() {
            entity::FEATURE_UNIT => {
                let Ok(channel) = Channel::try_from(req.channel()) else {
                    trace!("Unsupported channel {}", req.channel());
                    return InResponse::Rejected;
                };
                let mixer = speaker.playback.mixer();

                match (req.request, control_selector) {
                    (CUR, FU_MUTE_CONTROL) => {
                        buf[0] = mixer.is_muted(channel).into();
                        1
                    }
                    (CUR, FU_VOLUME_CONTROL) => {
                        buf[..2].copy_from_slice(&mixer.volume(channel).to_le_bytes());
                        2
                    }
                    (RANGE, FU_VOLUME_CONTROL) => {
                        let range = mixer.volume_range(channel);
                        buf[..2].copy_from_slice(&1u16.to_le_bytes());
                        buf[2..4].copy_from_slice(&range.min.to_le_bytes());
                        buf[4..6].copy_from_slice(&range.max.to_le_bytes());
                        buf[6..8].copy_from_slice(&range.resolution.to_le_bytes());
                        8
                    }
                    _ => 0,
                }
            }
            entity::CLOCK_SOURCE => match (req.request, control_selector) {
                (CUR, CS_SAM_FREQ_CONTROL) => {
                    buf[..4].copy_from_slice(&speaker.playback.sample_rate_hz().to_le_bytes());
                    4
                }
                (CUR, CS_CLOCK_VALID_CONTROL) => {
                    buf[0] = 1;
                    1
                }
                (RANGE, CS_SAM_FREQ_CONTROL) => {
                    // Discrete rates, as one subrange per rate.
                    buf[..2].copy_from_slice(&(SAMPLE_RATES_HZ.len() as u16).to_le_bytes());
                    for (subrange, rate) in buf[2..].chunks_exact_mut(12).zip(SAMPLE_RATES_HZ) {
                        subrange[0..4].copy_from_slice(&rate.to_le_bytes());
                        subrange[4..8].copy_from_slice(&rate.to_le_bytes());
                        subrange[8..12].fill(0);
                    }
                    2 + 12 * SAMPLE_RATES_HZ.len()
                }
                _ => 0,
            },
            _ => 0,
        };

        if len == 0 {
            trace!(
                "Unsupported get request {} for entity {} and control {}",
                req.request,
                req.entity(),
                control_selector
            );
            return InResponse::Rejected;
        }

        InResponse::Accepted(&buf[..len])
    }

    fn control_out(&self, speaker: &mut Speaker<O, L>, req: &SetupPacket, data: &[u8]) -> OutResponse {
        if req.request != CUR {
            return OutResponse::Rejected;
        }

        match (req.entity(), req.control_selector(), data) {
            (entity::CLOCK_SOURCE, CS_SAM_FREQ_CONTROL, &[b0, b1, b2, b3]) => {
                let sample_rate_hz = u32::from_le_bytes([b0, b1, b2, b3]);
                if !is_supported_sample_rate(sample_rate_hz) {
                    debug!("Unsupported sample rate {} Hz", sample_rate_hz);
                    return OutResponse::Rejected;
                }

                speaker.playback.set_sample_rate(sample_rate_hz);
                OutResponse::Accepted
            }
            (entity::FEATURE_UNIT, FU_MUTE_CONTROL, &[muted]) => match Channel::try_from(req.channel()) {
                Ok(channel) => {
                    speaker.playback.mixer_mut().set_mute(channel, muted != 0);
                    OutResponse::Accepted
                }
                Err(_) => OutResponse::Rejected,
            },
            (entity::FEATURE_UNIT, FU_VOLUME_CONTROL, &[lo, hi]) => match Channel::try_from(req.channel()) {
                Ok(channel) => {
                    speaker.playback.mixer_mut().set_volume(channel, i16::from_le_bytes([lo, hi]));
                    OutResponse::Accepted
                }
                Err(_) => OutResponse::Rejected,
            },
            _ => {
                trace!(
                    "Unsupported set request for entity {} and control {} with {} bytes",
                    req.entity(),
                    req.control_selector(),
                    data.len()
                );
                OutResponse::Rejected
            }
        }
    }

    fn set_interface(
        &self,
        _speaker: &mut Speaker<O, L>,
        _endpoints: &mut Endpoints<B>,
        alternate_setting: u8,
    ) -> bool {
        alternate_setting == 0
    }
}

impl<B: UsbBus, O: AudioOutput, L: StatusIndicator> InterfaceHandler<B, Speaker<O, L>> for AudioStreaming {
    fn set_interface(&self, speaker: &mut Speaker<O, L>, endpoints: &mut Endpoints<B>, alternate_setting: u8) -> bool {
        info!("Set streaming interface alternate setting {}", alternate_setting);

        if alternate_setting > 3 {
            warn!("Unknown alternate setting {}", alternate_setting);
            return false;
        }

        speaker.playback.stream_stop();
        speaker.format = SampleFormat::for_alternate_setting(alternate_setting);

        let Some(format) = speaker.format else {
            return true;
        };

        if let Err(e) = speaker.playback.stream_start(format.bit_depth()) {
            error!("Stream start failed: {:?}", e);
            speaker.format = None;
            return false;
        }

        // The first feedback value starts the feedback cycle.
        speaker.send_feedback(endpoints);
        true
    }

    fn bus_reset(&self, speaker: &mut Speaker<O, L>) {
        speaker.playback.stream_stop();
        speaker.format = None;
    }
}

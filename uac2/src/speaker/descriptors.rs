//! Descriptors of the speaker: one configuration, with an audio control and an audio streaming interface.
//!
//! Topology: input terminal (USB stream) -> feature unit (mute and volume) -> output terminal (speaker), all
//! clocked by one programmable clock source. Alternate settings 1 to 3 carry 16, 24 and 32 bit samples.
use super::class_codes::*;
use super::{
    entity, AUDIO_CONTROL_INTERFACE, AUDIO_MAX_PACKET_SIZE, AUDIO_STREAMING_INTERFACE, FEEDBACK_IN_ENDPOINT,
    STREAM_OUT_ENDPOINT,
};
use crate::descriptor::kind;
use crate::device::DescriptorSet;
use crate::EP0_MAX_PACKET_SIZE;
use audio::feedback::FEEDBACK_PACKET_SIZE;
use static_assertions::const_assert_eq;

const VENDOR_ID: u16 = 0x1209;
const PRODUCT_ID: u16 = 0x0001;

const CONFIGURATION_LENGTH: usize = 258;
const AUDIO_CONTROL_LENGTH: usize = 64;
const STREAMING_ALTERNATE_LENGTH: usize = 53;

#[rustfmt::skip]
pub static DEVICE_DESCRIPTOR: [u8; 18] = [
    18, kind::DEVICE,
    0x00, 0x02,                             // USB 2.0
    0xEF, 0x02, 0x01,                       // Miscellaneous, with interface association
    EP0_MAX_PACKET_SIZE as u8,
    VENDOR_ID as u8, (VENDOR_ID >> 8) as u8,
    PRODUCT_ID as u8, (PRODUCT_ID >> 8) as u8,
    0x00, 0x00,                             // bcdDevice
    0, 0, 0,                                // No strings
    1,                                      // Configurations
];

/// Returned for any string index.
#[rustfmt::skip]
pub static STRING_DESCRIPTOR: [u8; 12] = [
    12, kind::STRING,
    b'd', 0, b'u', 0, b'm', 0, b'm', 0, b'y', 0,
];

#[rustfmt::skip]
const CONFIGURATION_HEADER: [u8; 9] = [
    9, kind::CONFIGURATION,
    CONFIGURATION_LENGTH as u8, (CONFIGURATION_LENGTH >> 8) as u8,
    2,                                      // Interfaces
    1,                                      // Configuration value
    0,
    0x80,                                   // Bus powered
    100 / 2,                                // 100 mA
];

#[rustfmt::skip]
const INTERFACE_ASSOCIATION: [u8; 8] = [
    8, kind::INTERFACE_ASSOCIATION,
    AUDIO_CONTROL_INTERFACE, 2,
    AUDIO_FUNCTION, FUNCTION_SUBCLASS_UNDEFINED, AF_VERSION_02_00,
    0,
];

#[rustfmt::skip]
const AUDIO_CONTROL: [u8; 9 + AUDIO_CONTROL_LENGTH] = [
    // Standard interface [UAC2 4.7.1]
    9, kind::INTERFACE, AUDIO_CONTROL_INTERFACE, 0, 0, AUDIO, AUDIOCONTROL, IP_VERSION_02_00, 0,

    // Class-specific header [UAC2 4.7.2]
    9, kind::CS_INTERFACE, HEADER,
    0x00, 0x02,                             // bcdADC 2.0
    DESKTOP_SPEAKER,
    AUDIO_CONTROL_LENGTH as u8, 0,
    0,

    // Clock source [UAC2 4.7.2.1]
    8, kind::CS_INTERFACE, CLOCK_SOURCE,
    entity::CLOCK_SOURCE,
    CLOCK_INTERNAL_PROGRAMMABLE,
    0x03,                                   // Sampling frequency is read/write
    entity::INPUT_TERMINAL,
    0,

    // Input terminal [UAC2 4.7.2.4]
    17, kind::CS_INTERFACE, INPUT_TERMINAL,
    entity::INPUT_TERMINAL,
    USB_STREAMING as u8, (USB_STREAMING >> 8) as u8,
    0,
    entity::CLOCK_SOURCE,
    2,
    FRONT_LEFT_RIGHT as u8, 0, 0, 0,
    0,
    0, 0,
    0,

    // Output terminal [UAC2 4.7.2.5]
    12, kind::CS_INTERFACE, OUTPUT_TERMINAL,
    entity::OUTPUT_TERMINAL,
    TERMINAL_DESKTOP_SPEAKER as u8, (TERMINAL_DESKTOP_SPEAKER >> 8) as u8,
    entity::INPUT_TERMINAL,
    entity::FEATURE_UNIT,
    entity::CLOCK_SOURCE,
    0, 0,
    0,

    // Feature unit [UAC2 4.7.2.8], with mute and volume read/write on master, left and right
    18, kind::CS_INTERFACE, FEATURE_UNIT,
    entity::FEATURE_UNIT,
    entity::INPUT_TERMINAL,
    0x0F, 0, 0, 0,
    0x0F, 0, 0, 0,
    0x0F, 0, 0, 0,
    0,
];

#[rustfmt::skip]
const STREAMING_IDLE: [u8; 9] = [
    9, kind::INTERFACE, AUDIO_STREAMING_INTERFACE, 0, 0, AUDIO, AUDIOSTREAMING, IP_VERSION_02_00, 0,
];

/// An operational alternate setting, with the stream endpoint and its feedback endpoint.
#[rustfmt::skip]
const fn streaming_alternate(
    alternate_setting: u8,
    subslot_size: u8,
    bit_resolution: u8,
) -> [u8; STREAMING_ALTERNATE_LENGTH] {
    [
        // Standard interface [UAC2 4.9.1]
        9, kind::INTERFACE, AUDIO_STREAMING_INTERFACE, alternate_setting, 2,
        AUDIO, AUDIOSTREAMING, IP_VERSION_02_00, 0,

        // Class-specific interface [UAC2 4.9.2]
        16, kind::CS_INTERFACE, AS_GENERAL,
        entity::INPUT_TERMINAL,
        0,
        FORMAT_TYPE_I,
        PCM as u8, 0, 0, 0,
        2,
        FRONT_LEFT_RIGHT as u8, 0, 0, 0,
        0,

        // Type I format [FMT20 2.3.1.6]
        6, kind::CS_INTERFACE, FORMAT_TYPE, FORMAT_TYPE_I, subslot_size, bit_resolution,

        // Stream endpoint [UAC2 4.10.1.1]
        7, kind::ENDPOINT, STREAM_OUT_ENDPOINT, ISOCHRONOUS_ASYNCHRONOUS_DATA,
        AUDIO_MAX_PACKET_SIZE as u8, (AUDIO_MAX_PACKET_SIZE >> 8) as u8,
        1,

        // Class-specific endpoint [UAC2 4.10.1.2], lock delay of 1 ms
        8, kind::CS_ENDPOINT, EP_GENERAL, 0, 0, 1, 1, 0,

        // Feedback endpoint [UAC2 4.10.2.1]
        7, kind::ENDPOINT, FEEDBACK_IN_ENDPOINT, ISOCHRONOUS_FEEDBACK,
        FEEDBACK_PACKET_SIZE as u8, 0,
        1,
    ]
}

pub static CONFIGURATION_DESCRIPTOR: [u8; CONFIGURATION_LENGTH] = concat(&[
    &CONFIGURATION_HEADER,
    &INTERFACE_ASSOCIATION,
    &AUDIO_CONTROL,
    &STREAMING_IDLE,
    &streaming_alternate(1, 2, 16),
    &streaming_alternate(2, 4, 24),
    &streaming_alternate(3, 4, 32),
]);

const_assert_eq!(
    CONFIGURATION_LENGTH,
    9 + 8 + 9 + AUDIO_CONTROL_LENGTH + 9 + 3 * STREAMING_ALTERNATE_LENGTH
);

const fn concat<const N: usize>(parts: &[&[u8]]) -> [u8; N] {
    let mut out = [0u8; N];
    let mut offset = 0;

    let mut i = 0;
    while i < parts.len() {
        let part = parts[i];
        let mut j = 0;
        while j < part.len() {
            out[offset] = part[j];
            offset += 1;
            j += 1;
        }
        i += 1;
    }

    if offset != N {
        ::core::panic!("Descriptor length mismatch");
    }
    out
}

pub fn descriptor_set() -> DescriptorSet<'static> {
    DescriptorSet {
        device: &DEVICE_DESCRIPTOR,
        configuration: &CONFIGURATION_DESCRIPTOR,
        string: &STRING_DESCRIPTOR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{self, Descriptors, EndpointDescriptors};

    #[test]
    fn configuration_is_well_formed() {
        assert_eq!(
            u16::from_le_bytes([CONFIGURATION_DESCRIPTOR[2], CONFIGURATION_DESCRIPTOR[3]]),
            258
        );
        assert!(Descriptors::new(&CONFIGURATION_DESCRIPTOR).all(|descriptor| descriptor.is_ok()));
        assert_eq!(descriptor::configuration_value(&CONFIGURATION_DESCRIPTOR), Ok(1));
    }

    #[test]
    fn audio_control_length_matches_header() {
        let total: usize = Descriptors::new(&CONFIGURATION_DESCRIPTOR)
            .filter_map(Result::ok)
            .filter(|descriptor| descriptor.kind == kind::CS_INTERFACE)
            .take(5)
            .map(|descriptor| descriptor.bytes.len())
            .sum();

        assert_eq!(total, AUDIO_CONTROL_LENGTH);
    }

    #[test]
    fn streaming_alternate_settings() {
        for alternate_setting in 0..=3 {
            assert!(descriptor::has_alternate_setting(
                &CONFIGURATION_DESCRIPTOR,
                AUDIO_STREAMING_INTERFACE,
                alternate_setting
            ));
        }
        assert!(!descriptor::has_alternate_setting(
            &CONFIGURATION_DESCRIPTOR,
            AUDIO_STREAMING_INTERFACE,
            4
        ));

        let endpoints: Vec<_> = EndpointDescriptors::new(&CONFIGURATION_DESCRIPTOR)
            .map(|endpoint| {
                endpoint.map(|(info, endpoint)| (info.alternate_setting, endpoint.address, endpoint.max_packet_size))
            })
            .collect();
        assert_eq!(
            endpoints,
            [
                Ok((1, 0x01, 776)),
                Ok((1, 0x81, 4)),
                Ok((2, 0x01, 776)),
                Ok((2, 0x81, 4)),
                Ok((3, 0x01, 776)),
                Ok((3, 0x81, 4)),
            ]
        );
    }

    #[test]
    fn device_descriptor() {
        assert_eq!(DEVICE_DESCRIPTOR[0] as usize, DEVICE_DESCRIPTOR.len());
        assert_eq!(u16::from_le_bytes([DEVICE_DESCRIPTOR[8], DEVICE_DESCRIPTOR[9]]), VENDOR_ID);
        assert_eq!(STRING_DESCRIPTOR[0] as usize, STRING_DESCRIPTOR.len());
    }
}

//! Codes of the USB Audio Class 2.0 [UAC2 Appendix A].
#![allow(unused)]

pub const AUDIO_FUNCTION: u8 = 0x01;
pub const FUNCTION_SUBCLASS_UNDEFINED: u8 = 0x00;
pub const AF_VERSION_02_00: u8 = 0x20;

pub const AUDIO: u8 = 0x01;
pub const AUDIOCONTROL: u8 = 0x01;
pub const AUDIOSTREAMING: u8 = 0x02;
pub const IP_VERSION_02_00: u8 = 0x20;

pub const DESKTOP_SPEAKER: u8 = 0x01;

// Audio control interface descriptor subtypes [UAC2 Table A-9]
pub const HEADER: u8 = 0x01;
pub const INPUT_TERMINAL: u8 = 0x02;
pub const OUTPUT_TERMINAL: u8 = 0x03;
pub const FEATURE_UNIT: u8 = 0x06;
pub const CLOCK_SOURCE: u8 = 0x0A;

// Audio streaming interface descriptor subtypes [UAC2 Table A-10]
pub const AS_GENERAL: u8 = 0x01;
pub const FORMAT_TYPE: u8 = 0x02;

pub const FORMAT_TYPE_I: u8 = 0x01;
pub const PCM: u32 = 0x0000_0001;

// Audio class-specific endpoint descriptor subtypes [UAC2 Table A-13]
pub const EP_GENERAL: u8 = 0x01;

// Terminal types [Termt20 Table 2-1, 2-3]
pub const USB_STREAMING: u16 = 0x0101;
pub const TERMINAL_DESKTOP_SPEAKER: u16 = 0x0304;

// Clock source attributes: internal programmable clock
pub const CLOCK_INTERNAL_PROGRAMMABLE: u8 = 0x03;

// Channel configuration: front left and front right
pub const FRONT_LEFT_RIGHT: u32 = 0x0000_0003;

// Request codes [UAC2 Table A-14]
pub const CUR: u8 = 0x01;
pub const RANGE: u8 = 0x02;

// Clock source control selectors [UAC2 Table A-17]
pub const CS_SAM_FREQ_CONTROL: u8 = 0x01;
pub const CS_CLOCK_VALID_CONTROL: u8 = 0x02;

// Feature unit control selectors [UAC2 Table A-23]
pub const FU_MUTE_CONTROL: u8 = 0x01;
pub const FU_VOLUME_CONTROL: u8 = 0x02;

// Endpoint attributes
pub const ISOCHRONOUS_ASYNCHRONOUS_DATA: u8 = 0x05;
pub const ISOCHRONOUS_FEEDBACK: u8 = 0x11;

//! Control request model [USB 9.3].
use crate::Direction;

/// Standard request codes [USB Table 9-4].
pub mod request {
    pub const GET_STATUS: u8 = 0x00;
    pub const CLEAR_FEATURE: u8 = 0x01;
    pub const SET_FEATURE: u8 = 0x03;
    pub const SET_ADDRESS: u8 = 0x05;
    pub const GET_DESCRIPTOR: u8 = 0x06;
    pub const SET_DESCRIPTOR: u8 = 0x07;
    pub const GET_CONFIGURATION: u8 = 0x08;
    pub const SET_CONFIGURATION: u8 = 0x09;
    pub const GET_INTERFACE: u8 = 0x0A;
    pub const SET_INTERFACE: u8 = 0x0B;
    pub const SYNCH_FRAME: u8 = 0x0C;
}

/// Feature selector for `CLEAR_FEATURE` on endpoints.
pub const FEATURE_ENDPOINT_HALT: u16 = 0x0000;

const DIRECTION_MASK: u8 = 0x80;
const TYPE_MASK: u8 = 0x60;
const RECIPIENT_MASK: u8 = 0x1F;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestType {
    Standard,
    Class,
    Vendor,
    Reserved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
    Reserved,
}

/// The 8 byte setup packet that starts every control transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    pub fn parse(buf: &[u8; 8]) -> Self {
        Self {
            request_type: buf[0],
            request: buf[1],
            value: u16::from_le_bytes([buf[2], buf[3]]),
            index: u16::from_le_bytes([buf[4], buf[5]]),
            length: u16::from_le_bytes([buf[6], buf[7]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        let value = self.value.to_le_bytes();
        let index = self.index.to_le_bytes();
        let length = self.length.to_le_bytes();

        [
            self.request_type,
            self.request,
            value[0],
            value[1],
            index[0],
            index[1],
            length[0],
            length[1],
        ]
    }

    pub fn direction(&self) -> Direction {
        if self.request_type & DIRECTION_MASK != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub fn request_type(&self) -> RequestType {
        match (self.request_type & TYPE_MASK) >> 5 {
            0 => RequestType::Standard,
            1 => RequestType::Class,
            2 => RequestType::Vendor,
            _ => RequestType::Reserved,
        }
    }

    pub fn recipient(&self) -> Recipient {
        match self.request_type & RECIPIENT_MASK {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            3 => Recipient::Other,
            _ => Recipient::Reserved,
        }
    }

    /// Interface number, for interface recipients.
    pub fn interface(&self) -> u8 {
        self.index as u8
    }

    /// Descriptor type, for `GET_DESCRIPTOR`.
    pub fn descriptor_type(&self) -> u8 {
        (self.value >> 8) as u8
    }

    /// Entity ID of an audio class request [UAC2 5.2.1].
    pub fn entity(&self) -> u8 {
        (self.index >> 8) as u8
    }

    /// Control selector of an audio class request.
    pub fn control_selector(&self) -> u8 {
        (self.value >> 8) as u8
    }

    /// Channel number of an audio class request.
    pub fn channel(&self) -> u8 {
        self.value as u8
    }
}

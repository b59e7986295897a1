//! Walking configuration descriptors.
use crate::Error;

/// Descriptor types [USB Table 9-5, UAC2 Table A-4].
pub mod kind {
    pub const DEVICE: u8 = 0x01;
    pub const CONFIGURATION: u8 = 0x02;
    pub const STRING: u8 = 0x03;
    pub const INTERFACE: u8 = 0x04;
    pub const ENDPOINT: u8 = 0x05;
    pub const DEVICE_QUALIFIER: u8 = 0x06;
    pub const INTERFACE_ASSOCIATION: u8 = 0x0B;
    pub const CS_INTERFACE: u8 = 0x24;
    pub const CS_ENDPOINT: u8 = 0x25;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterfaceInfo {
    pub number: u8,
    pub alternate_setting: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointInfo {
    pub address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
}

impl EndpointInfo {
    pub fn number(&self) -> u8 {
        self.address & 0x0F
    }
}

/// A descriptor inside a configuration, as (type, full body including the header).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawDescriptor<'a> {
    pub kind: u8,
    pub bytes: &'a [u8],
}

/// Iterates over the descriptors of a configuration.
///
/// Yields an error once and then stops on zero length or overrunning descriptors.
pub struct Descriptors<'a> {
    remaining: &'a [u8],
}

impl<'a> Descriptors<'a> {
    pub fn new(configuration: &'a [u8]) -> Self {
        Self {
            remaining: configuration,
        }
    }
}

impl<'a> Iterator for Descriptors<'a> {
    type Item = Result<RawDescriptor<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }

        let length = self.remaining[0] as usize;
        if length < 2 || length > self.remaining.len() {
            self.remaining = &[];
            return Some(Err(Error::MalformedDescriptor));
        }

        let (bytes, rest) = self.remaining.split_at(length);
        self.remaining = rest;

        Some(Ok(RawDescriptor { kind: bytes[1], bytes }))
    }
}

/// Iterates over the endpoints of a configuration, together with the interface that declares them.
pub struct EndpointDescriptors<'a> {
    descriptors: Descriptors<'a>,
    interface: Option<InterfaceInfo>,
}

impl<'a> EndpointDescriptors<'a> {
    pub fn new(configuration: &'a [u8]) -> Self {
        Self {
            descriptors: Descriptors::new(configuration),
            interface: None,
        }
    }
}

impl Iterator for EndpointDescriptors<'_> {
    type Item = Result<(InterfaceInfo, EndpointInfo), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let descriptor = match self.descriptors.next()? {
                Ok(descriptor) => descriptor,
                Err(error) => return Some(Err(error)),
            };

            match descriptor.kind {
                kind::INTERFACE => match parse_interface(descriptor.bytes) {
                    Ok(info) => self.interface = Some(info),
                    Err(error) => return Some(Err(error)),
                },
                kind::ENDPOINT => {
                    let Some(interface) = self.interface else {
                        return Some(Err(Error::MalformedDescriptor));
                    };
                    return Some(parse_endpoint(descriptor.bytes).map(|endpoint| (interface, endpoint)));
                }
                _ => {}
            }
        }
    }
}

/// Iterates over the interface descriptors of a configuration, one item per alternate setting.
pub fn interfaces(configuration: &[u8]) -> impl Iterator<Item = Result<InterfaceInfo, Error>> + '_ {
    Descriptors::new(configuration).filter_map(|descriptor| match descriptor {
        Ok(descriptor) if descriptor.kind == kind::INTERFACE => Some(parse_interface(descriptor.bytes)),
        Ok(_) => None,
        Err(error) => Some(Err(error)),
    })
}

/// Value of the configuration, as used by `SET_CONFIGURATION`.
pub fn configuration_value(configuration: &[u8]) -> Result<u8, Error> {
    match Descriptors::new(configuration).next() {
        Some(Ok(descriptor)) if descriptor.kind == kind::CONFIGURATION && descriptor.bytes.len() >= 9 => {
            Ok(descriptor.bytes[5])
        }
        _ => Err(Error::MalformedDescriptor),
    }
}

/// Whether the configuration declares `alternate_setting` for `interface`.
pub fn has_alternate_setting(configuration: &[u8], interface: u8, alternate_setting: u8) -> bool {
    interfaces(configuration).any(|info| {
        matches!(info, Ok(info) if info.number == interface && info.alternate_setting == alternate_setting)
    })
}

fn parse_interface(bytes: &[u8]) -> Result<InterfaceInfo, Error> {
    if bytes.len() < 9 {
        return Err(Error::MalformedDescriptor);
    }

    Ok(InterfaceInfo {
        number: bytes[2],
        alternate_setting: bytes[3],
    })
}

fn parse_endpoint(bytes: &[u8]) -> Result<EndpointInfo, Error> {
    if bytes.len() < 7 {
        return Err(Error::MalformedDescriptor);
    }

    Ok(EndpointInfo {
        address: bytes[2],
        attributes: bytes[3],
        max_packet_size: u16::from_le_bytes([bytes[4], bytes[5]]) & 0x07FF,
    })
}

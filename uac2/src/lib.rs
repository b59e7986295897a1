//! USB device stack and USB Audio Class 2.0 speaker.
//!
//! The device side is driven by events. An interrupt handler turns hardware status into [`event::UsbEvent`]s,
//! which the main loop hands to [`device::UsbDevice::poll`]. Everything above the [`hal::UsbBus`] trait is
//! plain logic, so that it runs against a software bus in tests.
#![cfg_attr(not(test), no_std)]

mod fmt;

pub mod descriptor;
pub mod device;
pub mod endpoint;
pub mod event;
pub mod hal;
pub mod setup;
pub mod speaker;

mod control;

pub use device::{EndpointHandler, InResponse, InterfaceHandler, OutResponse, UsbDevice};
pub use endpoint::Endpoints;
pub use event::{EventQueue, EventReceiver, EventSender, UsbEvent};
pub use hal::UsbBus;
pub use setup::SetupPacket;

/// Maximum packet size of the control endpoint.
pub const EP0_MAX_PACKET_SIZE: usize = 64;

/// Interface numbers that the handler registry can hold.
pub const MAX_INTERFACES: usize = 8;

/// Endpoint numbers, including the control endpoint.
pub const MAX_ENDPOINTS: usize = 16;

/// Largest data stage that is sent on the control endpoint.
pub const MAX_CONTROL_DATA_SIZE: usize = 512;

/// Largest packet of any endpoint, as allowed for full-speed isochronous endpoints.
pub const MAX_PACKET_SIZE: usize = 1023;

/// Endpoint direction, as seen from the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Host to device
    Out,
    /// Device to host
    In,
}

impl Direction {
    /// Direction of an endpoint address.
    pub fn of_address(address: u8) -> Self {
        if address & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Endpoint number zero, or beyond the hardware's endpoints.
    InvalidEndpoint,
    /// The endpoint is not part of the active configuration.
    EndpointDisabled,
    /// A transfer larger than the endpoint's maximum packet size.
    PacketTooLarge,
    /// The endpoints do not fit into the shared buffer memory.
    BufferMemoryExhausted,
    /// A descriptor with a bad length, or an endpoint outside of an interface.
    MalformedDescriptor,
    InvalidInterface,
    InvalidAlternateSetting,
    InvalidConfiguration,
}

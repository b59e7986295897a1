//! Hardware access that the device stack needs from a USB controller.
use crate::Direction;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EndpointType {
    Control = 0,
    Isochronous = 1,
    Bulk = 2,
    Interrupt = 3,
}

impl EndpointType {
    /// Transfer type from an endpoint descriptor's `bmAttributes`.
    pub fn from_attributes(attributes: u8) -> Self {
        match attributes & 0x03 {
            0 => EndpointType::Control,
            1 => EndpointType::Isochronous,
            2 => EndpointType::Bulk,
            _ => EndpointType::Interrupt,
        }
    }

    /// Largest packet size that full-speed devices may declare for this type.
    pub fn max_packet_size_limit(&self) -> u16 {
        match self {
            EndpointType::Isochronous => 1023,
            _ => 64,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataPid {
    Data0,
    Data1,
}

impl DataPid {
    pub fn toggled(self) -> Self {
        match self {
            DataPid::Data0 => DataPid::Data1,
            DataPid::Data1 => DataPid::Data0,
        }
    }
}

/// A USB device controller with buffer memory shared between endpoints.
///
/// Endpoint zero is always enabled and uses its own fixed buffers. Implementations may be called from the main
/// loop only, never from the interrupt handler.
pub trait UsbBus {
    /// Bytes of buffer memory available for endpoints other than zero.
    const BUFFER_MEMORY_SIZE: usize;

    /// Configures an endpoint, with its buffer at `buffer_offset` into buffer memory.
    fn enable_endpoint(&mut self, number: u8, direction: Direction, ep_type: EndpointType, buffer_offset: u16);

    fn disable_endpoint(&mut self, number: u8, direction: Direction);

    /// Copies `data` into the endpoint buffer and hands it to the controller.
    fn arm_in(&mut self, number: u8, data: &[u8], pid: DataPid);

    /// Hands the endpoint buffer to the controller for receiving up to `len` bytes.
    fn arm_out(&mut self, number: u8, len: u16, pid: DataPid);

    /// Copies received data out of an OUT endpoint buffer.
    fn read_out(&mut self, number: u8, buf: &mut [u8]);

    /// Answers the current control transfer with STALL in both directions.
    fn stall_ep0(&mut self);

    fn set_address(&mut self, address: u8);
}

#[cfg(test)]
pub(crate) mod fake {
    //! A bus that records what the stack does with it.
    use super::*;
    use std::vec::Vec;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Op {
        Enable(u8, Direction, EndpointType, u16),
        Disable(u8, Direction),
        ArmIn(u8, Vec<u8>, DataPid),
        ArmOut(u8, u16, DataPid),
        Stall,
        Address(u8),
    }

    #[derive(Default)]
    pub struct FakeBus {
        pub ops: Vec<Op>,
        /// Data returned by `read_out`, per endpoint number.
        pub received: [Vec<u8>; crate::MAX_ENDPOINTS],
    }

    impl FakeBus {
        pub fn new() -> Self {
            Self::default()
        }

        /// Returns all operations since the last call.
        pub fn take(&mut self) -> Vec<Op> {
            core::mem::take(&mut self.ops)
        }

        pub fn receive(&mut self, number: u8, data: &[u8]) {
            self.received[number as usize] = data.to_vec();
        }
    }

    impl UsbBus for FakeBus {
        const BUFFER_MEMORY_SIZE: usize = 3712;

        fn enable_endpoint(&mut self, number: u8, direction: Direction, ep_type: EndpointType, buffer_offset: u16) {
            self.ops.push(Op::Enable(number, direction, ep_type, buffer_offset));
        }

        fn disable_endpoint(&mut self, number: u8, direction: Direction) {
            self.ops.push(Op::Disable(number, direction));
        }

        fn arm_in(&mut self, number: u8, data: &[u8], pid: DataPid) {
            self.ops.push(Op::ArmIn(number, data.to_vec(), pid));
        }

        fn arm_out(&mut self, number: u8, len: u16, pid: DataPid) {
            self.ops.push(Op::ArmOut(number, len, pid));
        }

        fn read_out(&mut self, number: u8, buf: &mut [u8]) {
            let received = &self.received[number as usize];
            let len = buf.len().min(received.len());
            buf[..len].copy_from_slice(&received[..len]);
        }

        fn stall_ep0(&mut self) {
            self.ops.push(Op::Stall);
        }

        fn set_address(&mut self, address: u8) {
            self.ops.push(Op::Address(address));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_type_from_attributes() {
        // Isochronous, asynchronous.
        assert_eq!(EndpointType::from_attributes(0x05), EndpointType::Isochronous);
        // Isochronous, feedback.
        assert_eq!(EndpointType::from_attributes(0x11), EndpointType::Isochronous);
        assert_eq!(EndpointType::from_attributes(0x02), EndpointType::Bulk);
        assert_eq!(EndpointType::from_attributes(0x03), EndpointType::Interrupt);

        assert_eq!(EndpointType::Isochronous.max_packet_size_limit(), 1023);
        assert_eq!(EndpointType::Bulk.max_packet_size_limit(), 64);
    }

    #[test]
    fn pid_toggles() {
        assert_eq!(DataPid::Data0.toggled(), DataPid::Data1);
        assert_eq!(DataPid::Data1.toggled(), DataPid::Data0);
    }
}

//! Endpoint state and buffer memory layout.
//!
//! Owns the [`UsbBus`]. Endpoints of a configuration share one region of buffer memory, where each
//! endpoint address gets a 64 byte aligned slot that is large enough for its biggest alternate setting.
use crate::descriptor::{self, EndpointDescriptors};
use crate::hal::{DataPid, EndpointType, UsbBus};
use crate::{Direction, Error, EP0_MAX_PACKET_SIZE, MAX_ENDPOINTS, MAX_INTERFACES};

const BUFFER_ALIGNMENT: usize = 64;

#[derive(Clone, Copy, Debug)]
struct EndpointState {
    enabled: bool,
    ep_type: EndpointType,
    max_packet_size: u16,
    buffer_offset: u16,
    next_pid: DataPid,
}

impl EndpointState {
    const UNUSED: Self = Self {
        enabled: false,
        ep_type: EndpointType::Control,
        max_packet_size: 0,
        buffer_offset: 0,
        next_pid: DataPid::Data0,
    };

    const CONTROL: Self = Self {
        enabled: true,
        ep_type: EndpointType::Control,
        max_packet_size: EP0_MAX_PACKET_SIZE as u16,
        buffer_offset: 0,
        next_pid: DataPid::Data0,
    };
}

pub struct Endpoints<B: UsbBus> {
    bus: B,
    in_endpoints: [EndpointState; MAX_ENDPOINTS],
    out_endpoints: [EndpointState; MAX_ENDPOINTS],
    alternate_settings: [u8; MAX_INTERFACES],
}

impl<B: UsbBus> Endpoints<B> {
    pub fn new(bus: B) -> Self {
        let mut endpoints = Self {
            bus,
            in_endpoints: [EndpointState::UNUSED; MAX_ENDPOINTS],
            out_endpoints: [EndpointState::UNUSED; MAX_ENDPOINTS],
            alternate_settings: [0; MAX_INTERFACES],
        };
        endpoints.in_endpoints[0] = EndpointState::CONTROL;
        endpoints.out_endpoints[0] = EndpointState::CONTROL;
        endpoints
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Makes `configuration` the active configuration, or deconfigures the device for `value == 0`.
    ///
    /// All endpoints of the previous configuration are disabled, and every interface starts in
    /// alternate setting 0.
    pub fn activate_configuration(&mut self, configuration: &[u8], value: u8) -> Result<(), Error> {
        self.disable_all();
        self.alternate_settings = [0; MAX_INTERFACES];

        if value == 0 {
            return Ok(());
        }

        if descriptor::configuration_value(configuration)? != value {
            return Err(Error::InvalidConfiguration);
        }

        self.layout(configuration)?;

        for info in descriptor::interfaces(configuration) {
            let info = info?;
            if info.alternate_setting == 0 {
                self.enable_alternate_setting(configuration, info.number, 0)?;
            }
        }

        Ok(())
    }

    /// Switches `interface` to `alternate_setting`.
    ///
    /// Endpoints of the previous alternate setting are disabled before those of the new one are enabled.
    pub fn set_alternate_setting(
        &mut self,
        configuration: &[u8],
        interface: u8,
        alternate_setting: u8,
    ) -> Result<(), Error> {
        if interface as usize >= MAX_INTERFACES {
            return Err(Error::InvalidInterface);
        }
        if !descriptor::has_alternate_setting(configuration, interface, alternate_setting) {
            return Err(Error::InvalidAlternateSetting);
        }

        let previous = self.alternate_settings[interface as usize];
        for endpoint in EndpointDescriptors::new(configuration) {
            let (info, endpoint) = endpoint?;
            if info.number == interface && info.alternate_setting == previous {
                self.disable(endpoint.number(), Direction::of_address(endpoint.address));
            }
        }

        self.enable_alternate_setting(configuration, interface, alternate_setting)?;
        self.alternate_settings[interface as usize] = alternate_setting;

        debug!("Interface {}: alternate setting {}", interface, alternate_setting);
        Ok(())
    }

    pub fn alternate_setting(&self, interface: u8) -> Option<u8> {
        self.alternate_settings.get(interface as usize).copied()
    }

    /// Sends `data` from an IN endpoint.
    pub fn start_in(&mut self, number: u8, data: &[u8]) -> Result<(), Error> {
        let state = Self::checked(&mut self.in_endpoints, number, data.len())?;
        let pid = state.next_pid;
        state.next_pid = pid.toggled();

        self.bus.arm_in(number, data, pid);
        Ok(())
    }

    /// Prepares an OUT endpoint for receiving up to `len` bytes.
    pub fn start_out(&mut self, number: u8, len: usize) -> Result<(), Error> {
        let state = Self::checked(&mut self.out_endpoints, number, len)?;
        let pid = state.next_pid;
        state.next_pid = pid.toggled();

        self.bus.arm_out(number, len as u16, pid);
        Ok(())
    }

    /// Copies a received packet out of an OUT endpoint buffer.
    pub fn read(&mut self, number: u8, buf: &mut [u8]) {
        self.bus.read_out(number, buf);
    }

    pub fn is_enabled(&self, number: u8, direction: Direction) -> bool {
        self.state(number, direction).is_some_and(|state| state.enabled)
    }

    pub fn max_packet_size(&self, number: u8, direction: Direction) -> Option<u16> {
        self.state(number, direction)
            .filter(|state| state.enabled)
            .map(|state| state.max_packet_size)
    }

    /// Restarts the data toggle sequence of both directions of an endpoint.
    pub fn reset_toggle(&mut self, number: u8) {
        if let Some(state) = self.in_endpoints.get_mut(number as usize) {
            state.next_pid = DataPid::Data0;
        }
        if let Some(state) = self.out_endpoints.get_mut(number as usize) {
            state.next_pid = DataPid::Data0;
        }
    }

    /// Returns to the state after power up, with only the control endpoint enabled.
    pub fn bus_reset(&mut self) {
        self.disable_all();
        self.alternate_settings = [0; MAX_INTERFACES];
        self.in_endpoints[0] = EndpointState::CONTROL;
        self.out_endpoints[0] = EndpointState::CONTROL;
    }

    /// Overrides the toggle of the next transfer, for the control endpoint's fixed stage PIDs.
    pub(crate) fn set_next_pid(&mut self, number: u8, direction: Direction, pid: DataPid) {
        let states = match direction {
            Direction::In => &mut self.in_endpoints,
            Direction::Out => &mut self.out_endpoints,
        };
        if let Some(state) = states.get_mut(number as usize) {
            state.next_pid = pid;
        }
    }

    fn checked(
        states: &mut [EndpointState; MAX_ENDPOINTS],
        number: u8,
        len: usize,
    ) -> Result<&mut EndpointState, Error> {
        let state = states.get_mut(number as usize).ok_or(Error::InvalidEndpoint)?;

        if !state.enabled {
            return Err(Error::EndpointDisabled);
        }
        if len > state.max_packet_size as usize {
            return Err(Error::PacketTooLarge);
        }

        Ok(state)
    }

    fn state(&self, number: u8, direction: Direction) -> Option<&EndpointState> {
        match direction {
            Direction::In => self.in_endpoints.get(number as usize),
            Direction::Out => self.out_endpoints.get(number as usize),
        }
    }

    /// Assigns buffer memory to every endpoint address that the configuration uses.
    fn layout(&mut self, configuration: &[u8]) -> Result<(), Error> {
        for number in 1..MAX_ENDPOINTS {
            self.in_endpoints[number] = EndpointState::UNUSED;
            self.out_endpoints[number] = EndpointState::UNUSED;
        }

        for endpoint in EndpointDescriptors::new(configuration) {
            let (_, endpoint) = endpoint?;

            let number = endpoint.number() as usize;
            if number == 0 || number >= MAX_ENDPOINTS {
                return Err(Error::InvalidEndpoint);
            }

            let ep_type = EndpointType::from_attributes(endpoint.attributes);
            if endpoint.max_packet_size > ep_type.max_packet_size_limit() {
                return Err(Error::PacketTooLarge);
            }

            let state = match Direction::of_address(endpoint.address) {
                Direction::In => &mut self.in_endpoints[number],
                Direction::Out => &mut self.out_endpoints[number],
            };
            state.ep_type = ep_type;
            state.max_packet_size = state.max_packet_size.max(endpoint.max_packet_size);
        }

        let mut offset = 0usize;
        for number in 1..MAX_ENDPOINTS {
            for state in [&mut self.in_endpoints[number], &mut self.out_endpoints[number]] {
                if state.max_packet_size == 0 {
                    continue;
                }

                let size = state.max_packet_size as usize;
                if offset + size > B::BUFFER_MEMORY_SIZE {
                    return Err(Error::BufferMemoryExhausted);
                }

                state.buffer_offset = offset as u16;
                offset += size.next_multiple_of(BUFFER_ALIGNMENT);
            }
        }

        trace!("Endpoint buffers use {} bytes", offset);
        Ok(())
    }

    fn enable_alternate_setting(
        &mut self,
        configuration: &[u8],
        interface: u8,
        alternate_setting: u8,
    ) -> Result<(), Error> {
        for endpoint in EndpointDescriptors::new(configuration) {
            let (info, endpoint) = endpoint?;
            if info.number == interface && info.alternate_setting == alternate_setting {
                self.enable(endpoint.number(), Direction::of_address(endpoint.address))?;
            }
        }

        Ok(())
    }

    fn enable(&mut self, number: u8, direction: Direction) -> Result<(), Error> {
        let state = match direction {
            Direction::In => self.in_endpoints.get_mut(number as usize),
            Direction::Out => self.out_endpoints.get_mut(number as usize),
        }
        .ok_or(Error::InvalidEndpoint)?;

        state.enabled = true;
        state.next_pid = DataPid::Data0;
        let (ep_type, buffer_offset, max_packet_size) = (state.ep_type, state.buffer_offset, state.max_packet_size);

        self.bus.enable_endpoint(number, direction, ep_type, buffer_offset);

        // OUT endpoints receive from the moment they are enabled.
        if direction == Direction::Out {
            self.start_out(number, max_packet_size as usize)?;
        }

        Ok(())
    }

    fn disable(&mut self, number: u8, direction: Direction) {
        let state = match direction {
            Direction::In => self.in_endpoints.get_mut(number as usize),
            Direction::Out => self.out_endpoints.get_mut(number as usize),
        };

        if let Some(state) = state {
            if state.enabled {
                state.enabled = false;
                self.bus.disable_endpoint(number, direction);
            }
        }
    }

    fn disable_all(&mut self) {
        for number in 1..MAX_ENDPOINTS as u8 {
            self.disable(number, Direction::In);
            self.disable(number, Direction::Out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::kind;
    use crate::hal::fake::{FakeBus, Op};

    // Interface 0 with an interrupt IN endpoint, and interface 1 with two alternate settings of different
    // packet sizes for the same OUT endpoint.
    #[rustfmt::skip]
    const CONFIGURATION: &[u8] = &[
        9, kind::CONFIGURATION, 64, 0, 2, 1, 0, 0x80, 50,
        9, kind::INTERFACE, 0, 0, 1, 0xFF, 0, 0, 0,
        7, kind::ENDPOINT, 0x82, 0x03, 8, 0, 1,
        9, kind::INTERFACE, 1, 0, 0, 0xFF, 0, 0, 0,
        9, kind::INTERFACE, 1, 1, 1, 0xFF, 0, 0, 0,
        7, kind::ENDPOINT, 0x01, 0x05, 0xC8, 0, 1,
        9, kind::INTERFACE, 1, 2, 1, 0xFF, 0, 0, 0,
        7, kind::ENDPOINT, 0x01, 0x05, 0x08, 0x03, 1,
    ];

    fn configured() -> Endpoints<FakeBus> {
        let mut endpoints = Endpoints::new(FakeBus::new());
        endpoints.activate_configuration(CONFIGURATION, 1).unwrap();
        endpoints.bus_mut().take();
        endpoints
    }

    #[test]
    fn layout_uses_largest_packet_size() {
        let mut endpoints = Endpoints::new(FakeBus::new());
        endpoints.activate_configuration(CONFIGURATION, 1).unwrap();

        // EP1 OUT needs 776 bytes, and is placed before EP2 IN.
        assert_eq!(
            endpoints.bus_mut().take(),
            [Op::Enable(2, Direction::In, EndpointType::Interrupt, 832)]
        );
        assert_eq!(endpoints.max_packet_size(2, Direction::In), Some(8));
        assert_eq!(endpoints.max_packet_size(1, Direction::Out), None);
    }

    #[test]
    fn switches_alternate_settings() {
        let mut endpoints = configured();

        endpoints.set_alternate_setting(CONFIGURATION, 1, 1).unwrap();
        assert_eq!(
            endpoints.bus_mut().take(),
            [
                Op::Enable(1, Direction::Out, EndpointType::Isochronous, 0),
                Op::ArmOut(1, 776, DataPid::Data0),
            ]
        );
        assert_eq!(endpoints.alternate_setting(1), Some(1));

        endpoints.set_alternate_setting(CONFIGURATION, 1, 2).unwrap();
        assert_eq!(
            endpoints.bus_mut().take(),
            [
                Op::Disable(1, Direction::Out),
                Op::Enable(1, Direction::Out, EndpointType::Isochronous, 0),
                Op::ArmOut(1, 776, DataPid::Data0),
            ]
        );

        endpoints.set_alternate_setting(CONFIGURATION, 1, 0).unwrap();
        assert_eq!(endpoints.bus_mut().take(), [Op::Disable(1, Direction::Out)]);
        assert!(!endpoints.is_enabled(1, Direction::Out));
    }

    #[test]
    fn rejects_unknown_alternate_settings() {
        let mut endpoints = configured();

        assert_eq!(
            endpoints.set_alternate_setting(CONFIGURATION, 1, 3),
            Err(Error::InvalidAlternateSetting)
        );
        assert_eq!(
            endpoints.set_alternate_setting(CONFIGURATION, MAX_INTERFACES as u8, 0),
            Err(Error::InvalidInterface)
        );
        assert!(endpoints.bus_mut().take().is_empty());
    }

    #[test]
    fn transfers_toggle_pid() {
        let mut endpoints = configured();

        endpoints.start_in(2, &[1, 2]).unwrap();
        endpoints.start_in(2, &[3]).unwrap();
        assert_eq!(
            endpoints.bus_mut().take(),
            [
                Op::ArmIn(2, vec![1, 2], DataPid::Data0),
                Op::ArmIn(2, vec![3], DataPid::Data1),
            ]
        );

        endpoints.reset_toggle(2);
        endpoints.start_in(2, &[4]).unwrap();
        assert_eq!(endpoints.bus_mut().take(), [Op::ArmIn(2, vec![4], DataPid::Data0)]);
    }

    #[test]
    fn rejects_invalid_transfers() {
        let mut endpoints = configured();

        assert_eq!(endpoints.start_in(2, &[0; 9]), Err(Error::PacketTooLarge));
        assert_eq!(endpoints.start_out(1, 8), Err(Error::EndpointDisabled));
        assert_eq!(endpoints.start_in(MAX_ENDPOINTS as u8, &[]), Err(Error::InvalidEndpoint));
        assert!(endpoints.bus_mut().take().is_empty());
    }

    #[test]
    fn deconfigure_and_bus_reset_disable_endpoints() {
        let mut endpoints = configured();
        endpoints.set_alternate_setting(CONFIGURATION, 1, 1).unwrap();
        endpoints.bus_mut().take();

        endpoints.activate_configuration(CONFIGURATION, 0).unwrap();
        assert_eq!(
            endpoints.bus_mut().take(),
            [Op::Disable(1, Direction::Out), Op::Disable(2, Direction::In)]
        );
        assert_eq!(endpoints.alternate_setting(1), Some(0));

        let mut endpoints = configured();
        endpoints.bus_reset();
        assert_eq!(endpoints.bus_mut().take(), [Op::Disable(2, Direction::In)]);
        assert!(endpoints.is_enabled(0, Direction::In));
    }

    #[test]
    fn rejects_mismatching_configuration_value() {
        let mut endpoints = Endpoints::new(FakeBus::new());
        assert_eq!(
            endpoints.activate_configuration(CONFIGURATION, 2),
            Err(Error::InvalidConfiguration)
        );
    }

    struct SmallBus(FakeBus);

    impl UsbBus for SmallBus {
        const BUFFER_MEMORY_SIZE: usize = 512;

        fn enable_endpoint(&mut self, number: u8, direction: Direction, ep_type: EndpointType, offset: u16) {
            self.0.enable_endpoint(number, direction, ep_type, offset)
        }
        fn disable_endpoint(&mut self, number: u8, direction: Direction) {
            self.0.disable_endpoint(number, direction)
        }
        fn arm_in(&mut self, number: u8, data: &[u8], pid: DataPid) {
            self.0.arm_in(number, data, pid)
        }
        fn arm_out(&mut self, number: u8, len: u16, pid: DataPid) {
            self.0.arm_out(number, len, pid)
        }
        fn read_out(&mut self, number: u8, buf: &mut [u8]) {
            self.0.read_out(number, buf)
        }
        fn stall_ep0(&mut self) {
            self.0.stall_ep0()
        }
        fn set_address(&mut self, address: u8) {
            self.0.set_address(address)
        }
    }

    #[test]
    fn detects_buffer_memory_exhaustion() {
        let mut endpoints = Endpoints::new(SmallBus(FakeBus::new()));
        assert_eq!(
            endpoints.activate_configuration(CONFIGURATION, 1),
            Err(Error::BufferMemoryExhausted)
        );
    }
}

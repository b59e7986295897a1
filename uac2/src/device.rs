//! The USB control engine.
//!
//! Standard requests are handled here. Class and vendor requests are routed to the [`InterfaceHandler`]
//! registered for the addressed interface, and transfers on other endpoints to their [`EndpointHandler`].
//! Handlers are stateless; all mutable state lives in the class object `C` that the device owns.
use crate::control::ControlPipe;
use crate::descriptor::{self, kind};
use crate::endpoint::Endpoints;
use crate::event::{EventReceiver, UsbEvent, MAX_EVENTS_PER_POLL};
use crate::hal::UsbBus;
use crate::setup::{request, Recipient, RequestType, SetupPacket, FEATURE_ENDPOINT_HALT};
use crate::{Direction, Error, MAX_CONTROL_DATA_SIZE, MAX_ENDPOINTS, MAX_INTERFACES, MAX_PACKET_SIZE};

/// Response to a control IN request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InResponse<'a> {
    Accepted(&'a [u8]),
    Rejected,
}

/// Response to a control OUT request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutResponse {
    Accepted,
    Rejected,
}

/// Class specific behaviour of an interface.
pub trait InterfaceHandler<B: UsbBus, C> {
    /// Answers a class or vendor IN request, with the response written into `buf`.
    fn control_in<'a>(&self, _class: &mut C, _request: &SetupPacket, _buf: &'a mut [u8]) -> InResponse<'a> {
        InResponse::Rejected
    }

    /// Handles a class or vendor OUT request, with its data stage in `data`.
    fn control_out(&self, _class: &mut C, _request: &SetupPacket, _data: &[u8]) -> OutResponse {
        OutResponse::Rejected
    }

    /// Called after the endpoints of `alternate_setting` were enabled. Returns `false` to reject it.
    fn set_interface(&self, _class: &mut C, _endpoints: &mut Endpoints<B>, _alternate_setting: u8) -> bool {
        true
    }

    fn bus_reset(&self, _class: &mut C) {}
}

/// Transfer completion on an endpoint other than zero.
pub trait EndpointHandler<B: UsbBus, C> {
    fn in_complete(&self, _class: &mut C, _endpoints: &mut Endpoints<B>) {}

    fn out_complete(&self, _class: &mut C, _endpoints: &mut Endpoints<B>, _data: &[u8]) {}

    /// The host cleared a halt on the endpoint, and its data toggle was reset.
    fn halt_cleared(&self, _class: &mut C, _endpoints: &mut Endpoints<B>) {}
}

/// Static descriptors of a device with a single configuration.
#[derive(Clone, Copy, Debug)]
pub struct DescriptorSet<'d> {
    pub device: &'d [u8],
    pub configuration: &'d [u8],
    /// Returned for every string index.
    pub string: &'d [u8],
}

type InterfaceSlot<'d, B, C> = Option<&'d dyn InterfaceHandler<B, C>>;
type EndpointSlot<'d, B, C> = Option<&'d dyn EndpointHandler<B, C>>;

pub struct UsbDevice<'d, B: UsbBus, C> {
    endpoints: Endpoints<B>,
    control: ControlPipe,
    descriptors: DescriptorSet<'d>,
    interface_handlers: [InterfaceSlot<'d, B, C>; MAX_INTERFACES],
    in_handlers: [EndpointSlot<'d, B, C>; MAX_ENDPOINTS],
    out_handlers: [EndpointSlot<'d, B, C>; MAX_ENDPOINTS],
    configuration: u8,
    class: C,
    response: [u8; MAX_CONTROL_DATA_SIZE],
    packet: [u8; MAX_PACKET_SIZE],
}

impl<'d, B: UsbBus, C> UsbDevice<'d, B, C> {
    pub fn new(bus: B, descriptors: DescriptorSet<'d>, class: C) -> Self {
        Self {
            endpoints: Endpoints::new(bus),
            control: ControlPipe::new(),
            descriptors,
            interface_handlers: [None; MAX_INTERFACES],
            in_handlers: [None; MAX_ENDPOINTS],
            out_handlers: [None; MAX_ENDPOINTS],
            configuration: 0,
            class,
            response: [0; MAX_CONTROL_DATA_SIZE],
            packet: [0; MAX_PACKET_SIZE],
        }
    }

    pub fn set_interface_handler(
        &mut self,
        interface: u8,
        handler: &'d dyn InterfaceHandler<B, C>,
    ) -> Result<(), Error> {
        let slot = self
            .interface_handlers
            .get_mut(interface as usize)
            .ok_or(Error::InvalidInterface)?;
        *slot = Some(handler);
        Ok(())
    }

    /// Registers a handler for the endpoint `address`, including the direction bit.
    pub fn set_endpoint_handler(&mut self, address: u8, handler: &'d dyn EndpointHandler<B, C>) -> Result<(), Error> {
        let number = (address & 0x0F) as usize;
        if number == 0 {
            return Err(Error::InvalidEndpoint);
        }

        match Direction::of_address(address) {
            Direction::In => self.in_handlers[number] = Some(handler),
            Direction::Out => self.out_handlers[number] = Some(handler),
        }
        Ok(())
    }

    pub fn class(&self) -> &C {
        &self.class
    }

    pub fn class_mut(&mut self) -> &mut C {
        &mut self.class
    }

    pub fn endpoints(&self) -> &Endpoints<B> {
        &self.endpoints
    }

    pub fn endpoints_mut(&mut self) -> &mut Endpoints<B> {
        &mut self.endpoints
    }

    /// Value of the active configuration, 0 while unconfigured.
    pub fn configuration(&self) -> u8 {
        self.configuration
    }

    /// Handles pending events, at most [`MAX_EVENTS_PER_POLL`] of them.
    pub fn poll(&mut self, events: &mut EventReceiver<'_>) {
        for _ in 0..MAX_EVENTS_PER_POLL {
            match events.pop() {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }
    }

    pub fn handle_event(&mut self, event: UsbEvent) {
        match event {
            UsbEvent::Setup(setup) => self.handle_setup(setup),
            UsbEvent::BufferDone {
                endpoint: 0,
                direction: Direction::In,
                ..
            } => {
                if let Err(e) = self.control.in_complete(&mut self.endpoints) {
                    warn!("Control IN failed: {:?}", e);
                    self.control.stall(&mut self.endpoints);
                }
            }
            UsbEvent::BufferDone {
                endpoint: 0,
                direction: Direction::Out,
                length,
            } => self.handle_control_out_data(length),
            UsbEvent::BufferDone {
                endpoint,
                direction: Direction::In,
                ..
            } => {
                let Some(handler) = self.in_handlers.get(endpoint as usize).copied().flatten() else {
                    trace!("No handler for endpoint {} IN", endpoint);
                    return;
                };
                handler.in_complete(&mut self.class, &mut self.endpoints);
            }
            UsbEvent::BufferDone {
                endpoint,
                direction: Direction::Out,
                length,
            } => {
                let Some(handler) = self.out_handlers.get(endpoint as usize).copied().flatten() else {
                    trace!("No handler for endpoint {} OUT", endpoint);
                    return;
                };

                let data = &mut self.packet[..(length as usize).min(MAX_PACKET_SIZE)];
                self.endpoints.read(endpoint, data);
                handler.out_complete(&mut self.class, &mut self.endpoints, data);
            }
            UsbEvent::BusReset => self.bus_reset(),
        }
    }

    fn bus_reset(&mut self) {
        debug!("Bus reset");

        self.control.reset();
        self.endpoints.bus_reset();
        self.endpoints.bus_mut().set_address(0);
        self.configuration = 0;

        for handler in self.interface_handlers.iter().flatten() {
            handler.bus_reset(&mut self.class);
        }
    }

    fn handle_setup(&mut self, setup: SetupPacket) {
        trace!("Setup {:?}", setup);
        self.control.setup(&mut self.endpoints);

        let result = match setup.request_type() {
            RequestType::Standard => self.handle_standard(&setup),
            RequestType::Class | RequestType::Vendor if setup.recipient() == Recipient::Interface => {
                self.handle_class(&setup)
            }
            _ => Err(Error::InvalidInterface),
        };

        if let Err(e) = result {
            debug!("Stall request {:x} type {:x}: {:?}", setup.request, setup.request_type, e);
            self.control.stall(&mut self.endpoints);
        }
    }

    fn handle_standard(&mut self, setup: &SetupPacket) -> Result<(), Error> {
        match (setup.recipient(), setup.direction(), setup.request) {
            (_, Direction::In, request::GET_STATUS) => self.respond(&[0, 0], setup.length),
            (Recipient::Device, Direction::In, request::GET_DESCRIPTOR) => self.get_descriptor(setup),
            (Recipient::Device, Direction::In, request::GET_CONFIGURATION) => {
                self.respond(&[self.configuration], setup.length)
            }
            (Recipient::Device, Direction::Out, request::SET_ADDRESS) => {
                self.control.set_pending_address((setup.value & 0x7F) as u8);
                self.control.ack(&mut self.endpoints)
            }
            (Recipient::Device, Direction::Out, request::SET_CONFIGURATION) => {
                self.set_configuration(setup.value as u8)?;
                self.control.ack(&mut self.endpoints)
            }
            (Recipient::Interface, Direction::In, request::GET_INTERFACE) => {
                if self.configuration == 0 {
                    return Err(Error::InvalidConfiguration);
                }
                let alternate_setting = self
                    .endpoints
                    .alternate_setting(setup.interface())
                    .ok_or(Error::InvalidInterface)?;
                self.respond(&[alternate_setting], setup.length)
            }
            (Recipient::Interface, Direction::Out, request::SET_INTERFACE) => {
                self.set_interface(setup.interface(), setup.value as u8)?;
                self.control.ack(&mut self.endpoints)
            }
            (Recipient::Endpoint, Direction::Out, request::CLEAR_FEATURE) if setup.value == FEATURE_ENDPOINT_HALT => {
                self.clear_halt(setup.index as u8)?;
                self.control.ack(&mut self.endpoints)
            }
            _ => Err(Error::InvalidInterface),
        }
    }

    fn get_descriptor(&mut self, setup: &SetupPacket) -> Result<(), Error> {
        let descriptor = match setup.descriptor_type() {
            kind::DEVICE => self.descriptors.device,
            kind::CONFIGURATION => self.descriptors.configuration,
            kind::STRING => self.descriptors.string,
            // Full speed only, so there is no qualifier.
            other => {
                debug!("Unsupported descriptor type {}", other);
                return Err(Error::MalformedDescriptor);
            }
        };

        self.respond(descriptor, setup.length)
    }

    fn set_configuration(&mut self, value: u8) -> Result<(), Error> {
        let configuration = self.descriptors.configuration;
        self.configuration = 0;

        match self.activate(configuration, value) {
            Ok(()) => {
                self.configuration = value;
                info!("Configuration {}", value);
                Ok(())
            }
            Err(Error::BufferMemoryExhausted) => panic!("Endpoint buffers exceed buffer memory"),
            Err(e) => {
                // Value 0 only disables endpoints.
                let _ = self.endpoints.activate_configuration(configuration, 0);
                Err(e)
            }
        }
    }

    /// Enables the endpoints of `value` and returns every interface to its default setting.
    fn activate(&mut self, configuration: &'d [u8], value: u8) -> Result<(), Error> {
        self.endpoints.activate_configuration(configuration, value)?;

        for info in descriptor::interfaces(configuration) {
            let info = info?;
            if info.alternate_setting != 0 {
                continue;
            }

            if let Some(handler) = self.interface_handlers.get(info.number as usize).copied().flatten() {
                if !handler.set_interface(&mut self.class, &mut self.endpoints, 0) {
                    return Err(Error::InvalidAlternateSetting);
                }
            }
        }

        Ok(())
    }

    fn set_interface(&mut self, interface: u8, alternate_setting: u8) -> Result<(), Error> {
        if self.configuration == 0 {
            return Err(Error::InvalidConfiguration);
        }

        self.endpoints
            .set_alternate_setting(self.descriptors.configuration, interface, alternate_setting)?;

        match self.interface_handlers.get(interface as usize).copied().flatten() {
            Some(handler) if !handler.set_interface(&mut self.class, &mut self.endpoints, alternate_setting) => {
                Err(Error::InvalidAlternateSetting)
            }
            _ => Ok(()),
        }
    }

    fn clear_halt(&mut self, address: u8) -> Result<(), Error> {
        let number = address & 0x0F;
        let direction = Direction::of_address(address);

        if number == 0 || !self.endpoints.is_enabled(number, direction) {
            return Err(Error::EndpointDisabled);
        }

        self.endpoints.reset_toggle(number);

        let handlers = match direction {
            Direction::In => &self.in_handlers,
            Direction::Out => &self.out_handlers,
        };
        if let Some(handler) = handlers[number as usize] {
            handler.halt_cleared(&mut self.class, &mut self.endpoints);
        }

        Ok(())
    }

    fn handle_class(&mut self, setup: &SetupPacket) -> Result<(), Error> {
        let handler = self
            .interface_handlers
            .get(setup.interface() as usize)
            .copied()
            .flatten()
            .ok_or(Error::InvalidInterface)?;

        match setup.direction() {
            Direction::In => match handler.control_in(&mut self.class, setup, &mut self.response) {
                InResponse::Accepted(data) => self.control.start_in(&mut self.endpoints, data, setup.length),
                InResponse::Rejected => Err(Error::InvalidInterface),
            },
            Direction::Out if setup.length == 0 => match handler.control_out(&mut self.class, setup, &[]) {
                OutResponse::Accepted => self.control.ack(&mut self.endpoints),
                OutResponse::Rejected => Err(Error::InvalidInterface),
            },
            Direction::Out => self.control.expect_out(&mut self.endpoints, *setup),
        }
    }

    fn handle_control_out_data(&mut self, length: u16) {
        let Some(setup) = self.control.out_complete() else {
            return;
        };

        let len = length.min(setup.length) as usize;
        let data = &mut self.packet[..len];
        self.endpoints.read(0, data);

        let response = match self.interface_handlers.get(setup.interface() as usize).copied().flatten() {
            Some(handler) => handler.control_out(&mut self.class, &setup, data),
            None => OutResponse::Rejected,
        };

        let result = match response {
            OutResponse::Accepted => self.control.ack(&mut self.endpoints),
            OutResponse::Rejected => Err(Error::InvalidInterface),
        };
        if result.is_err() {
            debug!("Stall request {:x} type {:x}", setup.request, setup.request_type);
            self.control.stall(&mut self.endpoints);
        }
    }

    fn respond(&mut self, data: &[u8], requested: u16) -> Result<(), Error> {
        self.control.start_in(&mut self.endpoints, data, requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event;
    use crate::hal::fake::{FakeBus, Op};
    use crate::hal::{DataPid, EndpointType};

    const DEVICE: &[u8] = &[18, kind::DEVICE, 0x00, 0x02, 0, 0, 0, 64, 0x09, 0x12, 0x01, 0, 0, 0, 0, 0, 0, 1];

    #[rustfmt::skip]
    const CONFIGURATION: &[u8] = &[
        9, kind::CONFIGURATION, 39, 0, 2, 1, 0, 0x80, 50,
        9, kind::INTERFACE, 0, 0, 0, 0xFF, 0, 0, 0,
        9, kind::INTERFACE, 1, 0, 0, 0xFF, 0, 0, 0,
        9, kind::INTERFACE, 1, 1, 2, 0xFF, 0, 0, 0,
        7, kind::ENDPOINT, 0x01, 0x05, 0x08, 0x03, 1,
        7, kind::ENDPOINT, 0x81, 0x11, 0x04, 0x00, 1,
    ];

    const STRING: &[u8] = &[4, kind::STRING, 0x09, 0x04];

    #[derive(Default)]
    struct Class {
        level: u8,
        alternate_setting: Option<u8>,
        received: Vec<Vec<u8>>,
        sent: usize,
        resets: usize,
        refuse_default_setting: bool,
    }

    struct Control;

    impl InterfaceHandler<FakeBus, Class> for Control {
        fn control_in<'a>(&self, class: &mut Class, request: &SetupPacket, buf: &'a mut [u8]) -> InResponse<'a> {
            match request.request {
                0x01 => {
                    buf[0] = class.level;
                    InResponse::Accepted(&buf[..1])
                }
                _ => InResponse::Rejected,
            }
        }

        fn control_out(&self, class: &mut Class, request: &SetupPacket, data: &[u8]) -> OutResponse {
            match (request.request, data) {
                (0x01, [level]) => {
                    class.level = *level;
                    OutResponse::Accepted
                }
                (0x02, []) => {
                    class.level = 0;
                    OutResponse::Accepted
                }
                _ => OutResponse::Rejected,
            }
        }
    }

    struct Streaming;

    impl InterfaceHandler<FakeBus, Class> for Streaming {
        fn set_interface(&self, class: &mut Class, endpoints: &mut Endpoints<FakeBus>, alternate_setting: u8) -> bool {
            if alternate_setting == 0 && class.refuse_default_setting {
                return false;
            }
            class.alternate_setting = Some(alternate_setting);
            if alternate_setting != 0 {
                let _ = endpoints.start_in(1, &[0; 4]);
            }
            true
        }

        fn bus_reset(&self, class: &mut Class) {
            class.resets += 1;
        }
    }

    struct Stream;

    impl EndpointHandler<FakeBus, Class> for Stream {
        fn out_complete(&self, class: &mut Class, endpoints: &mut Endpoints<FakeBus>, data: &[u8]) {
            class.received.push(data.to_vec());
            let _ = endpoints.start_out(1, 776);
        }

        fn halt_cleared(&self, _class: &mut Class, endpoints: &mut Endpoints<FakeBus>) {
            let _ = endpoints.start_out(1, 776);
        }
    }

    struct Feedback;

    impl EndpointHandler<FakeBus, Class> for Feedback {
        fn in_complete(&self, class: &mut Class, _endpoints: &mut Endpoints<FakeBus>) {
            class.sent += 1;
        }
    }

    static CONTROL: Control = Control;
    static STREAMING: Streaming = Streaming;
    static STREAM: Stream = Stream;
    static FEEDBACK: Feedback = Feedback;

    fn device() -> UsbDevice<'static, FakeBus, Class> {
        let descriptors = DescriptorSet {
            device: DEVICE,
            configuration: CONFIGURATION,
            string: STRING,
        };
        let mut device = UsbDevice::new(FakeBus::new(), descriptors, Class::default());
        device.set_interface_handler(0, &CONTROL).unwrap();
        device.set_interface_handler(1, &STREAMING).unwrap();
        device.set_endpoint_handler(0x01, &STREAM).unwrap();
        device.set_endpoint_handler(0x81, &FEEDBACK).unwrap();
        device
    }

    fn setup(device: &mut UsbDevice<'static, FakeBus, Class>, packet: [u8; 8]) -> Vec<Op> {
        device.handle_event(UsbEvent::Setup(SetupPacket::parse(&packet)));
        device.endpoints_mut().bus_mut().take()
    }

    fn complete(
        device: &mut UsbDevice<'static, FakeBus, Class>,
        endpoint: u8,
        direction: Direction,
        length: u16,
    ) -> Vec<Op> {
        device.handle_event(UsbEvent::BufferDone {
            endpoint,
            direction,
            length,
        });
        device.endpoints_mut().bus_mut().take()
    }

    fn ack() -> Op {
        Op::ArmIn(0, vec![], DataPid::Data1)
    }

    fn configured() -> UsbDevice<'static, FakeBus, Class> {
        let mut device = device();
        setup(&mut device, [0x00, request::SET_CONFIGURATION, 1, 0, 0, 0, 0, 0]);
        complete(&mut device, 0, Direction::In, 0);
        device
    }

    #[test]
    fn get_device_descriptor() {
        let mut device = device();

        let ops = setup(&mut device, [0x80, request::GET_DESCRIPTOR, 0, kind::DEVICE, 0, 0, 18, 0]);
        assert_eq!(ops, [Op::ArmIn(0, DEVICE.to_vec(), DataPid::Data1)]);

        let ops = complete(&mut device, 0, Direction::In, 18);
        assert_eq!(ops, [Op::ArmOut(0, 0, DataPid::Data1)]);
    }

    #[test]
    fn get_descriptor_truncates() {
        let mut device = device();

        let ops = setup(&mut device, [0x80, request::GET_DESCRIPTOR, 0, kind::CONFIGURATION, 0, 0, 9, 0]);
        assert_eq!(ops, [Op::ArmIn(0, CONFIGURATION[..9].to_vec(), DataPid::Data1)]);

        let ops = setup(&mut device, [0x80, request::GET_DESCRIPTOR, 3, kind::STRING, 0x09, 0x04, 0xFF, 0]);
        assert_eq!(ops, [Op::ArmIn(0, STRING.to_vec(), DataPid::Data1)]);
    }

    #[test]
    fn unsupported_descriptor_stalls() {
        let mut device = device();

        let ops = setup(&mut device, [0x80, request::GET_DESCRIPTOR, 0, kind::DEVICE_QUALIFIER, 0, 0, 10, 0]);
        assert_eq!(ops, [Op::Stall]);
    }

    #[test]
    fn set_address_after_status_stage() {
        let mut device = device();

        let ops = setup(&mut device, [0x00, request::SET_ADDRESS, 42, 0, 0, 0, 0, 0]);
        assert_eq!(ops, [ack()]);

        let ops = complete(&mut device, 0, Direction::In, 0);
        assert_eq!(ops, [Op::Address(42)]);
    }

    #[test]
    fn set_configuration_enables_default_settings() {
        let mut device = device();

        let ops = setup(&mut device, [0x00, request::SET_CONFIGURATION, 1, 0, 0, 0, 0, 0]);
        assert_eq!(ops, [ack()]);
        assert_eq!(device.configuration(), 1);
        assert_eq!(device.class().alternate_setting, Some(0));

        let ops = setup(&mut device, [0x80, request::GET_CONFIGURATION, 0, 0, 0, 0, 1, 0]);
        assert_eq!(ops, [Op::ArmIn(0, vec![1], DataPid::Data1)]);

        let ops = setup(&mut device, [0x00, request::SET_CONFIGURATION, 2, 0, 0, 0, 0, 0]);
        assert_eq!(ops, [Op::Stall]);
    }

    #[test]
    fn refused_default_setting_deconfigures() {
        let mut device = configured();
        setup(&mut device, [0x01, request::SET_INTERFACE, 1, 0, 1, 0, 0, 0]);
        device.class_mut().refuse_default_setting = true;

        let ops = setup(&mut device, [0x00, request::SET_CONFIGURATION, 1, 0, 0, 0, 0, 0]);
        assert_eq!(
            ops,
            [
                Op::Disable(1, Direction::In),
                Op::Disable(1, Direction::Out),
                Op::Stall
            ]
        );
        assert_eq!(device.configuration(), 0);
        assert!(!device.endpoints().is_enabled(1, Direction::Out));

        let ops = setup(&mut device, [0x80, request::GET_CONFIGURATION, 0, 0, 0, 0, 1, 0]);
        assert_eq!(ops, [Op::ArmIn(0, vec![0], DataPid::Data1)]);

        let ops = setup(&mut device, [0x01, request::SET_INTERFACE, 1, 0, 1, 0, 0, 0]);
        assert_eq!(ops, [Op::Stall]);
    }

    #[test]
    fn set_interface_switches_endpoints() {
        let mut device = configured();

        let ops = setup(&mut device, [0x01, request::SET_INTERFACE, 1, 0, 1, 0, 0, 0]);
        assert_eq!(
            ops,
            [
                Op::Enable(1, Direction::Out, EndpointType::Isochronous, 64),
                Op::ArmOut(1, 776, DataPid::Data0),
                Op::Enable(1, Direction::In, EndpointType::Isochronous, 0),
                Op::ArmIn(1, vec![0; 4], DataPid::Data0),
                ack(),
            ]
        );
        assert_eq!(device.class().alternate_setting, Some(1));

        let ops = setup(&mut device, [0x81, request::GET_INTERFACE, 0, 0, 1, 0, 1, 0]);
        assert_eq!(ops, [Op::ArmIn(0, vec![1], DataPid::Data1)]);

        let ops = setup(&mut device, [0x01, request::SET_INTERFACE, 2, 0, 1, 0, 0, 0]);
        assert_eq!(ops, [Op::Stall]);
    }

    #[test]
    fn set_interface_requires_configuration() {
        let mut device = device();

        let ops = setup(&mut device, [0x01, request::SET_INTERFACE, 1, 0, 1, 0, 0, 0]);
        assert_eq!(ops, [Op::Stall]);
    }

    #[test]
    fn class_in_request() {
        let mut device = configured();
        device.class_mut().level = 7;

        let ops = setup(&mut device, [0xA1, 0x01, 0, 0, 0, 0, 4, 0]);
        assert_eq!(ops, [Op::ArmIn(0, vec![7], DataPid::Data1)]);

        let ops = setup(&mut device, [0xA1, 0x03, 0, 0, 0, 0, 4, 0]);
        assert_eq!(ops, [Op::Stall]);
    }

    #[test]
    fn class_out_request_with_data_stage() {
        let mut device = configured();

        let ops = setup(&mut device, [0x21, 0x01, 0, 0, 0, 0, 1, 0]);
        assert_eq!(ops, [Op::ArmOut(0, 1, DataPid::Data1)]);
        assert_eq!(device.class().level, 0);

        device.endpoints_mut().bus_mut().receive(0, &[9]);
        let ops = complete(&mut device, 0, Direction::Out, 1);
        assert_eq!(ops, [ack()]);
        assert_eq!(device.class().level, 9);

        // Rejected after the data stage.
        setup(&mut device, [0x21, 0x01, 0, 0, 0, 0, 2, 0]);
        device.endpoints_mut().bus_mut().receive(0, &[1, 2]);
        let ops = complete(&mut device, 0, Direction::Out, 2);
        assert_eq!(ops, [Op::Stall]);
        assert_eq!(device.class().level, 9);
    }

    #[test]
    fn class_out_request_without_data_stage() {
        let mut device = configured();
        device.class_mut().level = 3;

        let ops = setup(&mut device, [0x21, 0x02, 0, 0, 0, 0, 0, 0]);
        assert_eq!(ops, [ack()]);
        assert_eq!(device.class().level, 0);

        let ops = setup(&mut device, [0x21, 0x05, 0, 0, 0, 0, 0, 0]);
        assert_eq!(ops, [Op::Stall]);
    }

    #[test]
    #[should_panic]
    fn oversized_class_out_request_is_fatal() {
        let mut device = configured();
        setup(&mut device, [0x21, 0x01, 0, 0, 0, 0, 65, 0]);
    }

    #[test]
    fn unrouted_requests_stall() {
        let mut device = configured();

        // No handler for interface 5.
        assert_eq!(setup(&mut device, [0x21, 0x01, 0, 0, 5, 0, 0, 0]), [Op::Stall]);
        // Class request to the device.
        assert_eq!(setup(&mut device, [0xA0, 0x01, 0, 0, 0, 0, 1, 0]), [Op::Stall]);
        // Unknown standard request.
        assert_eq!(setup(&mut device, [0x00, request::SET_FEATURE, 1, 0, 0, 0, 0, 0]), [Op::Stall]);
    }

    #[test]
    fn get_status() {
        let mut device = configured();

        let ops = setup(&mut device, [0x80, request::GET_STATUS, 0, 0, 0, 0, 2, 0]);
        assert_eq!(ops, [Op::ArmIn(0, vec![0, 0], DataPid::Data1)]);

        let ops = setup(&mut device, [0x81, request::GET_STATUS, 0, 0, 1, 0, 2, 0]);
        assert_eq!(ops, [Op::ArmIn(0, vec![0, 0], DataPid::Data1)]);
    }

    #[test]
    fn endpoint_transfers_reach_handlers() {
        let mut device = configured();
        setup(&mut device, [0x01, request::SET_INTERFACE, 1, 0, 1, 0, 0, 0]);

        device.endpoints_mut().bus_mut().receive(1, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let ops = complete(&mut device, 1, Direction::Out, 8);
        assert_eq!(ops, [Op::ArmOut(1, 776, DataPid::Data1)]);
        assert_eq!(device.class().received, [vec![1, 2, 3, 4, 5, 6, 7, 8]]);

        complete(&mut device, 1, Direction::In, 4);
        assert_eq!(device.class().sent, 1);

        // Nothing registered for endpoint 2.
        assert!(complete(&mut device, 2, Direction::Out, 8).is_empty());
    }

    #[test]
    fn clear_halt_resets_toggle() {
        let mut device = configured();
        setup(&mut device, [0x01, request::SET_INTERFACE, 1, 0, 1, 0, 0, 0]);

        let ops = setup(&mut device, [0x02, request::CLEAR_FEATURE, 0, 0, 0x01, 0, 0, 0]);
        assert_eq!(ops, [Op::ArmOut(1, 776, DataPid::Data0), ack()]);

        // Disabled endpoint.
        let ops = setup(&mut device, [0x02, request::CLEAR_FEATURE, 0, 0, 0x02, 0, 0, 0]);
        assert_eq!(ops, [Op::Stall]);
    }

    #[test]
    fn bus_reset_deconfigures() {
        let mut device = configured();
        setup(&mut device, [0x01, request::SET_INTERFACE, 1, 0, 1, 0, 0, 0]);

        device.handle_event(UsbEvent::BusReset);
        assert_eq!(
            device.endpoints_mut().bus_mut().take(),
            [
                Op::Disable(1, Direction::In),
                Op::Disable(1, Direction::Out),
                Op::Address(0)
            ]
        );
        assert_eq!(device.configuration(), 0);
        assert_eq!(device.class().resets, 1);
    }

    #[test]
    fn poll_drains_bounded_batches() {
        let mut device = device();
        let mut queue = event::EventQueue::new();
        let (mut sender, mut receiver) = event::split(&mut queue);

        for _ in 0..MAX_EVENTS_PER_POLL + 3 {
            sender.push(UsbEvent::BusReset);
        }

        device.poll(&mut receiver);
        assert_eq!(device.class().resets, MAX_EVENTS_PER_POLL);
        assert_eq!(receiver.len(), 3);

        device.poll(&mut receiver);
        assert!(receiver.is_empty());
        assert_eq!(device.class().resets, MAX_EVENTS_PER_POLL + 3);
    }
}

//! Stages of control transfers on endpoint zero.
use crate::endpoint::Endpoints;
use crate::hal::{DataPid, UsbBus};
use crate::setup::SetupPacket;
use crate::{Direction, Error, EP0_MAX_PACKET_SIZE, MAX_CONTROL_DATA_SIZE};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Idle,
    /// Sending data to the host. A zero length packet follows the data when `terminate` is set.
    DataIn { terminate: bool },
    StatusIn,
    /// Waiting for the payload of a class request.
    DataOut(SetupPacket),
    StatusOut,
}

pub(crate) struct ControlPipe {
    stage: Stage,
    data: [u8; MAX_CONTROL_DATA_SIZE],
    total: usize,
    sent: usize,
    pending_address: Option<u8>,
}

impl ControlPipe {
    pub(crate) const fn new() -> Self {
        Self {
            stage: Stage::Idle,
            data: [0; MAX_CONTROL_DATA_SIZE],
            total: 0,
            sent: 0,
            pending_address: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.stage = Stage::Idle;
        self.total = 0;
        self.sent = 0;
        self.pending_address = None;
    }

    /// A new setup packet aborts whatever transfer was in progress.
    pub(crate) fn setup<B: UsbBus>(&mut self, endpoints: &mut Endpoints<B>) {
        self.reset();

        // Data and status stages always start with DATA1.
        endpoints.set_next_pid(0, Direction::In, DataPid::Data1);
        endpoints.set_next_pid(0, Direction::Out, DataPid::Data1);
    }

    /// Starts a data stage that sends `data`, truncated to what the host asked for.
    pub(crate) fn start_in<B: UsbBus>(
        &mut self,
        endpoints: &mut Endpoints<B>,
        data: &[u8],
        requested: u16,
    ) -> Result<(), Error> {
        let len = data.len().min(requested as usize).min(MAX_CONTROL_DATA_SIZE);
        self.data[..len].copy_from_slice(&data[..len]);
        self.total = len;
        self.sent = 0;

        // A data stage that ends on a full packet is terminated by a zero length packet.
        let terminate = len != 0 && len % EP0_MAX_PACKET_SIZE == 0;
        self.stage = Stage::DataIn { terminate };

        self.send_next_chunk(endpoints)
    }

    /// Acknowledges a request without data stage, or with a received data stage.
    pub(crate) fn ack<B: UsbBus>(&mut self, endpoints: &mut Endpoints<B>) -> Result<(), Error> {
        self.stage = Stage::StatusIn;
        endpoints.set_next_pid(0, Direction::In, DataPid::Data1);
        endpoints.start_in(0, &[])
    }

    pub(crate) fn stall<B: UsbBus>(&mut self, endpoints: &mut Endpoints<B>) {
        self.stage = Stage::Idle;
        self.pending_address = None;
        endpoints.bus_mut().stall_ep0();
    }

    /// Receives the single packet data stage of `request`.
    pub(crate) fn expect_out<B: UsbBus>(
        &mut self,
        endpoints: &mut Endpoints<B>,
        request: SetupPacket,
    ) -> Result<(), Error> {
        let len = request.length as usize;
        if len > EP0_MAX_PACKET_SIZE {
            panic!("Control OUT data stage of {} bytes exceeds one packet", len);
        }

        self.stage = Stage::DataOut(request);
        endpoints.set_next_pid(0, Direction::Out, DataPid::Data1);
        endpoints.start_out(0, len)
    }

    /// The address is applied once the status stage of `SET_ADDRESS` is complete.
    pub(crate) fn set_pending_address(&mut self, address: u8) {
        self.pending_address = Some(address);
    }

    pub(crate) fn in_complete<B: UsbBus>(&mut self, endpoints: &mut Endpoints<B>) -> Result<(), Error> {
        match self.stage {
            Stage::DataIn { terminate } => {
                if self.sent < self.total {
                    self.send_next_chunk(endpoints)
                } else if terminate {
                    self.stage = Stage::DataIn { terminate: false };
                    endpoints.start_in(0, &[])
                } else {
                    self.stage = Stage::StatusOut;
                    endpoints.set_next_pid(0, Direction::Out, DataPid::Data1);
                    endpoints.start_out(0, 0)
                }
            }
            Stage::StatusIn => {
                self.stage = Stage::Idle;
                if let Some(address) = self.pending_address.take() {
                    trace!("Set address {}", address);
                    endpoints.bus_mut().set_address(address);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Returns the request whose data stage was received, if any.
    pub(crate) fn out_complete(&mut self) -> Option<SetupPacket> {
        match self.stage {
            Stage::DataOut(request) => {
                self.stage = Stage::Idle;
                Some(request)
            }
            Stage::StatusOut => {
                self.stage = Stage::Idle;
                None
            }
            _ => None,
        }
    }

    fn send_next_chunk<B: UsbBus>(&mut self, endpoints: &mut Endpoints<B>) -> Result<(), Error> {
        let end = (self.sent + EP0_MAX_PACKET_SIZE).min(self.total);
        let chunk = &self.data[self.sent..end];
        self.sent = end;

        endpoints.start_in(0, chunk)
    }
}

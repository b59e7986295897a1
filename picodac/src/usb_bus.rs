//! The RP2040 USB controller, in device mode.
//!
//! The interrupt handler only turns status bits into [`UsbEvent`]s. All register writes that drive transfers are
//! done by [`Rp2040Bus`], from the main loop.
use core::cell::RefCell;

use defmt::{trace, warn};
use embassy_rp::interrupt;
use embassy_rp::pac;
use embassy_rp::pac::usb_dpram::vals::EpControlEndpointType;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use uac2::hal::{DataPid, EndpointType};
use uac2::{Direction, EventSender, SetupPacket, UsbBus, UsbEvent, MAX_ENDPOINTS};

/// Size of the controller's dual-port RAM.
const DPRAM_SIZE: usize = 4096;
/// Fixed buffer of endpoint zero, shared by both directions.
const EP0_BUFFER: u16 = 0x100;
/// Start of the buffers of all other endpoints.
const DATA_BUFFERS: u16 = 0x180;

static EVENT_SENDER: Mutex<CriticalSectionRawMutex, RefCell<Option<EventSender<'static>>>> =
    Mutex::new(RefCell::new(None));

fn dpram() -> *mut u8 {
    pac::USBCTRL_DPRAM.as_ptr() as *mut u8
}

fn pid_bit(pid: DataPid) -> bool {
    pid == DataPid::Data1
}

pub struct Rp2040Bus {
    /// Buffer addresses in DPRAM, per endpoint number.
    in_buffers: [u16; MAX_ENDPOINTS],
    out_buffers: [u16; MAX_ENDPOINTS],
}

impl Rp2040Bus {
    /// Takes the controller out of reset and prepares it for device mode, still disconnected from the bus.
    pub fn new() -> Self {
        pac::RESETS.reset().modify(|w| w.set_usbctrl(true));
        pac::RESETS.reset().modify(|w| w.set_usbctrl(false));
        while !pac::RESETS.reset_done().read().usbctrl() {}

        // Clear setup packet, endpoint control and buffer control registers.
        unsafe { core::ptr::write_bytes(dpram(), 0, EP0_BUFFER as usize) };

        let regs = pac::USBCTRL_REGS;
        regs.usb_muxing().write(|w| {
            w.set_to_phy(true);
            w.set_softcon(true);
        });
        // Not every board routes VBUS to the chip.
        regs.usb_pwr().write(|w| {
            w.set_vbus_detect(true);
            w.set_vbus_detect_override_en(true);
        });
        regs.main_ctrl().write(|w| w.set_controller_en(true));
        regs.sie_ctrl().write(|w| w.set_ep0_int_1buf(true));
        regs.inte().write(|w| {
            w.set_buff_status(true);
            w.set_bus_reset(true);
            w.set_setup_req(true);
        });

        let mut in_buffers = [0; MAX_ENDPOINTS];
        let mut out_buffers = [0; MAX_ENDPOINTS];
        in_buffers[0] = EP0_BUFFER;
        out_buffers[0] = EP0_BUFFER;

        Self {
            in_buffers,
            out_buffers,
        }
    }

    /// Hands the event queue to the interrupt handler and connects to the host.
    pub fn connect(&mut self, sender: EventSender<'static>) {
        EVENT_SENDER.lock(|s| s.borrow_mut().replace(sender));

        unsafe { cortex_m::peripheral::NVIC::unmask(interrupt::USBCTRL_IRQ) };
        pac::USBCTRL_REGS.sie_ctrl().modify(|w| w.set_pullup_en(true));
    }

    fn write_buffer_control(number: u8, direction: Direction, len: u16, pid: DataPid, full: bool) {
        let dpram = pac::USBCTRL_DPRAM;
        let control = match direction {
            Direction::In => dpram.ep_in_buffer_control(number as usize),
            Direction::Out => dpram.ep_out_buffer_control(number as usize),
        };

        control.write(|w| {
            w.set_pid(0, pid_bit(pid));
            w.set_length(0, len);
            w.set_full(0, full);
        });
        // The controller may sample the register in its own clock domain, so AVAILABLE goes in last.
        cortex_m::asm::delay(12);
        control.write(|w| {
            w.set_pid(0, pid_bit(pid));
            w.set_length(0, len);
            w.set_full(0, full);
            w.set_available(0, true);
        });
    }
}

impl Default for Rp2040Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbBus for Rp2040Bus {
    const BUFFER_MEMORY_SIZE: usize = DPRAM_SIZE - DATA_BUFFERS as usize;

    fn enable_endpoint(&mut self, number: u8, direction: Direction, ep_type: EndpointType, buffer_offset: u16) {
        if number == 0 || number as usize >= MAX_ENDPOINTS {
            return;
        }

        let address = DATA_BUFFERS + buffer_offset;
        let dpram = pac::USBCTRL_DPRAM;
        let index = number as usize - 1;
        let control = match direction {
            Direction::In => {
                self.in_buffers[number as usize] = address;
                dpram.ep_in_control(index)
            }
            Direction::Out => {
                self.out_buffers[number as usize] = address;
                dpram.ep_out_control(index)
            }
        };

        control.write(|w| {
            w.set_enable(true);
            w.set_interrupt_per_buff(true);
            w.set_endpoint_type(EpControlEndpointType::from_bits(ep_type as u8));
            w.set_buffer_address(address);
        });
    }

    fn disable_endpoint(&mut self, number: u8, direction: Direction) {
        if number == 0 || number as usize >= MAX_ENDPOINTS {
            return;
        }

        let dpram = pac::USBCTRL_DPRAM;
        let index = number as usize - 1;
        match direction {
            Direction::In => {
                dpram.ep_in_control(index).write(|w| w.set_enable(false));
                dpram.ep_in_buffer_control(number as usize).write(|_| {});
            }
            Direction::Out => {
                dpram.ep_out_control(index).write(|w| w.set_enable(false));
                dpram.ep_out_buffer_control(number as usize).write(|_| {});
            }
        }
    }

    fn arm_in(&mut self, number: u8, data: &[u8], pid: DataPid) {
        let address = self.in_buffers[number as usize];

        // The controller does not touch the buffer until it is marked available.
        unsafe {
            core::ptr::copy_nonoverlapping(data.as_ptr(), dpram().add(address as usize), data.len());
        }
        Self::write_buffer_control(number, Direction::In, data.len() as u16, pid, true);
    }

    fn arm_out(&mut self, number: u8, len: u16, pid: DataPid) {
        Self::write_buffer_control(number, Direction::Out, len, pid, false);
    }

    fn read_out(&mut self, number: u8, buf: &mut [u8]) {
        let address = self.out_buffers[number as usize];

        // Only called for completed transfers, which the controller released.
        unsafe {
            core::ptr::copy_nonoverlapping(dpram().add(address as usize), buf.as_mut_ptr(), buf.len());
        }
    }

    fn stall_ep0(&mut self) {
        pac::USBCTRL_REGS.ep_stall_arm().write(|w| {
            w.set_ep0_in(true);
            w.set_ep0_out(true);
        });

        let dpram = pac::USBCTRL_DPRAM;
        dpram.ep_in_buffer_control(0).write(|w| w.set_stall(true));
        dpram.ep_out_buffer_control(0).write(|w| w.set_stall(true));
    }

    fn set_address(&mut self, address: u8) {
        trace!("USB address {}", address);
        pac::USBCTRL_REGS.addr_endp().write(|w| w.set_address(address));
    }
}

fn push(event: UsbEvent) {
    critical_section::with(|cs| match EVENT_SENDER.borrow(cs).borrow_mut().as_mut() {
        Some(sender) => sender.push(event),
        None => warn!("USB event before connect"),
    });
}

#[interrupt]
fn USBCTRL_IRQ() {
    let regs = pac::USBCTRL_REGS;
    let ints = regs.ints().read();

    if ints.setup_req() {
        let mut packet = [0u8; 8];
        unsafe { core::ptr::copy_nonoverlapping(dpram(), packet.as_mut_ptr(), packet.len()) };
        regs.sie_status().write(|w| w.set_setup_rec(true));

        push(UsbEvent::Setup(SetupPacket::parse(&packet)));
    }

    if ints.buff_status() {
        let status = regs.buff_status().read().0;
        regs.buff_status().write_value(pac::usb::regs::BuffStatus(status));

        let dpram = pac::USBCTRL_DPRAM;
        let mut pending = status;
        while pending != 0 {
            let bit = pending.trailing_zeros();
            pending &= !(1 << bit);

            // IN and OUT alternate, starting with EP0 IN.
            let endpoint = (bit / 2) as u8;
            let (direction, control) = if bit % 2 == 0 {
                (Direction::In, dpram.ep_in_buffer_control(endpoint as usize))
            } else {
                (Direction::Out, dpram.ep_out_buffer_control(endpoint as usize))
            };

            push(UsbEvent::BufferDone {
                endpoint,
                direction,
                length: control.read().length(0),
            });
        }
    }

    if ints.bus_reset() {
        regs.sie_status().write(|w| w.set_bus_reset(true));
        push(UsbEvent::BusReset);
    }
}

#![no_std]
#![no_main]

use audio::playback::{Config, Playback};
use defmt::{info, unwrap};
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::PIO0;
use embassy_rp::pio::{InterruptHandler, Pio};
use embassy_rp::pio_programs::i2s::{PioI2sOut, PioI2sOutProgram};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::zerocopy_channel;
use picodac::i2s::{i2s_task, I2sOutput};
use picodac::led::{blink_task, Led};
use picodac::usb_bus::Rp2040Bus;
use picodac::*;
use static_cell::StaticCell;
use uac2::speaker::{self, Speaker};
use uac2::{EventQueue, UsbDevice};
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => InterruptHandler<PIO0>;
});

type PicoSpeaker = Speaker<I2sOutput<'static>, Led>;

static EVENT_QUEUE: StaticCell<EventQueue> = StaticCell::new();
static DEVICE: StaticCell<UsbDevice<'static, Rp2040Bus, PicoSpeaker>> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Hi.");

    // 125 MHz system clock and 48 MHz USB clock, from the 12 MHz crystal.
    let p = embassy_rp::init(Default::default());

    // I2S on PIO0, with samples moved by DMA.
    let mut pio = Pio::new(p.PIO0, Irqs);

    static I2S_PROGRAM: StaticCell<PioI2sOutProgram<'static, PIO0>> = StaticCell::new();
    let program = I2S_PROGRAM.init(PioI2sOutProgram::new(&mut pio.common));

    let i2s = PioI2sOut::new(
        &mut pio.common,
        pio.sm0,
        p.DMA_CH0,
        p.PIN_20,
        p.PIN_18,
        p.PIN_19,
        audio::DEFAULT_SAMPLE_RATE_HZ,
        I2S_BIT_DEPTH,
        I2S_CHANNEL_COUNT,
        program,
    );

    // Output periods travel from the main loop to the I2S task.
    static PERIODS: StaticCell<[I2sPeriod; PERIOD_COUNT]> = StaticCell::new();
    let periods = PERIODS.init([I2sPeriod::new(), I2sPeriod::new()]);

    static PERIOD_CHANNEL: StaticCell<zerocopy_channel::Channel<'static, NoopRawMutex, I2sPeriod>> = StaticCell::new();
    let period_channel = PERIOD_CHANNEL.init(zerocopy_channel::Channel::new(periods));
    let (period_sender, period_receiver) = period_channel.split();

    let output = I2sOutput::new(period_sender, Output::new(p.PIN_22, Level::Low));
    let playback = unwrap!(Playback::new(output, Led, Config::default()));

    let queue = EVENT_QUEUE.init(EventQueue::new());
    let (event_sender, mut event_receiver) = uac2::event::split(queue);

    let device = DEVICE.init(UsbDevice::new(
        Rp2040Bus::new(),
        speaker::descriptor_set(),
        Speaker::new(playback),
    ));
    unwrap!(Speaker::register(device));

    unwrap!(spawner.spawn(blink_task(Output::new(p.PIN_25, Level::Low))));
    unwrap!(spawner.spawn(i2s_task(i2s, period_receiver)));

    device.endpoints_mut().bus_mut().connect(event_sender);
    info!("USB connected");

    loop {
        device.poll(&mut event_receiver);
        device.class_mut().tick();

        embassy_futures::yield_now().await;
    }
}

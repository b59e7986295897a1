//! Status LED, blinked by a task.
use core::sync::atomic::{AtomicU32, Ordering};

use audio::output::StatusIndicator;
use embassy_rp::gpio::Output;
use embassy_time::Timer;

// Half of the blink period, zero for solid on.
static HALF_PERIOD_US: AtomicU32 = AtomicU32::new(0);

/// Poll interval while the LED is solid on.
const IDLE_POLL_MS: u64 = 10;

/// Hands blink periods to [`blink_task`].
pub struct Led;

impl StatusIndicator for Led {
    fn set_blink_period_us(&mut self, period_us: u32) {
        HALF_PERIOD_US.store((period_us / 2).max(1), Ordering::Relaxed);
    }

    fn led_on(&mut self) {
        HALF_PERIOD_US.store(0, Ordering::Relaxed);
    }
}

#[embassy_executor::task]
pub async fn blink_task(mut led_pin: Output<'static>) {
    loop {
        match HALF_PERIOD_US.load(Ordering::Relaxed) {
            0 => {
                led_pin.set_high();
                Timer::after_millis(IDLE_POLL_MS).await;
            }
            half_period_us => {
                led_pin.toggle();
                Timer::after_micros(half_period_us as u64).await;
            }
        }
    }
}

//! Status LED
//!
//! Plays the requested [`LedPattern`] on the indicator LED. A pulse is
//! momentary and drops back to whatever steady pattern was playing.

use crate::system::indicator::{self, LedPattern};
use crate::system::resources::StatusLedResources;
use embassy_futures::select::{select, Either};
use embassy_rp::gpio::{Level, Output};
use embassy_time::{Duration, Timer};

/// On and off phase lengths per steady pattern (ms)
fn timing(pattern: LedPattern) -> (u64, u64) {
    match pattern {
        LedPattern::Idle => (60, 2940),
        LedPattern::Active => (500, 0),
        LedPattern::Fault => (150, 150),
        // Played inline, never a steady phase
        LedPattern::Pulse => (0, 0),
    }
}

#[embassy_executor::task]
pub async fn status_led(r: StatusLedResources) {
    let mut led = Output::new(r.led_pin, Level::Low);
    let mut steady = LedPattern::Idle;
    loop {
        let (on, off) = timing(steady);

        led.set_high();
        if let Either::First(incoming) =
            select(indicator::wait_led(), Timer::after(Duration::from_millis(on))).await
        {
            steady = absorb(&mut led, steady, incoming).await;
            continue;
        }

        led.set_low();
        if let Either::First(incoming) =
            select(indicator::wait_led(), Timer::after(Duration::from_millis(off))).await
        {
            steady = absorb(&mut led, steady, incoming).await;
        }
    }
}

/// Applies an incoming request, playing momentary pulses inline
async fn absorb(led: &mut Output<'static>, steady: LedPattern, incoming: LedPattern) -> LedPattern {
    if incoming != LedPattern::Pulse {
        return incoming;
    }
    for _ in 0..2 {
        led.set_high();
        Timer::after(Duration::from_millis(40)).await;
        led.set_low();
        Timer::after(Duration::from_millis(60)).await;
    }
    steady
}

//! Chime Output
//!
//! Plays short melodies on the piezo buzzer. Tones sit in the 2.4-3.6 kHz
//! band, which keeps the PWM wrap value inside 16 bits at the stock
//! 150 MHz system clock without touching the divider.

use crate::system::indicator::{self, ChimeRequest};
use crate::system::resources::ChimeResources;
use embassy_rp::pwm::{Config, Pwm};
use embassy_time::{Duration, Timer};

const SYSTEM_CLOCK_HZ: u32 = 150_000_000;

/// Gap between notes (ms)
const NOTE_GAP_MS: u64 = 20;

/// Notes as (frequency in Hz, duration in ms)
fn melody(request: ChimeRequest) -> &'static [(u32, u64)] {
    match request {
        ChimeRequest::Startup => &[(2400, 120), (3000, 120), (3600, 160)],
        ChimeRequest::Connected => &[(2700, 90), (3600, 140)],
        ChimeRequest::Disconnected => &[(3600, 90), (2400, 140)],
        ChimeRequest::Confirm => &[(3000, 60)],
    }
}

#[embassy_executor::task]
pub async fn chime(r: ChimeResources) {
    // Default config is enabled with zero duty, so the buzzer starts silent
    let mut config = Config::default();
    let mut pwm = Pwm::new_output_b(r.slice, r.buzzer_pin, config.clone());

    loop {
        let request = indicator::wait_chime().await;
        for &(freq, ms) in melody(request) {
            play(&mut pwm, &mut config, freq, ms).await;
        }
    }
}

async fn play(pwm: &mut Pwm<'static>, config: &mut Config, freq: u32, ms: u64) {
    let top = (SYSTEM_CLOCK_HZ / freq) as u16;
    config.top = top;
    config.compare_b = top / 2;
    pwm.set_config(config);
    Timer::after(Duration::from_millis(ms)).await;

    config.compare_b = 0;
    pwm.set_config(config);
    Timer::after(Duration::from_millis(NOTE_GAP_MS)).await;
}

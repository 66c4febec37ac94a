//! Status Indicator and Chime Requests
//!
//! Signal-based handoff from the core to the LED and chime tasks. A
//! signal only keeps the most recent value, which is exactly right for
//! indication: a newer pattern supersedes an unserved one.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// Status LED patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "pico2w", derive(defmt::Format))]
pub enum LedPattern {
    /// Slow heartbeat while idle
    Idle,
    /// Steady on while a mode is running
    Active,
    /// One short flash, then back to the steady pattern
    Pulse,
    /// Fast blink after an unrecoverable subsystem failure
    Fault,
}

/// Chime melodies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "pico2w", derive(defmt::Format))]
pub enum ChimeRequest {
    Startup,
    Connected,
    Disconnected,
    /// Menu confirmation blip
    Confirm,
}

static LED_CHANGED: Signal<CriticalSectionRawMutex, LedPattern> = Signal::new();
static CHIME_REQUESTED: Signal<CriticalSectionRawMutex, ChimeRequest> = Signal::new();

/// Requests an LED pattern change
pub fn set_led(pattern: LedPattern) {
    LED_CHANGED.signal(pattern);
}

/// Waits for the next LED pattern request
pub async fn wait_led() -> LedPattern {
    LED_CHANGED.wait().await
}

/// Short flash marking one capture cycle
pub fn capture_pulse() {
    set_led(LedPattern::Pulse);
}

/// Requests a chime
pub fn chime(request: ChimeRequest) {
    CHIME_REQUESTED.signal(request);
}

/// Waits for the next chime request
pub async fn wait_chime() -> ChimeRequest {
    CHIME_REQUESTED.wait().await
}

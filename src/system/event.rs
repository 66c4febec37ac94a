//! System Events
//!
//! Defines events and channels for inter-task communication.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

/// Multi-producer, single-consumer event channel with capacity of 10
pub static EVENT_CHANNEL: Channel<CriticalSectionRawMutex, Events, 10> = Channel::new();

/// Sends an event to the system channel
pub async fn send(event: Events) {
    EVENT_CHANNEL.sender().send(event).await;
}

/// Receives the next event from the system channel
pub async fn wait() -> Events {
    EVENT_CHANNEL.receiver().receive().await
}

/// System-wide events
#[derive(Debug, Clone)]
#[cfg_attr(feature = "pico2w", derive(defmt::Format))]
pub enum Events {
    /// Raw command byte from the wireless control characteristic
    ControlByte(u8),
    /// A control peer finished connecting
    PeerConnected,
    /// The control peer dropped, both on a clean disconnect and when the
    /// health check finds the link dead
    PeerDisconnected,
    /// Local button input, already debounced and classified
    Button(ButtonPress),
}

/// Classified button input
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "pico2w", derive(defmt::Format))]
pub enum ButtonPress {
    /// Short press, advances the menu selection
    Click,
    /// Hold past the hold threshold, opens the menu or confirms
    LongPress,
}

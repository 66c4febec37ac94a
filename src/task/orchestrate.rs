//! Orchestrator Module
//!
//! Central event loop: consumes system events, routes command bytes and
//! connection edges through the controller, feeds button presses to the
//! local menu, and mirrors the resulting state onto the indicator LED
//! and the display.

use crate::system::controller;
use crate::system::event;
use crate::system::indicator::{self, ChimeRequest, LedPattern};
use crate::system::menu::{LocalMenu, SCREEN};
use crate::system::state::{self, ActiveMode};
use defmt::{info, warn};

/// Main orchestrator task
///
/// Both command sources end up here: wireless bytes arrive as events
/// from the link task, and confirmed menu items yield the same bytes
/// locally. Everything funnels through the one arbitration path.
#[embassy_executor::task]
pub async fn orchestrate() {
    info!("Orchestrator started");
    let mut menu = LocalMenu::new();
    loop {
        let event = event::wait().await;
        process_event(&mut menu, event).await;
        refresh_indication(&menu);
    }
}

async fn process_event(menu: &mut LocalMenu, event: event::Events) {
    match event {
        event::Events::ControlByte(byte) => {
            if let Err(e) = controller::handle_command(byte).await {
                warn!("Command 0x{:02x} not handled: {}", byte, e);
            }
        }
        event::Events::PeerConnected => {
            controller::on_peer_connected().await;
            indicator::chime(ChimeRequest::Connected);
        }
        event::Events::PeerDisconnected => {
            controller::on_peer_disconnected().await;
            indicator::chime(ChimeRequest::Disconnected);
        }
        event::Events::Button(press) => {
            let active = state::active_mode();
            if let Some(byte) = menu.on_press(press, active) {
                indicator::chime(ChimeRequest::Confirm);
                if let Err(e) = controller::handle_command(byte).await {
                    warn!("Menu command 0x{:02x} not handled: {}", byte, e);
                }
            }
        }
    }
}

/// Publishes the screen model and the LED pattern after every event
fn refresh_indication(menu: &LocalMenu) {
    let active = state::active_mode();
    SCREEN.signal(menu.screen_model(active));
    indicator::set_led(if active == ActiveMode::None {
        LedPattern::Idle
    } else {
        LedPattern::Active
    });
}

//! Menu Button Handling
//!
//! Classifies presses of the single navigation button and forwards them
//! as events.

use crate::system::event;
use crate::system::resources::MenuButtonResources;
use embassy_futures::select::{select, Either};
use embassy_rp::gpio::{Input, Level, Pull};
use embassy_time::{Duration, Timer};

/// Button hold threshold (ms)
const HOLD_DURATION: Duration = Duration::from_millis(700);

/// Button debounce delay (ms)
const DEBOUNCE_DURATION: Duration = Duration::from_millis(30);

/// Navigation button handler
///
/// Generates:
/// - Click for a short press
/// - LongPress once the hold threshold elapses
#[embassy_executor::task]
pub async fn menu_button(r: MenuButtonResources) {
    let mut btn = Input::new(r.button_pin, Pull::Up);
    loop {
        let init_level = debounce(&mut btn).await;

        // Pulled up, so a press reads low
        if init_level != Level::Low {
            continue;
        }

        match select(Timer::after(HOLD_DURATION), debounce(&mut btn)).await {
            Either::First(()) => {
                event::send(event::Events::Button(event::ButtonPress::LongPress)).await;
                btn.wait_for_high().await;
            }
            Either::Second(_) => {
                event::send(event::Events::Button(event::ButtonPress::Click)).await;
            }
        }
    }
}

/// Ensures stable button state
async fn debounce(button: &mut Input<'static>) -> Level {
    loop {
        let st_level = button.get_level();
        button.wait_for_any_edge().await;
        Timer::after(DEBOUNCE_DURATION).await;
        let end_level = button.get_level();
        if st_level != end_level {
            break end_level;
        }
    }
}

//! Periodic Upkeep
//!
//! Runs the recurring link maintenance from one place: the keep-alive
//! beacon, the connection health check against the transport's own peer
//! count, and the periodic status report. Also feeds the hardware
//! watchdog, so a wedged executor resets the device.

use crate::system::controller;
use crate::system::resources::UpkeepResources;
use crate::task::ble_link;
use embassy_rp::watchdog::Watchdog;
use embassy_time::{Duration, Instant, Ticker};

/// Watchdog timeout; the 10 ms upkeep tick feeds well inside it
const WATCHDOG_TIMEOUT: Duration = Duration::from_millis(5000);

#[embassy_executor::task]
pub async fn upkeep(r: UpkeepResources) {
    let mut watchdog = Watchdog::new(r.watchdog);
    watchdog.pause_on_debug(true);
    watchdog.start(WATCHDOG_TIMEOUT);

    let mut ticker = Ticker::every(Duration::from_millis(10));
    let mut next_keep_alive = Instant::now() + controller::KEEP_ALIVE_PERIOD;
    let mut next_health = Instant::now() + controller::HEALTH_CHECK_PERIOD;
    let mut next_status = Instant::now() + controller::STATUS_PERIOD;

    loop {
        ticker.next().await;
        watchdog.feed();
        let now = Instant::now();

        if now >= next_keep_alive {
            controller::keep_alive_tick();
            next_keep_alive = now + controller::KEEP_ALIVE_PERIOD;
        }
        if now >= next_health {
            controller::health_check(ble_link::peer_count()).await;
            next_health = now + controller::HEALTH_CHECK_PERIOD;
        }
        if now >= next_status {
            controller::status_tick();
            next_status = now + controller::STATUS_PERIOD;
        }
    }
}

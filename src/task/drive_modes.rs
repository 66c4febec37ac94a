//! Mode Driver
//!
//! Owns the camera and the three mode workers, and turns the
//! controller's observer flags into worker lifecycle calls. A consumed
//! stop request also carries the restart policy: an operator stop
//! reboots the device once the worker has wound down, a stop caused by
//! disconnect handling leaves it idle.

use crate::platform::rp2350::sdcard::SdImageStore;
use crate::platform::test_pattern::TestPatternCamera;
use crate::system::capture::{self, CaptureWorker};
use crate::system::controller::{self, StopDisposition};
use crate::system::inference::{self, InferenceWorker};
use crate::system::preview::{self, PreviewWorker};
use crate::system::resources::SdCardResources;
use crate::system::state::{self, ActiveMode};
use crate::task::wifi_stream::SignalPreviewLink;
use defmt::{info, warn};
use embassy_rp::gpio::{Level, Output};
use embassy_rp::spi::{self, Spi};
use embassy_time::{Delay, Duration, Instant, Ticker, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use embedded_sdmmc::SdCard;

/// Worker poll cadence
const DRIVE_TICK: Duration = Duration::from_millis(20);

/// Pause before a failed worker start may be attempted again
const BEGIN_RETRY_DELAY: Duration = Duration::from_secs(1);

/// JPEG encode scratch size
const ENCODE_SCRATCH: usize = 16384;

#[embassy_executor::task]
pub async fn drive_modes(r: SdCardResources) {
    // SD cards want a slow clock while they initialize; the probe below
    // runs at 400 kHz, then the bus moves to full speed.
    let mut spi_config = spi::Config::default();
    spi_config.frequency = 400_000;
    let bus = Spi::new_blocking(r.spi, r.clk_pin, r.mosi_pin, r.miso_pin, spi_config);
    let cs = Output::new(r.cs_pin, Level::High);
    let device = ExclusiveDevice::new(bus, cs, Delay).unwrap();
    let sdcard = SdCard::new(device, Delay);
    match sdcard.num_bytes() {
        Ok(size) => info!("SD card reports {} bytes", size),
        Err(e) => warn!("SD card not responding: {}", defmt::Debug2Format(&e)),
    }
    sdcard.spi(|dev| dev.bus_mut().set_frequency(16_000_000));

    let mut camera = TestPatternCamera::new();
    let mut capture_worker = CaptureWorker::new(SdImageStore::new(sdcard));
    let mut preview_worker = PreviewWorker::new(SignalPreviewLink);
    let mut inference_worker = InferenceWorker::new();
    let mut scratch = [0u8; ENCODE_SCRATCH];

    let mut last_begin_failure: Option<Instant> = None;
    let mut ticker = Ticker::every(DRIVE_TICK);
    info!("Mode driver started");

    loop {
        ticker.next().await;
        let now = Instant::now();

        // Stop requests first, so a restart never races a fresh poll
        if capture::take_stop_request() {
            if capture_worker.is_running() {
                capture_worker.stop(&mut camera);
            }
            finish_stop().await;
        }
        if preview::take_stop_request() {
            if preview_worker.is_running() {
                preview_worker.stop(&mut camera).await;
            }
            finish_stop().await;
        }
        if inference::take_stop_request() {
            if inference_worker.is_running() {
                inference_worker.stop(&mut camera);
            }
            finish_stop().await;
        }

        // Start edges, gated by the failed-start debounce
        let may_begin = match last_begin_failure {
            Some(at) => now >= at + BEGIN_RETRY_DELAY,
            None => true,
        };
        if may_begin {
            if capture::desired() && !capture_worker.is_running() {
                match capture_worker.begin(&mut camera).await {
                    Ok(()) => info!("Capture worker running"),
                    Err(e) => {
                        warn!("Capture start failed: {}", e);
                        last_begin_failure = Some(now);
                        controller::rollback_failed_start(ActiveMode::Capture).await;
                    }
                }
            }
            if preview::desired() && !preview_worker.is_running() {
                match preview_worker.begin(&mut camera).await {
                    Ok(()) => info!("Preview worker running"),
                    Err(e) => {
                        warn!("Preview start failed: {}", e);
                        last_begin_failure = Some(now);
                        controller::rollback_failed_start(ActiveMode::Preview).await;
                    }
                }
            }
            if inference::desired() && !inference_worker.is_running() {
                match inference_worker.begin(&mut camera) {
                    Ok(()) => info!("Inference worker running"),
                    Err(e) => {
                        warn!("Inference start failed: {}", e);
                        last_begin_failure = Some(now);
                        controller::rollback_failed_start(ActiveMode::Inference).await;
                    }
                }
            }
        }

        // Each poll is a no-op unless its worker is the running one
        capture_worker.poll(&mut camera, &mut scratch, now).await;
        preview_worker.poll(&mut camera, now).await;
        inference_worker.poll(&mut camera, now);
    }
}

/// Restart policy at the completion of a stop request
async fn finish_stop() {
    match controller::restart_disposition(state::explicit_stop(), state::disconnecting()) {
        StopDisposition::RestartDevice => {
            controller::push_notification("Restarting...");
            Timer::after(controller::RESTART_GRACE).await;
            info!("Restarting after operator stop");
            cortex_m::peripheral::SCB::sys_reset();
        }
        StopDisposition::RemainIdle => {}
    }
}

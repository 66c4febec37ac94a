//! Timed Capture Worker
//!
//! Persists a frame pair every interval: the raw sensor dump as
//! `picture<N>.rgb` and the compressed form as `picture<N>.jpg`. The two
//! saves succeed or fail independently; losing the JPEG never discards
//! the raw capture. `N` is seeded from the highest index already on the
//! medium so a restart never overwrites earlier images.

use core::fmt::Write as _;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_time::{Duration, Instant};
use heapless::String;
use serde::Serialize;

use crate::platform::{Camera, CameraProfile, ImageStore};
use crate::system::{controller, indicator, WorkerError};
use crate::{log_error, log_info};

/// Time between capture cycles
pub const CAPTURE_INTERVAL: Duration = Duration::from_secs(5);

static DESIRED: AtomicBool = AtomicBool::new(false);
static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Observer registered with the mode controller
///
/// Every `false` also latches a stop request; the mode driver consumes
/// it and evaluates the restart policy, including for a stop of a mode
/// that was not running.
pub fn mode_observer(enabled: bool) {
    DESIRED.store(enabled, Ordering::Release);
    if !enabled {
        STOP_REQUESTED.store(true, Ordering::Release);
    }
}

/// Whether the arbitration wants this worker running
pub fn desired() -> bool {
    DESIRED.load(Ordering::Acquire)
}

/// Consumes the pending stop request, if any
pub fn take_stop_request() -> bool {
    STOP_REQUESTED.swap(false, Ordering::AcqRel)
}

/// Index parsed from `picture<N>.rgb` / `picture<N>.jpg` names
pub fn parse_image_index(name: &str) -> Option<u32> {
    let rest = name.strip_prefix("picture")?;
    let stem = rest
        .strip_suffix(".rgb")
        .or_else(|| rest.strip_suffix(".jpg"))?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

#[derive(Serialize)]
struct CaptureMetrics {
    image_count: u32,
    last_capture: u64,
    next_capture: u64,
}

pub struct CaptureWorker<S: ImageStore> {
    store: S,
    next_index: u32,
    session_count: u32,
    last_capture: Option<Instant>,
    running: bool,
}

impl<S: ImageStore> CaptureWorker<S> {
    pub const fn new(store: S) -> Self {
        Self {
            store,
            next_index: 1,
            session_count: 0,
            last_capture: None,
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Acquires the camera and the storage medium
    ///
    /// Any failure releases what was already acquired and reports the
    /// error; a failed scan also fails the start, since guessing an
    /// index could overwrite existing images.
    pub async fn begin<C: Camera>(&mut self, camera: &mut C) -> Result<(), WorkerError> {
        camera.configure(CameraProfile::Capture)?;
        if let Err(e) = self.store.prepare().await {
            camera.release();
            return Err(e.into());
        }
        let mut highest = 0u32;
        let scan = self
            .store
            .scan_names(|name| {
                if let Some(index) = parse_image_index(name) {
                    highest = highest.max(index);
                }
            })
            .await;
        if let Err(e) = scan {
            camera.release();
            return Err(e.into());
        }
        self.next_index = highest + 1;
        self.session_count = 0;
        self.last_capture = None;
        self.running = true;
        log_info!("Capture ready, next image index {}", self.next_index);
        Ok(())
    }

    /// Runs at most one capture cycle, gated by [`CAPTURE_INTERVAL`]
    ///
    /// `scratch` receives the encoded frame and must be large enough for
    /// the camera's JPEG output.
    pub async fn poll<C: Camera>(&mut self, camera: &mut C, scratch: &mut [u8], now: Instant) {
        if !self.running {
            return;
        }
        if let Some(last) = self.last_capture {
            if now.duration_since(last) < CAPTURE_INTERVAL {
                return;
            }
        }
        self.last_capture = Some(now);
        indicator::capture_pulse();

        let mut raw_ok = false;
        match camera.capture() {
            Ok(frame) => {
                let mut name = String::<24>::new();
                let _ = write!(name, "picture{}.rgb", self.next_index);
                match self.store.save(&name, frame.data).await {
                    Ok(()) => raw_ok = true,
                    Err(e) => log_error!("Failed to save {}: {:?}", name.as_str(), e),
                }
            }
            Err(e) => {
                log_error!("Frame acquisition failed: {:?}", e);
                controller::push_service_status("capture", "capture failed");
                self.push_metrics(now);
                return;
            }
        }

        let mut jpeg_ok = false;
        match camera.encode_jpeg(scratch) {
            Ok(len) => {
                let mut name = String::<24>::new();
                let _ = write!(name, "picture{}.jpg", self.next_index);
                match self.store.save(&name, &scratch[..len]).await {
                    Ok(()) => jpeg_ok = true,
                    Err(e) => log_error!("Failed to save {}: {:?}", name.as_str(), e),
                }
            }
            Err(e) => log_error!("JPEG encode failed: {:?}", e),
        }

        if raw_ok || jpeg_ok {
            self.next_index += 1;
            self.session_count += 1;
        }
        if !raw_ok || !jpeg_ok {
            controller::push_service_status("capture", "write failed");
        }
        self.push_metrics(now);
    }

    /// Releases the camera; safe to call when already stopped
    pub fn stop<C: Camera>(&mut self, camera: &mut C) {
        if !self.running {
            return;
        }
        self.running = false;
        self.last_capture = None;
        camera.release();
        log_info!("Capture stopped after {} images", self.session_count);
    }

    fn push_metrics(&self, now: Instant) {
        let metrics = CaptureMetrics {
            image_count: self.session_count,
            last_capture: now.as_secs(),
            next_capture: (now + CAPTURE_INTERVAL).as_secs(),
        };
        let mut buf = [0u8; 96];
        if let Ok(len) = serde_json_core::to_slice(&metrics, &mut buf) {
            if let Ok(data) = core::str::from_utf8(&buf[..len]) {
                controller::push_metrics("capture", data);
            }
        }
    }
}

//! On-Device Inference Worker
//!
//! The begin/poll/stop contract exists in every build, but the model
//! hook is only compiled into the `inference` build variant. Other
//! builds understand the start command and answer it with an
//! acquisition failure, so the peer sees a clean "failed" status
//! instead of silence.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_time::{Duration, Instant};
use serde::Serialize;

use crate::platform::{Camera, CameraProfile};
use crate::system::{controller, WorkerError};
use crate::{log_error, log_info};

/// Minimum spacing between inference cycles
pub const INFERENCE_INTERVAL: Duration = Duration::from_secs(1);

static DESIRED: AtomicBool = AtomicBool::new(false);
static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Observer registered with the mode controller
///
/// Every `false` also latches a stop request for the mode driver's
/// restart evaluation.
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

#[cfg(feature = "inference")]
mod model {
    /// Mean luminance of the high bytes of an RGB565 frame
    ///
    /// Stands in for the real classifier so the inference pipeline has a
    /// deterministic signal end to end.
    /// TODO: swap in the trained model once its flash layout is settled
    pub fn score(data: &[u8]) -> u8 {
        if data.is_empty() {
            return 0;
        }
        let sum: u32 = data.iter().step_by(2).map(|&b| b as u32).sum();
        (sum / data.len().div_ceil(2) as u32) as u8
    }
}

#[derive(Serialize)]
struct InferenceMetrics {
    cycles: u32,
    score: u8,
}

pub struct InferenceWorker {
    running: bool,
    last_cycle: Option<Instant>,
    cycles: u32,
    score: u8,
}

impl InferenceWorker {
    pub const fn new() -> Self {
        Self {
            running: false,
            last_cycle: None,
            cycles: 0,
            score: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Acquires the camera; fails as unavailable in builds without the
    /// model hook
    pub fn begin<C: Camera>(&mut self, camera: &mut C) -> Result<(), WorkerError> {
        if !cfg!(feature = "inference") {
            return Err(WorkerError::Unavailable);
        }
        camera.configure(CameraProfile::Inference)?;
        self.running = true;
        self.last_cycle = None;
        self.cycles = 0;
        self.score = 0;
        log_info!("Inference ready");
        Ok(())
    }

    /// Runs at most one scoring cycle, gated by [`INFERENCE_INTERVAL`]
    pub fn poll<C: Camera>(&mut self, camera: &mut C, now: Instant) {
        if !self.running {
            return;
        }
        if let Some(last) = self.last_cycle {
            if now.duration_since(last) < INFERENCE_INTERVAL {
                return;
            }
        }
        self.last_cycle = Some(now);

        match camera.capture() {
            Ok(_frame) => {
                #[cfg(feature = "inference")]
                {
                    self.score = model::score(_frame.data);
                }
                self.cycles += 1;
                self.push_metrics();
            }
            Err(e) => log_error!("Inference frame acquisition failed: {:?}", e),
        }
    }

    /// Releases the camera; safe to call when already stopped
    pub fn stop<C: Camera>(&mut self, camera: &mut C) {
        if !self.running {
            return;
        }
        self.running = false;
        self.last_cycle = None;
        camera.release();
        log_info!("Inference stopped after {} cycles", self.cycles);
    }

    fn push_metrics(&self) {
        let metrics = InferenceMetrics {
            cycles: self.cycles,
            score: self.score,
        };
        let mut buf = [0u8; 48];
        if let Ok(len) = serde_json_core::to_slice(&metrics, &mut buf) {
            if let Ok(data) = core::str::from_utf8(&buf[..len]) {
                controller::push_metrics("inference", data);
            }
        }
    }
}

impl Default for InferenceWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockCamera;
    use serial_test::serial;

    #[cfg(not(feature = "inference"))]
    #[test]
    fn begin_is_unavailable_in_this_build() {
        let mut worker = InferenceWorker::new();
        let mut camera = MockCamera::new();
        assert_eq!(worker.begin(&mut camera), Err(WorkerError::Unavailable));
        assert!(!worker.is_running());
        assert_eq!(camera.profile, None);
    }

    #[cfg(feature = "inference")]
    #[test]
    #[serial]
    fn cycles_score_frames_on_the_interval() {
        let mut worker = InferenceWorker::new();
        let mut camera = MockCamera::new();
        worker.begin(&mut camera).unwrap();

        worker.poll(&mut camera, Instant::from_millis(100));
        worker.poll(&mut camera, Instant::from_millis(600));
        assert_eq!(worker.cycles, 1);
        worker.poll(&mut camera, Instant::from_millis(1100));
        assert_eq!(worker.cycles, 2);
        assert!(worker.score > 0);

        worker.stop(&mut camera);
        worker.stop(&mut camera);
        assert_eq!(camera.releases, 1);
    }

    #[test]
    #[serial]
    fn observer_toggles_the_desired_flag() {
        let _ = take_stop_request();
        mode_observer(true);
        assert!(desired());
        mode_observer(false);
        assert!(!desired());
        assert!(take_stop_request());
    }
}

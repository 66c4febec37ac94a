//! Live Preview Worker
//!
//! Runs the camera as an MJPEG source: brings up the device's own access
//! point and the stream server, publishes the connection details over
//! the preview-info characteristic, and hands encoded frames to the
//! stream task through a signal. Teardown order is fixed: the stream
//! server goes down before the access point, so active viewers get a
//! clean close instead of a dead network.

use core::fmt::Write as _;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant};
use heapless::{String, Vec};
use serde::Serialize;

use crate::platform::{Camera, CameraProfile};
use crate::system::{controller, telemetry, WorkerError};
use crate::{log_error, log_info, log_warn};

/// TCP port the MJPEG server listens on
pub const STREAM_PORT: u16 = 81;
/// Minimum spacing between encoded preview frames
pub const FRAME_INTERVAL: Duration = Duration::from_millis(100);
/// Cadence of the preview metrics document
pub const METRICS_PERIOD: Duration = Duration::from_secs(30);
/// Upper bound for one encoded preview frame
pub const FRAME_CAPACITY: usize = 16384;

/// One encoded JPEG frame
pub type FrameBuf = Vec<u8, FRAME_CAPACITY>;

/// Latest encoded frame for the stream task; a newer frame replaces an
/// unconsumed one
pub static FRAME: Signal<CriticalSectionRawMutex, FrameBuf> = Signal::new();

/// Preview-info value published when the worker shuts down
pub const PREVIEW_INFO_DISABLED: &str =
    "{\"status\":\"disabled\",\"message\":\"Preview service stopped\"}";

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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "pico2w", derive(defmt::Format))]
pub enum PreviewError {
    /// Access point did not come up
    AccessPoint,
    /// Stream server did not come up
    StreamServer,
}

impl From<PreviewError> for WorkerError {
    fn from(_: PreviewError) -> Self {
        WorkerError::Wireless
    }
}

/// Details of the access point brought up for the preview
pub struct ApInfo {
    pub ssid: String<32>,
    pub ip: [u8; 4],
    pub channel: u8,
}

/// Wireless side of the preview, implemented by the wifi task on target
/// and mocked in tests
#[allow(async_fn_in_trait)]
pub trait PreviewLink {
    async fn start_access_point(&mut self) -> Result<ApInfo, PreviewError>;
    async fn start_stream_server(&mut self) -> Result<(), PreviewError>;
    async fn stop_stream_server(&mut self);
    async fn stop_access_point(&mut self);
    /// Currently connected stream clients
    fn client_count(&self) -> usize;
}

#[derive(Serialize)]
struct WifiInfo<'a> {
    ssid: &'a str,
    ip: &'a str,
    channel: u8,
}

#[derive(Serialize)]
struct StreamInfo<'a> {
    url: &'a str,
    r#type: &'a str,
    port: u16,
}

#[derive(Serialize)]
struct EnabledInfo<'a> {
    status: &'a str,
    wifi: WifiInfo<'a>,
    stream: StreamInfo<'a>,
}

#[derive(Serialize)]
struct PreviewMetrics {
    clients: u32,
}

pub struct PreviewWorker<L: PreviewLink> {
    link: L,
    ap: Option<ApInfo>,
    running: bool,
    last_frame: Option<Instant>,
    last_metrics: Option<Instant>,
}

impl<L: PreviewLink> PreviewWorker<L> {
    pub const fn new(link: L) -> Self {
        Self {
            link,
            ap: None,
            running: false,
            last_frame: None,
            last_metrics: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Brings up camera, access point and stream server in that order
    ///
    /// Failure tears back down whatever was already up, leaving no
    /// partial side effects. A publish failure is only logged; telemetry
    /// loss never blocks the preview itself.
    pub async fn begin<C: Camera>(&mut self, camera: &mut C) -> Result<(), WorkerError> {
        camera.configure(CameraProfile::Preview)?;
        let ap = match self.link.start_access_point().await {
            Ok(ap) => ap,
            Err(e) => {
                camera.release();
                return Err(e.into());
            }
        };
        if let Err(e) = self.link.start_stream_server().await {
            self.link.stop_access_point().await;
            camera.release();
            return Err(e.into());
        }
        log_info!(
            "Preview up: ssid {} channel {}",
            ap.ssid.as_str(),
            ap.channel
        );
        self.ap = Some(ap);
        self.running = true;
        self.last_frame = None;
        self.last_metrics = None;
        self.publish_enabled_info().await;
        Ok(())
    }

    /// Encodes at most one frame per call while clients are watching
    pub async fn poll<C: Camera>(&mut self, camera: &mut C, now: Instant) {
        if !self.running {
            return;
        }

        let clients = self.link.client_count();
        if clients > 0 && self.frame_due(now) {
            self.last_frame = Some(now);
            match camera.capture() {
                Ok(_) => {
                    let mut frame = FrameBuf::new();
                    // Capacity is a compile-time constant, cannot fail
                    let _ = frame.resize_default(FRAME_CAPACITY);
                    match camera.encode_jpeg(&mut frame) {
                        Ok(len) => {
                            frame.truncate(len);
                            FRAME.signal(frame);
                        }
                        Err(e) => log_error!("Preview encode failed: {:?}", e),
                    }
                }
                Err(e) => log_error!("Preview frame acquisition failed: {:?}", e),
            }
        }

        // The first poll only sets the baseline; the first metrics
        // document goes out a full period after the preview came up.
        match self.last_metrics {
            None => self.last_metrics = Some(now),
            Some(last) if now.duration_since(last) >= METRICS_PERIOD => {
                self.last_metrics = Some(now);
                self.push_metrics(clients as u32);
            }
            _ => {}
        }
    }

    /// Tears down server, then access point, then the camera
    pub async fn stop<C: Camera>(&mut self, camera: &mut C) {
        if !self.running {
            return;
        }
        self.running = false;
        self.link.stop_stream_server().await;
        self.link.stop_access_point().await;
        camera.release();
        self.ap = None;
        if telemetry::publish_preview_info(PREVIEW_INFO_DISABLED)
            .await
            .is_err()
        {
            log_warn!("Failed to publish disabled preview info");
        }
        log_info!("Preview stopped");
    }

    fn frame_due(&self, now: Instant) -> bool {
        self.last_frame
            .map_or(true, |last| now.duration_since(last) >= FRAME_INTERVAL)
    }

    async fn publish_enabled_info(&mut self) {
        let Some(ap) = &self.ap else {
            return;
        };
        let mut ip = String::<16>::new();
        let _ = write!(ip, "{}.{}.{}.{}", ap.ip[0], ap.ip[1], ap.ip[2], ap.ip[3]);
        let mut url = String::<40>::new();
        let _ = write!(url, "http://{}:{}/stream", ip.as_str(), STREAM_PORT);
        let info = EnabledInfo {
            status: "enabled",
            wifi: WifiInfo {
                ssid: ap.ssid.as_str(),
                ip: ip.as_str(),
                channel: ap.channel,
            },
            stream: StreamInfo {
                url: url.as_str(),
                r#type: "MJPEG",
                port: STREAM_PORT,
            },
        };
        let mut buf = [0u8; telemetry::DOC_CAPACITY];
        let Ok(len) = serde_json_core::to_slice(&info, &mut buf) else {
            log_warn!("Preview info did not fit its document");
            return;
        };
        let Ok(text) = core::str::from_utf8(&buf[..len]) else {
            return;
        };
        if telemetry::publish_preview_info(text).await.is_err() {
            log_warn!("Failed to publish preview info");
        }
    }

    fn push_metrics(&self, clients: u32) {
        let metrics = PreviewMetrics { clients };
        let mut buf = [0u8; 32];
        if let Ok(len) = serde_json_core::to_slice(&metrics, &mut buf) {
            if let Ok(data) = core::str::from_utf8(&buf[..len]) {
                controller::push_metrics("preview", data);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockCamera;
    use embassy_futures::block_on;
    use serial_test::serial;

    struct MockPreviewLink {
        ops: std::vec::Vec<&'static str>,
        fail_ap: bool,
        fail_server: bool,
        clients: usize,
    }

    impl MockPreviewLink {
        fn new() -> Self {
            Self {
                ops: std::vec::Vec::new(),
                fail_ap: false,
                fail_server: false,
                clients: 0,
            }
        }
    }

    impl PreviewLink for MockPreviewLink {
        async fn start_access_point(&mut self) -> Result<ApInfo, PreviewError> {
            self.ops.push("ap_start");
            if self.fail_ap {
                return Err(PreviewError::AccessPoint);
            }
            let mut ssid = String::new();
            ssid.push_str("TrailCam").unwrap();
            Ok(ApInfo {
                ssid,
                ip: [192, 168, 4, 1],
                channel: 5,
            })
        }

        async fn start_stream_server(&mut self) -> Result<(), PreviewError> {
            self.ops.push("server_start");
            if self.fail_server {
                return Err(PreviewError::StreamServer);
            }
            Ok(())
        }

        async fn stop_stream_server(&mut self) {
            self.ops.push("server_stop");
        }

        async fn stop_access_point(&mut self) {
            self.ops.push("ap_stop");
        }

        fn client_count(&self) -> usize {
            self.clients
        }
    }

    fn at(secs: u64) -> Instant {
        Instant::from_secs(secs)
    }

    #[test]
    #[serial]
    fn server_goes_down_before_the_access_point() {
        block_on(async {
            let mut worker = PreviewWorker::new(MockPreviewLink::new());
            let mut camera = MockCamera::new();
            worker.begin(&mut camera).await.unwrap();
            worker.stop(&mut camera).await;
            assert_eq!(
                worker.link().ops,
                vec!["ap_start", "server_start", "server_stop", "ap_stop"]
            );
            assert_eq!(camera.releases, 1);
        });
    }

    #[test]
    #[serial]
    fn failed_access_point_rolls_back_the_camera() {
        block_on(async {
            let mut link = MockPreviewLink::new();
            link.fail_ap = true;
            let mut worker = PreviewWorker::new(link);
            let mut camera = MockCamera::new();
            let result = worker.begin(&mut camera).await;
            assert_eq!(result, Err(WorkerError::Wireless));
            assert!(!worker.is_running());
            assert_eq!(camera.releases, 1);
            assert_eq!(worker.link().ops, vec!["ap_start"]);
        });
    }

    #[test]
    #[serial]
    fn failed_server_stops_the_access_point_again() {
        block_on(async {
            let mut link = MockPreviewLink::new();
            link.fail_server = true;
            let mut worker = PreviewWorker::new(link);
            let mut camera = MockCamera::new();
            let result = worker.begin(&mut camera).await;
            assert_eq!(result, Err(WorkerError::Wireless));
            assert_eq!(
                worker.link().ops,
                vec!["ap_start", "server_start", "ap_stop"]
            );
            assert_eq!(camera.releases, 1);
        });
    }

    #[test]
    #[serial]
    fn begin_publishes_the_connection_details() {
        block_on(async {
            let mut worker = PreviewWorker::new(MockPreviewLink::new());
            let mut camera = MockCamera::new();
            worker.begin(&mut camera).await.unwrap();
            assert_eq!(
                telemetry::preview_info_snapshot().await.as_str(),
                "{\"status\":\"enabled\",\"wifi\":{\"ssid\":\"TrailCam\",\"ip\":\"192.168.4.1\",\
                 \"channel\":5},\"stream\":{\"url\":\"http://192.168.4.1:81/stream\",\
                 \"type\":\"MJPEG\",\"port\":81}}"
            );
            worker.stop(&mut camera).await;
            assert_eq!(
                telemetry::preview_info_snapshot().await.as_str(),
                PREVIEW_INFO_DISABLED
            );
        });
    }

    #[test]
    #[serial]
    fn frames_flow_only_while_clients_are_watching() {
        block_on(async {
            let mut worker = PreviewWorker::new(MockPreviewLink::new());
            let mut camera = MockCamera::new();
            worker.begin(&mut camera).await.unwrap();
            let _ = FRAME.try_take();

            worker.poll(&mut camera, at(10)).await;
            assert!(FRAME.try_take().is_none());
            assert_eq!(camera.captures, 0);

            worker.link.clients = 2;
            worker.poll(&mut camera, at(11)).await;
            let frame = FRAME.try_take().expect("frame for connected clients");
            assert_eq!(&frame[..2], &[0xff, 0xd8]);
            assert_eq!(&frame[frame.len() - 2..], &[0xff, 0xd9]);
        });
    }

    #[test]
    #[serial]
    fn frame_interval_is_respected() {
        block_on(async {
            let mut link = MockPreviewLink::new();
            link.clients = 1;
            let mut worker = PreviewWorker::new(link);
            let mut camera = MockCamera::new();
            worker.begin(&mut camera).await.unwrap();
            let _ = FRAME.try_take();

            worker.poll(&mut camera, Instant::from_millis(1000)).await;
            worker.poll(&mut camera, Instant::from_millis(1050)).await;
            assert_eq!(camera.captures, 1);
            worker.poll(&mut camera, Instant::from_millis(1100)).await;
            assert_eq!(camera.captures, 2);
        });
    }

    #[test]
    #[serial]
    fn first_metrics_document_waits_a_full_period() {
        use crate::system::state::{ConnectionState, CONTROLLER_STATE};

        block_on(async {
            {
                let mut state = CONTROLLER_STATE.lock().await;
                state.set_connection(ConnectionState::Connected);
            }
            let mut link = MockPreviewLink::new();
            link.clients = 1;
            let mut worker = PreviewWorker::new(link);
            let mut camera = MockCamera::new();
            worker.begin(&mut camera).await.unwrap();
            while telemetry::try_next_outbound().is_some() {}

            // First poll after bring-up only sets the baseline.
            worker.poll(&mut camera, at(10)).await;
            assert!(telemetry::try_next_outbound().is_none());

            worker.poll(&mut camera, at(41)).await;
            let doc = telemetry::try_next_outbound().expect("metrics after a full period");
            assert_eq!(
                doc.as_str(),
                "{\"type\":\"metrics\",\"service\":\"preview\",\"data\":{\"clients\":1}}"
            );

            {
                let mut state = CONTROLLER_STATE.lock().await;
                state.set_connection(ConnectionState::Disconnected);
            }
            while telemetry::try_next_outbound().is_some() {}
        });
    }

    #[test]
    #[serial]
    fn stop_is_idempotent() {
        block_on(async {
            let mut worker = PreviewWorker::new(MockPreviewLink::new());
            let mut camera = MockCamera::new();
            worker.begin(&mut camera).await.unwrap();
            worker.stop(&mut camera).await;
            worker.stop(&mut camera).await;
            assert_eq!(
                worker.link().ops,
                vec!["ap_start", "server_start", "server_stop", "ap_stop"]
            );
        });
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

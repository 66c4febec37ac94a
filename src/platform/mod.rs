//! Hardware Seams
//!
//! Traits for the camera sensor and the image store, so the mode workers
//! stay independent of any concrete peripheral. The firmware wires in
//! [`test_pattern::TestPatternCamera`] until a sensor driver exists, and
//! the SD card store on the `pico2w` build; host tests substitute mocks.

pub mod fat_names;
pub mod test_pattern;

#[cfg(test)]
pub mod mock;

#[cfg(feature = "pico2w")]
pub mod rp2350;

/// Sensor configuration per mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "pico2w", derive(defmt::Format))]
pub enum CameraProfile {
    /// Full-size stills for timed capture
    Capture,
    /// Stream-friendly frames for the MJPEG preview
    Preview,
    /// Model input frames for on-device inference
    Inference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "pico2w", derive(defmt::Format))]
pub enum CameraError {
    /// Sensor rejected or never acknowledged the requested profile
    Configure,
    /// No frame could be acquired
    Acquisition,
    /// Encoded frame did not fit the output buffer
    Encode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "pico2w", derive(defmt::Format))]
pub enum StoreError {
    /// Storage medium missing or repeatedly failed to initialize
    Unavailable,
    /// Write or close failed
    Write,
    /// Directory listing failed
    List,
}

/// One acquired frame, borrowed from the camera until the next call
pub struct Frame<'a> {
    pub data: &'a [u8],
    pub width: u16,
    pub height: u16,
}

/// Shared camera sensor
///
/// Exactly one worker holds the camera at a time; the mode arbitration
/// guarantees it. `capture` keeps the frame in the camera's own buffer,
/// so the raw data must be consumed before `encode_jpeg` reuses it.
pub trait Camera {
    fn configure(&mut self, profile: CameraProfile) -> Result<(), CameraError>;
    /// Returns the sensor to its neutral state; safe to call when
    /// already released
    fn release(&mut self);
    fn capture(&mut self) -> Result<Frame<'_>, CameraError>;
    /// Encodes the most recently captured frame, returning the encoded
    /// length
    fn encode_jpeg(&mut self, into: &mut [u8]) -> Result<usize, CameraError>;
}

/// Persistent image storage for the capture worker
#[allow(async_fn_in_trait)]
pub trait ImageStore {
    /// Brings the medium up, with bounded retries where that makes sense
    async fn prepare(&mut self) -> Result<(), StoreError>;
    async fn save(&mut self, name: &str, data: &[u8]) -> Result<(), StoreError>;
    /// Visits every stored file name; used to seed the image counter
    async fn scan_names<F: FnMut(&str)>(&mut self, visit: F) -> Result<(), StoreError>;
}

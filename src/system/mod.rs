//! Core system components for camera operation
//!
//! Everything in here builds for the host as well, so the mode
//! arbitration, workers and menu are covered by plain `cargo test`.

pub mod capture;
pub mod command;
pub mod controller;
pub mod event;
pub mod indicator;
pub mod inference;
pub mod menu;
pub mod preview;
pub mod state;
pub mod telemetry;

#[cfg(feature = "pico2w")]
pub mod resources;

use crate::platform::{CameraError, StoreError};

/// Why a worker's `begin` failed
///
/// The mode driver rolls the arbitration state back on any of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "pico2w", derive(defmt::Format))]
pub enum WorkerError {
    Camera(CameraError),
    Store(StoreError),
    /// Access point or stream server could not be brought up
    Wireless,
    /// This build was compiled without the requested capability
    Unavailable,
}

impl From<CameraError> for WorkerError {
    fn from(e: CameraError) -> Self {
        WorkerError::Camera(e)
    }
}

impl From<StoreError> for WorkerError {
    fn from(e: StoreError) -> Self {
        WorkerError::Store(e)
    }
}

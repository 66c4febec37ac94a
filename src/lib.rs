//! Camera firmware core for the Pico 2 W.
//!
//! The crate is split so the control logic is testable on the host:
//! - [`system`]: mode arbitration, connection lifecycle, telemetry protocol,
//!   menu and the mode workers. Builds everywhere.
//! - [`platform`]: seams for the peripherals the core only consumes (camera,
//!   image storage), with mock implementations for tests and the SD-backed
//!   implementation for the target.
//! - [`task`]: the embassy tasks wiring the core to the radio, display and
//!   button hardware. Only built with the `pico2w` feature.

#![cfg_attr(not(test), no_std)]

/// Device name advertised over BLE and used as the preview AP SSID
pub const DEVICE_NAME: &str = "TrailCam";

/// Firmware version shown on the idle screen
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod logging;
pub mod platform;
pub mod system;
#[cfg(feature = "pico2w")]
pub mod task;

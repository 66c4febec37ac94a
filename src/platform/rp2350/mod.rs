//! RP2350 Peripheral Glue

pub mod sdcard;

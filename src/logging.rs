//! Logging macros usable from code that builds both for the target and for
//! host tests.
//!
//! - `pico2w` builds log through defmt, like the rest of the firmware.
//! - Host test builds print to stdout/stderr.
//! - Host non-test builds are a no-op.
//!
//! Task modules are target-only and use defmt directly; these macros exist
//! for the shared core under `system/` and `platform/`.

/// Log informational message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "pico2w")]
        ::defmt::info!($($arg)*);

        #[cfg(all(not(feature = "pico2w"), test))]
        println!("[INFO ] {}", format!($($arg)*));
    }};
}

/// Log warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "pico2w")]
        ::defmt::warn!($($arg)*);

        #[cfg(all(not(feature = "pico2w"), test))]
        println!("[WARN ] {}", format!($($arg)*));
    }};
}

/// Log error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "pico2w")]
        ::defmt::error!($($arg)*);

        #[cfg(all(not(feature = "pico2w"), test))]
        eprintln!("[ERROR] {}", format!($($arg)*));
    }};
}

/// Log debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "pico2w")]
        ::defmt::debug!($($arg)*);

        #[cfg(all(not(feature = "pico2w"), test))]
        println!("[DEBUG] {}", format!($($arg)*));
    }};
}

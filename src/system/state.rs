//! System State Management
//!
//! Manages the camera's global state including:
//! - Active mode (None/Preview/Capture/Inference)
//! - Connection state of the wireless control link
//! - Stop/disconnect bookkeeping that drives the restart policy
//!
//! The state is protected by a mutex to ensure safe concurrent access
//! from multiple tasks. Every mutation also refreshes a set of atomic
//! mirrors so that hot paths (mode polling, push guards, the display)
//! can read current values without taking the lock.
//!
//! # State Access Pattern
//! ```ignore
//! let mut state = CONTROLLER_STATE.lock().await;
//! state.set_mode(ActiveMode::Capture);
//! // Lock automatically released when state goes out of scope
//! ```

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex};

/// The single active mode of the device
///
/// Modes are mutually exclusive. A start command is only honored from
/// `None`; anything else is reported back as busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "pico2w", derive(defmt::Format))]
#[repr(u8)]
pub enum ActiveMode {
    /// No mode running, device is idle and accepting start commands
    None = 0,
    /// Live MJPEG preview over the device's own WiFi access point
    Preview = 1,
    /// Periodic image capture to removable storage
    Capture = 2,
    /// On-device inference (only functional in the inference build)
    Inference = 3,
}

impl ActiveMode {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Preview,
            2 => Self::Capture,
            3 => Self::Inference,
            _ => Self::None,
        }
    }

    /// Lowercase name used in status and metrics documents
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "idle",
            Self::Preview => "preview",
            Self::Capture => "capture",
            Self::Inference => "inference",
        }
    }

    /// Capitalized name used in notification messages
    pub fn title(self) -> &'static str {
        match self {
            Self::None => "Idle",
            Self::Preview => "Preview",
            Self::Capture => "Capture",
            Self::Inference => "Inference",
        }
    }

    /// Observer slot index, `None` for the idle mode
    pub fn slot(self) -> Option<usize> {
        match self {
            Self::None => None,
            Self::Preview => Some(0),
            Self::Capture => Some(1),
            Self::Inference => Some(2),
        }
    }
}

/// Connection state of the wireless control link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "pico2w", derive(defmt::Format))]
pub enum ConnectionState {
    /// No peer, advertising (or trying to resume advertising)
    Disconnected,
    /// A peer is negotiating but not yet usable
    Connecting,
    /// A peer is subscribed and push channels are live
    Connected,
}

/// Callback invoked with `true` on mode start and `false` on mode stop
pub type ModeObserver = fn(bool);

/// Global controller state protected by a mutex
///
/// Initialized to:
/// - No active mode
/// - Disconnected control link
/// - No pending explicit stop
/// - Not inside disconnect handling
/// - No mode observers registered
pub static CONTROLLER_STATE: Mutex<CriticalSectionRawMutex, ControllerState> =
    Mutex::new(ControllerState {
        mode: ActiveMode::None,
        connection: ConnectionState::Disconnected,
        explicit_stop: false,
        disconnecting: false,
        observers: [None, None, None],
    });

static MODE_MIRROR: AtomicU8 = AtomicU8::new(ActiveMode::None as u8);
static CONNECTED_MIRROR: AtomicBool = AtomicBool::new(false);
static EXPLICIT_STOP_MIRROR: AtomicBool = AtomicBool::new(false);
static DISCONNECTING_MIRROR: AtomicBool = AtomicBool::new(false);

/// Controller state shared between the command handler, the mode driver
/// and the connection lifecycle
///
/// All fields are only mutated through the setters so the atomic mirrors
/// stay in sync with the locked value.
pub struct ControllerState {
    /// Currently active mode
    /// - Only one mode runs at a time
    /// - Start commands are rejected while another mode is active
    pub mode: ActiveMode,
    /// Wireless control link state
    /// - Push helpers become no-ops unless this is `Connected`
    pub connection: ConnectionState,
    /// Set by a stop command, cleared by disconnect handling
    /// - Decides whether a stopped mode restarts the device
    pub explicit_stop: bool,
    /// True only while disconnect handling runs
    /// - Suppresses the restart path for modes cleared by a disconnect
    pub disconnecting: bool,
    /// Mode observers by slot (preview, capture, inference)
    pub observers: [Option<ModeObserver>; 3],
}

impl ControllerState {
    /// Updates the active mode and refreshes its lock-free mirror
    pub fn set_mode(&mut self, mode: ActiveMode) {
        self.mode = mode;
        MODE_MIRROR.store(mode as u8, Ordering::Release);
    }

    /// Updates the connection state and refreshes its lock-free mirror
    pub fn set_connection(&mut self, connection: ConnectionState) {
        self.connection = connection;
        CONNECTED_MIRROR.store(connection == ConnectionState::Connected, Ordering::Release);
    }

    pub fn set_explicit_stop(&mut self, value: bool) {
        self.explicit_stop = value;
        EXPLICIT_STOP_MIRROR.store(value, Ordering::Release);
    }

    pub fn set_disconnecting(&mut self, value: bool) {
        self.disconnecting = value;
        DISCONNECTING_MIRROR.store(value, Ordering::Release);
    }

    /// Observer registered for a concrete mode, replacing any previous one
    pub fn register_observer(&mut self, mode: ActiveMode, observer: ModeObserver) {
        if let Some(slot) = mode.slot() {
            self.observers[slot] = Some(observer);
        }
    }
}

/// Current mode without taking the state lock
pub fn active_mode() -> ActiveMode {
    ActiveMode::from_u8(MODE_MIRROR.load(Ordering::Acquire))
}

/// Whether a control peer is currently connected, without the lock
pub fn is_connected() -> bool {
    CONNECTED_MIRROR.load(Ordering::Acquire)
}

/// Whether the last mode exit was an explicit stop, without the lock
pub fn explicit_stop() -> bool {
    EXPLICIT_STOP_MIRROR.load(Ordering::Acquire)
}

/// Whether disconnect handling is currently in progress, without the lock
pub fn disconnecting() -> bool {
    DISCONNECTING_MIRROR.load(Ordering::Acquire)
}

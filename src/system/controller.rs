//! Mode Arbitration and Connection Lifecycle
//!
//! The single decision point for which worker may run. Both command
//! sources (the wireless control characteristic and the local menu)
//! funnel their bytes through [`handle_command`], which owns the state
//! lock for a bounded time, mutates, and only then notifies the mode
//! observers and pushes telemetry.
//!
//! # Locking rules
//! - `handle_command` waits at most [`COMMAND_LOCK_TIMEOUT`] for the
//!   state lock; on timeout it logs and fails instead of stalling the
//!   transport callback that delivered the byte.
//! - Observers always run after the lock is released, so an observer may
//!   itself take the lock without deadlocking.
//! - Push helpers never take the lock; they read the atomic mirrors.

use core::fmt::Write as _;

use embassy_time::{with_timeout, Duration, Instant};
use heapless::String;

use crate::system::command::ControlCommand;
use crate::system::state::{
    self, ActiveMode, ConnectionState, ModeObserver, CONTROLLER_STATE,
};
use crate::system::telemetry::{self, Outbound};
use crate::{log_error, log_info, log_warn};

/// Bounded wait for the state lock inside the command handler
pub const COMMAND_LOCK_TIMEOUT: Duration = Duration::from_millis(100);
/// Cadence of the "alive" notification while connected
pub const KEEP_ALIVE_PERIOD: Duration = Duration::from_secs(1);
/// Cadence of the connection health check
pub const HEALTH_CHECK_PERIOD: Duration = Duration::from_secs(5);
/// Cadence of the unsolicited status document
pub const STATUS_PERIOD: Duration = Duration::from_secs(5);
/// Delay between the restart notification and the actual device restart
pub const RESTART_GRACE: Duration = Duration::from_secs(1);
/// Bounded retries for resuming advertising after a disconnect
pub const ADVERTISING_RESUME_ATTEMPTS: usize = 3;
/// Delay between advertising resume attempts
pub const ADVERTISING_RESUME_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "pico2w", derive(defmt::Format))]
pub enum CommandError {
    /// State lock was not acquired within [`COMMAND_LOCK_TIMEOUT`]
    LockTimeout,
}

/// What the mode driver does after a worker has finished stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "pico2w", derive(defmt::Format))]
pub enum StopDisposition {
    /// Operator stopped the mode, restart the whole device
    RestartDevice,
    /// Mode was cleared by a disconnect (or never ran), stay idle
    RemainIdle,
}

/// Restart policy at the moment a worker's stop completes
///
/// A restart happens only for an operator-initiated stop. A stop caused
/// by disconnect handling must leave the device idle, otherwise every
/// dropped link would reboot the camera.
pub fn restart_disposition(explicit_stop: bool, disconnecting: bool) -> StopDisposition {
    if explicit_stop && !disconnecting {
        StopDisposition::RestartDevice
    } else {
        StopDisposition::RemainIdle
    }
}

/// Work recorded under the lock, executed after it is released
enum CommandEffect {
    Started {
        mode: ActiveMode,
        observer: Option<ModeObserver>,
    },
    Rejected {
        requested: ActiveMode,
        active: ActiveMode,
    },
    Stopped {
        mode: ActiveMode,
        observer: Option<ModeObserver>,
    },
}

/// Handles one command byte from either input source
///
/// Unknown bytes produce a notification and change nothing. Start
/// commands are honored only while idle; anything else is reported back
/// as busy. Stop commands latch the explicit-stop flag and always notify
/// the mode's observer, even when that mode was not running.
pub async fn handle_command(raw: u8) -> Result<(), CommandError> {
    let Some(command) = ControlCommand::from_byte(raw) else {
        let mut message = String::<48>::new();
        // Quote, backslash and control bytes render as '?' so the
        // notification body stays valid inside its JSON document.
        let shown = if (0x21..=0x7e).contains(&raw) && raw != b'"' && raw != b'\\' {
            raw as char
        } else {
            '?'
        };
        let _ = write!(message, "Unknown Command: {} (ASCII: {})", shown, raw);
        log_warn!("Unknown command byte: {}", raw);
        push_notification(&message);
        return Ok(());
    };

    let effect = {
        let mut state = match with_timeout(COMMAND_LOCK_TIMEOUT, CONTROLLER_STATE.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                log_error!("Dropping command {}, state lock timed out", raw);
                return Err(CommandError::LockTimeout);
            }
        };
        let mode = command.mode();
        if command.is_start() {
            if state.mode == ActiveMode::None {
                state.set_mode(mode);
                state.set_explicit_stop(false);
                CommandEffect::Started {
                    mode,
                    observer: mode.slot().and_then(|slot| state.observers[slot]),
                }
            } else {
                CommandEffect::Rejected {
                    requested: mode,
                    active: state.mode,
                }
            }
        } else {
            if state.mode == mode {
                state.set_mode(ActiveMode::None);
            }
            state.set_explicit_stop(true);
            CommandEffect::Stopped {
                mode,
                observer: mode.slot().and_then(|slot| state.observers[slot]),
            }
        }
    };

    match effect {
        CommandEffect::Started { mode, observer } => {
            log_info!("Starting mode: {}", mode.label());
            if let Some(observer) = observer {
                observer(true);
            }
            push_service_status(mode.label(), "starting");
            let mut message = String::<48>::new();
            let _ = write!(message, "{} Starting", mode.title());
            push_notification(&message);
        }
        CommandEffect::Rejected { requested, active } => {
            log_warn!(
                "Rejecting start of {}, {} is active",
                requested.label(),
                active.label()
            );
            push_service_status(requested.label(), "busy");
            let mut message = String::<48>::new();
            let _ = write!(message, "Busy: {} active", active.title());
            push_notification(&message);
        }
        CommandEffect::Stopped { mode, observer } => {
            log_info!("Stopping mode: {}", mode.label());
            if let Some(observer) = observer {
                observer(false);
            }
            let mut message = String::<48>::new();
            let _ = write!(message, "{} Stopped", mode.title());
            push_notification(&message);
        }
    }
    Ok(())
}

/// Marks the control link connected; modes are left untouched
pub async fn on_peer_connected() {
    {
        let mut state = CONTROLLER_STATE.lock().await;
        state.set_connection(ConnectionState::Connected);
    }
    log_info!("Control peer connected");
    if let Ok(doc) = telemetry::connection_doc(true) {
        telemetry::enqueue(Outbound::Status(doc));
    }
    // Refresh the preview-info characteristic for this peer; anything
    // published while disconnected never left the stored value.
    let preview = telemetry::preview_info_snapshot().await;
    telemetry::enqueue(Outbound::PreviewInfo(preview));
}

/// Full disconnect handling
///
/// Clears every mode, resets the explicit-stop flag and notifies all
/// observers with `false` while the disconnecting flag is raised. The
/// flag ordering is what keeps a dropped link from restarting the
/// device: explicit-stop is already false by the time any worker
/// observes its stop.
pub async fn on_peer_disconnected() {
    let observers = {
        let mut state = CONTROLLER_STATE.lock().await;
        state.set_connection(ConnectionState::Disconnected);
        state.set_disconnecting(true);
        state.set_mode(ActiveMode::None);
        state.set_explicit_stop(false);
        state.observers
    };
    log_info!("Control peer disconnected, clearing active mode");
    for observer in observers.iter().flatten() {
        observer(false);
    }
    {
        let mut state = CONTROLLER_STATE.lock().await;
        state.set_disconnecting(false);
    }
    // Updates the characteristic value for the next peer; with no peer
    // connected there is nobody to notify.
    if let Ok(doc) = telemetry::connection_doc(false) {
        telemetry::enqueue(Outbound::Status(doc));
    }
}

/// Reconciles the connection flag with what the transport reports
///
/// A missed disconnect event leaves the controller Connected with zero
/// transport peers; this forces the full disconnect handling. The state
/// transition inside [`on_peer_disconnected`] makes a second invocation
/// a no-op.
pub async fn health_check(transport_peers: usize) {
    if state::is_connected() && transport_peers == 0 {
        log_warn!("Link marked connected with no transport peer, forcing disconnect handling");
        on_peer_disconnected().await;
    }
}

/// Pushes the periodic liveness notification while connected
pub fn keep_alive_tick() {
    push_notification("alive");
}

/// Pushes the periodic status document while connected
pub fn status_tick() {
    if !state::is_connected() {
        return;
    }
    let uptime = Instant::now().as_secs();
    match telemetry::status_doc(state::active_mode().label(), uptime) {
        Ok(doc) => telemetry::enqueue(Outbound::Status(doc)),
        Err(e) => log_warn!("Failed to serialize status document: {:?}", e),
    }
}

/// Rolls the state back after a worker failed to acquire its resources
///
/// The mode returns to idle without touching the explicit-stop flag, the
/// observer is told `false` so the desired flag clears, and the failure
/// is reported to the peer.
pub async fn rollback_failed_start(mode: ActiveMode) {
    let observer = {
        let mut state = CONTROLLER_STATE.lock().await;
        if state.mode == mode {
            state.set_mode(ActiveMode::None);
        }
        mode.slot().and_then(|slot| state.observers[slot])
    };
    log_error!("Mode {} failed to start, rolling back", mode.label());
    if let Some(observer) = observer {
        observer(false);
    }
    push_service_status(mode.label(), "failed");
    let mut message = String::<48>::new();
    let _ = write!(message, "{} failed to start", mode.title());
    push_notification(&message);
}

/// Registers the worker observers; called once at boot
pub async fn register_mode_observers() {
    let mut state = CONTROLLER_STATE.lock().await;
    state.register_observer(ActiveMode::Preview, crate::system::preview::mode_observer);
    state.register_observer(ActiveMode::Capture, crate::system::capture::mode_observer);
    state.register_observer(ActiveMode::Inference, crate::system::inference::mode_observer);
}

/// Queues a notification document, no-op while disconnected
pub fn push_notification(message: &str) {
    if !state::is_connected() {
        return;
    }
    match telemetry::notification_doc(message) {
        Ok(doc) => telemetry::enqueue(Outbound::Status(doc)),
        Err(e) => log_warn!("Failed to serialize notification: {:?}", e),
    }
}

/// Queues a service status document, no-op while disconnected
pub fn push_service_status(service: &str, status: &str) {
    if !state::is_connected() {
        return;
    }
    match telemetry::service_status_doc(service, status) {
        Ok(doc) => telemetry::enqueue(Outbound::Status(doc)),
        Err(e) => log_warn!("Failed to serialize service status: {:?}", e),
    }
}

/// Validates and queues a metrics document, no-op while disconnected
///
/// `data` is worker-supplied JSON; malformed input is logged and dropped
/// without touching what was published before.
pub fn push_metrics(service: &str, data: &str) {
    if !state::is_connected() {
        return;
    }
    match telemetry::metrics_doc(service, data) {
        Ok(doc) => telemetry::enqueue(Outbound::Status(doc)),
        Err(e) => log_warn!("Dropping metrics for {}: {:?}", service, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use embassy_futures::block_on;
    use serial_test::serial;

    async fn reset() {
        let mut state = CONTROLLER_STATE.lock().await;
        state.set_mode(ActiveMode::None);
        state.set_connection(ConnectionState::Connected);
        state.set_explicit_stop(false);
        state.set_disconnecting(false);
        state.observers = [None, None, None];
        drop(state);
        while telemetry::try_next_outbound().is_some() {}
    }

    fn collect_docs() -> Vec<std::string::String> {
        let mut docs = Vec::new();
        while let Some(doc) = telemetry::try_next_outbound() {
            docs.push(doc.as_str().to_string());
        }
        docs
    }

    #[test]
    #[serial]
    fn one_mode_at_a_time_across_a_command_sequence() {
        block_on(async {
            reset().await;

            handle_command(b'1').await.unwrap();
            assert_eq!(state::active_mode(), ActiveMode::Preview);
            let docs = collect_docs();
            assert!(docs.contains(&
                "{\"type\":\"service_status\",\"service\":\"preview\",\"status\":\"starting\"}"
                    .to_string()));
            assert!(docs.contains(
                &"{\"type\":\"notification\",\"message\":\"Preview Starting\"}".to_string()
            ));

            handle_command(b'3').await.unwrap();
            assert_eq!(state::active_mode(), ActiveMode::Preview);
            let docs = collect_docs();
            assert!(docs.contains(
                &"{\"type\":\"service_status\",\"service\":\"capture\",\"status\":\"busy\"}"
                    .to_string()
            ));
            assert!(docs.contains(
                &"{\"type\":\"notification\",\"message\":\"Busy: Preview active\"}".to_string()
            ));

            handle_command(b'2').await.unwrap();
            assert_eq!(state::active_mode(), ActiveMode::None);
            assert!(state::explicit_stop());

            handle_command(b'3').await.unwrap();
            assert_eq!(state::active_mode(), ActiveMode::Capture);
            assert!(!state::explicit_stop());
            reset().await;
        });
    }

    #[test]
    #[serial]
    fn stop_is_idempotent_and_always_notifies() {
        block_on(async {
            reset().await;

            handle_command(b'4').await.unwrap();
            assert_eq!(state::active_mode(), ActiveMode::None);
            assert!(state::explicit_stop());
            let docs = collect_docs();
            assert_eq!(
                docs,
                vec!["{\"type\":\"notification\",\"message\":\"Capture Stopped\"}".to_string()]
            );

            handle_command(b'4').await.unwrap();
            assert_eq!(state::active_mode(), ActiveMode::None);
            let docs = collect_docs();
            assert_eq!(
                docs,
                vec!["{\"type\":\"notification\",\"message\":\"Capture Stopped\"}".to_string()]
            );
            reset().await;
        });
    }

    #[test]
    #[serial]
    fn unknown_bytes_notify_and_change_nothing() {
        block_on(async {
            reset().await;
            handle_command(b'1').await.unwrap();
            collect_docs();

            handle_command(b'9').await.unwrap();
            assert_eq!(state::active_mode(), ActiveMode::Preview);
            assert_eq!(
                collect_docs(),
                vec![
                    "{\"type\":\"notification\",\"message\":\"Unknown Command: 9 (ASCII: 57)\"}"
                        .to_string()
                ]
            );

            handle_command(0x0a).await.unwrap();
            assert_eq!(
                collect_docs(),
                vec![
                    "{\"type\":\"notification\",\"message\":\"Unknown Command: ? (ASCII: 10)\"}"
                        .to_string()
                ]
            );
            reset().await;
        });
    }

    static DISCONNECT_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting_observer(enabled: bool) {
        if !enabled {
            DISCONNECT_CALLS.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    #[serial]
    fn disconnect_clears_state_and_invokes_every_observer() {
        block_on(async {
            reset().await;
            DISCONNECT_CALLS.store(0, Ordering::SeqCst);
            {
                let mut state = CONTROLLER_STATE.lock().await;
                state.register_observer(ActiveMode::Preview, counting_observer);
                state.register_observer(ActiveMode::Capture, counting_observer);
                state.register_observer(ActiveMode::Inference, counting_observer);
                state.set_mode(ActiveMode::Preview);
                state.set_explicit_stop(true);
            }

            on_peer_disconnected().await;

            assert_eq!(state::active_mode(), ActiveMode::None);
            assert!(!state::explicit_stop());
            assert!(!state::disconnecting());
            assert!(!state::is_connected());
            assert_eq!(DISCONNECT_CALLS.load(Ordering::SeqCst), 3);
            let docs = collect_docs();
            assert!(docs.contains(&"{\"connection\":\"disconnected\"}".to_string()));
            reset().await;
        });
    }

    #[test]
    fn restart_only_for_explicit_stops_outside_disconnect_handling() {
        assert_eq!(restart_disposition(true, false), StopDisposition::RestartDevice);
        assert_eq!(restart_disposition(true, true), StopDisposition::RemainIdle);
        assert_eq!(restart_disposition(false, false), StopDisposition::RemainIdle);
        assert_eq!(restart_disposition(false, true), StopDisposition::RemainIdle);
    }

    #[test]
    #[serial]
    fn commands_work_while_disconnected_without_pushes() {
        block_on(async {
            reset().await;
            {
                let mut state = CONTROLLER_STATE.lock().await;
                state.set_connection(ConnectionState::Disconnected);
            }

            handle_command(b'1').await.unwrap();
            assert_eq!(state::active_mode(), ActiveMode::Preview);
            assert!(collect_docs().is_empty());

            on_peer_connected().await;
            status_tick();
            let docs = collect_docs();
            assert!(docs.contains(&"{\"connection\":\"connected\"}".to_string()));
            assert!(docs
                .iter()
                .any(|d| d.starts_with("{\"type\":\"status\",\"mode\":\"preview\",\"uptime\":")));
            reset().await;
        });
    }

    #[test]
    #[serial]
    fn health_check_forces_disconnect_exactly_once() {
        block_on(async {
            reset().await;
            {
                let mut state = CONTROLLER_STATE.lock().await;
                state.set_mode(ActiveMode::Capture);
            }

            health_check(0).await;
            assert!(!state::is_connected());
            assert_eq!(state::active_mode(), ActiveMode::None);
            let first = collect_docs();
            assert!(first.contains(&"{\"connection\":\"disconnected\"}".to_string()));

            health_check(0).await;
            assert!(collect_docs().is_empty());
            reset().await;
        });
    }

    #[test]
    #[serial]
    fn health_check_leaves_live_connections_alone() {
        block_on(async {
            reset().await;
            health_check(1).await;
            assert!(state::is_connected());
            assert!(collect_docs().is_empty());
            reset().await;
        });
    }

    #[test]
    #[serial]
    fn command_fails_fast_when_the_lock_is_held() {
        block_on(async {
            reset().await;
        });
        let guard = block_on(CONTROLLER_STATE.lock());
        let result = block_on(handle_command(b'1'));
        drop(guard);
        assert_eq!(result, Err(CommandError::LockTimeout));
        block_on(async {
            assert_eq!(state::active_mode(), ActiveMode::None);
            reset().await;
        });
    }

    static REENTRANT_LOCK_OK: AtomicBool = AtomicBool::new(false);

    fn probing_observer(enabled: bool) {
        if enabled {
            REENTRANT_LOCK_OK.store(CONTROLLER_STATE.try_lock().is_ok(), Ordering::SeqCst);
        }
    }

    #[test]
    #[serial]
    fn observers_run_after_the_lock_is_released() {
        block_on(async {
            reset().await;
            REENTRANT_LOCK_OK.store(false, Ordering::SeqCst);
            {
                let mut state = CONTROLLER_STATE.lock().await;
                state.register_observer(ActiveMode::Capture, probing_observer);
            }
            handle_command(b'3').await.unwrap();
            assert!(REENTRANT_LOCK_OK.load(Ordering::SeqCst));
            reset().await;
        });
    }

    #[test]
    #[serial]
    fn rollback_reports_failure_and_returns_to_idle() {
        block_on(async {
            reset().await;
            handle_command(b'3').await.unwrap();
            collect_docs();

            rollback_failed_start(ActiveMode::Capture).await;
            assert_eq!(state::active_mode(), ActiveMode::None);
            assert!(!state::explicit_stop());
            let docs = collect_docs();
            assert!(docs.contains(
                &"{\"type\":\"service_status\",\"service\":\"capture\",\"status\":\"failed\"}"
                    .to_string()
            ));
            assert!(docs.contains(
                &"{\"type\":\"notification\",\"message\":\"Capture failed to start\"}".to_string()
            ));
            reset().await;
        });
    }

    #[test]
    #[serial]
    fn keep_alive_only_flows_while_connected() {
        block_on(async {
            reset().await;
            keep_alive_tick();
            assert_eq!(
                collect_docs(),
                vec!["{\"type\":\"notification\",\"message\":\"alive\"}".to_string()]
            );

            {
                let mut state = CONTROLLER_STATE.lock().await;
                state.set_connection(ConnectionState::Disconnected);
            }
            keep_alive_tick();
            status_tick();
            assert!(collect_docs().is_empty());
            reset().await;
        });
    }
}

//! Telemetry Documents
//!
//! Builds the JSON documents pushed over the wireless status and preview
//! info characteristics, and carries them from the core to the wireless
//! task over a bounded channel.
//!
//! Documents are serialized into fixed-capacity strings. Externally
//! supplied JSON (worker metrics, preview info payloads) is validated by
//! parsing it with serde-json-core before it is spliced or stored;
//! malformed input is rejected and the previous value kept.

use core::fmt::Write as _;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use heapless::String;
use serde::de::IgnoredAny;
use serde::Serialize;

use crate::log_warn;

/// Capacity of a single outbound JSON document
pub const DOC_CAPACITY: usize = 192;

/// A serialized JSON document, sized for one characteristic value
pub type Doc = String<DOC_CAPACITY>;

/// Maximum nesting accepted from externally supplied JSON
const NEST_LIMIT: u8 = 8;

/// Preview info value before the preview service has ever started
pub const PREVIEW_INFO_IDLE: &str = "{\"status\":\"Preview service not enabled\"}";

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "pico2w", derive(defmt::Format))]
pub enum TelemetryError {
    /// Externally supplied JSON failed validation
    Malformed,
    /// Document does not fit the fixed capacity
    Overflow,
}

/// Documents routed to their characteristic by the wireless task
pub enum Outbound {
    /// Notification, service status, metrics, connection and status docs
    Status(Doc),
    /// Preview service info document
    PreviewInfo(Doc),
}

impl Outbound {
    pub fn as_str(&self) -> &str {
        match self {
            Outbound::Status(doc) => doc.as_str(),
            Outbound::PreviewInfo(doc) => doc.as_str(),
        }
    }
}

/// Outbound document queue, drained by the wireless task
static OUTBOUND: Channel<CriticalSectionRawMutex, Outbound, 8> = Channel::new();

/// Latest preview info document, empty until the first publish
static PREVIEW_INFO: Mutex<CriticalSectionRawMutex, Doc> = Mutex::new(String::new());

/// Queues a document for push, dropping it when the queue is full
///
/// Dropping is acceptable here: every document is either periodic or
/// superseded by the next state change, and the sender must never block
/// while holding the state lock.
pub fn enqueue(doc: Outbound) {
    if OUTBOUND.try_send(doc).is_err() {
        log_warn!("Outbound telemetry queue full, dropping document");
    }
}

/// Receives the next outbound document
pub async fn next_outbound() -> Outbound {
    OUTBOUND.receiver().receive().await
}

/// Non-blocking receive, `None` when the queue is empty
pub fn try_next_outbound() -> Option<Outbound> {
    OUTBOUND.try_receive().ok()
}

#[derive(Serialize)]
struct NotificationMsg<'a> {
    r#type: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct ServiceStatusMsg<'a> {
    r#type: &'a str,
    service: &'a str,
    status: &'a str,
}

#[derive(Serialize)]
struct ConnectionMsg<'a> {
    connection: &'a str,
}

#[derive(Serialize)]
struct StatusMsg<'a> {
    r#type: &'a str,
    mode: &'a str,
    uptime: u64,
}

fn to_doc<T: Serialize>(msg: &T) -> Result<Doc, TelemetryError> {
    let mut buf = [0u8; DOC_CAPACITY];
    let len = serde_json_core::to_slice(msg, &mut buf).map_err(|_| TelemetryError::Overflow)?;
    let text = core::str::from_utf8(&buf[..len]).map_err(|_| TelemetryError::Overflow)?;
    let mut doc = Doc::new();
    doc.push_str(text).map_err(|_| TelemetryError::Overflow)?;
    Ok(doc)
}

/// `{"type":"notification","message":...}`
pub fn notification_doc(message: &str) -> Result<Doc, TelemetryError> {
    to_doc(&NotificationMsg {
        r#type: "notification",
        message,
    })
}

/// `{"type":"service_status","service":...,"status":...}`
pub fn service_status_doc(service: &str, status: &str) -> Result<Doc, TelemetryError> {
    to_doc(&ServiceStatusMsg {
        r#type: "service_status",
        service,
        status,
    })
}

/// `{"connection":"connected"}` / `{"connection":"disconnected"}`
pub fn connection_doc(connected: bool) -> Result<Doc, TelemetryError> {
    to_doc(&ConnectionMsg {
        connection: if connected { "connected" } else { "disconnected" },
    })
}

/// `{"type":"status","mode":...,"uptime":...}`
pub fn status_doc(mode: &str, uptime_secs: u64) -> Result<Doc, TelemetryError> {
    to_doc(&StatusMsg {
        r#type: "status",
        mode,
        uptime: uptime_secs,
    })
}

/// `{"type":"metrics","service":...,"data":...}`
///
/// `data` comes from the workers as pre-serialized JSON and is validated
/// before it is spliced into the envelope.
pub fn metrics_doc(service: &str, data: &str) -> Result<Doc, TelemetryError> {
    if !json_is_well_formed(data) {
        return Err(TelemetryError::Malformed);
    }
    let mut doc = Doc::new();
    write!(
        doc,
        "{{\"type\":\"metrics\",\"service\":\"{}\",\"data\":{}}}",
        service, data
    )
    .map_err(|_| TelemetryError::Overflow)?;
    Ok(doc)
}

/// Validates and stores a preview info document, queueing a push when a
/// peer is connected
///
/// Malformed input is rejected and the previously stored document kept,
/// so a bad payload can never corrupt what peers read.
pub async fn publish_preview_info(json: &str) -> Result<(), TelemetryError> {
    if !json_is_well_formed(json) {
        log_warn!("Rejecting malformed preview info document");
        return Err(TelemetryError::Malformed);
    }
    let mut doc = Doc::new();
    doc.push_str(json).map_err(|_| TelemetryError::Overflow)?;
    {
        let mut stored = PREVIEW_INFO.lock().await;
        *stored = doc.clone();
    }
    if crate::system::state::is_connected() {
        enqueue(Outbound::PreviewInfo(doc));
    }
    Ok(())
}

/// Latest preview info document, falling back to the idle value before
/// the first publish
pub async fn preview_info_snapshot() -> Doc {
    let stored = PREVIEW_INFO.lock().await;
    if stored.is_empty() {
        let mut doc = Doc::new();
        // Idle constant is shorter than the capacity
        let _ = doc.push_str(PREVIEW_INFO_IDLE);
        doc
    } else {
        stored.clone()
    }
}

/// Validates externally supplied JSON without materializing it
///
/// Runs the input through serde-json-core with the value discarded, so
/// it must parse as exactly one document with nothing but whitespace
/// after it. Documents here are objects, arrays or strings; a bare
/// literal at the top level is rejected. The parse recurses per nesting
/// level, so depth is capped at `NEST_LIMIT` before anything is handed
/// to it.
pub fn json_is_well_formed(input: &str) -> bool {
    if bracket_depth(input) > NEST_LIMIT {
        return false;
    }
    serde_json_core::from_str::<IgnoredAny>(input).is_ok()
}

/// Deepest `{`/`[` nesting, ignoring brackets inside strings
fn bracket_depth(input: &str) -> u8 {
    let mut depth = 0u8;
    let mut deepest = 0u8;
    let mut in_string = false;
    let mut escaped = false;
    for byte in input.bytes() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
        } else {
            match byte {
                b'"' => in_string = true,
                b'{' | b'[' => {
                    depth = depth.saturating_add(1);
                    deepest = deepest.max(depth);
                }
                b'}' | b']' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
    }
    deepest
}

/// Consecutive notify failures tolerated before a peer is written off
pub const DELIVERY_FAILURE_LIMIT: u8 = 3;

/// Tracks notification delivery to the connected peer
///
/// A single failed notify can be transient. Hitting the limit without a
/// success in between means the link is gone even though no disconnect
/// event arrived, and `record` returns true exactly once so the caller
/// can drop the peer.
pub struct DeliveryWatch {
    failures: u8,
}

impl DeliveryWatch {
    pub const fn new() -> Self {
        Self { failures: 0 }
    }

    pub fn record(&mut self, delivered: bool) -> bool {
        if delivered {
            self.failures = 0;
            return false;
        }
        if self.failures >= DELIVERY_FAILURE_LIMIT {
            return false;
        }
        self.failures += 1;
        self.failures == DELIVERY_FAILURE_LIMIT
    }
}

//! Wireless Preview Plumbing
//!
//! Owns the wifi half of the CYW43439: brings the access point up and
//! down on request from the preview worker and serves the MJPEG stream
//! on port 81, one viewer at a time. The worker talks to this task
//! through a command/ack signal pair, so worker code never touches the
//! wireless stack directly.

use core::fmt::Write as _;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::system::preview::{ApInfo, PreviewError, PreviewLink, FRAME, STREAM_PORT};
use crate::DEVICE_NAME;
use cyw43::{Control, PowerManagementMode};
use defmt::{info, warn, Format};
use embassy_futures::select::{select, Either};
use embassy_net::tcp::TcpSocket;
use embassy_net::Stack;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration, Timer};
use embedded_io_async::Write as _;
use heapless::String;

/// Channel the access point announces on
pub const AP_CHANNEL: u8 = 5;

/// Address the device claims on its own network
pub const AP_ADDRESS: [u8; 4] = [192, 168, 4, 1];

const RESPONSE_HEADER: &[u8] = b"HTTP/1.1 200 OK\r\n\
Content-Type: multipart/x-mixed-replace; boundary=frame\r\n\
Cache-Control: no-cache\r\n\
Connection: close\r\n\r\n";

/// Commands from the preview worker to this task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
enum LinkCommand {
    ApUp,
    ApDown,
    ServerUp,
    ServerDown,
}

static LINK_COMMAND: Signal<CriticalSectionRawMutex, LinkCommand> = Signal::new();
static LINK_ACK: Signal<CriticalSectionRawMutex, bool> = Signal::new();
static CLIENT_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Preview worker's handle to the wireless side
///
/// Each call signals the wifi task and waits for its ack, keeping all
/// cyw43 ownership inside that task.
pub struct SignalPreviewLink;

impl PreviewLink for SignalPreviewLink {
    async fn start_access_point(&mut self) -> Result<ApInfo, PreviewError> {
        LINK_COMMAND.signal(LinkCommand::ApUp);
        if LINK_ACK.wait().await {
            let mut ssid = String::new();
            let _ = ssid.push_str(DEVICE_NAME);
            Ok(ApInfo {
                ssid,
                ip: AP_ADDRESS,
                channel: AP_CHANNEL,
            })
        } else {
            Err(PreviewError::AccessPoint)
        }
    }

    async fn start_stream_server(&mut self) -> Result<(), PreviewError> {
        LINK_COMMAND.signal(LinkCommand::ServerUp);
        if LINK_ACK.wait().await {
            Ok(())
        } else {
            Err(PreviewError::StreamServer)
        }
    }

    async fn stop_stream_server(&mut self) {
        LINK_COMMAND.signal(LinkCommand::ServerDown);
        LINK_ACK.wait().await;
    }

    async fn stop_access_point(&mut self) {
        LINK_COMMAND.signal(LinkCommand::ApDown);
        LINK_ACK.wait().await;
    }

    fn client_count(&self) -> usize {
        CLIENT_COUNT.load(Ordering::Acquire)
    }
}

#[embassy_executor::task]
pub async fn wifi_stream(mut control: Control<'static>, stack: Stack<'static>) {
    // Stream latency over power draw
    control.set_power_management(PowerManagementMode::None).await;
    info!("Wireless stream task started");

    let mut serving = false;
    loop {
        if serving {
            match select(LINK_COMMAND.wait(), serve_one_client(stack)).await {
                Either::First(cmd) => serving = apply(cmd, &mut control).await,
                Either::Second(()) => {}
            }
        } else {
            let cmd = LINK_COMMAND.wait().await;
            serving = apply(cmd, &mut control).await;
        }
    }
}

/// Executes one link command and returns whether the server is up
async fn apply(cmd: LinkCommand, control: &mut Control<'static>) -> bool {
    match cmd {
        LinkCommand::ApUp => {
            control.start_ap_open(DEVICE_NAME, AP_CHANNEL).await;
            info!("Access point {} up on channel {}", DEVICE_NAME, AP_CHANNEL);
            LINK_ACK.signal(true);
            false
        }
        LinkCommand::ServerUp => {
            info!("Stream server listening on port {}", STREAM_PORT);
            LINK_ACK.signal(true);
            true
        }
        LinkCommand::ServerDown => {
            info!("Stream server stopped");
            LINK_ACK.signal(true);
            false
        }
        LinkCommand::ApDown => {
            control.close_ap().await;
            info!("Access point down");
            LINK_ACK.signal(true);
            false
        }
    }
}

/// Keeps the viewer count right even when the serve future is cancelled
struct ClientGuard;

impl ClientGuard {
    fn new() -> Self {
        CLIENT_COUNT.fetch_add(1, Ordering::AcqRel);
        Self
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        CLIENT_COUNT.fetch_sub(1, Ordering::AcqRel);
    }
}

async fn serve_one_client(stack: Stack<'static>) {
    let mut rx_buffer = [0u8; 1024];
    let mut tx_buffer = [0u8; 4096];
    let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
    socket.set_timeout(Some(Duration::from_secs(10)));

    if let Err(e) = socket.accept(STREAM_PORT).await {
        warn!("Stream accept failed: {:?}", e);
        Timer::after(Duration::from_millis(250)).await;
        return;
    }
    info!("Stream client connected");

    let _guard = ClientGuard::new();
    match stream_mjpeg(&mut socket).await {
        Ok(()) => info!("Stream client left"),
        Err(e) => info!("Stream ended: {:?}", e),
    }
    socket.close();
    let _ = with_timeout(Duration::from_millis(100), socket.flush()).await;
}

async fn stream_mjpeg(socket: &mut TcpSocket<'_>) -> Result<(), embassy_net::tcp::Error> {
    // Any request gets the stream; read to the end of the headers and
    // ignore what they asked for
    let mut buf = [0u8; 512];
    let mut filled = 0usize;
    loop {
        let n = socket.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Ok(());
        }
        filled += n;
        if buf[..filled].windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if filled == buf.len() {
            // Oversized request header, keep draining from the start
            filled = 0;
        }
    }

    socket.write_all(RESPONSE_HEADER).await?;
    loop {
        let frame = FRAME.wait().await;
        let mut part: String<80> = String::new();
        let _ = write!(
            part,
            "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            frame.len()
        );
        socket.write_all(part.as_bytes()).await?;
        socket.write_all(&frame).await?;
        socket.write_all(b"\r\n").await?;
    }
}

//! BLE Control Link
//!
//! GATT peripheral for the companion app: a write-only control byte, a
//! status characteristic carrying the JSON telemetry documents, the
//! preview connection details, and a static command legend. Transport
//! edges and control writes leave here only as events; all decisions
//! happen in the controller.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::system::command::COMMAND_LEGEND;
use crate::system::indicator::{self, LedPattern};
use crate::system::telemetry::{self, DeliveryWatch, Outbound};
use crate::system::{controller, event};
use crate::DEVICE_NAME;
use bt_hci::controller::ExternalController;
use cyw43::bluetooth::BtDriver;
use defmt::{error, info, warn};
use embassy_futures::select::select;
use embassy_time::Timer;
use trouble_host::prelude::*;

/// One operator connection at a time
const MAX_CONNECTIONS: usize = 1;
const L2CAP_CHANNELS: usize = 2;
const L2CAP_MTU: usize = 251;

/// HCI transport over the shared CYW43439
pub type BtController = ExternalController<BtDriver<'static>, 10>;

/// Characteristic width for the notified documents; trailing spaces are
/// valid JSON whitespace, so a read of the fixed-width value parses as
/// is
const DOC_SPACE: usize = 192;

static PEER_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Peers the transport itself currently reports
pub fn peer_count() -> usize {
    PEER_COUNT.load(Ordering::Acquire)
}

#[gatt_server]
struct Server {
    camera: CameraService,
}

#[gatt_service(uuid = "4fafc201-1fb5-459e-8fcc-c5c9c331914b")]
struct CameraService {
    /// Single ASCII command byte
    #[characteristic(uuid = "beb5483e-36e1-4688-b7f5-ea07361b26a8", write)]
    control: u8,
    /// Latest telemetry document
    #[characteristic(uuid = "beb5483e-36e1-4688-b7f5-ea07361b26a9", read, notify)]
    status: [u8; 192],
    /// Latest preview connection details
    #[characteristic(uuid = "beb5483e-36e1-4688-b7f5-ea07361b26aa", read, notify)]
    preview_info: [u8; 192],
    /// Human readable command legend
    #[characteristic(uuid = "beb5483e-36e1-4688-b7f5-ea07361b26ab", read)]
    menu: [u8; 192],
}

fn padded<const N: usize>(doc: &str) -> [u8; N] {
    let mut out = [b' '; N];
    let n = doc.len().min(N);
    out[..n].copy_from_slice(&doc.as_bytes()[..n]);
    out
}

#[embassy_executor::task]
pub async fn ble_link(bt_controller: BtController) {
    let address = Address::random([0x41, 0x5a, 0x23, 0x9f, 0x75, 0xc6]);
    let mut resources: HostResources<BtController, MAX_CONNECTIONS, L2CAP_CHANNELS, L2CAP_MTU> =
        HostResources::new(PacketQos::None);
    let stack = trouble_host::new(bt_controller, &mut resources).set_random_address(address);
    let Host {
        mut peripheral,
        mut runner,
        ..
    } = stack.build();

    let server = Server::new_with_config(GapConfig::Peripheral(PeripheralConfig {
        name: DEVICE_NAME,
        appearance: &appearance::sensor::GENERIC_SENSOR,
    }))
    .unwrap();
    server
        .set(&server.camera.menu, &padded::<DOC_SPACE>(COMMAND_LEGEND))
        .unwrap();
    server
        .set(
            &server.camera.preview_info,
            &padded::<DOC_SPACE>(telemetry::PREVIEW_INFO_IDLE),
        )
        .unwrap();
    if let Ok(doc) = telemetry::notification_doc("Device ready") {
        server
            .set(&server.camera.status, &padded::<DOC_SPACE>(doc.as_str()))
            .unwrap();
    }

    info!("BLE link task started as {}", DEVICE_NAME);
    select(
        async {
            if let Err(e) = runner.run().await {
                error!("BLE host runner failed: {}", defmt::Debug2Format(&e));
            }
        },
        connection_loop(&mut peripheral, &server),
    )
    .await;
}

/// Advertises, serves one connection at a time, and resumes advertising
/// after each disconnect with bounded retries
async fn connection_loop(peripheral: &mut Peripheral<'_, BtController>, server: &Server<'_>) {
    loop {
        let mut attempts = 0;
        let conn = loop {
            match advertise(peripheral).await {
                Ok(conn) => break Some(conn),
                Err(e) => {
                    attempts += 1;
                    warn!(
                        "Advertising attempt {} failed: {}",
                        attempts,
                        defmt::Debug2Format(&e)
                    );
                    if attempts >= controller::ADVERTISING_RESUME_ATTEMPTS {
                        break None;
                    }
                    Timer::after(controller::ADVERTISING_RESUME_DELAY).await;
                }
            }
        };
        let conn = match conn {
            Some(conn) => conn,
            None => {
                error!("Advertising could not be resumed, link is down until restart");
                indicator::set_led(LedPattern::Fault);
                core::future::pending::<()>().await;
                continue;
            }
        };

        PEER_COUNT.store(1, Ordering::Release);
        event::send(event::Events::PeerConnected).await;

        let _ = select(gatt_events(server, &conn), push_outbound(server, &conn)).await;

        PEER_COUNT.store(0, Ordering::Release);
        event::send(event::Events::PeerDisconnected).await;
    }
}

async fn advertise<'a, C: Controller>(
    peripheral: &mut Peripheral<'a, C>,
) -> Result<Connection<'a>, BleHostError<C::Error>> {
    let mut adv_data = [0; 31];
    AdStructure::encode_slice(
        &[
            AdStructure::Flags(LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED),
            AdStructure::CompleteLocalName(DEVICE_NAME.as_bytes()),
        ],
        &mut adv_data[..],
    )?;
    let mut advertiser = peripheral
        .advertise(
            &Default::default(),
            Advertisement::ConnectableScannableUndirected {
                adv_data: &adv_data[..],
                scan_data: &[],
            },
        )
        .await?;
    let conn = advertiser.accept().await?;
    info!("Peer connected");
    Ok(conn)
}

/// Pumps GATT events until the peer disconnects
async fn gatt_events(server: &Server<'_>, conn: &Connection<'_>) {
    let control = server.camera.control;
    loop {
        match conn.next().await {
            ConnectionEvent::Disconnected { reason } => {
                info!("Peer disconnected: {:?}", reason);
                break;
            }
            ConnectionEvent::Gatt { data } => match data.process(server).await {
                Ok(Some(GattEvent::Write(event))) => {
                    if event.handle() == control.handle {
                        if let Some(&byte) = event.data().first() {
                            event::send(event::Events::ControlByte(byte)).await;
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("GATT event error: {:?}", e),
            },
        }
    }
}

/// Notifies queued telemetry documents to the connected peer
///
/// A failed notify drops that document; telemetry loss is tolerated and
/// never tears down the connection from our side. Repeated failures are
/// independent evidence the peer is gone without a disconnect event, so
/// after `DELIVERY_FAILURE_LIMIT` in a row the reported peer count goes
/// to zero and the periodic health check reconciles the controller.
async fn push_outbound(server: &Server<'_>, conn: &Connection<'_>) {
    let mut watch = DeliveryWatch::new();
    loop {
        let outbound = telemetry::next_outbound().await;
        let payload = padded::<DOC_SPACE>(outbound.as_str());
        let result = match &outbound {
            Outbound::Status(_) => {
                server
                    .camera
                    .status
                    .notify(server, conn, &payload)
                    .await
            }
            Outbound::PreviewInfo(_) => {
                server
                    .camera
                    .preview_info
                    .notify(server, conn, &payload)
                    .await
            }
        };
        if let Err(e) = &result {
            warn!("Notify failed, dropping document: {:?}", e);
        }
        if watch.record(result.is_ok()) {
            warn!("Peer stopped acknowledging notifications, reporting it gone");
            PEER_COUNT.store(0, Ordering::Release);
        }
    }
}

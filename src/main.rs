//! Camera firmware entry point
//!
//! Initializes the system and spawns the control tasks.

#![no_std]
#![no_main]

use cyw43_pio::{PioSpi, DEFAULT_CLOCK_DIVIDER};
use defmt::info;
use embassy_executor::Spawner;
use embassy_net::{Ipv4Address, Ipv4Cidr, StackResources};
use embassy_rp::block::ImageDef;
use embassy_rp::clocks::RoscRng;
use embassy_rp::config::Config;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::{DMA_CH0, PIO0};
use embassy_rp::pio::Pio;
use rand_core::RngCore;
use static_cell::StaticCell;
use trail_camera::system::controller;
use trail_camera::system::indicator::{self, ChimeRequest};
use trail_camera::system::resources::{
    AssignedResources, ChimeResources, DisplayResources, Irqs, MenuButtonResources,
    SdCardResources, StatusLedResources, UpkeepResources, WirelessResources,
};
use trail_camera::task::{
    ble_link::{self, ble_link},
    chime::chime,
    display::display,
    drive_modes::drive_modes,
    menu_button::menu_button,
    orchestrate::orchestrate,
    status_led::status_led,
    upkeep::upkeep,
    wifi_stream::{self, wifi_stream},
};
use trail_camera::{split_resources, DEVICE_NAME, FIRMWARE_VERSION};
use {defmt_rtt as _, panic_probe as _};

/// Firmware image type for bootloader
#[link_section = ".start_block"]
#[used]
pub static IMAGE_DEF: ImageDef = ImageDef::secure_exe();

#[embassy_executor::task]
async fn cyw43_task(
    runner: cyw43::Runner<'static, Output<'static>, PioSpi<'static, PIO0, 0, DMA_CH0>>,
) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn net_task(mut runner: embassy_net::Runner<'static, cyw43::NetDriver<'static>>) -> ! {
    runner.run().await
}

/// Firmware entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Config::default());

    // Register the worker observers before any task that can deliver a
    // command is running.
    controller::register_mode_observers().await;

    // Split the resources into separate groups for each task, for all the
    // resources that we do not share between tasks.
    let r = split_resources!(p);

    // Local interface first, so the screen and sounder are alive while the
    // radio boots
    spawner.spawn(display(r.display)).unwrap();
    spawner.spawn(status_led(r.status_led)).unwrap();
    spawner.spawn(chime(r.chime)).unwrap();
    spawner.spawn(menu_button(r.menu_button)).unwrap();
    spawner.spawn(orchestrate()).unwrap();
    spawner.spawn(upkeep(r.upkeep)).unwrap();
    spawner.spawn(drive_modes(r.sdcard)).unwrap();

    // CYW43439 bring-up; the one radio serves both the control link and the
    // preview access point. The firmware blobs come baked in from the
    // cyw43-firmware crate.
    let fw = cyw43_firmware::CYW43_43439A0;
    let clm = cyw43_firmware::CYW43_43439A0_CLM;
    let btfw = cyw43_firmware::CYW43_43439A0_BTFW;
    let w = r.wireless;
    let pwr = Output::new(w.pwr_pin, Level::Low);
    let cs = Output::new(w.cs_pin, Level::High);
    let mut pio = Pio::new(w.pio, Irqs);
    let spi = PioSpi::new(
        &mut pio.common,
        pio.sm0,
        DEFAULT_CLOCK_DIVIDER,
        pio.irq0,
        cs,
        w.dio_pin,
        w.clk_pin,
        w.dma,
    );
    static STATE: StaticCell<cyw43::State> = StaticCell::new();
    let state = STATE.init(cyw43::State::new());
    let (net_device, bt_device, mut control, runner) =
        cyw43::new_with_bluetooth(state, pwr, spi, fw, btfw).await;
    spawner.spawn(cyw43_task(runner)).unwrap();
    control.init(clm).await;

    // The stream server owns a fixed address on its own access point;
    // viewers self-assign in the same /24.
    let config = embassy_net::Config::ipv4_static(embassy_net::StaticConfigV4 {
        address: Ipv4Cidr::new(Ipv4Address::from(wifi_stream::AP_ADDRESS), 24),
        dns_servers: heapless::Vec::new(),
        gateway: None,
    });
    let mut rng = RoscRng;
    let seed = rng.next_u64();
    static NET_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
    let (stack, net_runner) =
        embassy_net::new(net_device, config, NET_RESOURCES.init(StackResources::new()), seed);
    spawner.spawn(net_task(net_runner)).unwrap();
    spawner.spawn(wifi_stream(control, stack)).unwrap();

    let bt_controller = ble_link::BtController::new(bt_device);
    spawner.spawn(ble_link(bt_controller)).unwrap();

    indicator::chime(ChimeRequest::Startup);
    info!("{} v{} up", DEVICE_NAME, FIRMWARE_VERSION);
}

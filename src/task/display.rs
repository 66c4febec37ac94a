//! Status Display
//!
//! Renders the idle status screen or the open menu on the SSD1306.
//! Redraws whenever the screen model changes and on a one second
//! heartbeat so the mode and link lines stay fresh between events.

use core::fmt::Write as _;

use crate::system::menu::{ScreenModel, SCREEN};
use crate::system::resources::{DisplayResources, Irqs};
use crate::system::state;
use crate::{DEVICE_NAME, FIRMWARE_VERSION};
use defmt::{info, warn};
use embassy_futures::select::{select, Either};
use embassy_rp::i2c::{Config, I2c};
use embassy_time::{Duration, Timer};
use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle, MonoTextStyleBuilder},
    pixelcolor::BinaryColor,
    prelude::*,
    text::{Baseline, Text},
};
use heapless::String;
use ssd1306::{prelude::*, I2CDisplayInterface, Ssd1306Async};

const LINE_HEIGHT: i32 = 12;

#[embassy_executor::task]
pub async fn display(r: DisplayResources) {
    let mut config = Config::default();
    config.frequency = 400_000;
    let bus = I2c::new_async(r.i2c, r.scl_pin, r.sda_pin, Irqs, config);

    let interface = I2CDisplayInterface::new(bus);
    let mut display = Ssd1306Async::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
        .into_buffered_graphics_mode();
    display.init().await.unwrap();
    info!("Display initialized");

    let mut model = ScreenModel::Idle;
    loop {
        display.clear_buffer();
        draw_screen(&mut display, &model).unwrap();
        if let Err(e) = display.flush().await {
            warn!("Display flush failed: {}", defmt::Debug2Format(&e));
        }

        model = match select(SCREEN.wait(), Timer::after(Duration::from_secs(1))).await {
            Either::First(next) => next,
            Either::Second(()) => model,
        };
    }
}

fn draw_screen<D>(target: &mut D, model: &ScreenModel) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let style = MonoTextStyleBuilder::new()
        .font(&FONT_6X10)
        .text_color(BinaryColor::On)
        .build();
    match model {
        ScreenModel::Idle => draw_idle(target, style),
        ScreenModel::Menu { items, selection } => draw_menu(target, style, items, *selection),
    }
}

fn draw_idle<D>(target: &mut D, style: MonoTextStyle<'static, BinaryColor>) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let mut title: String<24> = String::new();
    let _ = write!(title, "{} v{}", DEVICE_NAME, FIRMWARE_VERSION);
    Text::with_baseline(&title, Point::zero(), style, Baseline::Top).draw(target)?;

    let link = if state::is_connected() {
        "BLE: linked"
    } else {
        "BLE: advertising"
    };
    Text::with_baseline(link, Point::new(0, LINE_HEIGHT * 2), style, Baseline::Top).draw(target)?;

    let mut mode_line: String<24> = String::new();
    let _ = write!(mode_line, "Mode: {}", state::active_mode().label());
    Text::with_baseline(&mode_line, Point::new(0, LINE_HEIGHT * 3), style, Baseline::Top)
        .draw(target)?;

    Text::with_baseline(
        "Hold for menu",
        Point::new(0, LINE_HEIGHT * 4),
        style,
        Baseline::Top,
    )
    .draw(target)?;
    Ok(())
}

fn draw_menu<D>(
    target: &mut D,
    style: MonoTextStyle<'static, BinaryColor>,
    items: &[&str],
    selection: usize,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    Text::with_baseline("Menu", Point::zero(), style, Baseline::Top).draw(target)?;
    for (i, item) in items.iter().enumerate() {
        let mut line: String<24> = String::new();
        let marker = if i == selection { '>' } else { ' ' };
        let _ = write!(line, "{} {}", marker, item);
        Text::with_baseline(
            &line,
            Point::new(0, LINE_HEIGHT * (i as i32 + 1)),
            style,
            Baseline::Top,
        )
        .draw(target)?;
    }
    Ok(())
}

//! Hardware Resource Management
//!
//! Manages and allocates hardware resources (pins, peripherals) to different system components.
//! This module ensures safe and organized access to the camera unit's hardware by:
//! - Defining clear ownership of hardware resources
//! - Preventing conflicts in hardware access
//!
//! # Resource Groups
//! - Display: SSD1306 status display on I2C0
//! - Menu Button: single navigation push button
//! - Status LED: connection indicator
//! - Chime: piezo buzzer PWM output
//! - SD Card: SPI-attached image storage socket
//! - Wireless: CYW43439 module for BLE and the preview access point

use assign_resources::assign_resources;
use embassy_rp::bind_interrupts;
use embassy_rp::i2c::InterruptHandler as I2cInterruptHandler;
use embassy_rp::peripherals::{self, I2C0, PIO0};
use embassy_rp::pio::InterruptHandler as PioInterruptHandler;

assign_resources! {
    /// SSD1306 status display bus
    display: DisplayResources {
        i2c: I2C0,
        sda_pin: PIN_4,
        scl_pin: PIN_5,
    },
    /// Menu navigation push button
    menu_button: MenuButtonResources {
        button_pin: PIN_14,
    },
    /// Connection indicator LED
    status_led: StatusLedResources {
        led_pin: PIN_13,
    },
    /// Piezo buzzer PWM output
    chime: ChimeResources {
        slice: PWM_SLICE7,
        buzzer_pin: PIN_15,
    },
    /// SD card socket on SPI0
    sdcard: SdCardResources {
        spi: SPI0,
        clk_pin: PIN_18,
        mosi_pin: PIN_19,
        miso_pin: PIN_16,
        cs_pin: PIN_17,
    },
    /// Hardware watchdog, fed by the upkeep task
    upkeep: UpkeepResources {
        watchdog: WATCHDOG,
    },
    /// CYW43439 wireless module
    wireless: WirelessResources {
        pwr_pin: PIN_23,
        cs_pin: PIN_25,
        dio_pin: PIN_24,
        clk_pin: PIN_29,
        pio: PIO0,
        dma: DMA_CH0,
    },
}

bind_interrupts!(pub struct Irqs {
    I2C0_IRQ => I2cInterruptHandler<I2C0>;
    PIO0_IRQ_0 => PioInterruptHandler<PIO0>;
});

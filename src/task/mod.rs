pub mod ble_link;
pub mod chime;
pub mod display;
pub mod drive_modes;
pub mod menu_button;
pub mod orchestrate;
pub mod status_led;
pub mod upkeep;
pub mod wifi_stream;

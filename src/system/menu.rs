//! Local Button Menu
//!
//! A two-screen state machine driven by a single button: the idle screen
//! shows device status, a long press opens the menu, a click advances
//! the highlighted item cyclically and another long press confirms it.
//! While a mode is running the item list collapses to Stop/Back.
//!
//! Confirming an item yields the same command byte the wireless channel
//! would send, so the menu goes through the identical arbitration path.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use crate::system::command::ControlCommand;
use crate::system::event::ButtonPress;
use crate::system::state::ActiveMode;

/// Menu items offered while the device is idle
pub const IDLE_ITEMS: &[&str] = &["Start Preview", "Start Capturing", "Start Inferring", "Back"];

/// Menu items offered while a mode is running
pub const ACTIVE_ITEMS: &[&str] = &["Stop", "Back"];

/// What the display task should render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenModel {
    /// Status screen; the display reads mode and link state itself
    Idle,
    /// Menu screen with the highlighted item
    Menu {
        items: &'static [&'static str],
        selection: usize,
    },
}

/// Latest screen model, signalled on every change and consumed by the
/// display task
pub static SCREEN: Signal<CriticalSectionRawMutex, ScreenModel> = Signal::new();

enum MenuScreen {
    IdleDisplay,
    MenuActive { selection: usize },
}

/// Button menu state machine
pub struct LocalMenu {
    screen: MenuScreen,
}

impl LocalMenu {
    pub const fn new() -> Self {
        Self {
            screen: MenuScreen::IdleDisplay,
        }
    }

    fn items_for(active: ActiveMode) -> &'static [&'static str] {
        if active == ActiveMode::None {
            IDLE_ITEMS
        } else {
            ACTIVE_ITEMS
        }
    }

    /// Feeds one classified press into the state machine
    ///
    /// Returns the command byte to issue when the press confirmed an
    /// actionable item. The selection is reduced modulo the current item
    /// count, which also keeps it valid when the item set shrinks while
    /// the menu is open.
    pub fn on_press(&mut self, press: ButtonPress, active: ActiveMode) -> Option<u8> {
        match (&self.screen, press) {
            (MenuScreen::IdleDisplay, ButtonPress::LongPress) => {
                self.screen = MenuScreen::MenuActive { selection: 0 };
                None
            }
            (MenuScreen::IdleDisplay, ButtonPress::Click) => None,
            (MenuScreen::MenuActive { selection }, ButtonPress::Click) => {
                let items = Self::items_for(active);
                let next = (*selection + 1) % items.len();
                self.screen = MenuScreen::MenuActive { selection: next };
                None
            }
            (MenuScreen::MenuActive { selection }, ButtonPress::LongPress) => {
                let items = Self::items_for(active);
                let confirmed = *selection % items.len();
                self.screen = MenuScreen::IdleDisplay;
                self.command_for(confirmed, active)
            }
        }
    }

    fn command_for(&self, index: usize, active: ActiveMode) -> Option<u8> {
        if active == ActiveMode::None {
            match index {
                0 => Some(ControlCommand::StartPreview.byte()),
                1 => Some(ControlCommand::StartCapture.byte()),
                2 => Some(ControlCommand::StartInference.byte()),
                _ => None,
            }
        } else {
            match index {
                0 => ControlCommand::stop_for(active).map(ControlCommand::byte),
                _ => None,
            }
        }
    }

    /// Screen model for the current menu state
    pub fn screen_model(&self, active: ActiveMode) -> ScreenModel {
        match self.screen {
            MenuScreen::IdleDisplay => ScreenModel::Idle,
            MenuScreen::MenuActive { selection } => {
                let items = Self::items_for(active);
                ScreenModel::Menu {
                    items,
                    selection: selection % items.len(),
                }
            }
        }
    }
}

impl Default for LocalMenu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_press_opens_the_menu_at_the_first_item() {
        let mut menu = LocalMenu::new();
        assert_eq!(menu.screen_model(ActiveMode::None), ScreenModel::Idle);
        assert_eq!(menu.on_press(ButtonPress::LongPress, ActiveMode::None), None);
        assert_eq!(
            menu.screen_model(ActiveMode::None),
            ScreenModel::Menu {
                items: IDLE_ITEMS,
                selection: 0
            }
        );
    }

    #[test]
    fn clicks_cycle_through_the_idle_items() {
        let mut menu = LocalMenu::new();
        menu.on_press(ButtonPress::LongPress, ActiveMode::None);
        for expected in [1, 2, 3, 0, 1] {
            assert_eq!(menu.on_press(ButtonPress::Click, ActiveMode::None), None);
            assert_eq!(
                menu.screen_model(ActiveMode::None),
                ScreenModel::Menu {
                    items: IDLE_ITEMS,
                    selection: expected
                }
            );
        }
    }

    #[test]
    fn clicks_on_the_idle_screen_do_nothing() {
        let mut menu = LocalMenu::new();
        assert_eq!(menu.on_press(ButtonPress::Click, ActiveMode::None), None);
        assert_eq!(menu.screen_model(ActiveMode::None), ScreenModel::Idle);
    }

    #[test]
    fn confirming_a_start_item_issues_its_command_and_closes() {
        let mut menu = LocalMenu::new();
        menu.on_press(ButtonPress::LongPress, ActiveMode::None);
        menu.on_press(ButtonPress::Click, ActiveMode::None);
        assert_eq!(
            menu.on_press(ButtonPress::LongPress, ActiveMode::None),
            Some(b'3')
        );
        assert_eq!(menu.screen_model(ActiveMode::None), ScreenModel::Idle);
    }

    #[test]
    fn back_closes_without_a_command() {
        let mut menu = LocalMenu::new();
        menu.on_press(ButtonPress::LongPress, ActiveMode::None);
        for _ in 0..3 {
            menu.on_press(ButtonPress::Click, ActiveMode::None);
        }
        assert_eq!(menu.on_press(ButtonPress::LongPress, ActiveMode::None), None);
        assert_eq!(menu.screen_model(ActiveMode::None), ScreenModel::Idle);
    }

    #[test]
    fn running_mode_collapses_the_items_to_stop_and_back() {
        let mut menu = LocalMenu::new();
        menu.on_press(ButtonPress::LongPress, ActiveMode::Capture);
        assert_eq!(
            menu.screen_model(ActiveMode::Capture),
            ScreenModel::Menu {
                items: ACTIVE_ITEMS,
                selection: 0
            }
        );
        assert_eq!(
            menu.on_press(ButtonPress::LongPress, ActiveMode::Capture),
            Some(b'4')
        );
    }

    #[test]
    fn stop_maps_to_the_running_mode() {
        for (mode, byte) in [
            (ActiveMode::Preview, b'2'),
            (ActiveMode::Capture, b'4'),
            (ActiveMode::Inference, b'6'),
        ] {
            let mut menu = LocalMenu::new();
            menu.on_press(ButtonPress::LongPress, mode);
            assert_eq!(menu.on_press(ButtonPress::LongPress, mode), Some(byte));
        }
    }

    #[test]
    fn selection_stays_valid_when_the_item_set_shrinks() {
        let mut menu = LocalMenu::new();
        menu.on_press(ButtonPress::LongPress, ActiveMode::None);
        for _ in 0..3 {
            menu.on_press(ButtonPress::Click, ActiveMode::None);
        }
        // A wireless command started capture while the menu was open
        assert_eq!(
            menu.screen_model(ActiveMode::Capture),
            ScreenModel::Menu {
                items: ACTIVE_ITEMS,
                selection: 1
            }
        );
        assert_eq!(menu.on_press(ButtonPress::Click, ActiveMode::Capture), None);
        assert_eq!(
            menu.on_press(ButtonPress::LongPress, ActiveMode::Capture),
            Some(b'4')
        );
    }
}

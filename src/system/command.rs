//! Control command byte protocol
//!
//! Both input sources produce the same single-byte commands: the wireless
//! control characteristic carries the raw byte, the local menu synthesizes
//! it. Everything funnels into `controller::handle_command`.

use crate::system::state::ActiveMode;

/// Mode-change commands carried as single ASCII bytes `'1'..'6'`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "pico2w", derive(defmt::Format))]
pub enum ControlCommand {
    StartPreview,
    StopPreview,
    StartCapture,
    StopCapture,
    StartInference,
    StopInference,
}

impl ControlCommand {
    /// Decodes a wire byte. Anything outside `'1'..'6'` is unknown and must
    /// not change state.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'1' => Some(Self::StartPreview),
            b'2' => Some(Self::StopPreview),
            b'3' => Some(Self::StartCapture),
            b'4' => Some(Self::StopCapture),
            b'5' => Some(Self::StartInference),
            b'6' => Some(Self::StopInference),
            _ => None,
        }
    }

    /// Wire byte for this command
    pub fn byte(self) -> u8 {
        match self {
            Self::StartPreview => b'1',
            Self::StopPreview => b'2',
            Self::StartCapture => b'3',
            Self::StopCapture => b'4',
            Self::StartInference => b'5',
            Self::StopInference => b'6',
        }
    }

    /// The mode this command starts or stops
    pub fn mode(self) -> ActiveMode {
        match self {
            Self::StartPreview | Self::StopPreview => ActiveMode::Preview,
            Self::StartCapture | Self::StopCapture => ActiveMode::Capture,
            Self::StartInference | Self::StopInference => ActiveMode::Inference,
        }
    }

    /// True for the three start commands
    pub fn is_start(self) -> bool {
        matches!(
            self,
            Self::StartPreview | Self::StartCapture | Self::StartInference
        )
    }

    /// The stop command for a running mode, `None` for the idle mode
    pub fn stop_for(mode: ActiveMode) -> Option<Self> {
        match mode {
            ActiveMode::None => None,
            ActiveMode::Preview => Some(Self::StopPreview),
            ActiveMode::Capture => Some(Self::StopCapture),
            ActiveMode::Inference => Some(Self::StopInference),
        }
    }
}

/// Command legend served by the read-only menu characteristic
pub const COMMAND_LEGEND: &str = "Available Commands:\n\
    1: Start Preview\n\
    2: Stop Preview\n\
    3: Start Data Collection\n\
    4: Stop Data Collection\n\
    5: Start Inference\n\
    6: Stop Inference";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_all_six_commands() {
        assert_eq!(
            ControlCommand::from_byte(b'1'),
            Some(ControlCommand::StartPreview)
        );
        assert_eq!(
            ControlCommand::from_byte(b'2'),
            Some(ControlCommand::StopPreview)
        );
        assert_eq!(
            ControlCommand::from_byte(b'3'),
            Some(ControlCommand::StartCapture)
        );
        assert_eq!(
            ControlCommand::from_byte(b'4'),
            Some(ControlCommand::StopCapture)
        );
        assert_eq!(
            ControlCommand::from_byte(b'5'),
            Some(ControlCommand::StartInference)
        );
        assert_eq!(
            ControlCommand::from_byte(b'6'),
            Some(ControlCommand::StopInference)
        );
    }

    #[test]
    fn rejects_bytes_outside_the_command_range() {
        assert_eq!(ControlCommand::from_byte(b'0'), None);
        assert_eq!(ControlCommand::from_byte(b'7'), None);
        assert_eq!(ControlCommand::from_byte(b'a'), None);
        assert_eq!(ControlCommand::from_byte(0x00), None);
        assert_eq!(ControlCommand::from_byte(0xff), None);
    }

    #[test]
    fn byte_round_trips() {
        for b in b'1'..=b'6' {
            let cmd = ControlCommand::from_byte(b).unwrap();
            assert_eq!(cmd.byte(), b);
        }
    }

    #[test]
    fn stop_for_covers_every_running_mode() {
        assert_eq!(ControlCommand::stop_for(ActiveMode::None), None);
        assert_eq!(
            ControlCommand::stop_for(ActiveMode::Preview),
            Some(ControlCommand::StopPreview)
        );
        assert_eq!(
            ControlCommand::stop_for(ActiveMode::Capture),
            Some(ControlCommand::StopCapture)
        );
        assert_eq!(
            ControlCommand::stop_for(ActiveMode::Inference),
            Some(ControlCommand::StopInference)
        );
    }

    #[test]
    fn start_stop_pairs_map_to_the_same_mode() {
        assert_eq!(ControlCommand::StartPreview.mode(), ActiveMode::Preview);
        assert_eq!(ControlCommand::StopPreview.mode(), ActiveMode::Preview);
        assert_eq!(ControlCommand::StartCapture.mode(), ActiveMode::Capture);
        assert_eq!(ControlCommand::StopCapture.mode(), ActiveMode::Capture);
        assert_eq!(ControlCommand::StartInference.mode(), ActiveMode::Inference);
        assert_eq!(ControlCommand::StopInference.mode(), ActiveMode::Inference);
        assert!(ControlCommand::StartPreview.is_start());
        assert!(!ControlCommand::StopPreview.is_start());
    }
}

//! Synthetic Camera
//!
//! Stand-in [`Camera`] implementation that renders a moving RGB565 test
//! pattern and wraps it in a minimal JFIF shell. It keeps the whole
//! capture/encode/store pipeline and the preview stream exercisable on
//! hardware that has no sensor driver wired in yet.

use super::{Camera, CameraError, CameraProfile, Frame};

pub const PATTERN_WIDTH: u16 = 96;
pub const PATTERN_HEIGHT: u16 = 96;

const FRAME_LEN: usize = PATTERN_WIDTH as usize * PATTERN_HEIGHT as usize * 2;

/// Every 4th pixel of every 4th row lands in the encoded payload
const SUBSAMPLE: usize = 4;

pub struct TestPatternCamera {
    profile: Option<CameraProfile>,
    captured: bool,
    phase: u8,
    frame: [u8; FRAME_LEN],
}

impl TestPatternCamera {
    pub const fn new() -> Self {
        Self {
            profile: None,
            captured: false,
            phase: 0,
            frame: [0; FRAME_LEN],
        }
    }
}

impl Default for TestPatternCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera for TestPatternCamera {
    fn configure(&mut self, profile: CameraProfile) -> Result<(), CameraError> {
        self.profile = Some(profile);
        Ok(())
    }

    fn release(&mut self) {
        self.profile = None;
        self.captured = false;
    }

    fn capture(&mut self) -> Result<Frame<'_>, CameraError> {
        if self.profile.is_none() {
            return Err(CameraError::Acquisition);
        }
        let width = PATTERN_WIDTH as usize;
        let bar = (self.phase as usize * 3) % width;
        for y in 0..PATTERN_HEIGHT as usize {
            for x in 0..width {
                let red = (x * 31 / (width - 1)) as u16;
                let blue = (y * 31 / (PATTERN_HEIGHT as usize - 1)) as u16;
                let green: u16 = if x.abs_diff(bar) < 4 { 63 } else { 0 };
                let pixel = (red << 11) | (green << 5) | blue;
                let at = (y * width + x) * 2;
                self.frame[at] = (pixel >> 8) as u8;
                self.frame[at + 1] = pixel as u8;
            }
        }
        self.phase = self.phase.wrapping_add(1);
        self.captured = true;
        Ok(Frame {
            data: &self.frame,
            width: PATTERN_WIDTH,
            height: PATTERN_HEIGHT,
        })
    }

    fn encode_jpeg(&mut self, into: &mut [u8]) -> Result<usize, CameraError> {
        if !self.captured {
            return Err(CameraError::Acquisition);
        }
        let mut at = 0;
        // SOI + JFIF APP0
        push(into, &mut at, &[0xff, 0xd8])?;
        push(
            into,
            &mut at,
            &[
                0xff, 0xe0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00,
                0x01, 0x00, 0x01, 0x00, 0x00,
            ],
        )?;
        let comment = b"synthetic frame";
        let comment_len = (comment.len() + 2) as u16;
        push(into, &mut at, &[0xff, 0xfe])?;
        push(into, &mut at, &comment_len.to_be_bytes())?;
        push(into, &mut at, comment)?;
        // Subsampled pattern as the entropy payload, high bit cleared so
        // no marker sequence can appear inside it
        for y in (0..PATTERN_HEIGHT as usize).step_by(SUBSAMPLE) {
            for x in (0..PATTERN_WIDTH as usize).step_by(SUBSAMPLE) {
                let byte = self.frame[(y * PATTERN_WIDTH as usize + x) * 2] >> 1;
                push(into, &mut at, &[byte])?;
            }
        }
        push(into, &mut at, &[0xff, 0xd9])?;
        Ok(at)
    }
}

fn push(into: &mut [u8], at: &mut usize, bytes: &[u8]) -> Result<(), CameraError> {
    let end = *at + bytes.len();
    if end > into.len() {
        return Err(CameraError::Encode);
    }
    into[*at..end].copy_from_slice(bytes);
    *at = end;
    Ok(())
}

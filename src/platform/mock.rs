//! Test doubles for the hardware seams

use super::{Camera, CameraError, CameraProfile, Frame, ImageStore, StoreError};

pub struct MockCamera {
    pub profile: Option<CameraProfile>,
    pub fail_configure: bool,
    pub fail_capture: bool,
    pub fail_encode: bool,
    pub captures: usize,
    pub releases: usize,
    frame: [u8; 8],
}

impl MockCamera {
    pub fn new() -> Self {
        Self {
            profile: None,
            fail_configure: false,
            fail_capture: false,
            fail_encode: false,
            captures: 0,
            releases: 0,
            frame: [0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80],
        }
    }
}

impl Camera for MockCamera {
    fn configure(&mut self, profile: CameraProfile) -> Result<(), CameraError> {
        if self.fail_configure {
            return Err(CameraError::Configure);
        }
        self.profile = Some(profile);
        Ok(())
    }

    fn release(&mut self) {
        self.profile = None;
        self.releases += 1;
    }

    fn capture(&mut self) -> Result<Frame<'_>, CameraError> {
        if self.profile.is_none() || self.fail_capture {
            return Err(CameraError::Acquisition);
        }
        self.captures += 1;
        Ok(Frame {
            data: &self.frame,
            width: 2,
            height: 2,
        })
    }

    fn encode_jpeg(&mut self, into: &mut [u8]) -> Result<usize, CameraError> {
        if self.profile.is_none() || self.fail_encode {
            return Err(CameraError::Encode);
        }
        let encoded = [0xff, 0xd8, 0xaa, 0xbb, 0xff, 0xd9];
        if into.len() < encoded.len() {
            return Err(CameraError::Encode);
        }
        into[..encoded.len()].copy_from_slice(&encoded);
        Ok(encoded.len())
    }
}

pub struct MockImageStore {
    pub fail_prepare: bool,
    pub fail_scan: bool,
    /// Saves whose name contains this substring fail
    pub fail_saves_containing: Option<&'static str>,
    pub prepares: usize,
    /// Names present before the worker starts, fed to `scan_names`
    pub existing: Vec<String>,
    /// Every successful save as (name, byte length)
    pub saved: Vec<(String, usize)>,
}

impl MockImageStore {
    pub fn new() -> Self {
        Self {
            fail_prepare: false,
            fail_scan: false,
            fail_saves_containing: None,
            prepares: 0,
            existing: Vec::new(),
            saved: Vec::new(),
        }
    }

    pub fn with_existing(names: &[&str]) -> Self {
        let mut store = Self::new();
        store.existing = names.iter().map(|n| n.to_string()).collect();
        store
    }

    pub fn saved_names(&self) -> Vec<String> {
        self.saved.iter().map(|(name, _)| name.clone()).collect()
    }
}

impl ImageStore for MockImageStore {
    async fn prepare(&mut self) -> Result<(), StoreError> {
        self.prepares += 1;
        if self.fail_prepare {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }

    async fn save(&mut self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        if let Some(pattern) = self.fail_saves_containing {
            if name.contains(pattern) {
                return Err(StoreError::Write);
            }
        }
        self.saved.push((name.to_string(), data.len()));
        Ok(())
    }

    async fn scan_names<F: FnMut(&str)>(&mut self, mut visit: F) -> Result<(), StoreError> {
        if self.fail_scan {
            return Err(StoreError::List);
        }
        for name in &self.existing {
            visit(name);
        }
        Ok(())
    }
}

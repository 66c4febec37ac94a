//! SD Card Image Store
//!
//! FAT volume on the SPI-attached SD card. Each call opens the volume,
//! does its work and lets the handles close on drop, so a yanked card
//! only costs the one operation. Names longer than 8.3 go through the
//! [`fat_names`] alias mapping.

use defmt::{debug, error, info, warn};
use embassy_time::{Duration, Timer};
use embedded_sdmmc::{BlockDevice, Mode, TimeSource, Timestamp, VolumeIdx, VolumeManager};

use crate::platform::{fat_names, ImageStore, StoreError};

const INIT_ATTEMPTS: u32 = 3;
const INIT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// RTC integration is a stub, so stored files carry the FAT epoch.
struct FixedTimesource;

impl TimeSource for FixedTimesource {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 0,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

pub struct SdImageStore<D: BlockDevice> {
    volume_mgr: VolumeManager<D, FixedTimesource>,
}

impl<D: BlockDevice> SdImageStore<D> {
    pub fn new(device: D) -> Self {
        Self {
            volume_mgr: VolumeManager::new(device, FixedTimesource),
        }
    }
}

fn storage_err<E: core::fmt::Debug>(
    context: &'static str,
    err: embedded_sdmmc::Error<E>,
    kind: StoreError,
) -> StoreError {
    error!("{} failed: {}", context, defmt::Debug2Format(&err));
    kind
}

impl<D: BlockDevice> ImageStore for SdImageStore<D> {
    async fn prepare(&mut self) -> Result<(), StoreError> {
        let mut attempt = 1;
        loop {
            match self.volume_mgr.open_volume(VolumeIdx(0)) {
                Ok(_) => {
                    info!("SD card ready on attempt {}", attempt);
                    return Ok(());
                }
                Err(e) if attempt < INIT_ATTEMPTS => {
                    warn!(
                        "SD card init attempt {} failed: {}",
                        attempt,
                        defmt::Debug2Format(&e)
                    );
                    attempt += 1;
                    Timer::after(INIT_RETRY_DELAY).await;
                }
                Err(e) => {
                    error!("SD card unavailable: {}", defmt::Debug2Format(&e));
                    return Err(StoreError::Unavailable);
                }
            }
        }
    }

    async fn save(&mut self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        let Some(short) = fat_names::short_name_for(name) else {
            error!("No on-disk name for {}", name);
            return Err(StoreError::Write);
        };
        let mut volume = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(|e| storage_err("Volume open", e, StoreError::Write))?;
        let mut root = volume
            .open_root_dir()
            .map_err(|e| storage_err("Root dir open", e, StoreError::Write))?;
        let mut file = root
            .open_file_in_dir(short.as_str(), Mode::ReadWriteCreateOrTruncate)
            .map_err(|e| storage_err("File open", e, StoreError::Write))?;
        file.write(data)
            .map_err(|e| storage_err("File write", e, StoreError::Write))?;
        file.close()
            .map_err(|e| storage_err("File close", e, StoreError::Write))?;
        debug!("Stored {} ({} bytes)", name, data.len());
        Ok(())
    }

    async fn scan_names<F: FnMut(&str)>(&mut self, mut visit: F) -> Result<(), StoreError> {
        let mut volume = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(|e| storage_err("Volume open", e, StoreError::List))?;
        let mut root = volume
            .open_root_dir()
            .map_err(|e| storage_err("Root dir open", e, StoreError::List))?;
        root.iterate_dir(|entry| {
            if entry.attributes.is_directory() {
                return;
            }
            if let Some(name) =
                fat_names::long_name_for(entry.name.base_name(), entry.name.extension())
            {
                visit(&name);
            }
        })
        .map_err(|e| storage_err("Directory scan", e, StoreError::List))?;
        Ok(())
    }
}

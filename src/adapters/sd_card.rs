//! SD card mount.
//!
//! On the device the card sits on its own SPI bus (`pins::SD_*`) and is
//! mounted as FAT into the VFS at [`SD_MOUNT_POINT`], after which the
//! record store writes to it with plain `std::fs`.  The returned
//! [`SdCard`] owns the mount; dropping it unmounts the card.
//!
//! In simulation a host directory stands in for the card.

use std::path::{Path, PathBuf};

use log::info;

use crate::error::Result;

#[cfg(target_os = "espidf")]
use crate::error::Error;

/// VFS mount point of the SD card.
pub const SD_MOUNT_POINT: &str = "/sdcard";

/// Open files the FAT driver may hold at once.
#[cfg(target_os = "espidf")]
const MAX_OPEN_FILES: usize = 4;

#[cfg(target_os = "espidf")]
type MountedCard = esp_idf_svc::io::vfs::MountedFatfs<
    esp_idf_svc::fs::fatfs::Fatfs<
        esp_idf_hal::sd::SdCardDriver<
            esp_idf_hal::sd::spi::SdSpiHostDriver<'static, esp_idf_hal::spi::SpiDriver<'static>>,
        >,
    >,
>;

pub struct SdCard {
    root: PathBuf,
    #[cfg(target_os = "espidf")]
    _mount: MountedCard,
}

impl SdCard {
    /// Directory the card's files live under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Bring up the SPI bus on the board's SD pins and mount the card.
    #[cfg(target_os = "espidf")]
    pub fn mount_spi(spi: esp_idf_hal::spi::SPI3) -> Result<Self> {
        use esp_idf_hal::gpio::AnyIOPin;
        use esp_idf_hal::sd::spi::SdSpiHostDriver;
        use esp_idf_hal::sd::{SdCardConfiguration, SdCardDriver};
        use esp_idf_hal::spi::config::DriverConfig;
        use esp_idf_hal::spi::{Dma, SpiDriver};
        use esp_idf_svc::fs::fatfs::Fatfs;
        use esp_idf_svc::io::vfs::MountedFatfs;
        use log::warn;

        use crate::pins;

        // SAFETY: the SD pins come from the board map and no other driver
        // claims them.
        let (sck, mosi, miso, cs) = unsafe {
            (
                AnyIOPin::new(pins::SD_SCK_GPIO),
                AnyIOPin::new(pins::SD_MOSI_GPIO),
                AnyIOPin::new(pins::SD_MISO_GPIO),
                AnyIOPin::new(pins::SD_CS_GPIO),
            )
        };

        let bus = SpiDriver::new(
            spi,
            sck,
            mosi,
            Some(miso),
            &DriverConfig::default().dma(Dma::Auto(4096)),
        )
        .map_err(|e| {
            warn!("SD: SPI bus init failed: {}", e);
            Error::Init("sd spi bus")
        })?;
        let host = SdSpiHostDriver::new(
            bus,
            Some(cs),
            AnyIOPin::none(),
            AnyIOPin::none(),
            AnyIOPin::none(),
            None,
        )
        .map_err(|e| {
            warn!("SD: SPI host init failed: {}", e);
            Error::Init("sd spi host")
        })?;
        let card = SdCardDriver::new_spi(host, &SdCardConfiguration::new()).map_err(|e| {
            warn!("SD: no card answered: {}", e);
            Error::Init("sd card")
        })?;
        let fatfs = Fatfs::new_sdcard(0, card).map_err(|e| {
            warn!("SD: FAT driver failed: {}", e);
            Error::Init("sd fatfs")
        })?;
        let mount = MountedFatfs::mount(fatfs, SD_MOUNT_POINT, MAX_OPEN_FILES).map_err(|e| {
            warn!("SD: mount at {} failed: {}", SD_MOUNT_POINT, e);
            Error::Init("sd mount")
        })?;

        info!("SD: FAT mounted at {}", SD_MOUNT_POINT);
        Ok(Self {
            root: PathBuf::from(SD_MOUNT_POINT),
            _mount: mount,
        })
    }

    /// Simulation: use `dir` as the card, creating it if needed.
    #[cfg(not(target_os = "espidf"))]
    pub fn mount_at(dir: impl AsRef<Path>) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| {
            log::warn!("SD(sim): cannot create {}: {}", root.display(), e);
            crate::error::Error::Init("sd mount")
        })?;
        info!("SD(sim): card at {}", root.display());
        Ok(Self { root })
    }
}

//! CSV record store on the SD card.
//!
//! Implements [`RecordStorePort`].  Each sample becomes one `epoch,wh`
//! line appended to a per-day file named after the sample's local date:
//!
//! ```text
//! <root>/power/20240301.csv
//! <root>/power/unsynced.csv      (samples sealed before the first time sync)
//! ```
//!
//! [`SdCard`] mounts the card into the VFS on the device, so plain
//! `std::fs` works on both targets.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::sd_card::SdCard;
use crate::app::ports::{PortError, RecordStorePort};
use crate::display::CivilDateTime;
use crate::energy::EnergySample;

/// Directory under the root holding the daily files.
pub const RECORD_DIR: &str = "power";
/// File collecting undated samples.
pub const UNSYNCED_FILE: &str = "unsynced.csv";

/// File name for the day a sample belongs to.
pub fn file_name_for(sample: &EnergySample, utc_offset_secs: i32) -> String {
    if !sample.is_dated() {
        return UNSYNCED_FILE.to_string();
    }
    let local = i64::from(sample.timestamp) + i64::from(utc_offset_secs);
    let d = CivilDateTime::from_epoch(local);
    format!("{:04}{:02}{:02}.csv", d.year, d.month, d.day)
}

/// One CSV line, newline-terminated.
pub fn format_record(sample: &EnergySample) -> String {
    format!("{},{}\n", sample.timestamp, sample.watt_hours)
}

pub struct CsvRecordStore {
    dir: PathBuf,
    utc_offset_secs: i32,
    appended: u32,
}

impl CsvRecordStore {
    pub fn new(root: impl AsRef<Path>, utc_offset_secs: i32) -> Self {
        Self {
            dir: root.as_ref().join(RECORD_DIR),
            utc_offset_secs,
            appended: 0,
        }
    }

    /// Store rooted on a mounted card.
    pub fn on_card(card: &SdCard, utc_offset_secs: i32) -> Self {
        Self::new(card.root(), utc_offset_secs)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Records appended since construction.
    pub fn appended(&self) -> u32 {
        self.appended
    }

    pub fn path_for(&self, sample: &EnergySample) -> PathBuf {
        self.dir.join(file_name_for(sample, self.utc_offset_secs))
    }
}

impl RecordStorePort for CsvRecordStore {
    fn append_record(&mut self, sample: &EnergySample) -> Result<(), PortError> {
        let path = self.path_for(sample);
        fs::create_dir_all(&self.dir).map_err(|e| {
            warn!("Records: cannot create {}: {}", self.dir.display(), e);
            PortError::Io
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                warn!("Records: cannot open {}: {}", path.display(), e);
                PortError::Io
            })?;
        file.write_all(format_record(sample).as_bytes())
            .map_err(|e| {
                warn!("Records: write to {} failed: {}", path.display(), e);
                PortError::Io
            })?;

        self.appended = self.appended.saturating_add(1);
        debug!("Records: {} <- {} Wh", path.display(), sample.watt_hours);
        Ok(())
    }
}

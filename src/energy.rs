//! Energy samples and the running daily total.

use serde::Serialize;

/// Seconds per day.
const DAY_SECS: i64 = 86_400;

/// Energy metered over one logging interval.
///
/// `timestamp == 0` means the clock was not yet synchronised when the
/// sample was sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnergySample {
    pub timestamp: u32,
    pub watt_hours: u16,
}

impl EnergySample {
    pub const fn new(timestamp: u32, watt_hours: u16) -> Self {
        Self {
            timestamp,
            watt_hours,
        }
    }

    pub const fn is_dated(&self) -> bool {
        self.timestamp != 0
    }
}

/// Local day number (days since 1970-01-01 in local time).
pub fn local_day(epoch: u32, utc_offset_secs: i32) -> i64 {
    (i64::from(epoch) + i64::from(utc_offset_secs)).div_euclid(DAY_SECS)
}

/// Watt-hours accumulated since local midnight.
///
/// Samples taken before the first clock sync cannot be placed on a day;
/// they are added to whatever day is current.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyTotal {
    day: Option<i64>,
    watt_hours: u32,
}

impl DailyTotal {
    /// Fold a sample in, starting a new day if the local date changed.
    /// Returns `true` when the total was reset.
    pub fn add(&mut self, sample: &EnergySample, utc_offset_secs: i32) -> bool {
        let rolled = if sample.is_dated() {
            self.roll_to(local_day(sample.timestamp, utc_offset_secs))
        } else {
            false
        };
        self.watt_hours = self.watt_hours.saturating_add(u32::from(sample.watt_hours));
        rolled
    }

    /// Reset the total if `day` differs from the day being accumulated.
    pub fn roll_to(&mut self, day: i64) -> bool {
        match self.day {
            Some(current) if current == day => false,
            Some(_) => {
                self.day = Some(day);
                self.watt_hours = 0;
                true
            }
            None => {
                self.day = Some(day);
                false
            }
        }
    }

    /// Today's energy, saturated to the 16-bit reporting range.
    pub fn watt_hours(&self) -> u16 {
        self.watt_hours.min(u32::from(u16::MAX)) as u16
    }
}

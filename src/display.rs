//! Display dirty tracking.
//!
//! Every status value the screen shows has one bit in a
//! [`DisplayFieldMask`].  Phases set the bit when they change the value;
//! the display phase hands the mask to the display collaborator and clears
//! only the bits it reports as redrawn.
//!
//! ```text
//!   bit   7     6      5    4     3     2    1       0
//!       ┌─────┬───────┬────┬─────┬─────┬────┬───────┬──────┐
//!       │Heap │ Today │Now │Time │Date │ Ip │Status │ Ssid │
//!       └─────┴───────┴────┴─────┴─────┴────┴───────┴──────┘
//! ```

use core::ops::{BitOr, BitOrAssign};

use serde::Serialize;

/// One status field on the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DisplayField {
    Ssid = 0x01,
    Status = 0x02,
    Ip = 0x04,
    Date = 0x08,
    Time = 0x10,
    Now = 0x20,
    Today = 0x40,
    Heap = 0x80,
}

impl DisplayField {
    pub const ALL: [DisplayField; 8] = [
        Self::Ssid,
        Self::Status,
        Self::Ip,
        Self::Date,
        Self::Time,
        Self::Now,
        Self::Today,
        Self::Heap,
    ];

    /// Return the bitmask for this field.
    pub const fn mask(self) -> u8 {
        self as u8
    }
}

/// Set of fields changed since their last redraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct DisplayFieldMask(u8);

impl DisplayFieldMask {
    pub const EMPTY: Self = Self(0);
    pub const ALL: Self = Self(0xFF);

    pub const SSID: Self = Self(DisplayField::Ssid.mask());
    pub const STATUS: Self = Self(DisplayField::Status.mask());
    pub const IP: Self = Self(DisplayField::Ip.mask());
    pub const DATE: Self = Self(DisplayField::Date.mask());
    pub const TIME: Self = Self(DisplayField::Time.mask());
    pub const NOW: Self = Self(DisplayField::Now.mask());
    pub const TODAY: Self = Self(DisplayField::Today.mask());
    pub const HEAP: Self = Self(DisplayField::Heap.mask());

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn has(self, field: DisplayField) -> bool {
        self.0 & field.mask() != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Fields in this set, lowest bit first.
    pub fn fields(self) -> impl Iterator<Item = DisplayField> {
        DisplayField::ALL.into_iter().filter(move |f| self.has(*f))
    }
}

impl From<DisplayField> for DisplayFieldMask {
    fn from(field: DisplayField) -> Self {
        Self(field.mask())
    }
}

impl BitOr for DisplayFieldMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DisplayFieldMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Which energy figure the screen highlights.  Toggled by a short press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DisplayMetric {
    #[default]
    Live,
    Today,
}

impl DisplayMetric {
    pub fn toggled(self) -> Self {
        match self {
            Self::Live => Self::Today,
            Self::Today => Self::Live,
        }
    }
}

/// Snapshot of every value the display collaborator may draw.
///
/// `None` means "not known yet"; the renderer shows a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayValues {
    pub ssid: heapless::String<32>,
    pub status: &'static str,
    pub ip: Option<[u8; 4]>,
    /// Local wall-clock time (UTC offset applied), `None` before first sync.
    pub local_time: Option<CivilDateTime>,
    pub now_watts: u16,
    pub today_wh: u16,
    pub heap_free: u32,
    pub metric: DisplayMetric,
}

/// Calendar date and time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CivilDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl CivilDateTime {
    /// Break seconds since 1970-01-01 into a proleptic Gregorian date.
    pub fn from_epoch(secs: i64) -> Self {
        let days = secs.div_euclid(86_400);
        let rem = secs.rem_euclid(86_400);

        // Howard Hinnant's days-from-civil inverse.
        let z = days + 719_468;
        let era = z.div_euclid(146_097);
        let doe = z.rem_euclid(146_097);
        let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
        let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
        let year = (yoe + era * 400 + i64::from(month <= 2)) as u16;

        Self {
            year,
            month,
            day,
            hour: (rem / 3600) as u8,
            minute: (rem % 3600 / 60) as u8,
            second: (rem % 60) as u8,
        }
    }
}

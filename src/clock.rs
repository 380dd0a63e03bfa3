//! Wall clock derived from the monotonic uptime plus a synced offset.
//!
//! The device has no RTC.  A successful time sync pins an epoch to the
//! uptime at which it was received; afterwards wall time is extrapolated
//! from uptime.  A failed sync never touches the stored anchor.

/// 2020-01-01T00:00:00Z.  Anything earlier is an unsynced source.
pub const EPOCH_2020: u32 = 1_577_836_800;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Anchor {
    epoch: u32,
    uptime_ms: u64,
}

/// Process-wide wall clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WallClock {
    anchor: Option<Anchor>,
}

impl WallClock {
    pub const fn unset() -> Self {
        Self { anchor: None }
    }

    pub fn is_set(&self) -> bool {
        self.anchor.is_some()
    }

    /// Pin `epoch` to the current uptime.
    pub fn set(&mut self, epoch: u32, now_ms: u64) {
        self.anchor = Some(Anchor {
            epoch,
            uptime_ms: now_ms,
        });
    }

    /// Seconds since the Unix epoch, or `None` before the first sync.
    pub fn now(&self, now_ms: u64) -> Option<u32> {
        self.anchor.map(|a| {
            let elapsed = now_ms.saturating_sub(a.uptime_ms) / 1000;
            a.epoch.saturating_add(elapsed.min(u64::from(u32::MAX)) as u32)
        })
    }

    /// Same as [`now`](Self::now) with `0` standing in for "unset".
    pub fn now_or_zero(&self, now_ms: u64) -> u32 {
        self.now(now_ms).unwrap_or(0)
    }

    /// Whether the clock needs a sync: never set, or last set at least
    /// `period_ms` ago.
    pub fn sync_due(&self, now_ms: u64, period_ms: u64) -> bool {
        match self.anchor {
            None => true,
            Some(a) => now_ms.saturating_sub(a.uptime_ms) >= period_ms,
        }
    }
}

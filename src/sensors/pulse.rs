//! Meter LED pulse accumulator.
//!
//! A photodiode on the utility meter's test LED produces one pulse per
//! `1 / pulses_per_wh` watt-hours.  The GPIO ISR calls
//! [`PulseAccumulator::on_pulse_interrupt`]; the main loop drains the
//! pending count once per logging interval and asks for a live power
//! estimate every iteration.
//!
//! ```text
//!   ISR (edge)                          main loop
//!   ──────────                          ─────────
//!   on_pulse_interrupt(now) ──▶ pending ──▶ drain_watt_hours_since_last()
//!                           ──▶ total   ──▶ total_pulses() (LED blinker)
//!                           ──▶ times   ──▶ instantaneous_rate_estimate()
//! ```
//!
//! Counters are atomics.  The two most recent pulse timestamps must be
//! updated together, so they sit behind a critical-section mutex whose
//! body is a handful of loads and stores.

use core::cell::Cell;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

/// One watt-hour per pulse expressed in watt-milliseconds.
const WATT_MS_PER_WH: u64 = 3_600_000;

#[derive(Debug, Clone, Copy, Default)]
struct PulseTimes {
    last_ms: Option<u32>,
    prev_ms: Option<u32>,
}

/// Interrupt-fed pulse counter.  `const`-constructible for use in a `static`.
pub struct PulseAccumulator {
    /// Pulses not yet folded into an energy sample.
    pending: AtomicU32,
    /// Monotonic pulse count since boot (wraps at `u32::MAX`).
    total: AtomicU32,
    pulses_per_wh: AtomicU32,
    debounce_ms: AtomicU32,
    times: Mutex<CriticalSectionRawMutex, Cell<PulseTimes>>,
}

impl Default for PulseAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseAccumulator {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            total: AtomicU32::new(0),
            pulses_per_wh: AtomicU32::new(1),
            debounce_ms: AtomicU32::new(0),
            times: Mutex::new(Cell::new(PulseTimes {
                last_ms: None,
                prev_ms: None,
            })),
        }
    }

    /// Apply calibration and the LED ringing filter.  A zero
    /// `pulses_per_wh` is treated as 1.
    pub fn configure(&self, pulses_per_wh: u16, debounce_ms: u32) {
        self.pulses_per_wh
            .store(u32::from(pulses_per_wh.max(1)), Ordering::Relaxed);
        self.debounce_ms.store(debounce_ms, Ordering::Relaxed);
    }

    /// Record one meter pulse.  ISR-safe: O(1), no allocation, no blocking.
    pub fn on_pulse_interrupt(&self, now_ms: u32) {
        let debounce = self.debounce_ms.load(Ordering::Relaxed);
        let accepted = self.times.lock(|cell| {
            let t = cell.get();
            if t.last_ms.is_some_and(|last| now_ms.wrapping_sub(last) < debounce) {
                return false;
            }
            cell.set(PulseTimes {
                last_ms: Some(now_ms),
                prev_ms: t.last_ms,
            });
            true
        });
        if accepted {
            self.pending.fetch_add(1, Ordering::Relaxed);
            self.total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take every whole watt-hour counted since the previous drain.
    ///
    /// The sub-Wh remainder stays pending for the next interval.  The
    /// result saturates at `u16::MAX`; the excess is discarded.
    pub fn drain_watt_hours_since_last(&self) -> u16 {
        let ppw = self.pulses_per_wh.load(Ordering::Relaxed).max(1);
        let taken = match self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some(c % ppw))
        {
            Ok(prev) | Err(prev) => prev,
        };
        (taken / ppw).min(u32::from(u16::MAX)) as u16
    }

    /// Live power in watts from the spacing of the two most recent pulses.
    ///
    /// When the current gap since the last pulse is already longer than
    /// the previous spacing, the gap is used instead so the estimate falls
    /// off smoothly as the load drops.  Returns 0 with fewer than two
    /// pulses or when the last pulse is older than `stale_ms`.
    pub fn instantaneous_rate_estimate(&self, now_ms: u32, stale_ms: u32) -> u16 {
        let t = self.times.lock(|cell| cell.get());
        let (Some(last), Some(prev)) = (t.last_ms, t.prev_ms) else {
            return 0;
        };
        let since_last = now_ms.wrapping_sub(last);
        if since_last > stale_ms {
            return 0;
        }
        let spacing = last.wrapping_sub(prev).max(since_last);
        if spacing == 0 {
            return 0;
        }
        let ppw = u64::from(self.pulses_per_wh.load(Ordering::Relaxed).max(1));
        let watts = WATT_MS_PER_WH / (u64::from(spacing) * ppw);
        watts.min(u64::from(u16::MAX)) as u16
    }

    /// Pulses accepted since boot.
    pub fn total_pulses(&self) -> u32 {
        self.total.load(Ordering::Relaxed)
    }
}

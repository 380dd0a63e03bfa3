//! Runtime diagnostics.
//!
//! [`RuntimeMetrics`] counts what went wrong (and how often things went
//! right) since boot.  The state machine owns one instance inside its
//! context; the admin surface serialises it on demand.
//!
//! Heap and uptime readings come straight from ESP-IDF on target and from
//! a synthetic model in simulation, so both paths exercise the same code.

use serde::Serialize;

/// Counters accumulated since boot.  All saturate instead of wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeMetrics {
    /// Completed device cycles (entries into the display phase).
    pub cycles: u32,
    pub samples_sealed: u32,
    pub publish_failures: u32,
    pub log_failures: u32,
    pub display_failures: u32,
    pub time_sync_failures: u32,
    /// Times the connection budget ran out and local-only mode began.
    pub local_only_entries: u32,
}

impl RuntimeMetrics {
    pub fn bump(counter: &mut u32) {
        *counter = counter.saturating_add(1);
    }

    /// Sum of every failure counter.
    pub fn failures(&self) -> u32 {
        self.publish_failures
            .saturating_add(self.log_failures)
            .saturating_add(self.display_failures)
            .saturating_add(self.time_sync_failures)
    }
}

// ───────────────────────────────────────────────────────────────
// Heap readings
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub fn free_heap_bytes() -> u32 {
    // SAFETY: read-only query of the allocator statistics.
    unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
}

/// Synthetic heap reading for simulation: 300 KB that "decays" slightly
/// with uptime to model fragmentation.
#[cfg(not(target_os = "espidf"))]
pub fn free_heap_bytes_at(uptime_secs: u64) -> u32 {
    let base_free: u32 = 307_200;
    let decay = (uptime_secs / 60).min(u64::from(u32::MAX / 512)) as u32 * 512;
    base_free.saturating_sub(decay)
}

// ───────────────────────────────────────────────────────────────
// Panic hook
// ───────────────────────────────────────────────────────────────

/// Install a panic hook that logs the reason before the default handler
/// resets the chip.
pub fn install_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };

        match info.location() {
            Some(loc) => log::error!("PANIC: {} at {}:{}", reason, loc.file(), loc.line()),
            None => log::error!("PANIC: {}", reason),
        }
    }));
}

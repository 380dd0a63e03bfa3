//! ESP32 monotonic time adapter.
//!
//! The main loop stamps every step with [`uptime_ms`](Esp32TimeAdapter::uptime_ms);
//! the ISR side uses the same source truncated to `u32`.
//!
//! - **`target_os = "espidf"`**: `esp_timer_get_time()`, the high-resolution
//!   boot timer (microseconds, monotonic).
//! - **`not(target_os = "espidf")`**: `std::time::Instant` for host-side
//!   testing and simulation.

/// Time since boot.
pub struct Esp32TimeAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Esp32TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32TimeAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Microseconds since boot.
    #[cfg(target_os = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        // SAFETY: plain read of the free-running boot timer.
        let us = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
        us.max(0) as u64
    }

    /// Microseconds since the adapter was created.
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Milliseconds since boot.
    pub fn uptime_ms(&self) -> u64 {
        self.uptime_us() / 1000
    }

    /// Millisecond stamp in the wrapping `u32` domain the ISRs use.
    pub fn isr_stamp_ms(&self) -> u32 {
        self.uptime_ms() as u32
    }
}

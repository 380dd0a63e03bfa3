//! System configuration parameters
//!
//! All tunable parameters for the power meter.
//! Values can be overridden via NVS (non-volatile storage).

use serde::{Deserialize, Serialize};

use crate::fsm::StateId;

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Retry budgets ---
    /// Extra association attempts before falling back to local-only mode
    pub wifi_retry_limit: u8,
    /// Extra SNTP exchanges per sync attempt
    pub time_sync_retry_limit: u8,
    /// Extra submissions of one sample to the push endpoint
    pub publish_retry_limit: u8,

    // --- Connectivity ---
    /// Period between clock resynchronisations (seconds)
    pub time_resync_period_secs: u32,
    /// How long network phases are skipped after Wi-Fi gives up (seconds)
    pub local_only_cooldown_secs: u32,
    /// Association deadline enforced by the Wi-Fi adapter (milliseconds)
    pub wifi_connect_timeout_ms: u32,
    /// SNTP response deadline enforced by the time adapter (milliseconds)
    pub time_sync_timeout_ms: u32,
    /// Run the firmware update check each cycle
    pub firmware_check_enabled: bool,
    /// Minimum time between two polls of the firmware manifest (seconds)
    pub firmware_poll_period_secs: u32,

    // --- Button ---
    /// Edges closer than this to the last recognised transition are ignored
    pub button_debounce_ms: u32,
    /// Holds at or above this duration are reported as a long press
    pub long_press_ms: u32,

    // --- Metering ---
    /// Meter LED blinks per watt-hour (1000 imp/kWh = 1)
    pub pulses_per_wh: u16,
    /// Pulses closer than this to the previous pulse are LED ringing
    pub pulse_debounce_ms: u32,
    /// Live estimate drops to 0 W when no pulse arrived for this long
    pub live_stale_secs: u32,
    /// Energy sample sealing interval (seconds)
    pub log_interval_secs: u32,
    /// Offset of local time from UTC, used for the day boundary and display
    pub utc_offset_secs: i32,

    // --- Timing ---
    /// Idle sleep between main loop iterations (milliseconds)
    pub loop_interval_ms: u32,
    /// Status LED on-time per metered pulse (milliseconds)
    pub blink_ms: u32,
}

impl SystemConfig {
    /// Retry limit for the budget armed on entry into `state`.
    ///
    /// Phases without network I/O get a zero budget.
    pub fn retry_limit_for(&self, state: StateId) -> u32 {
        match state {
            StateId::WifiConnect => self.wifi_retry_limit as u32,
            StateId::TimeSync => self.time_sync_retry_limit as u32,
            StateId::Publish => self.publish_retry_limit as u32,
            _ => 0,
        }
    }

    pub fn live_stale_ms(&self) -> u32 {
        self.live_stale_secs.saturating_mul(1000)
    }

    pub fn local_only_cooldown_ms(&self) -> u64 {
        self.local_only_cooldown_secs as u64 * 1000
    }

    pub fn time_resync_period_ms(&self) -> u64 {
        self.time_resync_period_secs as u64 * 1000
    }

    pub fn firmware_poll_period(&self) -> core::time::Duration {
        core::time::Duration::from_secs(u64::from(self.firmware_poll_period_secs))
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Retry budgets
            wifi_retry_limit: 5,
            time_sync_retry_limit: 3,
            publish_retry_limit: 2,

            // Connectivity
            time_resync_period_secs: 12 * 3600,
            local_only_cooldown_secs: 300,
            wifi_connect_timeout_ms: 5000,
            time_sync_timeout_ms: 3000,
            firmware_check_enabled: true,
            firmware_poll_period_secs: 3600,

            // Button
            button_debounce_ms: 100,
            long_press_ms: 2000,

            // Metering
            pulses_per_wh: 1,
            pulse_debounce_ms: 200,
            live_stale_secs: 300,
            log_interval_secs: 60,
            utc_offset_secs: 0,

            // Timing
            loop_interval_ms: 20,
            blink_ms: 50,
        }
    }
}

//! Task Watchdog Timer (TWDT) driver.
//!
//! Resets the device if the main loop stalls.  The timeout must cover the
//! longest blocking phase (a WiFi association or HTTP push), so it is
//! derived from the collaborator deadlines rather than fixed.
//!
//! The main loop calls `feed()` on every iteration.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

use crate::config::SystemConfig;
use crate::error::Result;

#[cfg(target_os = "espidf")]
use crate::error::Error;

/// Floor for the watchdog timeout.
pub const MIN_TIMEOUT_MS: u32 = 10_000;

/// Timeout covering the slowest phase twice over.
pub fn timeout_for(config: &SystemConfig) -> u32 {
    let slowest = config
        .wifi_connect_timeout_ms
        .max(config.time_sync_timeout_ms);
    slowest.saturating_mul(2).max(MIN_TIMEOUT_MS)
}

pub struct Watchdog {
    timeout_ms: u32,
}

impl Watchdog {
    /// Initialise and subscribe the current task to the TWDT.  Fails when
    /// the task cannot be subscribed; the caller runs unguarded then.
    pub fn new(timeout_ms: u32) -> Result<Self> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: TWDT reconfiguration and subscription of the calling
            // task; called once from main() before the loop.
            unsafe {
                let cfg = esp_task_wdt_config_t {
                    timeout_ms,
                    idle_core_mask: 0,
                    trigger_panic: true,
                };
                let ret = esp_task_wdt_reconfigure(&cfg);
                if ret != ESP_OK as i32 {
                    log::warn!(
                        "TWDT reconfigure returned {} (may already be configured)",
                        ret
                    );
                }

                let ret = esp_task_wdt_add(core::ptr::null_mut());
                if ret != ESP_OK as i32 {
                    log::warn!("Watchdog: failed to subscribe ({})", ret);
                    return Err(Error::Init("twdt subscribe"));
                }
            }
            info!("Watchdog: subscribed ({} ms timeout, panic on trigger)", timeout_ms);
            Ok(Self { timeout_ms })
        }

        #[cfg(not(target_os = "espidf"))]
        {
            log::info!("Watchdog(sim): no-op ({} ms)", timeout_ms);
            Ok(Self { timeout_ms })
        }
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Feed the watchdog.
    pub fn feed(&self) {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: resets the TWDT for the calling task, subscribed in new().
            unsafe {
                esp_task_wdt_reset();
            }
        }
    }
}

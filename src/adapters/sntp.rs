//! SNTP time source.
//!
//! Implements [`TimeSourcePort`].  On ESP-IDF the SNTP client runs in the
//! background once started; [`fetch_epoch`](TimeSourcePort::fetch_epoch)
//! waits, up to the configured response deadline, for the first completed
//! exchange and then reads the system clock it set.
//!
//! The simulation backend reads the host clock.  Plausibility (no epochs
//! before 2020) is judged by the state machine, not here.

use log::debug;

use crate::app::ports::{PortError, TimeSourcePort};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sntp::{EspSntp, SyncStatus};

pub struct SntpTimeSource {
    #[cfg(target_os = "espidf")]
    sntp: Option<EspSntp<'static>>,
    response_timeout_ms: u32,
    /// Simulation: forced outcome for the next fetches.
    #[cfg(not(target_os = "espidf"))]
    sim_failure: Option<PortError>,
}

impl SntpTimeSource {
    pub fn new(response_timeout_ms: u32) -> Self {
        Self {
            #[cfg(target_os = "espidf")]
            sntp: None,
            response_timeout_ms,
            #[cfg(not(target_os = "espidf"))]
            sim_failure: None,
        }
    }

    /// Simulate an unreachable server until cleared with `None`.
    #[cfg(not(target_os = "espidf"))]
    pub fn set_sim_failure(&mut self, failure: Option<PortError>) {
        self.sim_failure = failure;
    }

    fn system_epoch() -> Result<u32, PortError> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|_| PortError::InvalidResponse)?;
        u32::try_from(now.as_secs()).map_err(|_| PortError::InvalidResponse)
    }
}

impl TimeSourcePort for SntpTimeSource {
    #[cfg(target_os = "espidf")]
    fn fetch_epoch(&mut self) -> Result<u32, PortError> {
        use std::time::{Duration, Instant};

        // The client needs a network interface, so it is started lazily on
        // the first sync rather than at boot.
        if self.sntp.is_none() {
            let sntp = EspSntp::new_default().map_err(|_| PortError::Unavailable)?;
            self.sntp = Some(sntp);
        }
        let Some(sntp) = self.sntp.as_ref() else {
            return Err(PortError::Unavailable);
        };

        let deadline =
            Instant::now() + Duration::from_millis(u64::from(self.response_timeout_ms));
        while sntp.get_sync_status() != SyncStatus::Completed {
            if Instant::now() >= deadline {
                debug!("SNTP: no response within {} ms", self.response_timeout_ms);
                return Err(PortError::Timeout);
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        Self::system_epoch()
    }

    #[cfg(not(target_os = "espidf"))]
    fn fetch_epoch(&mut self) -> Result<u32, PortError> {
        if let Some(e) = self.sim_failure {
            debug!(
                "SNTP(sim): failing with {} (deadline {} ms)",
                e, self.response_timeout_ms
            );
            return Err(e);
        }
        Self::system_epoch()
    }
}

//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing one structured line per application
//! event to the ESP-IDF logger (UART / USB-CDC in production).  A status
//! page or MQTT bridge would implement the same trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink {
    emitted: u32,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self { emitted: 0 }
    }

    /// Events seen since construction.
    pub fn emitted(&self) -> u32 {
        self.emitted
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        self.emitted = self.emitted.wrapping_add(1);
        match event {
            AppEvent::Started(state) => {
                info!("START | initial_state={:?}", state);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::Connected { ip } => {
                info!("LINK | up ip={}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3]);
            }
            AppEvent::LocalOnlyEntered { cooldown_secs } => {
                warn!("LINK | local-only for {}s", cooldown_secs);
            }
            AppEvent::LocalOnlyLeft => {
                info!("LINK | leaving local-only");
            }
            AppEvent::ClockSynced(epoch) => {
                info!("CLOCK | synced epoch={}", epoch);
            }
            AppEvent::TimeSyncFailed(e) => {
                warn!("CLOCK | sync failed: {}", e);
            }
            AppEvent::UpdateInstalled => {
                info!("OTA | new image installed, restart pending");
            }
            AppEvent::SampleSealed(s) => {
                info!("SAMPLE | t={} wh={}", s.timestamp, s.watt_hours);
            }
            AppEvent::PublishFailed(e) => {
                warn!("SAMPLE | publish failed: {}", e);
            }
            AppEvent::LogFailed(e) => {
                warn!("SAMPLE | local log failed: {}", e);
            }
            AppEvent::DisplayFailed(e) => {
                warn!("SCREEN | redraw failed: {}", e);
            }
            AppEvent::Button(press) => {
                info!("BUTTON | {:?}", press);
            }
        }
    }
}

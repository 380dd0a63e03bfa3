//! Pulse indicator LED.
//!
//! Mirrors the meter: every accepted pulse lights the status LED for
//! `blink_ms`.  Polled from the main loop, never blocks; a pulse arriving
//! while the LED is already lit just extends the blink.
//!
//! Generic over any `embedded_hal::digital::OutputPin`, so the host tests
//! drive a recording pin and the firmware an `esp_idf_hal` `PinDriver`.

use embedded_hal::digital::OutputPin;

pub struct PulseBlinker<P: OutputPin> {
    pin: P,
    blink_ms: u32,
    seen_pulses: u32,
    off_at_ms: Option<u64>,
}

impl<P: OutputPin> PulseBlinker<P> {
    pub fn new(mut pin: P, blink_ms: u32) -> Self {
        let _ = pin.set_low();
        Self {
            pin,
            blink_ms,
            seen_pulses: 0,
            off_at_ms: None,
        }
    }

    /// Compare `total_pulses` with the last poll and drive the LED.
    pub fn poll(&mut self, total_pulses: u32, now_ms: u64) {
        if total_pulses != self.seen_pulses {
            self.seen_pulses = total_pulses;
            if self.off_at_ms.is_none() {
                let _ = self.pin.set_high();
            }
            self.off_at_ms = Some(now_ms + u64::from(self.blink_ms));
            return;
        }
        if let Some(off_at) = self.off_at_ms {
            if now_ms >= off_at {
                let _ = self.pin.set_low();
                self.off_at_ms = None;
            }
        }
    }

    pub fn is_lit(&self) -> bool {
        self.off_at_ms.is_some()
    }
}
